//! Seasonal and calendar-event adjustment factors.
//!
//! Sales of pet products move with the Indian retail calendar: festival
//! season peaks, monsoon lulls, and named events like Diwali week. This
//! module turns a date (plus optional sales history) into multiplicative
//! adjustment factors the forecast layer applies to its totals.

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::models::SalesSeries;

/// Minimum days of history before a weekly pattern is reported.
const MIN_DAYS_WEEKLY: usize = 7;
/// Minimum days of history before a monthly pattern is reported.
const MIN_DAYS_MONTHLY: usize = 30;
/// Ratio a side must exceed for a weekend/weekday-heavy classification.
const PATTERN_RATIO: f64 = 1.2;
/// How far ahead to scan for upcoming events.
const EVENT_LOOKAHEAD_DAYS: i64 = 14;

/// Named calendar events and their demand multipliers, keyed by
/// (month, day range).
const EVENTS: &[(u32, (u32, u32), &str, f64)] = &[
    (1, (10, 26), "Makar Sankranti/Republic Day", 1.1),
    (3, (1, 31), "Holi Season", 0.9),
    (8, (15, 31), "Independence Day/Raksha Bandhan", 1.05),
    (9, (1, 30), "Ganesh Chaturthi/Navratri Start", 1.1),
    (10, (1, 31), "Dussehra/Pre-Diwali", 1.3),
    (11, (1, 15), "Diwali Week", 1.5),
    (12, (20, 31), "Christmas/New Year", 1.2),
];

/// The four seasons of the Indian retail calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Season {
    Summer,
    Monsoon,
    Festival,
    Winter,
}

impl Season {
    pub fn for_date(date: NaiveDate) -> Self {
        match date.month() {
            3..=5 => Season::Summer,
            6..=9 => Season::Monsoon,
            10 | 11 => Season::Festival,
            _ => Season::Winter,
        }
    }
}

/// Active or upcoming calendar event and its impact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventImpact {
    pub has_event: bool,
    pub event_name: Option<String>,
    /// Days until the event starts; `None` when the event is active now.
    pub days_until: Option<u32>,
    pub impact_multiplier: f64,
    pub recommendation: Option<String>,
}

impl EventImpact {
    fn none() -> Self {
        Self {
            has_event: false,
            event_name: None,
            days_until: None,
            impact_multiplier: 1.0,
            recommendation: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WeeklyPatternKind {
    WeekendHeavy,
    WeekdayHeavy,
    Uniform,
}

/// Mean units sold for one day of the week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAverage {
    pub day: String,
    pub average_units: f64,
}

/// Day-of-week sales pattern over the observed history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPattern {
    pub daily_averages: Vec<DayAverage>,
    pub kind: WeeklyPatternKind,
    pub peak_day: String,
    pub low_day: String,
    pub weekend_weekday_ratio: f64,
    pub recommendation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MonthPeriod {
    Start,
    Mid,
    End,
}

/// Start/mid/end-of-month sales pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPattern {
    pub start_month_avg: f64,
    pub mid_month_avg: f64,
    pub end_month_avg: f64,
    pub peak_period: MonthPeriod,
    pub low_period: MonthPeriod,
    pub insight: String,
}

/// Advisory message derived from the seasonal context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalRecommendation {
    pub kind: String,
    pub priority: String,
    pub message: String,
}

/// Complete seasonal context for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalAdjustment {
    pub current_season: Season,
    pub seasonal_factor: f64,
    pub event_impact: EventImpact,
    pub weekly_pattern: Option<WeeklyPattern>,
    pub monthly_pattern: Option<MonthlyPattern>,
    /// seasonal_factor × event multiplier; multiplied into forecast totals.
    pub combined_adjustment_factor: f64,
    pub recommendations: Vec<SeasonalRecommendation>,
}

/// Analyzes seasonal patterns in pet product sales.
#[derive(Debug, Clone, Default)]
pub struct SeasonalAnalyzer;

impl SeasonalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Seasonal multiplier for a (pet type, product category) pair on the
    /// given date. Unknown pet types fall back to the per-season defaults.
    pub fn seasonal_factor(
        &self,
        date: NaiveDate,
        pet_type: &str,
        product_category: &str,
    ) -> f64 {
        let season = Season::for_date(date);
        if let Some(table) = pet_pattern(pet_type, season) {
            return table
                .iter()
                .find(|(cat, _)| *cat == product_category)
                .or_else(|| table.iter().find(|(cat, _)| *cat == "regular"))
                .map(|(_, factor)| *factor)
                .unwrap_or(1.0);
        }
        default_season_factor(season)
    }

    /// Event impact for `date`: the active event if one covers the date,
    /// otherwise the nearest event starting within the next two weeks.
    pub fn event_impact(&self, date: NaiveDate) -> EventImpact {
        if let Some((name, multiplier)) = event_on(date) {
            return EventImpact {
                has_event: true,
                event_name: Some(name.to_string()),
                days_until: None,
                impact_multiplier: multiplier,
                recommendation: Some(event_recommendation(name).to_string()),
            };
        }

        for days_ahead in 1..=EVENT_LOOKAHEAD_DAYS {
            let future = date + Duration::days(days_ahead);
            if let Some((name, multiplier)) = event_on(future) {
                return EventImpact {
                    has_event: true,
                    event_name: Some(format!("Upcoming: {}", name)),
                    days_until: Some(days_ahead as u32),
                    impact_multiplier: multiplier,
                    recommendation: Some(format!(
                        "Stock up! {} in {} days",
                        name, days_ahead
                    )),
                };
            }
        }

        EventImpact::none()
    }

    /// Day-of-week pattern; `None` below seven days of history.
    pub fn weekly_pattern(&self, series: &SalesSeries) -> Option<WeeklyPattern> {
        if series.len() < MIN_DAYS_WEEKLY {
            return None;
        }

        let mut sums = [0.0f64; 7];
        let mut counts = [0usize; 7];
        for obs in series.observations() {
            let idx = obs.date.weekday().num_days_from_monday() as usize;
            sums[idx] += f64::from(obs.units_sold);
            counts[idx] += 1;
        }

        let averages: Vec<f64> = (0..7)
            .map(|i| if counts[i] > 0 { sums[i] / counts[i] as f64 } else { 0.0 })
            .collect();

        let weekend_avg = (averages[5] + averages[6]) / 2.0;
        let weekday_avg = averages[..5].iter().sum::<f64>() / 5.0;

        let kind = if weekend_avg > weekday_avg * PATTERN_RATIO {
            WeeklyPatternKind::WeekendHeavy
        } else if weekday_avg > weekend_avg * PATTERN_RATIO {
            WeeklyPatternKind::WeekdayHeavy
        } else {
            WeeklyPatternKind::Uniform
        };

        let peak_idx = max_index(&averages);
        let low_idx = min_index(&averages);
        let peak_day = day_name(peak_idx).to_string();
        let low_day = day_name(low_idx).to_string();

        let recommendation = match kind {
            WeeklyPatternKind::WeekendHeavy => {
                format!("Ensure full stock by Friday. Peak day is {}", peak_day)
            }
            WeeklyPatternKind::WeekdayHeavy => {
                format!("Focus restocking on Sunday evening. Peak day is {}", peak_day)
            }
            WeeklyPatternKind::Uniform => {
                "Sales are uniform throughout the week".to_string()
            }
        };

        Some(WeeklyPattern {
            daily_averages: averages
                .iter()
                .enumerate()
                .map(|(i, avg)| DayAverage {
                    day: day_name(i).to_string(),
                    average_units: round2(*avg),
                })
                .collect(),
            kind,
            peak_day,
            low_day,
            weekend_weekday_ratio: round2(weekend_avg / weekday_avg.max(0.01)),
            recommendation,
        })
    }

    /// Start/mid/end-of-month pattern; `None` below thirty days of history.
    pub fn monthly_pattern(&self, series: &SalesSeries) -> Option<MonthlyPattern> {
        if series.len() < MIN_DAYS_MONTHLY {
            return None;
        }

        let mut sums = [0.0f64; 3];
        let mut counts = [0usize; 3];
        for obs in series.observations() {
            let idx = match obs.date.day() {
                1..=10 => 0,
                11..=20 => 1,
                _ => 2,
            };
            sums[idx] += f64::from(obs.units_sold);
            counts[idx] += 1;
        }

        let avgs: Vec<f64> = (0..3)
            .map(|i| if counts[i] > 0 { sums[i] / counts[i] as f64 } else { 0.0 })
            .collect();

        const PERIODS: [MonthPeriod; 3] =
            [MonthPeriod::Start, MonthPeriod::Mid, MonthPeriod::End];
        let peak_period = PERIODS[max_index(&avgs)];
        let low_period = PERIODS[min_index(&avgs)];

        Some(MonthlyPattern {
            start_month_avg: round2(avgs[0]),
            mid_month_avg: round2(avgs[1]),
            end_month_avg: round2(avgs[2]),
            peak_period,
            low_period,
            insight: format!("Sales peak at {} of month", peak_period),
        })
    }

    /// Complete adjustment context: seasonal factor, event impact, observed
    /// patterns, and the combined multiplier applied to forecasts.
    pub fn adjustment_factors(
        &self,
        series: Option<&SalesSeries>,
        pet_type: &str,
        product_category: &str,
        today: NaiveDate,
    ) -> SeasonalAdjustment {
        let seasonal_factor = self.seasonal_factor(today, pet_type, product_category);
        let event_impact = self.event_impact(today);

        let weekly_pattern = series.and_then(|s| self.weekly_pattern(s));
        let monthly_pattern = series.and_then(|s| self.monthly_pattern(s));

        let combined = round2(seasonal_factor * event_impact.impact_multiplier);
        debug!(
            season = %Season::for_date(today),
            seasonal_factor,
            event_multiplier = event_impact.impact_multiplier,
            combined,
            "seasonal adjustment computed"
        );

        let recommendations =
            build_recommendations(seasonal_factor, &event_impact, weekly_pattern.as_ref());

        SeasonalAdjustment {
            current_season: Season::for_date(today),
            seasonal_factor,
            event_impact,
            weekly_pattern,
            monthly_pattern,
            combined_adjustment_factor: combined,
            recommendations,
        }
    }
}

fn event_on(date: NaiveDate) -> Option<(&'static str, f64)> {
    let month = date.month();
    let day = date.day();
    EVENTS
        .iter()
        .find(|(m, (from, to), _, _)| *m == month && day >= *from && day <= *to)
        .map(|(_, _, name, multiplier)| (*name, *multiplier))
}

fn event_recommendation(event_name: &str) -> &'static str {
    match event_name {
        "Diwali Week" => "Stock up on pet calming products, treats, and comfortable beds",
        "Makar Sankranti/Republic Day" => "Increase stock of outdoor pet accessories",
        "Holi Season" => "Stock pet-safe cleaning products and anti-stain items",
        "Christmas/New Year" => "Increase stock of pet gifts, toys, and winter care",
        _ => "Consider increasing stock levels",
    }
}

/// Season-specific multiplier tables per pet type. Categories not listed
/// fall through to the `regular` entry.
fn pet_pattern(pet_type: &str, season: Season) -> Option<&'static [(&'static str, f64)]> {
    let table: &[(&str, f64)] = match (pet_type, season) {
        ("dog", Season::Summer) => {
            &[("cooling_products", 1.5), ("grooming", 1.4), ("regular", 1.1)]
        }
        ("dog", Season::Monsoon) => {
            &[("raincoats", 1.8), ("anti_fungal", 1.5), ("regular", 0.9)]
        }
        ("dog", Season::Winter) => {
            &[("sweaters", 1.7), ("joint_care", 1.3), ("regular", 1.0)]
        }
        ("dog", Season::Festival) => {
            &[("treats", 1.6), ("calming", 1.8), ("regular", 1.2)]
        }
        ("cat", Season::Summer) => &[("cooling_products", 1.3), ("regular", 1.0)],
        ("cat", Season::Monsoon) => &[("indoor_toys", 1.4), ("regular", 0.95)],
        ("cat", Season::Winter) => &[("warm_beds", 1.5), ("regular", 1.0)],
        ("cat", Season::Festival) => &[("calming", 1.5), ("regular", 1.1)],
        ("bird", Season::Summer) => &[("cage_covers", 1.2), ("regular", 1.0)],
        ("bird", Season::Monsoon) => &[("regular", 0.9)],
        ("bird", Season::Winter) => &[("cage_warmers", 1.4), ("regular", 1.0)],
        ("bird", Season::Festival) => &[("calming", 1.3), ("regular", 1.0)],
        _ => return None,
    };
    Some(table)
}

fn default_season_factor(season: Season) -> f64 {
    match season {
        Season::Summer => 1.1,
        Season::Monsoon => 0.9,
        Season::Festival => 1.3,
        Season::Winter => 1.0,
    }
}

fn build_recommendations(
    seasonal_factor: f64,
    event_impact: &EventImpact,
    weekly_pattern: Option<&WeeklyPattern>,
) -> Vec<SeasonalRecommendation> {
    let mut recommendations = Vec::new();

    if seasonal_factor > 1.2 {
        recommendations.push(SeasonalRecommendation {
            kind: "seasonal".to_string(),
            priority: "high".to_string(),
            message: format!(
                "High season detected. Increase stock by {}%",
                ((seasonal_factor - 1.0) * 100.0) as i64
            ),
        });
    }

    if event_impact.has_event && event_impact.days_until.unwrap_or(0) <= 7 {
        recommendations.push(SeasonalRecommendation {
            kind: "event".to_string(),
            priority: "urgent".to_string(),
            message: event_impact
                .recommendation
                .clone()
                .unwrap_or_else(|| "Prepare for upcoming event".to_string()),
        });
    }

    if let Some(pattern) = weekly_pattern {
        recommendations.push(SeasonalRecommendation {
            kind: "weekly".to_string(),
            priority: "medium".to_string(),
            message: pattern.recommendation.clone(),
        });
    }

    recommendations
}

fn day_name(index: usize) -> &'static str {
    match index {
        0 => "Monday",
        1 => "Tuesday",
        2 => "Wednesday",
        3 => "Thursday",
        4 => "Friday",
        5 => "Saturday",
        _ => "Sunday",
    }
}

fn max_index(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn min_index(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SalesObservation;
    use rust_decimal::Decimal;
    use test_case::test_case;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series_with(units: &[u32], start: NaiveDate) -> SalesSeries {
        let records = units.iter().enumerate().map(|(i, &u)| SalesObservation {
            date: start + Duration::days(i as i64),
            units_sold: u,
            revenue: Decimal::ZERO,
            returns_count: 0,
        });
        SalesSeries::build(start, start + Duration::days(units.len() as i64 - 1), records)
    }

    #[test_case(date(2025, 4, 15), Season::Summer; "april is summer")]
    #[test_case(date(2025, 7, 1), Season::Monsoon; "july is monsoon")]
    #[test_case(date(2025, 10, 5), Season::Festival; "october is festival")]
    #[test_case(date(2025, 1, 20), Season::Winter; "january is winter")]
    fn season_mapping(d: NaiveDate, expected: Season) {
        assert_eq!(Season::for_date(d), expected);
    }

    #[test]
    fn dog_cooling_products_peak_in_summer() {
        let analyzer = SeasonalAnalyzer::new();
        let factor = analyzer.seasonal_factor(date(2025, 4, 10), "dog", "cooling_products");
        assert_eq!(factor, 1.5);
    }

    #[test]
    fn unknown_category_falls_back_to_regular() {
        let analyzer = SeasonalAnalyzer::new();
        let factor = analyzer.seasonal_factor(date(2025, 4, 10), "dog", "leashes");
        assert_eq!(factor, 1.1);
    }

    #[test]
    fn unknown_pet_type_uses_default_season_table() {
        let analyzer = SeasonalAnalyzer::new();
        let factor = analyzer.seasonal_factor(date(2025, 10, 10), "hamster", "regular");
        assert_eq!(factor, 1.3);
    }

    #[test]
    fn active_event_is_reported_without_days_until() {
        let analyzer = SeasonalAnalyzer::new();
        let impact = analyzer.event_impact(date(2025, 11, 5));
        assert!(impact.has_event);
        assert_eq!(impact.event_name.as_deref(), Some("Diwali Week"));
        assert_eq!(impact.days_until, None);
        assert_eq!(impact.impact_multiplier, 1.5);
        assert!(impact.recommendation.unwrap().contains("calming"));
    }

    #[test]
    fn upcoming_event_within_two_weeks_is_flagged() {
        let analyzer = SeasonalAnalyzer::new();
        // Republic Day window starts Jan 10.
        let impact = analyzer.event_impact(date(2025, 1, 2));
        assert!(impact.has_event);
        assert_eq!(impact.days_until, Some(8));
        assert!(impact.event_name.unwrap().starts_with("Upcoming:"));
    }

    #[test]
    fn quiet_period_has_no_event() {
        let analyzer = SeasonalAnalyzer::new();
        let impact = analyzer.event_impact(date(2025, 5, 2));
        assert!(!impact.has_event);
        assert_eq!(impact.impact_multiplier, 1.0);
    }

    #[test]
    fn weekly_pattern_requires_seven_days() {
        let analyzer = SeasonalAnalyzer::new();
        let series = series_with(&[1, 2, 3], date(2025, 6, 2));
        assert!(analyzer.weekly_pattern(&series).is_none());
    }

    #[test]
    fn weekend_heavy_pattern_detected() {
        let analyzer = SeasonalAnalyzer::new();
        // Two weeks starting on a Monday: 2/day on weekdays, 10/day weekends.
        let units: Vec<u32> = (0..14)
            .map(|i| if i % 7 >= 5 { 10 } else { 2 })
            .collect();
        let series = series_with(&units, date(2025, 6, 2));

        let pattern = analyzer.weekly_pattern(&series).unwrap();
        assert_eq!(pattern.kind, WeeklyPatternKind::WeekendHeavy);
        assert!(pattern.recommendation.contains("Friday"));
        assert!(pattern.weekend_weekday_ratio > PATTERN_RATIO);
    }

    #[test]
    fn uniform_pattern_detected() {
        let analyzer = SeasonalAnalyzer::new();
        let series = series_with(&[3; 14], date(2025, 6, 2));
        let pattern = analyzer.weekly_pattern(&series).unwrap();
        assert_eq!(pattern.kind, WeeklyPatternKind::Uniform);
    }

    #[test]
    fn monthly_pattern_requires_thirty_days() {
        let analyzer = SeasonalAnalyzer::new();
        let series = series_with(&[1; 20], date(2025, 6, 1));
        assert!(analyzer.monthly_pattern(&series).is_none());
    }

    #[test]
    fn monthly_pattern_finds_peak_period() {
        let analyzer = SeasonalAnalyzer::new();
        // June 1-30: strong start of month, weak end.
        let units: Vec<u32> = (1..=30).map(|d| if d <= 10 { 8 } else { 1 }).collect();
        let series = series_with(&units, date(2025, 6, 1));

        let pattern = analyzer.monthly_pattern(&series).unwrap();
        assert_eq!(pattern.peak_period, MonthPeriod::Start);
        assert!(pattern.insight.contains("start"));
    }

    #[test]
    fn combined_factor_is_product_of_season_and_event() {
        let analyzer = SeasonalAnalyzer::new();
        // Diwali week: festival season (dog regular 1.2) x event 1.5.
        let adjustment =
            analyzer.adjustment_factors(None, "dog", "regular", date(2025, 11, 5));
        assert_eq!(adjustment.seasonal_factor, 1.2);
        assert_eq!(adjustment.event_impact.impact_multiplier, 1.5);
        assert_eq!(adjustment.combined_adjustment_factor, 1.8);
    }

    #[test]
    fn recommendations_include_active_event() {
        let analyzer = SeasonalAnalyzer::new();
        let adjustment =
            analyzer.adjustment_factors(None, "cat", "calming", date(2025, 11, 3));
        assert!(adjustment
            .recommendations
            .iter()
            .any(|r| r.kind == "event" && r.priority == "urgent"));
    }
}
