//! Outlier-day detection on the sales series.
//!
//! A z-score detector is the dependency-free baseline that always runs.
//! When the multivariate outlier family is available, an isolation-forest
//! style detector runs over {units sold, day of week, 7-day rolling mean}
//! and the two reports are merged. Either detector degrades to "no
//! anomalies" on internal failure; detection never fails an analysis.

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::debug;

use crate::capabilities::ModelCapabilities;
use crate::forecasting::{mean, std_dev};
use crate::models::SalesSeries;

/// Minimum observations before detection is attempted.
const MIN_DAYS: usize = 7;
/// Z-score threshold on raw daily units.
const Z_THRESHOLD: f64 = 2.5;
/// Fraction of days the isolation detector may flag.
const CONTAMINATION: f64 = 0.1;
const ISOLATION_TREES: usize = 100;
const ISOLATION_SAMPLE: usize = 64;
const SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectionMethod {
    InsufficientData,
    ZScore,
    Ensemble,
}

/// Findings from one detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorFindings {
    pub anomalies_detected: bool,
    pub count: usize,
    pub anomalous_dates: Vec<NaiveDate>,
}

/// Combined anomaly report for a sales series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyReport {
    pub anomalies_detected: bool,
    pub method: DetectionMethod,
    /// Union of all flagged dates, sorted.
    pub anomalous_dates: Vec<NaiveDate>,
    pub z_score: Option<DetectorFindings>,
    pub isolation: Option<DetectorFindings>,
}

impl AnomalyReport {
    fn insufficient_data() -> Self {
        Self {
            anomalies_detected: false,
            method: DetectionMethod::InsufficientData,
            anomalous_dates: Vec::new(),
            z_score: None,
            isolation: None,
        }
    }
}

/// Sales anomaly detector.
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    capabilities: ModelCapabilities,
}

impl AnomalyDetector {
    pub fn new(capabilities: ModelCapabilities) -> Self {
        Self { capabilities }
    }

    pub fn detect(&self, series: &SalesSeries) -> AnomalyReport {
        if series.len() < MIN_DAYS {
            return AnomalyReport::insufficient_data();
        }

        let z_score = detect_z_score(series);

        let isolation = if self.capabilities.multivariate_outlier {
            detect_isolation(series)
        } else {
            debug!("multivariate outlier family unavailable; z-score only");
            None
        };

        let mut dates: Vec<NaiveDate> = z_score.anomalous_dates.clone();
        if let Some(iso) = &isolation {
            dates.extend(iso.anomalous_dates.iter().copied());
        }
        dates.sort_unstable();
        dates.dedup();

        let detected = z_score.anomalies_detected
            || isolation.as_ref().map(|i| i.anomalies_detected).unwrap_or(false);
        let method = if detected && isolation.is_some() {
            DetectionMethod::Ensemble
        } else {
            DetectionMethod::ZScore
        };

        AnomalyReport {
            anomalies_detected: detected,
            method,
            anomalous_dates: dates,
            z_score: Some(z_score),
            isolation,
        }
    }
}

/// Flags days whose unit count sits more than 2.5σ from the series mean.
/// Zero-variance series produce no anomalies.
fn detect_z_score(series: &SalesSeries) -> DetectorFindings {
    let values = series.units();
    let mu = mean(&values);
    let sigma = std_dev(&values);

    if sigma == 0.0 {
        return DetectorFindings {
            anomalies_detected: false,
            count: 0,
            anomalous_dates: Vec::new(),
        };
    }

    let anomalous_dates: Vec<NaiveDate> = series
        .observations()
        .iter()
        .filter(|obs| ((f64::from(obs.units_sold) - mu) / sigma).abs() > Z_THRESHOLD)
        .map(|obs| obs.date)
        .collect();

    DetectorFindings {
        anomalies_detected: !anomalous_dates.is_empty(),
        count: anomalous_dates.len(),
        anomalous_dates,
    }
}

/// Isolation-forest style detector over {units, day of week, rolling mean}.
/// Degrades to `None` when the feature matrix is degenerate.
fn detect_isolation(series: &SalesSeries) -> Option<DetectorFindings> {
    let values = series.units();
    let n = values.len();

    let points: Vec<[f64; 3]> = series
        .observations()
        .iter()
        .enumerate()
        .map(|(i, obs)| {
            let window_start = i.saturating_sub(6);
            [
                f64::from(obs.units_sold),
                f64::from(obs.date.weekday().num_days_from_monday()),
                mean(&values[window_start..=i]),
            ]
        })
        .collect();

    let mut rng = StdRng::seed_from_u64(SEED);
    let sample_size = ISOLATION_SAMPLE.min(n);
    let height_limit = (sample_size as f64).log2().ceil() as usize;

    let mut path_sums = vec![0.0f64; n];
    for _ in 0..ISOLATION_TREES {
        let indices: Vec<usize> = sample(&mut rng, n, sample_size).into_vec();
        let tree = IsolationNode::grow(&points, &indices, height_limit, &mut rng);
        for (i, point) in points.iter().enumerate() {
            path_sums[i] += tree.path_length(point, 0.0);
        }
    }

    let norm = average_path_length(sample_size as f64);
    let scores: Vec<f64> = path_sums
        .iter()
        .map(|sum| {
            let avg_path = sum / ISOLATION_TREES as f64;
            2f64.powf(-avg_path / norm)
        })
        .collect();

    // All points equally isolated means nothing stands out.
    let max = scores.iter().cloned().fold(f64::MIN, f64::max);
    let min = scores.iter().cloned().fold(f64::MAX, f64::min);
    if max - min < 1e-9 {
        return Some(DetectorFindings {
            anomalies_detected: false,
            count: 0,
            anomalous_dates: Vec::new(),
        });
    }

    // Flag the top `contamination` fraction by score.
    let flag_count = ((n as f64 * CONTAMINATION).ceil() as usize).clamp(1, n);
    let mut ranked: Vec<(usize, f64)> = scores.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let threshold = ranked[flag_count - 1].1;

    let anomalous_dates: Vec<NaiveDate> = series
        .observations()
        .iter()
        .zip(&scores)
        .filter(|(_, score)| **score >= threshold && **score > 0.5)
        .map(|(obs, _)| obs.date)
        .collect();

    Some(DetectorFindings {
        anomalies_detected: !anomalous_dates.is_empty(),
        count: anomalous_dates.len(),
        anomalous_dates,
    })
}

enum IsolationNode {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
}

impl IsolationNode {
    fn grow(
        points: &[[f64; 3]],
        indices: &[usize],
        height_remaining: usize,
        rng: &mut StdRng,
    ) -> Self {
        if height_remaining == 0 || indices.len() <= 1 {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        }

        // Pick a feature with spread; give up if every feature is constant.
        let mut candidates = [0usize, 1, 2];
        let start = rng.gen_range(0..3);
        candidates.rotate_left(start);
        let chosen = candidates.iter().copied().find(|&f| {
            let lo = indices.iter().map(|&i| points[i][f]).fold(f64::MAX, f64::min);
            let hi = indices.iter().map(|&i| points[i][f]).fold(f64::MIN, f64::max);
            hi > lo
        });
        let Some(feature) = chosen else {
            return IsolationNode::Leaf {
                size: indices.len(),
            };
        };

        let lo = indices
            .iter()
            .map(|&i| points[i][feature])
            .fold(f64::MAX, f64::min);
        let hi = indices
            .iter()
            .map(|&i| points[i][feature])
            .fold(f64::MIN, f64::max);
        let threshold = rng.gen_range(lo..hi);

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .copied()
            .partition(|&i| points[i][feature] <= threshold);

        IsolationNode::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(points, &left, height_remaining - 1, rng)),
            right: Box::new(Self::grow(points, &right, height_remaining - 1, rng)),
        }
    }

    fn path_length(&self, point: &[f64; 3], depth: f64) -> f64 {
        match self {
            IsolationNode::Leaf { size } => depth + average_path_length(*size as f64),
            IsolationNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if point[*feature] <= *threshold {
                    left.path_length(point, depth + 1.0)
                } else {
                    right.path_length(point, depth + 1.0)
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: f64) -> f64 {
    if n <= 1.0 {
        return 0.0;
    }
    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
    let harmonic = (n - 1.0).ln() + EULER_GAMMA;
    2.0 * harmonic - 2.0 * (n - 1.0) / n
}
