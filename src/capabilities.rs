//! Model-family availability flags.
//!
//! Every forecasting family the engine can use is guarded by a flag so the
//! cascade paths are explicit and testable. The flags are resolved once per
//! process from the environment and cached; components receive the set by
//! value, never consult the environment themselves.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::warn;

static DETECTED: OnceCell<ModelCapabilities> = OnceCell::new();

/// Availability of each optional model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// MSTL seasonal-trend decomposition with an ETS trend model
    pub seasonal_decomposition: bool,
    /// Triple exponential smoothing
    pub exponential_smoothing: bool,
    /// Gradient-boosted regression trees
    pub tree_ensemble: bool,
    /// Isolation-forest style multivariate outlier detection
    pub multivariate_outlier: bool,
}

impl Default for ModelCapabilities {
    fn default() -> Self {
        Self {
            seasonal_decomposition: true,
            exponential_smoothing: true,
            tree_ensemble: true,
            multivariate_outlier: true,
        }
    }
}

impl ModelCapabilities {
    /// Resolves the capability set once for the process lifetime.
    ///
    /// `STOCKCAST_DISABLE_DECOMPOSITION`, `STOCKCAST_DISABLE_SMOOTHING`,
    /// `STOCKCAST_DISABLE_TREE_MODELS` and `STOCKCAST_DISABLE_OUTLIER_MODEL`
    /// turn individual families off, mirroring a runtime where the
    /// corresponding library is absent.
    pub fn detect() -> Self {
        *DETECTED.get_or_init(|| {
            let caps = Self {
                seasonal_decomposition: !flag_set("STOCKCAST_DISABLE_DECOMPOSITION"),
                exponential_smoothing: !flag_set("STOCKCAST_DISABLE_SMOOTHING"),
                tree_ensemble: !flag_set("STOCKCAST_DISABLE_TREE_MODELS"),
                multivariate_outlier: !flag_set("STOCKCAST_DISABLE_OUTLIER_MODEL"),
            };
            if caps == Self::none() {
                warn!("all model families disabled; forecasts limited to linear trend and naive average");
            }
            caps
        })
    }

    /// Every family enabled.
    pub fn all() -> Self {
        Self::default()
    }

    /// Every family disabled. The engine still functions on the
    /// linear-trend and naive-average fallbacks.
    pub fn none() -> Self {
        Self {
            seasonal_decomposition: false,
            exponential_smoothing: false,
            tree_ensemble: false,
            multivariate_outlier: false,
        }
    }
}

fn flag_set(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty() && v != "0").unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_everything() {
        let caps = ModelCapabilities::default();
        assert!(caps.seasonal_decomposition);
        assert!(caps.exponential_smoothing);
        assert!(caps.tree_ensemble);
        assert!(caps.multivariate_outlier);
    }

    #[test]
    fn none_disables_everything() {
        let caps = ModelCapabilities::none();
        assert!(!caps.seasonal_decomposition);
        assert!(!caps.exponential_smoothing);
        assert!(!caps.tree_ensemble);
        assert!(!caps.multivariate_outlier);
    }

    #[test]
    fn detect_is_stable_across_calls() {
        assert_eq!(ModelCapabilities::detect(), ModelCapabilities::detect());
    }
}
