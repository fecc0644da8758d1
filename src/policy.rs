use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};

const MAX_MIN_METRICS: u32 = 365;
const MAX_INACTIVITY_DAYS: i64 = 90;
const MAX_REJECTION_WINDOW_DAYS: i64 = 365;

/// ROI cut points in revenue per hour. A project is classified by the first
/// bound its ROI is strictly above.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiThresholds {
    pub winner_above: f64,
    pub promising_above: f64,
    pub viable_above: f64,
}

impl Default for RoiThresholds {
    fn default() -> Self {
        Self {
            winner_above: 50.0,
            promising_above: 10.0,
            viable_above: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Policy {
    pub min_metrics: u32,
    pub roi: RoiThresholds,
    pub zombie_inactivity_days: i64,
    pub rejection_window_days: i64,
    pub max_active_projects: usize,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            min_metrics: 3,
            roi: RoiThresholds::default(),
            zombie_inactivity_days: 4,
            rejection_window_days: 30,
            max_active_projects: 3,
        }
    }
}

impl Policy {
    pub fn validate(&self) -> AppResult<()> {
        if self.min_metrics == 0 || self.min_metrics > MAX_MIN_METRICS {
            return Err(AppError::Config(format!(
                "policy.min_metrics must be between 1 and {}",
                MAX_MIN_METRICS
            )));
        }
        self.validate_roi()?;
        if !(1..=MAX_INACTIVITY_DAYS).contains(&self.zombie_inactivity_days) {
            return Err(AppError::Config(format!(
                "policy.zombie_inactivity_days must be between 1 and {}",
                MAX_INACTIVITY_DAYS
            )));
        }
        if !(1..=MAX_REJECTION_WINDOW_DAYS).contains(&self.rejection_window_days) {
            return Err(AppError::Config(format!(
                "policy.rejection_window_days must be between 1 and {}",
                MAX_REJECTION_WINDOW_DAYS
            )));
        }
        if self.max_active_projects == 0 {
            return Err(AppError::Config(
                "policy.max_active_projects must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_roi(&self) -> AppResult<()> {
        let roi = &self.roi;
        let bounds = [roi.winner_above, roi.promising_above, roi.viable_above];
        if bounds.iter().any(|bound| !bound.is_finite()) {
            return Err(AppError::Config("policy.roi thresholds must be finite".to_string()));
        }
        if roi.winner_above <= roi.promising_above {
            return Err(AppError::Config(format!(
                "policy.roi.winner_above ({}) must be greater than promising_above ({})",
                roi.winner_above, roi.promising_above
            )));
        }
        if roi.promising_above < roi.viable_above {
            return Err(AppError::Config(format!(
                "policy.roi.promising_above ({}) must not be below viable_above ({})",
                roi.promising_above, roi.viable_above
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Policy, RoiThresholds};

    #[test]
    fn defaults_are_valid() {
        Policy::default().validate().expect("default policy");
    }

    #[test]
    fn rejects_inverted_roi_thresholds() {
        let policy = Policy {
            roi: RoiThresholds {
                winner_above: 10.0,
                promising_above: 50.0,
                viable_above: 0.0,
            },
            ..Policy::default()
        };
        let error = policy.validate().expect_err("inverted thresholds");
        assert!(error.to_string().contains("winner_above"));
    }

    #[test]
    fn rejects_zero_min_metrics() {
        let policy = Policy {
            min_metrics: 0,
            ..Policy::default()
        };
        assert!(policy.validate().is_err());
    }
}
