//! Load patterns: how many workers should be active at a point in time.

use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fraction of the run spent ramping in [`LoadPattern::RampUp`].
pub const RAMP_FRACTION: f64 = 0.3;
/// Length of one [`LoadPattern::Spike`] cycle in seconds.
pub const SPIKE_INTERVAL_SECS: f64 = 60.0;
/// Length of the high-load part of a spike cycle in seconds.
pub const SPIKE_DURATION_SECS: f64 = 10.0;
/// Length of one [`LoadPattern::Wave`] cycle in seconds.
pub const WAVE_PERIOD_SECS: f64 = 120.0;

/// Shape of offered load over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPattern {
    /// Full concurrency for the whole run.
    #[default]
    Constant,
    /// Linear ramp from 1 to target over the first 30% of the run, then hold.
    #[serde(alias = "ramp-up", alias = "rampup")]
    RampUp,
    /// Full concurrency for 10s out of every 60s, a quarter otherwise.
    Spike,
    /// Sinusoid between 25% and 100% of target with a 120s period.
    Wave,
}

impl LoadPattern {
    pub const ALL: [LoadPattern; 4] = [Self::Constant, Self::RampUp, Self::Spike, Self::Wave];

    /// Desired concurrency after `elapsed_secs` of a run lasting `total_secs`.
    ///
    /// Always within `[1, max(target, 1)]`.
    #[must_use]
    pub fn concurrency_at(&self, elapsed_secs: f64, total_secs: f64, target: usize) -> usize {
        let target = target.max(1);
        let elapsed = if elapsed_secs.is_finite() {
            elapsed_secs.max(0.0)
        } else {
            0.0
        };
        let t = target as f64;

        let raw = match self {
            Self::Constant => t,
            Self::RampUp => {
                let ramp = total_secs * RAMP_FRACTION;
                if elapsed < ramp {
                    (t * (elapsed / ramp)).floor()
                } else {
                    t
                }
            }
            Self::Spike => {
                if elapsed % SPIKE_INTERVAL_SECS < SPIKE_DURATION_SECS {
                    t
                } else {
                    (target / 4) as f64
                }
            }
            Self::Wave => {
                let phase = (elapsed % WAVE_PERIOD_SECS) / WAVE_PERIOD_SECS * 2.0 * PI;
                let factor = (phase.sin() + 1.0) / 2.0;
                (t * 0.25 + t * 0.75 * factor).round()
            }
        };

        (raw as usize).clamp(1, target)
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Constant => "constant",
            Self::RampUp => "ramp_up",
            Self::Spike => "spike",
            Self::Wave => "wave",
        }
    }
}

impl fmt::Display for LoadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadPattern {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "constant" => Ok(Self::Constant),
            "ramp_up" | "ramp-up" | "rampup" => Ok(Self::RampUp),
            "spike" => Ok(Self::Spike),
            "wave" => Ok(Self::Wave),
            other => Err(CoreError::configuration(format!(
                "unknown load pattern `{other}`"
            ))),
        }
    }
}
