//! Timeout policy for engine-facing waits.

use std::time::Duration;

/// A concrete wait bound derived from the policy.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    /// How long to wait.
    pub wait: Duration,
    /// True when `wait` is the hard maximum and nothing larger can be
    /// granted; a timeout under this budget is reported as
    /// maximum-reached rather than transient.
    pub at_maximum: bool,
}

/// Default and maximum waits for each class of engine operation.
///
/// Callers may request a timeout per call; the policy clamps requests to the
/// hard maximum so a stuck automation host cannot pin a caller forever.
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// Default wait for a feature command.
    pub default_command: Duration,
    /// Hard maximum wait for a feature command.
    pub max_command: Duration,
    /// Default wait for a save. Large-workbook saves can take minutes.
    pub default_save: Duration,
    /// Hard maximum wait for a save.
    pub max_save: Duration,
    /// Wait for the engine to open a workbook at session begin.
    pub open: Duration,
    /// Wait for the engine to release its resources at dispose.
    pub dispose: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            default_command: Duration::from_secs(30),
            max_command: Duration::from_secs(120),
            default_save: Duration::from_secs(60),
            max_save: Duration::from_secs(300),
            open: Duration::from_secs(60),
            dispose: Duration::from_secs(30),
        }
    }
}

impl TimeoutPolicy {
    pub fn command_budget(&self, requested: Option<Duration>) -> Budget {
        Self::clamp(requested, self.default_command, self.max_command)
    }

    pub fn save_budget(&self, requested: Option<Duration>) -> Budget {
        Self::clamp(requested, self.default_save, self.max_save)
    }

    pub fn open_budget(&self) -> Budget {
        Budget {
            wait: self.open,
            at_maximum: true,
        }
    }

    pub fn dispose_budget(&self) -> Budget {
        Budget {
            wait: self.dispose,
            at_maximum: true,
        }
    }

    fn clamp(requested: Option<Duration>, default: Duration, max: Duration) -> Budget {
        match requested {
            None => Budget {
                wait: default.min(max),
                at_maximum: default >= max,
            },
            Some(d) if d >= max => Budget {
                wait: max,
                at_maximum: true,
            },
            Some(d) => Budget {
                wait: d,
                at_maximum: false,
            },
        }
    }
}
