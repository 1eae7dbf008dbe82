//! Problem configuration.

use mosaic_core::SetupError;

/// Settings fixed for the lifetime of a [`Problem`](crate::Problem).
///
/// Validated once, before any setup task runs. Values that change during a
/// run (coefficients, sources) go through controllable parameters instead.
#[derive(Clone, Debug, PartialEq)]
pub struct ProblemConfig {
    /// Assembly worker threads. `None` = `available_parallelism`.
    /// Either way the count is clamped to `[1, 64]`.
    pub threads: Option<usize>,
    /// Check every local block for NaN/infinity before accumulation.
    /// Default: `true`.
    pub check_finite: bool,
    /// Initial time step size. Default: 1.0.
    pub dt: f64,
}

impl Default for ProblemConfig {
    fn default() -> Self {
        Self {
            threads: None,
            check_finite: true,
            dt: 1.0,
        }
    }
}

impl ProblemConfig {
    /// Single-threaded configuration, convenient for tests.
    pub fn serial() -> Self {
        Self {
            threads: Some(1),
            ..Self::default()
        }
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), SetupError> {
        if !self.dt.is_finite() || self.dt <= 0.0 {
            return Err(SetupError::Config {
                reason: format!("dt must be finite and positive, got {}", self.dt),
            });
        }
        Ok(())
    }

    /// The worker count actually used.
    pub fn resolved_threads(&self) -> usize {
        match self.threads {
            Some(n) => n.clamp(1, 64),
            None => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .clamp(1, 64),
        }
    }
}
