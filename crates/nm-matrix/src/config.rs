use std::time::Duration;

use crate::error::{MatrixError, Result};
use crate::op::{BinaryOp, OpSet};

/// Environment variable listing the accelerated operations, e.g. `add,multiply`.
pub const ACCELERATED_OPS_VAR: &str = "NM_ACCELERATED_OPS";
/// Environment variable holding the accelerator wait timeout in milliseconds.
pub const DISPATCH_TIMEOUT_VAR: &str = "NM_DISPATCH_TIMEOUT_MS";

/// Startup configuration for the accelerated path.
///
/// Decided once, before the dispatcher is built. After that the set of
/// registered programs never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceleratorConfig {
    /// Operations that get an accelerator program. Anything outside this set
    /// always runs sequentially.
    pub ops: OpSet,
    /// Upper bound on how long a dispatch may wait for the device. `None`
    /// waits indefinitely.
    pub dispatch_timeout: Option<Duration>,
}

impl Default for AcceleratorConfig {
    /// Addition and multiplication are accelerated; subtraction is not.
    fn default() -> Self {
        AcceleratorConfig {
            ops: OpSet::none().with(BinaryOp::Add).with(BinaryOp::Multiply),
            dispatch_timeout: None,
        }
    }
}

impl AcceleratorConfig {
    /// A configuration that accelerates exactly `ops`.
    pub fn with_ops(ops: OpSet) -> Self {
        AcceleratorConfig {
            ops,
            ..Default::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    /// Build a configuration from the process environment.
    ///
    /// Reads [`ACCELERATED_OPS_VAR`] and [`DISPATCH_TIMEOUT_VAR`]; unset
    /// variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = AcceleratorConfig::default();

        if let Some(ops) = lookup(ACCELERATED_OPS_VAR) {
            config.ops = ops.parse()?;
        }

        if let Some(raw) = lookup(DISPATCH_TIMEOUT_VAR) {
            let millis: u64 = raw.trim().parse().map_err(|_| {
                MatrixError::Config(format!(
                    "{}: expected milliseconds, got '{}'",
                    DISPATCH_TIMEOUT_VAR, raw
                ))
            })?;
            config.dispatch_timeout = Some(Duration::from_millis(millis));
        }

        Ok(config)
    }
}
