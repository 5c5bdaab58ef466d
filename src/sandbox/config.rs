//! Sandbox configuration with builder pattern.

use std::time::Duration;

/// Configuration for the Python sandbox.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Timeout applied when a request does not carry its own.
    pub default_timeout: Duration,
    /// Upper bound any per-request timeout is clamped to.
    pub max_timeout: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(10),
            max_timeout: Duration::from_secs(60),
        }
    }
}

impl SandboxConfig {
    /// Create a new builder for SandboxConfig.
    pub fn builder() -> SandboxConfigBuilder {
        SandboxConfigBuilder::default()
    }

    /// Resolve the timeout for one execution: the request's own value when
    /// present, the default otherwise, clamped to `max_timeout` either way.
    pub fn resolve_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout)
    }
}

/// Builder for creating SandboxConfig instances.
#[derive(Debug, Clone, Default)]
pub struct SandboxConfigBuilder {
    default_timeout: Option<Duration>,
    max_timeout: Option<Duration>,
}

impl SandboxConfigBuilder {
    /// Set the timeout used when a request does not specify one.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Set the upper bound for per-request timeouts.
    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    /// Build the SandboxConfig.
    pub fn build(self) -> SandboxConfig {
        let default = SandboxConfig::default();
        SandboxConfig {
            default_timeout: self.default_timeout.unwrap_or(default.default_timeout),
            max_timeout: self.max_timeout.unwrap_or(default.max_timeout),
        }
    }
}
