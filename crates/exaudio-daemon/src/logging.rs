//! Log output on stderr, switchable at runtime
//!
//! stdout carries the port protocol, so nothing may log there.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

/// Handle for the `log-on` and `log-off` commands
pub struct LogControl {
    handle: Option<reload::Handle<EnvFilter, Registry>>,
    directive: String,
    enabled: bool,
}

impl LogControl {
    /// Install the global subscriber filtered by `directive`
    pub fn install(directive: &str) -> Result<Self> {
        let filter = EnvFilter::try_new(directive)?;
        let (filter, handle) = reload::Layer::new(filter);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init()?;

        Ok(Self {
            handle: Some(handle),
            directive: directive.to_string(),
            enabled: true,
        })
    }

    /// Control that tracks state without a subscriber behind it
    #[cfg(test)]
    pub fn detached(directive: &str) -> Self {
        Self {
            handle: None,
            directive: directive.to_string(),
            enabled: true,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Replace the filter used while logging is on
    ///
    /// An invalid directive is an error and leaves the filter as it was.
    pub fn set_directive(&mut self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)?;
        if self.enabled {
            if let Some(handle) = &self.handle {
                handle.reload(filter)?;
            }
        }
        self.directive = directive.to_string();
        Ok(())
    }

    /// Restore the configured filter, or silence everything
    pub fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if let Some(handle) = &self.handle {
            let directive = if enabled { self.directive.as_str() } else { "off" };
            handle.reload(EnvFilter::try_new(directive)?)?;
        }
        self.enabled = enabled;
        Ok(())
    }
}
