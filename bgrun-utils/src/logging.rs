//! Logging infrastructure for bgrun
//!
//! Supervisor diagnostics go to the process's own stderr, never into the
//! child's output log.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{BgrunError, Result};

/// Initialize logging with the filter from `BGRUN_LOG` (default "info")
pub fn init_logging() -> Result<()> {
    let filter = std::env::var("BGRUN_LOG").unwrap_or_else(|_| "info".into());
    init_logging_with_filter(&filter)
}

/// Initialize logging with an explicit filter string
pub fn init_logging_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_new(filter)
        .map_err(|e| BgrunError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| BgrunError::internal(format!("Failed to init logging: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        let result = init_logging_with_filter("not==a==filter");
        assert!(matches!(result, Err(BgrunError::Config(_))));
    }
}
