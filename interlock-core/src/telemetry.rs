//! Diagnostic logging on the configured severity channel.

use crate::{ConfigError, InterlockResult, LogLevel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "interlock=debug,info";

/// Render a diagnostic line about a key, e.g.
/// `** fragment interlock:0:posts:show:7:sidebar registered a dependency on Post -> all.`
pub fn format_diagnostic(kind: &str, key: &str, msg: &str) -> String {
    format!("** {} {} {}", kind, key.escape_debug(), msg)
}

/// Emit a diagnostic about a key on the channel selected by `level`.
pub fn say(level: LogLevel, key: &str, msg: &str) {
    log(level, &format_diagnostic("fragment", key, msg));
}

/// Emit a message on the channel selected by `level`.
pub fn log(level: LogLevel, msg: &str) {
    match level {
        LogLevel::Debug => tracing::debug!(target: "interlock", "{}", msg),
        LogLevel::Info => tracing::info!(target: "interlock", "{}", msg),
        LogLevel::Warn => tracing::warn!(target: "interlock", "{}", msg),
        LogLevel::Error => tracing::error!(target: "interlock", "{}", msg),
    }
}

/// Install a global tracing subscriber.
///
/// Honors `RUST_LOG` when set. Call once at process start; a second call
/// fails because a subscriber is already installed.
pub fn init_tracing(json: bool) -> InterlockResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ConfigError::Logging {
        reason: e.to_string(),
    })?;

    tracing::info!(json, "Interlock telemetry initialized");
    Ok(())
}
