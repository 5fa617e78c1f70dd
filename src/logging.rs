//! Logger setup for native and web hosts

use std::sync::Once;

static INIT: Once = Once::new();

/// Logger settings
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub default_filter: String,
    /// Include timestamps in native output
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            timestamps: true,
        }
    }
}

/// Install the global logger. Later calls are no-ops.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| install(&config));
}

#[cfg(not(target_arch = "wasm32"))]
fn install(config: &LoggingConfig) {
    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.default_filter.as_str()),
    );
    if !config.timestamps {
        builder.format_timestamp(None);
    }
    if let Err(err) = builder.try_init() {
        eprintln!("Logger already installed: {}", err);
    }
}

#[cfg(target_arch = "wasm32")]
fn install(config: &LoggingConfig) {
    console_error_panic_hook::set_once();
    let level = config
        .default_filter
        .parse::<log::Level>()
        .unwrap_or(log::Level::Info);
    // A logger installed by the host page wins
    let _ = console_log::init_with_level(level);
}
