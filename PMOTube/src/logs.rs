//! Initialisation du logging à partir de la configuration

use pmoconfig::Config;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installe le subscriber global
///
/// Le niveau vient de `host.logger.min_level` ; la variable `RUST_LOG`,
/// si elle est définie, a priorité. Les logs partent sur stderr pour que
/// stdout reste disponible pour l'audio.
pub fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let enable_console = config.get_log_enable_console().unwrap_or(true);

    let registry = tracing_subscriber::registry().with(filter);
    if enable_console {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .init();
    } else {
        registry.init();
    }
}
