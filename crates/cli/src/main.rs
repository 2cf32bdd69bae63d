use std::process::ExitCode;

use voxflow_core::config::{EngineConfig, LoadOptions};

fn init_logging(config: &EngineConfig) {
    use tracing::Level;
    use voxflow_core::config::LogFormat::{Compact, Json, Pretty};

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

fn main() -> ExitCode {
    if let Ok(config) = EngineConfig::load(LoadOptions::default()) {
        init_logging(&config);
    }
    voxflow_cli::run()
}
