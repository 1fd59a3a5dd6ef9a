use chrono::Local;
use log::{error, info, warn};
use std::fmt::Display;
use std::io::Write;

/// Installs the stderr logger. `RUST_LOG` overrides the `info` default.
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("info");

    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(env_logger::Target::Stderr)
        .init();
}

pub fn log_success<T: Display, U: Display>(operation: T, target: U) {
    info!("Successfully {}: {}", operation, target);
}

pub fn log_failure<T: Display, U: Display, E: Display>(operation: T, target: U, error: &E) {
    error!("Failed to {}: {}. Error: {}", operation, target, error);
}

pub fn log_skipped<T: Display, U: Display>(operation: T, target: U, reason: &str) {
    warn!("Skipped {} for {}: {}", operation, target, reason);
}
