// Logging init (SPEC_FULL.md S10.1). `env_logger` only targets a single
// sink per builder instance; rather than pull in a tee-capable logging crate
// the teacher never reaches for, this rewrite's policy is: log to the
// `LOG_DIRECTORY` file at `FILE_DEBUG_LEVEL` when configured, otherwise log
// to stderr at `CONSOLE_DEBUG_LEVEL`.

use std::fs::OpenOptions;
use std::io::Write;

use env_logger::{Builder, Target};
use log::LevelFilter;

use crate::config::Config;

fn parse_level(raw: &str) -> LevelFilter {
    raw.parse().unwrap_or(LevelFilter::Info)
}

/// Initializes the global logger once per process (supervisor or worker).
/// Safe to call multiple times within a test binary; subsequent calls are
/// no-ops per `env_logger`'s own idempotent `try_init`.
pub fn init(config: &Config) {
    let mut builder = Builder::new();
    builder.format(|buf, record| {
        writeln!(buf, "[{} {} {}] {}", buf.timestamp(), record.level(), record.target(), record.args())
    });

    match &config.log_directory {
        Some(dir) => {
            if std::fs::create_dir_all(dir).is_ok() {
                if let Ok(file) = OpenOptions::new().create(true).append(true).open(dir.join("mediacatalog.log")) {
                    builder.target(Target::Pipe(Box::new(file)));
                    builder.filter_level(parse_level(&config.file_debug_level));
                    let _ = builder.try_init();
                    return;
                }
            }
            log::warn!("could not open LOG_DIRECTORY for writing, falling back to stderr");
        }
        None => {}
    }

    builder.filter_level(parse_level(&config.console_debug_level));
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(parse_level("not-a-level"), LevelFilter::Info);
    }

    #[test]
    fn known_level_parses_exactly() {
        assert_eq!(parse_level("debug"), LevelFilter::Debug);
    }
}
