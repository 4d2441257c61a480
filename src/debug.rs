//! Logging bridge for luadrv
//!
//! Routes every `log::info!()` / `log::error!()` etc. from all crates to a
//! debug log file. Script results and failures reach the operator only
//! through this file, since Close reports nothing but a status code.
//!
//! Level precedence: `--log-level` CLI flag, then `RUST_LOG`, then the
//! config file's `log_level`.
//!
//! Output goes to /tmp/luadrv_debug.log on Unix/macOS,
//! or %TEMP%\luadrv_debug.log on Windows.
//! When `RUST_LOG` is set, records are mirrored to stderr as well.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{LevelFilter, Log, Metadata, Record};
use luadrv_config::LogLevel;
use parking_lot::Mutex;

struct LogBridge {
    file: Mutex<Option<File>>,
    mirror_stderr: bool,
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format!(
            "[{}] [{:<5}] [{}] {}\n",
            get_timestamp(),
            record.level(),
            record.target(),
            record.args()
        );

        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.write_all(line.as_bytes());
        }
        if self.mirror_stderr {
            eprint!("{line}");
        }
    }

    fn flush(&self) {
        if let Some(file) = self.file.lock().as_mut() {
            let _ = file.flush();
        }
    }
}

static BRIDGE: OnceLock<LogBridge> = OnceLock::new();

fn get_timestamp() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}.{:06}", now.as_secs(), now.subsec_micros())
}

/// Location of the debug log file.
pub fn log_path() -> PathBuf {
    #[cfg(unix)]
    {
        PathBuf::from("/tmp/luadrv_debug.log")
    }
    #[cfg(not(unix))]
    {
        std::env::temp_dir().join("luadrv_debug.log")
    }
}

/// Pick the effective log level from the three possible sources.
///
/// An unparseable `RUST_LOG` is ignored rather than treated as an error.
pub fn resolve_level(cli: Option<LogLevel>, env: Option<&str>, config: LogLevel) -> LogLevel {
    cli.or_else(|| env.and_then(|v| v.parse().ok()))
        .unwrap_or(config)
}

/// Install the log bridge as the global logger.
///
/// Safe to call more than once; only the first call installs the logger,
/// later calls just adjust the maximum level. Returns the level in effect.
pub fn init_log_bridge(cli: Option<LogLevel>, config: LogLevel) -> LevelFilter {
    let rust_log = std::env::var("RUST_LOG").ok();
    let level = resolve_level(cli, rust_log.as_deref(), config).to_level_filter();

    if level == LevelFilter::Off {
        log::set_max_level(LevelFilter::Off);
        return level;
    }

    let bridge = BRIDGE.get_or_init(|| {
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(log_path())
            .ok();
        LogBridge {
            file: Mutex::new(file),
            mirror_stderr: rust_log.is_some(),
        }
    });

    // Fails only if some other logger is already installed; keep that one.
    let _ = log::set_logger(bridge);
    log::set_max_level(level);

    log::info!(
        "luadrv {} logging started at {} (level={})",
        crate::VERSION,
        get_timestamp(),
        level
    );
    level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_level_wins() {
        assert_eq!(
            resolve_level(Some(LogLevel::Trace), Some("error"), LogLevel::Info),
            LogLevel::Trace
        );
    }

    #[test]
    fn test_env_level_beats_config() {
        assert_eq!(
            resolve_level(None, Some("debug"), LogLevel::Info),
            LogLevel::Debug
        );
    }

    #[test]
    fn test_unparseable_env_falls_back_to_config() {
        assert_eq!(
            resolve_level(None, Some("luadrv=debug,info"), LogLevel::Warn),
            LogLevel::Warn
        );
        assert_eq!(resolve_level(None, None, LogLevel::Off), LogLevel::Off);
    }
}
