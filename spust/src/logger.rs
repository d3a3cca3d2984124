use crate::error::{CliError, Result as CliResult};

use std::path::PathBuf;
use std::time::SystemTime;

use fern::Dispatch;
use fern::colors::{Color, ColoredLevelConfig};
use log::info;

/// Install the global logger.
///
/// `log_file` appends plain lines to a file instead of stdout; `colored`
/// only applies to stdout.
pub fn initialize(
    log_level: sp_config::LogLevel,
    log_file: Option<PathBuf>,
    colored: bool,
) -> CliResult<()> {
    let level_filter = log_level.0;

    let output: fern::Output = match log_file {
        Some(ref log_path) => std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(|e| CliError::Logger {
                message: format!("Failed to open log file {}: {e}", log_path.display()),
            })?
            .into(),
        None => std::io::stdout().into(),
    };

    let colors = (colored && log_file.is_none()).then(|| {
        ColoredLevelConfig::new()
            .trace(Color::Magenta)
            .debug(Color::Blue)
            .info(Color::Green)
            .warn(Color::Yellow)
            .error(Color::Red)
    });

    Dispatch::new()
        .level(level_filter)
        .format(move |out, message, record| {
            let date = humantime::format_rfc3339(SystemTime::now());
            match &colors {
                Some(colors) => out.finish(format_args!(
                    "[{date} - {level}] {message} [{target}]",
                    level = colors.color(record.level()),
                    target = record.target(),
                )),
                None => out.finish(format_args!(
                    "[{date} - {level}] {message} [{target}]",
                    level = record.level(),
                    target = record.target(),
                )),
            }
        })
        .chain(output)
        .apply()
        .map_err(|e| CliError::Logger {
            message: format!("Failed to initialize logger: {e}"),
        })?;

    match log_file {
        Some(path) => info!("Logger initialized: level={level_filter:?}, file={}", path.display()),
        None => info!("Logger initialized: level={level_filter:?}, stdout"),
    }

    Ok(())
}
