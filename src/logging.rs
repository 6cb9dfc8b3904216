use std::fs::File;
use std::path::PathBuf;

use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, SharedLogger, TermLogger, TerminalMode, WriteLogger};

use crate::error::LoggingError;

/// Where resolver logs go.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub terminal_level: LevelFilter,
    pub file_level: LevelFilter,
    /// `None` to skip the log file
    pub file_path: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            terminal_level: LevelFilter::Warn,
            file_level: LevelFilter::Debug,
            file_path: Some(PathBuf::from("ethread_stack.log")),
        }
    }
}

/// Install the global logger. Only the first call in a process can succeed.
pub fn initialize_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let mut loggers: Vec<Box<dyn SharedLogger>> = vec![
        TermLogger::new(config.terminal_level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
    ];

    if let Some(path) = &config.file_path {
        loggers.push(WriteLogger::new(config.file_level, Config::default(), File::create(path)?));
    }

    CombinedLogger::init(loggers)?;
    info!("Logging initialized ({config:?})");
    Ok(())
}
