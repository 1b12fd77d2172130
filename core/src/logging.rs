use failure::Fail;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

pub const GROOVE_LOG_CONFIG: &str = "GROOVE_LOG_CONFIG";
pub const GROOVE_LOG_LEVEL: &str = "GROOVE_LOG_LEVEL";

const DEFAULT_PATTERN: &str = "{d(%H:%M:%S%.3f)} {h({l:<5})} [{T}] {t} - {m}{n}";

#[derive(Debug, Fail)]
pub enum LoggingError {
  #[fail(display = "Failed to init logging: {}", cause)]
  Init { cause: String },
}

/// Initialises log4rs for the host application.
///
/// Reads the file named by `GROOVE_LOG_CONFIG` when set, otherwise logs to the
/// console at the level named by `GROOVE_LOG_LEVEL` (`info` by default).
pub fn init() -> Result<(), LoggingError> {
  match std::env::var(GROOVE_LOG_CONFIG) {
    Ok(path) => log4rs::init_file(path.as_str(), Default::default()).map_err(|err| {
      LoggingError::Init {
        cause: err.to_string(),
      }
    }),
    Err(_) => {
      let level = std::env::var(GROOVE_LOG_LEVEL)
        .ok()
        .and_then(|level| level.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
      init_console(level)
    }
  }
}

pub fn init_console(level: LevelFilter) -> Result<(), LoggingError> {
  let config = console_config(level)?;
  log4rs::init_config(config)
    .map(|_handle| ())
    .map_err(|err| LoggingError::Init {
      cause: err.to_string(),
    })
}

fn console_config(level: LevelFilter) -> Result<Config, LoggingError> {
  let console = ConsoleAppender::builder()
    .encoder(Box::new(PatternEncoder::new(DEFAULT_PATTERN)))
    .build();

  Config::builder()
    .appender(Appender::builder().build("console", Box::new(console)))
    .build(Root::builder().appender("console").build(level))
    .map_err(|err| LoggingError::Init {
      cause: err.to_string(),
    })
}
