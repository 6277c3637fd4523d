//! Structured logging for the storage core, following the teacher's own
//! `utils::logger` pattern: a rolling file appender sized at 10 MiB per file
//! with 7 rotations, initialized either explicitly or from environment
//! variables.

use std::path::Path;

/// Initializes logging to `{dir}/lsmcore.log`, rolling at 10 MiB with 7
/// retained files.
///
/// # Errors
/// Returns an error if `dir` cannot be created or the logger fails to
/// initialize.
pub fn init_for_dir(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use log::LevelFilter;
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use std::fs;

    fs::create_dir_all(dir)?;
    let log_path = dir.join("lsmcore.log");
    let roller =
        FixedWindowRoller::builder().build(&format!("{}", dir.join("lsmcore.{}.log").display()), 7)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
    let appender = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}")))
        .build(log_path, Box::new(policy))?;
    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(appender)))
        .build(Root::builder().appender("app").build(LevelFilter::Info))?;
    log4rs::init_config(config)?;
    Ok(())
}

/// Configures logging from `LSMCORE_LOG_DIR` / `LSMCORE_LOG_LEVEL` if
/// present, defaulting to the current directory at `info` otherwise. Silent
/// on failure, matching the teacher's `configure_from_env` (logging setup
/// should never be the reason the engine fails to start).
pub fn configure_from_env() {
    use log::LevelFilter;
    use log4rs::append::rolling_file::RollingFileAppender;
    use log4rs::append::rolling_file::policy::compound::{
        CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
    };
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;
    use std::path::PathBuf;

    let dir = std::env::var("LSMCORE_LOG_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let level = match std::env::var("LSMCORE_LOG_LEVEL").ok().unwrap_or_default().to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    let Ok(roller) = FixedWindowRoller::builder().build(&format!("{}", dir.join("lsmcore.{}.log").display()), 7)
    else {
        return;
    };
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(10 * 1024 * 1024)), Box::new(roller));
    let Ok(appender) = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}")))
        .build(dir.join("lsmcore.log"), Box::new(policy))
    else {
        return;
    };
    if let Ok(config) = Config::builder()
        .appender(Appender::builder().build("app", Box::new(appender)))
        .build(Root::builder().appender("app").build(level))
    {
        let _ = log4rs::init_config(config);
    }
}
