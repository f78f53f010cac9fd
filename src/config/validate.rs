// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, RunwatchError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::RunwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_supervisor(cfg)?;
    validate_progress(cfg)?;
    validate_script(cfg)?;
    validate_build(cfg)?;
    Ok(())
}

fn config_error(msg: impl Into<String>) -> RunwatchError {
    RunwatchError::Config(msg.into())
}

fn validate_supervisor(cfg: &RawConfigFile) -> Result<()> {
    if cfg.supervisor.grace_period_ms == 0 {
        return Err(config_error(
            "[supervisor].grace_period_ms must be >= 1 (got 0)",
        ));
    }
    if cfg.supervisor.stderr_tail_lines == 0 {
        return Err(config_error(
            "[supervisor].stderr_tail_lines must be >= 1 (got 0)",
        ));
    }
    Ok(())
}

fn validate_progress(cfg: &RawConfigFile) -> Result<()> {
    let p = &cfg.progress;

    if p.tick_ms == 0 {
        return Err(config_error("[progress].tick_ms must be >= 1 (got 0)"));
    }
    if !(1..=99).contains(&p.ceiling) {
        return Err(config_error(format!(
            "[progress].ceiling must be between 1 and 99 (got {})",
            p.ceiling
        )));
    }
    if p.step == 0 || p.step > p.ceiling {
        return Err(config_error(format!(
            "[progress].step must be between 1 and the ceiling {} (got {})",
            p.ceiling, p.step
        )));
    }
    Ok(())
}

fn validate_script(cfg: &RawConfigFile) -> Result<()> {
    if cfg.script.interpreter.trim().is_empty() {
        return Err(config_error("[script].interpreter must not be empty"));
    }
    Ok(())
}

fn validate_build(cfg: &RawConfigFile) -> Result<()> {
    let Some(build) = &cfg.build else {
        return Ok(());
    };

    if build.python.trim().is_empty() {
        return Err(config_error("[build].python must not be empty"));
    }
    if build.script.as_os_str().is_empty() {
        return Err(config_error("[build].script must not be empty"));
    }
    Ok(())
}
