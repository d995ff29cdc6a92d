//! INI configuration loading.
//!
//! A listener can be described by a file with two sections:
//!
//! ```ini
//! [session]
//! app_url = https://crm.example.com
//! username = Supervisor
//! password = secret
//! log_level = Info
//! logger_pattern =
//! accept_invalid_certs = true
//!
//! [listener]
//! backoff_ms = 1000
//! ```
//!
//! Parsing uses the `rust-ini` crate. Unknown keys are logged and ignored;
//! malformed values are errors. The result is a [`ListenerBuilder`] so code
//! can still attach observers or override settings before building.

use std::{fmt::Display, fs, io::ErrorKind, path::Path, str::FromStr};

use ini::{Ini, Properties};
use log::warn;
use thiserror::Error;

use crate::level::LogLevel;
use crate::listener::ListenerBuilder;

/// Errors raised while reading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{path} doesn't exist")]
    NotFound { path: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is an empty file")]
    Empty { path: String },
    #[error("{path} is invalid: {message}")]
    Invalid { path: String, message: String },
    #[error("[{section}] {key} = {value:?}: {message}")]
    Value {
        section: &'static str,
        key: String,
        value: String,
        message: String,
    },
}

const SESSION: &str = "session";
const LISTENER: &str = "listener";

/// Read `path` and translate it into a builder.
pub fn load_config(path: impl AsRef<Path>) -> Result<ListenerBuilder, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => ConfigError::NotFound {
            path: display.clone(),
        },
        _ => ConfigError::Io {
            path: display.clone(),
            source: err,
        },
    })?;
    if text.trim().is_empty() {
        return Err(ConfigError::Empty { path: display });
    }
    parse_config(&display, &text)
}

/// Translate INI `text` into a builder. `origin` names the source in errors.
pub fn parse_config(origin: &str, text: &str) -> Result<ListenerBuilder, ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Invalid {
        path: origin.to_owned(),
        message: err.to_string(),
    })?;
    let mut builder = ListenerBuilder::new();
    for (section, props) in ini.iter() {
        builder = match section {
            Some(SESSION) => apply_session(builder, props)?,
            Some(LISTENER) => apply_listener(builder, props)?,
            Some(other) => {
                warn!("file_config: ignoring unknown section [{other}] in {origin}");
                builder
            }
            None if props.iter().next().is_none() => builder,
            None => {
                warn!("file_config: ignoring keys outside any section in {origin}");
                builder
            }
        };
    }
    Ok(builder)
}

fn apply_session(
    mut builder: ListenerBuilder,
    props: &Properties,
) -> Result<ListenerBuilder, ConfigError> {
    let mut username = None;
    let mut password = None;
    for (key, value) in props.iter() {
        let value = value.trim();
        builder = match key {
            "app_url" => builder.with_app_url(value),
            "username" => {
                username = Some(value.to_owned());
                builder
            }
            "password" => {
                password = Some(value.to_owned());
                builder
            }
            "log_level" => builder.with_log_level(parse::<LogLevel>(SESSION, key, value)?),
            "logger_pattern" => builder.with_logger_pattern(value),
            "buffer_capacity" => builder.with_buffer_capacity(parse(SESSION, key, value)?),
            "accept_invalid_certs" => {
                builder.with_accept_invalid_certs(parse_bool(SESSION, key, value)?)
            }
            "connect_timeout_ms" => builder.with_connect_timeout_ms(parse(SESSION, key, value)?),
            "keep_alive_ms" => builder.with_keep_alive_ms(parse(SESSION, key, value)?),
            "poll_interval_ms" => builder.with_poll_interval_ms(parse(SESSION, key, value)?),
            "close_timeout_ms" => builder.with_close_timeout_ms(parse(SESSION, key, value)?),
            other => {
                warn!("file_config: ignoring unknown key [{SESSION}] {other}");
                builder
            }
        };
    }
    if username.is_some() || password.is_some() {
        builder = builder
            .with_credentials(username.unwrap_or_default(), password.unwrap_or_default());
    }
    Ok(builder)
}

fn apply_listener(
    mut builder: ListenerBuilder,
    props: &Properties,
) -> Result<ListenerBuilder, ConfigError> {
    for (key, value) in props.iter() {
        let value = value.trim();
        builder = match key {
            "backoff_ms" => builder.with_backoff_ms(parse(LISTENER, key, value)?),
            "warn_interval_ms" => builder.with_warn_interval_ms(parse(LISTENER, key, value)?),
            "thread_name" => builder.with_thread_name(value),
            other => {
                warn!("file_config: ignoring unknown key [{LISTENER}] {other}");
                builder
            }
        };
    }
    Ok(builder)
}

fn parse<T>(section: &'static str, key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|err: T::Err| ConfigError::Value {
        section,
        key: key.to_owned(),
        value: value.to_owned(),
        message: err.to_string(),
    })
}

fn parse_bool(section: &'static str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Value {
            section,
            key: key.to_owned(),
            value: value.to_owned(),
            message: "expected a boolean".into(),
        }),
    }
}
