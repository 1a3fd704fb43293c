use crate::domain::{EventInfo, FacingMode};
use crate::use_cases::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::{env, fmt, time::Duration};
use url::Url;

// Runtime settings for the kiosk process, read from the environment.

pub const COMMAND_CHANNEL_CAPACITY: usize = 64;
pub const SCANNER_CONTAINER_ID: &str = "qr-reader";

#[derive(Debug)]
pub enum ConfigError {
    MissingEventId,
    EventFile { path: String, reason: String },
    InvalidUrl { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingEventId => {
                write!(f, "KIOSK_EVENT_ID is not set and no event file provides an id")
            }
            ConfigError::EventFile { path, reason } => {
                write!(f, "failed to load event file {path}: {reason}")
            }
            ConfigError::InvalidUrl { name, value } => write!(f, "{name} is not a valid url: {value}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct EventFile {
    pub id: Option<String>,
    pub name: Option<String>,
    pub banner_url: Option<String>,
}

pub fn parse_event_file(contents: &str) -> Result<EventFile, toml::de::Error> {
    toml::from_str(contents)
}

pub fn registration_api_url() -> String {
    env::var("REGISTRATION_API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000/api".to_string())
}

pub fn http_timeout() -> Duration {
    Duration::from_millis(env_u64("KIOSK_HTTP_TIMEOUT_MS").unwrap_or(5000))
}

pub fn retry_policy() -> RetryPolicy {
    let attempts = env::var("KIOSK_RETRY_ATTEMPTS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(3);
    let base_delay = Duration::from_millis(env_u64("KIOSK_RETRY_BASE_DELAY_MS").unwrap_or(500));
    RetryPolicy::new(attempts, base_delay)
}

pub fn qr_render_url() -> Result<Url, ConfigError> {
    let value = env::var("QR_RENDER_URL")
        .unwrap_or_else(|_| "https://api.qrserver.com/v1/create-qr-code/".to_string());
    Url::parse(&value).map_err(|_| ConfigError::InvalidUrl {
        name: "QR_RENDER_URL",
        value,
    })
}

pub fn badge_dir() -> PathBuf {
    env::var("KIOSK_BADGE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("badges"))
}

pub fn camera_facing() -> FacingMode {
    match env::var("KIOSK_CAMERA_FACING").as_deref() {
        Ok("user") => FacingMode::User,
        _ => FacingMode::Environment,
    }
}

// Event fields come from the environment; an event file, when given, overrides them.
pub fn event_info() -> Result<EventInfo, ConfigError> {
    let file = match env::var("KIOSK_EVENT_FILE") {
        Ok(path) => {
            let contents = std::fs::read_to_string(&path).map_err(|err| ConfigError::EventFile {
                path: path.clone(),
                reason: err.to_string(),
            })?;
            parse_event_file(&contents).map_err(|err| ConfigError::EventFile {
                path,
                reason: err.to_string(),
            })?
        }
        Err(_) => EventFile::default(),
    };

    merge_event(
        file,
        non_blank_var("KIOSK_EVENT_ID"),
        non_blank_var("KIOSK_EVENT_NAME"),
        non_blank_var("KIOSK_EVENT_BANNER_URL"),
    )
}

fn merge_event(
    file: EventFile,
    id: Option<String>,
    name: Option<String>,
    banner_url: Option<String>,
) -> Result<EventInfo, ConfigError> {
    let id = file.id.or(id).ok_or(ConfigError::MissingEventId)?;
    let name = file.name.or(name).unwrap_or_else(|| id.clone());
    Ok(EventInfo {
        id,
        name,
        banner_url: file.banner_url.or(banner_url),
    })
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok().and_then(|value| value.parse::<u64>().ok())
}

fn non_blank_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
