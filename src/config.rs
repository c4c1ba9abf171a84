use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::models::Credentials;
use crate::services::notifier::PermissionState;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub access_token: Option<String>,
    pub credentials: Option<Credentials>,
    pub poll_interval: Duration,
    pub notification_permission: PermissionState,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            access_token: None,
            credentials: None,
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            notification_permission: PermissionState::Granted,
        }
    }
}

impl ClientConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup; `new_from_env` passes `env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("TASKDECK_API_URL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "TASKDECK_API_URL must be an http(s) URL, got {}",
                    url
                )));
            }
            config.api_url = url.trim_end_matches('/').to_string();
        }

        config.access_token = lookup("TASKDECK_ACCESS_TOKEN").filter(|t| !t.is_empty());

        config.credentials = match (lookup("TASKDECK_EMAIL"), lookup("TASKDECK_PASSWORD")) {
            (Some(email), Some(password)) => Some(Credentials::new(email, password)),
            (None, None) => None,
            _ => {
                return Err(AppError::Config(
                    "TASKDECK_EMAIL and TASKDECK_PASSWORD must be set together".to_string(),
                ));
            }
        };

        if let Some(raw) = lookup("TASKDECK_POLL_INTERVAL_SECS") {
            let secs: u64 = raw.parse().map_err(|_| {
                AppError::Config(format!("TASKDECK_POLL_INTERVAL_SECS is not a number: {}", raw))
            })?;
            if secs == 0 {
                return Err(AppError::Config(
                    "TASKDECK_POLL_INTERVAL_SECS must be greater than zero".to_string(),
                ));
            }
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup("TASKDECK_NOTIFICATIONS") {
            config.notification_permission = match raw.as_str() {
                "granted" => PermissionState::Granted,
                "denied" => PermissionState::Denied,
                other => {
                    return Err(AppError::Config(format!(
                        "TASKDECK_NOTIFICATIONS must be granted or denied, got {}",
                        other
                    )));
                }
            };
        }

        Ok(config)
    }
}
