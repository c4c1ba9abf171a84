use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{info, warn};

use crate::api::AuthApi;
use crate::error::AppError;
use crate::models::{Credentials, CurrentUser};

/// Sessions closer than this to expiry get a warning.
const EXPIRY_WARNING_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Active(CurrentUser),
    /// The server rejected the session; the user has to log in again.
    LoginRequired,
}

pub struct SessionService {
    auth: Arc<dyn AuthApi>,
}

impl SessionService {
    pub fn new(auth: Arc<dyn AuthApi>) -> Self {
        Self { auth }
    }

    pub async fn check(&self) -> Result<SessionState, AppError> {
        self.check_at(Utc::now()).await
    }

    pub async fn check_at(&self, now: DateTime<Utc>) -> Result<SessionState, AppError> {
        match self.auth.current_user().await {
            Ok(user) => {
                if expires_soon(&user, now) {
                    warn!("Session is about to expire, log in again to renew it");
                }
                Ok(SessionState::Active(user))
            }
            Err(AppError::Unauthorized) => {
                info!("No valid session, login required");
                Ok(SessionState::LoginRequired)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<SessionState, AppError> {
        validate(credentials)?;
        self.auth.login(credentials).await?;
        info!("Logged in as {}", credentials.email);
        self.check().await
    }

    pub async fn signup(&self, credentials: &Credentials) -> Result<SessionState, AppError> {
        validate(credentials)?;
        self.auth.signup(credentials).await?;
        info!("Signed up as {}", credentials.email);
        self.check().await
    }

    pub async fn logout(&self) -> Result<(), AppError> {
        self.auth.logout().await?;
        info!("Logged out");
        Ok(())
    }
}

fn expires_soon(user: &CurrentUser, now: DateTime<Utc>) -> bool {
    user.session_expires_at
        .is_some_and(|expires_at| expires_at - now < TimeDelta::seconds(EXPIRY_WARNING_SECS))
}

fn validate(credentials: &Credentials) -> Result<(), AppError> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    }
    Ok(())
}
