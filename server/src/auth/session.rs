use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state::AppState;
use crate::utils::error::AppError;

pub const USER_SESSION_COOKIE: &str = "buspass_session";
pub const ADMIN_SESSION_COOKIE: &str = "buspass_admin_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    User,
    Admin,
}

impl SessionRole {
    pub fn cookie_name(&self) -> &'static str {
        match self {
            SessionRole::User => USER_SESSION_COOKIE,
            SessionRole::Admin => ADMIN_SESSION_COOKIE,
        }
    }

    pub fn login_path(&self) -> &'static str {
        match self {
            SessionRole::User => "/login",
            SessionRole::Admin => "/admin/login",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub role: SessionRole,
    /// Email for citizens, username for administrators.
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to sign session token: {0}")]
    Signing(String),
    #[error("session token is invalid or expired")]
    Invalid,
    #[error("session token was issued for another role")]
    WrongRole,
}

/// Issues and checks HS256 session tokens carried in HttpOnly cookies.
#[derive(Clone)]
pub struct SessionManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_minutes: i64,
    secure_cookies: bool,
}

impl SessionManager {
    pub fn new(secret: &str, ttl_minutes: i64, secure_cookies: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_minutes,
            secure_cookies,
        }
    }

    pub fn issue(&self, role: SessionRole, subject: i64, name: &str) -> Result<String, SessionError> {
        let now = Utc::now().timestamp();
        let claims = SessionClaims {
            sub: subject.to_string(),
            role,
            name: name.to_string(),
            iat: now,
            exp: now + self.ttl_minutes * 60,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Signing(e.to_string()))
    }

    pub fn validate(&self, token: &str, role: SessionRole) -> Result<SessionClaims, SessionError> {
        let validation = Validation::new(Algorithm::HS256);
        let claims = decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|_| SessionError::Invalid)?
            .claims;

        if claims.role != role {
            return Err(SessionError::WrongRole);
        }
        Ok(claims)
    }

    pub fn cookie(&self, role: SessionRole, token: String) -> Cookie<'static> {
        Cookie::build((role.cookie_name(), token))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure_cookies)
            .build()
    }

    pub fn removal_cookie(role: SessionRole) -> Cookie<'static> {
        Cookie::build((role.cookie_name(), "")).path("/").build()
    }

    fn claims_from(&self, parts: &Parts, role: SessionRole) -> Result<SessionClaims, AppError> {
        let unauthenticated = || AppError::Unauthenticated {
            login_path: role.login_path(),
        };

        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get(role.cookie_name()).ok_or_else(unauthenticated)?;
        self.validate(token.value(), role).map_err(|e| {
            tracing::debug!(error = %e, "Rejected session cookie");
            unauthenticated()
        })
    }
}

/// Logged-in citizen, taken from the user session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: i64,
    pub email: String,
}

/// Logged-in administrator, taken from the admin session cookie.
#[derive(Debug, Clone)]
pub struct CurrentAdmin {
    pub admin_id: i64,
    pub username: String,
}

fn subject_id(claims: &SessionClaims) -> Result<i64, AppError> {
    claims.sub.parse().map_err(|_| AppError::Unauthenticated {
        login_path: claims.role.login_path(),
    })
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = state.sessions.claims_from(parts, SessionRole::User)?;
        Ok(Self {
            user_id: subject_id(&claims)?,
            email: claims.name,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let claims = state.sessions.claims_from(parts, SessionRole::Admin)?;
        Ok(Self {
            admin_id: subject_id(&claims)?,
            username: claims.name,
        })
    }
}
