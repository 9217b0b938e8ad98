use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub address: Option<String>,
    pub phone_number: String,
    pub photo_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Row to insert at registration; the password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub address: Option<String>,
    pub phone_number: String,
    pub photo_path: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AdminUser {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Applicant details shown next to an application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holder {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub photo_path: Option<String>,
}

impl From<&User> for Holder {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
            phone_number: user.phone_number.clone(),
            photo_path: user.photo_path.clone(),
        }
    }
}
