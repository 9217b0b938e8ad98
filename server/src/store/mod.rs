//! Persistence seams for accounts and applications.
//!
//! Every state transition is expressed as a guarded update that reports
//! whether it applied, so callers never read-modify-write a row.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AdminUser, Application, ApprovedPass, NewApplication, NewUser, ReviewEntry, User};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Name of the unique index allowing one open application per user.
pub const OPEN_APPLICATION_CONSTRAINT: &str = "applications_one_open_per_user";
pub const USER_EMAIL_CONSTRAINT: &str = "users_email_key";
pub const ADMIN_USERNAME_CONSTRAINT: &str = "admin_users_username_key";

/// Outcome of a rejection that changed the row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// QR artifact the row pointed at right before the update.
    pub cleared_qr_code_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unreachable: {0}")]
    Connection(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("storage query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn violates(&self, constraint: &str) -> bool {
        matches!(self, StoreError::UniqueViolation(name) if name == constraint)
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::UniqueViolation(db.constraint().unwrap_or_default().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => StoreError::Connection(err.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<i64, StoreError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn insert_admin(&self, username: &str, password_hash: &str) -> Result<i64, StoreError>;
    async fn find_admin_by_username(&self, username: &str)
        -> Result<Option<AdminUser>, StoreError>;
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    /// Fails with a unique violation on [`OPEN_APPLICATION_CONSTRAINT`] when
    /// the user already has an open application.
    async fn insert_application(&self, application: NewApplication)
        -> Result<Application, StoreError>;
    async fn find_application(&self, id: i64) -> Result<Option<Application>, StoreError>;
    async fn find_owned_application(
        &self,
        id: i64,
        user_id: i64,
    ) -> Result<Option<Application>, StoreError>;
    async fn find_with_applicant(&self, id: i64) -> Result<Option<ReviewEntry>, StoreError>;
    async fn latest_for_user(&self, user_id: i64) -> Result<Option<Application>, StoreError>;
    async fn latest_approved_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<ApprovedPass>, StoreError>;

    /// PENDING/PENDING -> PENDING/COMPLETED. Returns false when the row was
    /// not in that state.
    async fn complete_payment(&self, id: i64, user_id: i64) -> Result<bool, StoreError>;
    /// PENDING/COMPLETED -> APPROVED with pass fields.
    async fn mark_approved(
        &self,
        id: i64,
        pass_number: &str,
        qr_code_path: &str,
    ) -> Result<bool, StoreError>;
    /// Any non-rejected state -> REJECTED with pass fields cleared. `None`
    /// when the row was missing or already rejected.
    async fn mark_rejected(&self, id: i64) -> Result<Option<Rejection>, StoreError>;

    /// Paid applications, oldest first.
    async fn paid_applications(&self) -> Result<Vec<ReviewEntry>, StoreError>;
    async fn count_awaiting_review(&self) -> Result<i64, StoreError>;
}
