pub mod password;
pub mod session;

pub use password::{CredentialError, CredentialHasher};
pub use session::{
    CurrentAdmin, CurrentUser, SessionError, SessionManager, SessionRole, ADMIN_SESSION_COOKIE,
    USER_SESSION_COOKIE,
};
