use std::sync::Arc;

use thiserror::Error;

use crate::auth::{CredentialError, CredentialHasher};
use crate::media::{MediaError, MediaStore, PHOTO_EXTENSIONS};
use crate::models::{AdminUser, NewUser, User};
use crate::store::{AccountStore, StoreError, ADMIN_USERNAME_CONSTRAINT, USER_EMAIL_CONSTRAINT};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("admin username {0} is already taken")]
    DuplicateUsername(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Uploaded photo as received from the registration form.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub address: Option<String>,
    pub phone_number: String,
    pub photo: Option<PhotoUpload>,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn AccountStore>,
    hasher: Arc<CredentialHasher>,
    media: MediaStore,
}

impl AccountService {
    pub fn new(store: Arc<dyn AccountStore>, hasher: Arc<CredentialHasher>, media: MediaStore) -> Self {
        Self {
            store,
            hasher,
            media,
        }
    }

    pub async fn register(&self, registration: Registration) -> Result<i64, AccountError> {
        let name = registration.name.trim();
        let email = normalize_email(&registration.email);
        let phone_number = registration.phone_number.trim();

        if name.is_empty()
            || email.is_empty()
            || registration.password.is_empty()
            || phone_number.is_empty()
        {
            return Err(AccountError::Validation(
                "Please fill in all required fields.".to_string(),
            ));
        }

        let photo = match registration.photo {
            Some(upload) if !upload.file_name.is_empty() => {
                let extension = MediaStore::photo_extension(&upload.file_name).ok_or_else(|| {
                    AccountError::Validation(format!(
                        "Invalid file type for photo. Allowed: {}.",
                        PHOTO_EXTENSIONS.join(", ")
                    ))
                })?;
                Some((extension, upload.bytes))
            }
            _ => None,
        };

        let password_hash = self.hash_password(registration.password).await?;

        let staged = match photo {
            Some((extension, bytes)) => Some(self.media.stage_photo(&extension, bytes).await?),
            None => None,
        };

        let user = NewUser {
            name: name.to_string(),
            email: email.clone(),
            password_hash,
            address: registration
                .address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            phone_number: phone_number.to_string(),
            photo_path: staged.as_ref().map(|file| file.public_path().to_string()),
        };

        // The staged photo is discarded with `staged` if the insert fails.
        let user_id = self.store.insert_user(user).await.map_err(|e| {
            if e.violates(USER_EMAIL_CONSTRAINT) {
                AccountError::DuplicateEmail(email.clone())
            } else {
                AccountError::Store(e)
            }
        })?;

        if let Some(file) = staged {
            file.commit()?;
        }

        tracing::info!(user_id, email = %email, "Registered user");
        Ok(user_id)
    }

    /// Never reveals whether the email exists.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, AccountError> {
        let email = normalize_email(email);
        let user = self.store.find_user_by_email(&email).await?;
        let stored = user.as_ref().map(|u| u.password_hash.clone());

        match user {
            Some(user) if self.verify_password(password, stored).await? => {
                tracing::info!(user_id = user.id, "User logged in");
                Ok(user)
            }
            Some(user) => {
                tracing::warn!(user_id = user.id, "Rejected user login");
                Err(AccountError::InvalidCredentials)
            }
            None => {
                self.verify_password(password, None).await?;
                tracing::warn!("Rejected user login for unknown email");
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    pub async fn authenticate_admin(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AdminUser, AccountError> {
        let admin = self.store.find_admin_by_username(username.trim()).await?;
        let stored = admin.as_ref().map(|a| a.password_hash.clone());

        match admin {
            Some(admin) if self.verify_password(password, stored).await? => {
                tracing::info!(admin_id = admin.id, "Admin logged in");
                Ok(admin)
            }
            _ => {
                tracing::warn!(username, "Rejected admin login");
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    pub async fn create_admin(&self, username: &str, password: &str) -> Result<i64, AccountError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::Validation(
                "Admin username and password are required.".to_string(),
            ));
        }

        let password_hash = self.hash_password(password.to_string()).await?;
        let admin_id = self
            .store
            .insert_admin(username, &password_hash)
            .await
            .map_err(|e| {
                if e.violates(ADMIN_USERNAME_CONSTRAINT) {
                    AccountError::DuplicateUsername(username.to_string())
                } else {
                    AccountError::Store(e)
                }
            })?;

        tracing::info!(admin_id, username, "Provisioned admin");
        Ok(admin_id)
    }

    #[cfg(test)]
    async fn find_user(&self, user_id: i64) -> Result<Option<User>, AccountError> {
        Ok(self.store.find_user(user_id).await?)
    }

    // Argon2 is CPU-bound; keep it off the async workers.
    async fn hash_password(&self, password: String) -> Result<String, AccountError> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| CredentialError::Hashing(e.to_string()))?
            .map_err(AccountError::from)
    }

    /// Verifies against `stored`, or burns a dummy verification when the
    /// account does not exist.
    async fn verify_password(&self, password: &str, stored: Option<String>) -> Result<bool, AccountError> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let verified = tokio::task::spawn_blocking(move || match stored {
            Some(hash) => hasher.verify(&password, &hash),
            None => {
                hasher.verify_missing(&password);
                false
            }
        })
        .await
        .map_err(|e| CredentialError::Hashing(e.to_string()))?;
        Ok(verified)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::cheap_params;
    use crate::media::scratch_media;
    use crate::store::MemoryStore;

    fn service() -> (AccountService, MediaStore, tempfile::TempDir) {
        let (media, root) = scratch_media();
        let hasher = CredentialHasher::with_params("pepper", cheap_params()).expect("hasher");
        let service = AccountService::new(
            Arc::new(MemoryStore::new()),
            Arc::new(hasher),
            media.clone(),
        );
        (service, media, root)
    }

    fn alice() -> Registration {
        Registration {
            name: "Alice".to_string(),
            email: "a@x.com".to_string(),
            password: "pw".to_string(),
            address: Some("Addr".to_string()),
            phone_number: "555-1".to_string(),
            photo: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (service, _, _root) = service();
        let user_id = service.register(alice()).await.expect("registers");

        let user = service.authenticate("a@x.com", "pw").await.expect("logs in");
        assert_eq!(user.id, user_id);
        assert_ne!(user.password_hash, "pw");
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let (service, _, _root) = service();
        service.register(alice()).await.expect("first registration");

        let mut again = alice();
        again.email = "  A@X.com ".to_string();
        let err = service.register(again).await.unwrap_err();
        assert!(matches!(err, AccountError::DuplicateEmail(email) if email == "a@x.com"));
    }

    #[tokio::test]
    async fn test_missing_required_field_is_validation_error() {
        let (service, _, _root) = service();
        let mut registration = alice();
        registration.phone_number = "   ".to_string();

        let err = service.register(registration).await.unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
    }

    #[tokio::test]
    async fn test_disallowed_photo_extension_is_validation_error() {
        let (service, _, _root) = service();
        let mut registration = alice();
        registration.photo = Some(PhotoUpload {
            file_name: "me.gif".to_string(),
            bytes: vec![1, 2, 3],
        });

        let err = service.register(registration).await.unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
    }

    #[tokio::test]
    async fn test_photo_is_stored_and_discarded_on_duplicate() {
        let (service, media, _root) = service();
        let mut first = alice();
        first.photo = Some(PhotoUpload {
            file_name: "me.png".to_string(),
            bytes: vec![7; 32],
        });
        let user_id = service.register(first.clone()).await.expect("registers");

        let stored = service
            .find_user(user_id)
            .await
            .expect("lookup")
            .and_then(|user| user.photo_path)
            .expect("photo recorded");
        assert!(media.resolve(&stored).expect("inside root").exists());

        let _ = service.register(first).await.unwrap_err();
        let photos = std::fs::read_dir(media.root().join(crate::media::PHOTO_DIR))
            .expect("photo dir")
            .count();
        assert_eq!(photos, 1);
    }

    #[tokio::test]
    async fn test_wrong_password_and_unknown_email_look_identical() {
        let (service, _, _root) = service();
        service.register(alice()).await.expect("registers");

        let wrong = service.authenticate("a@x.com", "nope").await.unwrap_err();
        let unknown = service.authenticate("b@x.com", "pw").await.unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_logins_verify_off_the_runtime() {
        let (service, _, _root) = service();
        service.register(alice()).await.expect("registers");

        let attempts = (0..8).map(|i| {
            let service = service.clone();
            tokio::spawn(async move {
                let password = if i % 2 == 0 { "pw" } else { "nope" };
                service.authenticate("a@x.com", password).await.is_ok()
            })
        });
        let mut accepted = 0;
        for attempt in attempts.collect::<Vec<_>>() {
            if attempt.await.expect("task") {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 4);
    }

    #[tokio::test]
    async fn test_admin_credentials_are_hashed() {
        let (service, _, _root) = service();
        service.create_admin("root", "s3cret").await.expect("admin");

        assert!(service.authenticate_admin("root", "s3cret").await.is_ok());
        assert!(matches!(
            service.authenticate_admin("root", "wrong").await,
            Err(AccountError::InvalidCredentials)
        ));
        assert!(matches!(
            service.create_admin("root", "other").await,
            Err(AccountError::DuplicateUsername(_))
        ));
    }
}
