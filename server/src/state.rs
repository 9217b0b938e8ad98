use std::sync::Arc;

use crate::auth::{CredentialHasher, SessionManager};
use crate::config::Config;
use crate::media::MediaStore;
use crate::services::{AccountService, ApplicationWorkflow, ReviewQueue};
use crate::store::{AccountStore, ApplicationStore};

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub workflow: ApplicationWorkflow,
    pub review: ReviewQueue,
    pub sessions: SessionManager,
    pub media: MediaStore,
}

impl AppState {
    pub fn build(
        config: &Config,
        accounts: Arc<dyn AccountStore>,
        applications: Arc<dyn ApplicationStore>,
        hasher: CredentialHasher,
    ) -> Self {
        let media = MediaStore::new(config.upload_dir.clone());
        Self {
            accounts: AccountService::new(accounts, Arc::new(hasher), media.clone()),
            workflow: ApplicationWorkflow::new(applications.clone(), media.clone()),
            review: ReviewQueue::new(applications),
            sessions: SessionManager::new(
                &config.session_secret,
                config.session_ttl_minutes,
                config.production,
            ),
            media,
        }
    }
}
