use std::sync::Arc;

use crate::models::ReviewEntry;
use crate::store::{ApplicationStore, StoreError};

/// Read side of the admin surface.
#[derive(Clone)]
pub struct ReviewQueue {
    store: Arc<dyn ApplicationStore>,
}

impl ReviewQueue {
    pub fn new(store: Arc<dyn ApplicationStore>) -> Self {
        Self { store }
    }

    /// Every paid application with its applicant, oldest first. Decided rows
    /// stay listed with their final status.
    pub async fn list_pending_review(&self) -> Result<Vec<ReviewEntry>, StoreError> {
        self.store.paid_applications().await
    }

    pub async fn count_pending_review(&self) -> Result<i64, StoreError> {
        self.store.count_awaiting_review().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::scratch_media;
    use crate::models::NewUser;
    use crate::services::ApplicationWorkflow;
    use crate::store::{AccountStore, MemoryStore};

    async fn user(store: &MemoryStore, name: &str) -> i64 {
        store
            .insert_user(NewUser {
                name: name.to_string(),
                email: format!("{}@x.com", name.to_lowercase()),
                password_hash: "$argon2id$stub".to_string(),
                address: None,
                phone_number: "555".to_string(),
                photo_path: None,
            })
            .await
            .expect("user")
    }

    #[tokio::test]
    async fn test_queue_lists_paid_applications_oldest_first() {
        let store = Arc::new(MemoryStore::new());
        let (media, _root) = scratch_media();
        let workflow = ApplicationWorkflow::new(store.clone(), media);
        let queue = ReviewQueue::new(store.clone());

        let alice = user(&store, "Alice").await;
        let bob = user(&store, "Bob").await;
        let carol = user(&store, "Carol").await;

        let first = workflow.submit(alice, "Majestic", "Whitefield").await.expect("a");
        let second = workflow.submit(bob, "Jayanagar", "Yeshwanthpur").await.expect("b");
        // Carol never pays, so she is not reviewable.
        workflow.submit(carol, "Marathahalli", "Electronic City").await.expect("c");

        workflow.pay(second.id, bob).await.expect("paid");
        workflow.pay(first.id, alice).await.expect("paid");
        assert_eq!(queue.count_pending_review().await.expect("count"), 2);

        workflow.reject(second.id).await.expect("rejected");

        let entries = queue.list_pending_review().await.expect("list");
        let ids: Vec<i64> = entries.iter().map(|entry| entry.application.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
        assert_eq!(entries[0].applicant.name, "Alice");
        assert_eq!(queue.count_pending_review().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let queue = ReviewQueue::new(Arc::new(MemoryStore::new()));
        assert!(queue.list_pending_review().await.expect("list").is_empty());
        assert_eq!(queue.count_pending_review().await.expect("count"), 0);
    }
}
