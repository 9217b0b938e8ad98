//! Lifecycle of a pass application: submit, pay, then an admin decision.

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::media::{MediaStore, StagedFile};
use crate::models::{
    Application, ApplicationStage, ApprovedPass, NewApplication, PaymentStatus, ReviewEntry,
    PASS_AMOUNT, ROUTE_POINTS,
};
use crate::pass::{GenerationError, PassCard};
use crate::store::{ApplicationStore, StoreError, OPEN_APPLICATION_CONSTRAINT};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),

    #[error("application {0} not found")]
    NotFound(i64),

    #[error("application {0} is still open")]
    PendingApplication(i64),

    #[error("application {id} cannot be {action} while {stage}")]
    InvalidTransition {
        id: i64,
        action: &'static str,
        stage: &'static str,
    },

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    Completed(Application),
    AlreadyCompleted(Application),
}

impl PaymentOutcome {
    pub fn application(&self) -> &Application {
        match self {
            PaymentOutcome::Completed(application)
            | PaymentOutcome::AlreadyCompleted(application) => application,
        }
    }
}

/// Issued pass as reported back to the approving admin.
#[derive(Debug, Clone, Serialize)]
pub struct PassRecord {
    pub application_id: i64,
    pub pass_number: String,
    pub qr_code_path: String,
    pub holder_name: String,
    /// False when the application had already been approved.
    pub newly_issued: bool,
}

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct ApplicationWorkflow {
    store: Arc<dyn ApplicationStore>,
    media: MediaStore,
    clock: Clock,
    // Admin decisions in one process run one at a time. Other processes are
    // fenced by the guarded updates.
    decisions: Arc<Mutex<()>>,
}

impl ApplicationWorkflow {
    pub fn new(store: Arc<dyn ApplicationStore>, media: MediaStore) -> Self {
        Self {
            store,
            media,
            clock: Arc::new(|| Local::now().date_naive()),
            decisions: Arc::new(Mutex::new(())),
        }
    }

    /// Replaces the source of the approval date.
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> NaiveDate + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    pub async fn submit(
        &self,
        user_id: i64,
        start_point: &str,
        end_point: &str,
    ) -> Result<Application, WorkflowError> {
        let (start_point, end_point) = validate_route(start_point, end_point)?;

        if let Some(latest) = self.store.latest_for_user(user_id).await? {
            if latest.is_open() {
                return Err(WorkflowError::PendingApplication(latest.id));
            }
        }

        let new_application = NewApplication {
            user_id,
            start_point: start_point.to_string(),
            end_point: end_point.to_string(),
            amount: PASS_AMOUNT,
        };

        match self.store.insert_application(new_application).await {
            Ok(application) => {
                tracing::info!(
                    application_id = application.id,
                    user_id,
                    start_point,
                    end_point,
                    "Application submitted"
                );
                Ok(application)
            }
            Err(e) if e.violates(OPEN_APPLICATION_CONSTRAINT) => {
                // Lost a race with a concurrent submission by the same user.
                match self.store.latest_for_user(user_id).await? {
                    Some(open) if open.is_open() => Err(WorkflowError::PendingApplication(open.id)),
                    _ => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Application `id` if it belongs to `user_id`.
    pub async fn owned(&self, id: i64, user_id: i64) -> Result<Application, WorkflowError> {
        self.store
            .find_owned_application(id, user_id)
            .await?
            .ok_or(WorkflowError::NotFound(id))
    }

    /// Simulated payment gateway; always succeeds once reached.
    pub async fn pay(&self, id: i64, user_id: i64) -> Result<PaymentOutcome, WorkflowError> {
        let application = self.owned(id, user_id).await?;
        if let Some(outcome) = settled_payment(application)? {
            return Ok(outcome);
        }

        let applied = self.store.complete_payment(id, user_id).await?;
        let current = self.owned(id, user_id).await?;
        if applied {
            tracing::info!(application_id = id, user_id, "Payment completed");
            return Ok(PaymentOutcome::Completed(current));
        }

        // Someone else moved the row between the read and the update.
        settled_payment(current)?.ok_or(WorkflowError::InvalidTransition {
            id,
            action: "paid",
            stage: ApplicationStage::Submitted.label(),
        })
    }

    pub async fn approve(&self, id: i64) -> Result<PassRecord, WorkflowError> {
        let _decision = self.decisions.lock().await;

        let entry = self
            .store
            .find_with_applicant(id)
            .await?
            .ok_or(WorkflowError::NotFound(id))?;
        let application = &entry.application;

        match application.stage() {
            ApplicationStage::AwaitingReview => {}
            ApplicationStage::Approved => return self.existing_pass(&entry).await,
            stage => {
                return Err(WorkflowError::InvalidTransition {
                    id,
                    action: "approved",
                    stage: stage.label(),
                })
            }
        }

        let card = PassCard::issue(
            id,
            (self.clock)(),
            &entry.applicant.name,
            &application.start_point,
            &application.end_point,
        );
        // Staged under a private name; `staged` deletes it on any early return.
        let staged = self.stage_card(&card).await?;

        if !self
            .store
            .mark_approved(id, &card.pass_number, staged.public_path())
            .await?
        {
            drop(staged);
            // Decided elsewhere between the read and the update.
            let current = self
                .store
                .find_with_applicant(id)
                .await?
                .ok_or(WorkflowError::NotFound(id))?;
            return match current.application.stage() {
                ApplicationStage::Approved => self.existing_pass(&current).await,
                stage => Err(WorkflowError::InvalidTransition {
                    id,
                    action: "approved",
                    stage: stage.label(),
                }),
            };
        }
        let qr_code_path = staged.commit().map_err(GenerationError::from)?;

        // A rejection that landed before the image was published could not
        // remove it.
        let current = self.store.find_application(id).await?;
        if current.as_ref().map(Application::stage) != Some(ApplicationStage::Approved) {
            self.media.remove(&qr_code_path).await;
            return Err(WorkflowError::InvalidTransition {
                id,
                action: "approved",
                stage: current
                    .map_or(ApplicationStage::Rejected, |a| a.stage())
                    .label(),
            });
        }

        tracing::info!(application_id = id, pass_number = %card.pass_number, "Pass approved");
        Ok(PassRecord {
            application_id: id,
            pass_number: card.pass_number,
            qr_code_path,
            holder_name: entry.applicant.name.clone(),
            newly_issued: true,
        })
    }

    pub async fn reject(&self, id: i64) -> Result<Application, WorkflowError> {
        let _decision = self.decisions.lock().await;

        let rejection = self.store.mark_rejected(id).await?;
        let current = self
            .store
            .find_application(id)
            .await?
            .ok_or(WorkflowError::NotFound(id))?;

        if let Some(rejection) = rejection {
            // Path as of the update, not of any earlier read.
            if let Some(qr_code_path) = &rejection.cleared_qr_code_path {
                self.media.remove(qr_code_path).await;
            }
            tracing::info!(
                application_id = id,
                had_pass = rejection.cleared_qr_code_path.is_some(),
                "Application rejected"
            );
        }
        Ok(current)
    }

    pub async fn latest_for(&self, user_id: i64) -> Result<Option<Application>, WorkflowError> {
        Ok(self.store.latest_for_user(user_id).await?)
    }

    pub async fn approved_pass_for(&self, user_id: i64) -> Result<Option<ApprovedPass>, WorkflowError> {
        Ok(self.store.latest_approved_for_user(user_id).await?)
    }

    async fn stage_card(&self, card: &PassCard) -> Result<StagedFile, WorkflowError> {
        let png = card.render().await?;
        let staged = self
            .media
            .stage_qr_code(card.file_name(), png)
            .await
            .map_err(GenerationError::from)?;
        Ok(staged)
    }

    /// Pass of an already approved row. Re-renders the QR image when the
    /// stored file has gone missing.
    async fn existing_pass(&self, entry: &ReviewEntry) -> Result<PassRecord, WorkflowError> {
        let application = &entry.application;
        let (Some(pass_number), Some(qr_code_path)) =
            (&application.pass_number, &application.qr_code_path)
        else {
            return Err(WorkflowError::Store(StoreError::Query(format!(
                "approved application {} has no pass fields",
                application.id
            ))));
        };

        if !self.media.exists(qr_code_path).await {
            tracing::warn!(application_id = application.id, %pass_number, "Re-issuing missing QR code");
            let card = PassCard::with_number(
                pass_number.clone(),
                &entry.applicant.name,
                &application.start_point,
                &application.end_point,
            );
            self.stage_card(&card)
                .await?
                .commit()
                .map_err(GenerationError::from)?;
        }

        Ok(PassRecord {
            application_id: application.id,
            pass_number: pass_number.clone(),
            qr_code_path: qr_code_path.clone(),
            holder_name: entry.applicant.name.clone(),
            newly_issued: false,
        })
    }
}

fn validate_route<'a>(start_point: &'a str, end_point: &'a str) -> Result<(&'a str, &'a str), WorkflowError> {
    let start_point = start_point.trim();
    let end_point = end_point.trim();

    for point in [start_point, end_point] {
        if !ROUTE_POINTS.contains(&point) {
            return Err(WorkflowError::Validation(format!(
                "Unknown route point '{}'.",
                point
            )));
        }
    }
    if start_point == end_point {
        return Err(WorkflowError::Validation(
            "Start and end points must differ.".to_string(),
        ));
    }
    Ok((start_point, end_point))
}

/// `Some` when no payment step is needed for `application`.
fn settled_payment(application: Application) -> Result<Option<PaymentOutcome>, WorkflowError> {
    if application.payment_status == PaymentStatus::Completed {
        return Ok(Some(PaymentOutcome::AlreadyCompleted(application)));
    }
    match application.stage() {
        ApplicationStage::Submitted => Ok(None),
        stage => Err(WorkflowError::InvalidTransition {
            id: application.id,
            action: "paid",
            stage: stage.label(),
        }),
    }
}
