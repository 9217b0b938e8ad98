use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::user::Holder;

/// Named stops a pass may start or end at.
pub const ROUTE_POINTS: [&str; 8] = [
    "Majestic",
    "Jayanagar",
    "Whitefield",
    "Koramangala",
    "Electronic City",
    "Indiranagar",
    "Marathahalli",
    "Yeshwanthpur",
];

/// Flat fee charged for every pass, in rupees.
pub const PASS_AMOUNT: Decimal = Decimal::from_parts(50000, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "varchar", rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
}

/// Workflow position derived from the two stored status columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStage {
    Submitted,
    AwaitingReview,
    Approved,
    Rejected,
}

impl ApplicationStage {
    pub fn label(&self) -> &'static str {
        match self {
            ApplicationStage::Submitted => "submitted",
            ApplicationStage::AwaitingReview => "awaiting_review",
            ApplicationStage::Approved => "approved",
            ApplicationStage::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: i64,
    pub user_id: i64,
    pub start_point: String,
    pub end_point: String,
    pub amount: Decimal,
    pub status: ApplicationStatus,
    pub payment_status: PaymentStatus,
    pub application_date: DateTime<Utc>,
    pub pass_number: Option<String>,
    pub qr_code_path: Option<String>,
}

impl Application {
    pub fn stage(&self) -> ApplicationStage {
        match (self.status, self.payment_status) {
            (ApplicationStatus::Approved, _) => ApplicationStage::Approved,
            (ApplicationStatus::Rejected, _) => ApplicationStage::Rejected,
            (ApplicationStatus::Pending, PaymentStatus::Pending) => ApplicationStage::Submitted,
            (ApplicationStatus::Pending, PaymentStatus::Completed) => {
                ApplicationStage::AwaitingReview
            }
        }
    }

    /// Open applications block a new submission by the same user.
    pub fn is_open(&self) -> bool {
        self.status == ApplicationStatus::Pending
    }
}

#[derive(Debug, Clone)]
pub struct NewApplication {
    pub user_id: i64,
    pub start_point: String,
    pub end_point: String,
    pub amount: Decimal,
}

/// A paid application as listed for administrators.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewEntry {
    #[serde(flatten)]
    pub application: Application,
    pub applicant: Holder,
}

/// The most recent approved application together with its holder.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovedPass {
    #[serde(flatten)]
    pub application: Application,
    pub holder: Holder,
}
