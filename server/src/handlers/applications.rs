use axum::extract::{Path, State};
use axum::response::Response;
use axum::Form;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::media::public_url;
use crate::models::{Application, ApplicationStage, ApprovedPass, PASS_AMOUNT, ROUTE_POINTS};
use crate::services::PaymentOutcome;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created_then, success, success_then};

/// Application as shown to its owner.
#[derive(Serialize)]
pub struct ApplicationView {
    #[serde(flatten)]
    pub application: Application,
    pub stage: ApplicationStage,
}

impl From<Application> for ApplicationView {
    fn from(application: Application) -> Self {
        Self {
            stage: application.stage(),
            application,
        }
    }
}

#[derive(Serialize)]
struct ApplyPage {
    points: &'static [&'static str],
    amount: Decimal,
    latest_application: Option<ApplicationView>,
}

pub async fn apply_form(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Response, AppError> {
    let latest = state.workflow.latest_for(user.user_id).await?;
    Ok(success(
        ApplyPage {
            points: &ROUTE_POINTS,
            amount: PASS_AMOUNT,
            latest_application: latest.map(ApplicationView::from),
        },
        "Choose your route",
    ))
}

#[derive(Deserialize)]
pub struct ApplyRequest {
    pub start_point: String,
    pub end_point: String,
}

pub async fn submit_application(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(request): Form<ApplyRequest>,
) -> Result<Response, AppError> {
    let application = state
        .workflow
        .submit(user.user_id, &request.start_point, &request.end_point)
        .await?;

    let next = format!("/payment/{}", application.id);
    Ok(created_then(
        ApplicationView::from(application),
        "Application submitted. Please complete the payment.",
        next,
    ))
}

pub async fn payment_page(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let application = state
        .workflow
        .owned(id, user.user_id)
        .await
        .map_err(|e| AppError::from(e).with_redirect("/apply_pass"))?;

    Ok(success(ApplicationView::from(application), "Review and pay"))
}

pub async fn submit_payment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Response, AppError> {
    let outcome = state
        .workflow
        .pay(id, user.user_id)
        .await
        .map_err(|e| AppError::from(e).with_redirect("/apply_pass"))?;

    let message = match &outcome {
        PaymentOutcome::Completed(_) => {
            "Payment successful! Your application is now under review."
        }
        PaymentOutcome::AlreadyCompleted(_) => "Payment has already been completed.",
    };
    let application = match outcome {
        PaymentOutcome::Completed(application) | PaymentOutcome::AlreadyCompleted(application) => {
            application
        }
    };

    Ok(success_then(
        ApplicationView::from(application),
        message,
        "/digital_pass",
    ))
}

#[derive(Serialize)]
struct PassView {
    #[serde(flatten)]
    pass: ApprovedPass,
    qr_code_url: Option<String>,
    photo_url: Option<String>,
}

#[derive(Serialize)]
struct DigitalPassPage {
    pass: Option<PassView>,
    latest_application: Option<ApplicationView>,
}

/// The newest approved pass. Without one, the latest application explains
/// where the user stands.
pub async fn digital_pass(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Response, AppError> {
    if let Some(pass) = state.workflow.approved_pass_for(user.user_id).await? {
        let view = PassView {
            qr_code_url: pass.application.qr_code_path.as_deref().map(public_url),
            photo_url: pass.holder.photo_path.as_deref().map(public_url),
            pass,
        };
        return Ok(success(
            DigitalPassPage {
                pass: Some(view),
                latest_application: None,
            },
            "Your digital pass",
        ));
    }

    let latest = state.workflow.latest_for(user.user_id).await?;
    let message = match latest.as_ref().map(Application::stage) {
        None => "You have not applied for a pass yet.",
        Some(ApplicationStage::Submitted) => "Your application is awaiting payment.",
        Some(ApplicationStage::AwaitingReview) => "Your application is under review.",
        Some(ApplicationStage::Rejected) => "Your latest application was rejected.",
        Some(ApplicationStage::Approved) => "Your pass is being prepared.",
    };

    Ok(success(
        DigitalPassPage {
            pass: None,
            latest_application: latest.map(ApplicationView::from),
        },
        message,
    ))
}
