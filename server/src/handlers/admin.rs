use axum::extract::{Path, State};
use axum::response::Response;
use axum::Form;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::auth::{CurrentAdmin, SessionRole};
use crate::media::public_url;
use crate::models::{ApplicationStage, ReviewEntry};
use crate::services::AccountError;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{success, success_then};

const QUEUE_PATH: &str = "/admin/applications";

pub async fn admin_login_form() -> Response {
    #[derive(Serialize)]
    struct AdminLoginForm {
        fields: [&'static str; 2],
    }

    success(
        AdminLoginForm {
            fields: ["username", "password"],
        },
        "Administrator login",
    )
}

#[derive(Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
struct AdminLoggedIn {
    admin_id: i64,
    username: String,
}

pub async fn admin_login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(request): Form<AdminLoginRequest>,
) -> Result<(CookieJar, Response), AppError> {
    let admin = state
        .accounts
        .authenticate_admin(&request.username, &request.password)
        .await
        .map_err(|e| match e {
            AccountError::InvalidCredentials => {
                AppError::AuthError("Invalid admin credentials.".to_string())
            }
            other => other.into(),
        })?;

    let token = state
        .sessions
        .issue(SessionRole::Admin, admin.id, &admin.username)?;
    let jar = jar.add(state.sessions.cookie(SessionRole::Admin, token));

    Ok((
        jar,
        success_then(
            AdminLoggedIn {
                admin_id: admin.id,
                username: admin.username,
            },
            "Admin login successful!",
            "/admin/dashboard",
        ),
    ))
}

#[derive(Serialize)]
struct Dashboard {
    username: String,
    pending_count: i64,
}

pub async fn admin_dashboard(
    State(state): State<AppState>,
    admin: CurrentAdmin,
) -> Result<Response, AppError> {
    let pending_count = state.review.count_pending_review().await?;
    Ok(success(
        Dashboard {
            username: admin.username,
            pending_count,
        },
        "Admin dashboard",
    ))
}

#[derive(Serialize)]
struct QueueItem {
    #[serde(flatten)]
    entry: ReviewEntry,
    stage: ApplicationStage,
    photo_url: Option<String>,
}

pub async fn admin_applications(
    State(state): State<AppState>,
    _admin: CurrentAdmin,
) -> Result<Response, AppError> {
    let items: Vec<QueueItem> = state
        .review
        .list_pending_review()
        .await?
        .into_iter()
        .map(|entry| QueueItem {
            stage: entry.application.stage(),
            photo_url: entry.applicant.photo_path.as_deref().map(public_url),
            entry,
        })
        .collect();

    let message = format!("{} paid application(s)", items.len());
    Ok(success(items, message))
}

pub async fn process_pass(
    State(state): State<AppState>,
    admin: CurrentAdmin,
    Path((id, action)): Path<(i64, String)>,
) -> Result<Response, AppError> {
    tracing::info!(admin_id = admin.admin_id, application_id = id, action = %action, "Processing application");

    match action.as_str() {
        "approve" => {
            let record = state
                .workflow
                .approve(id)
                .await
                .map_err(|e| AppError::from(e).with_redirect(QUEUE_PATH))?;
            let message = if record.newly_issued {
                format!(
                    "Pass for application {} approved, pass number {} generated.",
                    id, record.pass_number
                )
            } else {
                format!("Application {} was already approved.", id)
            };
            Ok(success_then(record, message, QUEUE_PATH))
        }
        "reject" => {
            let application = state
                .workflow
                .reject(id)
                .await
                .map_err(|e| AppError::from(e).with_redirect(QUEUE_PATH))?;
            Ok(success_then(
                application,
                format!("Application {} has been REJECTED.", id),
                QUEUE_PATH,
            ))
        }
        _ => Err(AppError::ValidationError("Invalid action.".to_string())),
    }
}
