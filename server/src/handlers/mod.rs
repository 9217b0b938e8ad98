use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::auth::CurrentUser;
use crate::utils::response::{success, success_then};

pub mod accounts;
pub mod admin;
pub mod applications;

pub use accounts::{login, login_form, logout, register, register_form};
pub use admin::{admin_applications, admin_dashboard, admin_login, admin_login_form, process_pass};
pub use applications::{apply_form, digital_pass, payment_page, submit_application, submit_payment};

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "buspass-api",
    };

    success(payload, "Health check successful").into_response()
}

#[derive(Serialize)]
struct IndexPayload {
    service: &'static str,
    logged_in: bool,
}

/// Landing page; a logged-in citizen is sent straight to the application form.
pub async fn index(user: Option<CurrentUser>) -> Response {
    match user {
        Some(_) => success_then(
            IndexPayload {
                service: "buspass-api",
                logged_in: true,
            },
            "Welcome back",
            "/apply_pass",
        ),
        None => success(
            IndexPayload {
                service: "buspass-api",
                logged_in: false,
            },
            "Apply for a bus pass online",
        ),
    }
}
