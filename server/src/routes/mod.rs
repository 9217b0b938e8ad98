use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{
    admin_applications, admin_dashboard, admin_login, admin_login_form, apply_form, digital_pass,
    health_check, index, login, login_form, logout, payment_page, process_pass, register,
    register_form, submit_application, submit_payment,
};
use crate::state::AppState;

/// Upper bound for a registration form including its photo.
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    let uploads = ServeDir::new(state.media.root());

    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/register", get(register_form).post(register))
        .route("/login", get(login_form).post(login))
        .route("/logout", get(logout))
        .route("/apply_pass", get(apply_form).post(submit_application))
        .route("/payment/:id", get(payment_page).post(submit_payment))
        .route("/digital_pass", get(digital_pass))
        .route("/admin/login", get(admin_login_form).post(admin_login))
        .route("/admin/dashboard", get(admin_dashboard))
        .route("/admin/applications", get(admin_applications))
        .route("/admin/process_pass/:id/:action", get(process_pass))
        .nest_service("/static/uploads", uploads)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config.production))
        .layer(create_cors_layer(&config.allowed_origins))
        .with_state(state)
}
