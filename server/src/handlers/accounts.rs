use axum::extract::{Multipart, State};
use axum::response::Response;
use axum::Form;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::auth::{SessionManager, SessionRole};
use crate::media::PHOTO_EXTENSIONS;
use crate::services::{PhotoUpload, Registration};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created_then, empty_success_then, success, success_then};

#[derive(Serialize)]
struct FormDescription {
    fields: &'static [&'static str],
    required: &'static [&'static str],
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_extensions: Option<&'static [&'static str]>,
}

pub async fn register_form() -> Response {
    let photo_extensions: &'static [&'static str] = &PHOTO_EXTENSIONS;
    success(
        FormDescription {
            fields: &["name", "email", "password", "address", "phone_number", "photo"],
            required: &["name", "email", "password", "phone_number"],
            photo_extensions: Some(photo_extensions),
        },
        "Create an account",
    )
}

#[derive(Serialize)]
struct Registered {
    user_id: i64,
}

pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, AppError> {
    let mut registration = Registration::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::ValidationError(format!("Malformed form data: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "photo" {
            let file_name = field.file_name().unwrap_or_default().to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::ValidationError(format!("Failed to read photo: {}", e)))?;
            if !file_name.is_empty() && !bytes.is_empty() {
                registration.photo = Some(PhotoUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::ValidationError(format!("Malformed field '{}': {}", name, e)))?;
        match name.as_str() {
            "name" => registration.name = value,
            "email" => registration.email = value,
            "password" => registration.password = value,
            "address" => registration.address = Some(value),
            "phone_number" => registration.phone_number = value,
            _ => {}
        }
    }

    let user_id = state.accounts.register(registration).await?;
    Ok(created_then(
        Registered { user_id },
        "Registration successful! Please log in.",
        "/login",
    ))
}

pub async fn login_form() -> Response {
    success(
        FormDescription {
            fields: &["email", "password"],
            required: &["email", "password"],
            photo_extensions: None,
        },
        "Log in to apply for a pass",
    )
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize)]
struct LoggedIn {
    user_id: i64,
    name: String,
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(request): Form<LoginRequest>,
) -> Result<(CookieJar, Response), AppError> {
    let user = state
        .accounts
        .authenticate(&request.email, &request.password)
        .await?;

    let token = state.sessions.issue(SessionRole::User, user.id, &user.email)?;
    let jar = jar.add(state.sessions.cookie(SessionRole::User, token));

    Ok((
        jar,
        success_then(
            LoggedIn {
                user_id: user.id,
                name: user.name,
            },
            "Login successful!",
            "/apply_pass",
        ),
    ))
}

/// Ends both the citizen and the admin session.
pub async fn logout(jar: CookieJar) -> (CookieJar, Response) {
    let jar = jar
        .remove(SessionManager::removal_cookie(SessionRole::User))
        .remove(SessionManager::removal_cookie(SessionRole::Admin));
    (jar, empty_success_then("You have been logged out.", "/"))
}
