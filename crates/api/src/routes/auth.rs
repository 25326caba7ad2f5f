//! Registration, login, email verification and password reset.

use std::sync::Arc;

use axum::extract::{Path, State};
use domain::{LoginOutput, RegisterInput, UserView};
use serde::Deserialize;
use store::DocumentStore;

use crate::error::ApiError;
use crate::extract::ValidJson;
use crate::response::{Envelope, message};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// POST /auth/register
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn register<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(req): ValidJson<RegisterInput>,
) -> Result<Envelope<UserView>, ApiError> {
    let user = state.auth.register(req).await?;
    Ok(Envelope::created(user).message("User registered successfully"))
}

/// POST /auth/login
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn login<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<Envelope<LoginOutput>, ApiError> {
    let out = state.auth.login(&req.email, &req.password).await?;
    Ok(Envelope::new(out).message("Logged in successfully"))
}

/// POST /auth/send-verification-email
#[tracing::instrument(skip(state, req))]
pub async fn send_verification_email<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(req): ValidJson<EmailRequest>,
) -> Result<Envelope<Option<()>>, ApiError> {
    state.auth.send_verification_email(&req.email).await?;
    Ok(message("Verification email sent"))
}

/// GET /auth/verify-email/{token}
#[tracing::instrument(skip_all)]
pub async fn verify_email<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(token): Path<String>,
) -> Result<Envelope<Option<()>>, ApiError> {
    if state.auth.verify_email(&token).await {
        Ok(message("Email verified successfully"))
    } else {
        Err(ApiError::BadRequest("Invalid or expired token".to_string()))
    }
}

/// POST /auth/forget-password
#[tracing::instrument(skip(state, req))]
pub async fn forget_password<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    ValidJson(req): ValidJson<EmailRequest>,
) -> Result<Envelope<Option<()>>, ApiError> {
    state.auth.forget_password(&req.email).await?;
    Ok(message("Password reset link sent to your email"))
}

/// POST /auth/reset-password/{token}
#[tracing::instrument(skip_all)]
pub async fn reset_password<S: DocumentStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(token): Path<String>,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> Result<Envelope<Option<()>>, ApiError> {
    state.auth.reset_password(&token, &req.password).await?;
    Ok(message("Password has been reset"))
}
