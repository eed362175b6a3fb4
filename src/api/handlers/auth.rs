use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::state::AppState;
use crate::auth::jwt::{issue_token, TOKEN_TTL_HOURS};
use crate::auth::password::{hash_password, validate_password, verify_password};
use crate::domain::operator::Email;
use crate::domain::repositories::Operator;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    /// Only read on registration; defaults to the email
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub operator_id: Uuid,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub operator_id: Uuid,
    pub expires_in: i64,
}

fn parse_email(raw: &str) -> Result<Email, ApiError> {
    Email::new(raw).map_err(ApiError::bad_request)
}

/// Unknown email and wrong password both come back as the same 401
async fn authenticate(state: &AppState, email: &Email, password: &str) -> Result<Operator, ApiError> {
    let operator = state
        .operators
        .find_by_email(email)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !operator.is_active {
        return Err(ApiError::unauthorized("Account is disabled"));
    }

    let matches = verify_password(password, &operator.password_hash)
        .map_err(|e| ApiError::internal_server_error(format!("Stored hash is unusable: {}", e)))?;
    if !matches {
        warn!(%email, "Failed login attempt");
        return Err(ApiError::unauthorized("Invalid credentials"));
    }
    Ok(operator)
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let email = parse_email(&req.email)?;
    validate_password(&req.password).map_err(ApiError::bad_request)?;

    let display_name = req
        .display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| email.to_string());
    let operator = Operator {
        id: Uuid::new_v4(),
        password_hash: hash_password(&req.password).map_err(ApiError::internal_server_error)?,
        email,
        display_name,
        is_active: true,
    };

    let operator_id = state.operators.create(operator).await.map_err(|e| {
        if e.contains("duplicate") || e.contains("unique") {
            ApiError::conflict("Email already registered")
        } else {
            ApiError::internal_server_error(e)
        }
    })?;

    info!(%operator_id, "Operator registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            operator_id,
            message: "Operator registered".to_string(),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = parse_email(&req.email)?;
    let operator = authenticate(&state, &email, &req.password).await?;

    if let Err(e) = state.operators.update_last_login(operator.id).await {
        warn!(operator_id = %operator.id, error = %e, "Could not record login");
    }

    let token = issue_token(operator.id, email.as_str(), state.jwt_secret())
        .map_err(ApiError::internal_server_error)?;

    Ok(Json(LoginResponse {
        token,
        operator_id: operator.id,
        expires_in: TOKEN_TTL_HOURS * 3600,
    }))
}
