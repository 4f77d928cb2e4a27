use crate::models::{ActingUser, CreateClient};
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientPayload {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(email(message = "invalid email address"))]
    pub email: Option<String>,
}

pub async fn create_client(
    State(state): State<AppState>,
    actor: ActingUser,
    Json(payload): Json<CreateClientPayload>,
) -> Result<impl IntoResponse, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only admins can create clients"
        )));
    }
    payload.validate()?;

    let client = state
        .db
        .create_client(&CreateClient {
            company_id: actor.company_id,
            name: payload.name,
            email: payload.email,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn list_clients(
    State(state): State<AppState>,
    actor: ActingUser,
) -> Result<impl IntoResponse, AppError> {
    let clients = state.db.list_clients(actor.company_id).await?;
    Ok(Json(clients))
}
