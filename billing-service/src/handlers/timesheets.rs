use crate::models::{ActingUser, Invoice, Timesheet};
use crate::services::workflow::CreateTimesheetRequest;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTimesheetPayload {
    pub client_id: Uuid,
    #[validate(range(min = 1, max = 12, message = "month must be between 1 and 12"))]
    pub month: i32,
    #[validate(range(min = 2000, max = 2100, message = "year out of range"))]
    pub year: i32,
    pub worked_days: Decimal,
    /// Submit in the same call instead of leaving the timesheet as draft.
    #[serde(default)]
    pub submit: bool,
}

pub async fn create_timesheet(
    State(state): State<AppState>,
    actor: ActingUser,
    Json(payload): Json<CreateTimesheetPayload>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let timesheet = state
        .workflow
        .create_timesheet(
            &actor,
            CreateTimesheetRequest {
                client_id: payload.client_id,
                month: payload.month,
                year: payload.year,
                worked_days: payload.worked_days,
                submit: payload.submit,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(timesheet)))
}

pub async fn submit_timesheet(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(timesheet_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let timesheet = state.workflow.submit_timesheet(&actor, timesheet_id).await?;
    Ok(Json(timesheet))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Deserialize)]
pub struct ReviewPayload {
    pub timesheet_id: Uuid,
    pub status: ReviewDecision,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub timesheet: Timesheet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,
}

/// Admin review of a submitted timesheet. Approval creates the invoice and
/// returns it alongside the updated timesheet.
pub async fn review_timesheet(
    State(state): State<AppState>,
    actor: ActingUser,
    Json(payload): Json<ReviewPayload>,
) -> Result<impl IntoResponse, AppError> {
    let response = match payload.status {
        ReviewDecision::Approved => {
            let (timesheet, invoice) = state
                .workflow
                .approve_timesheet(&actor, payload.timesheet_id)
                .await?;
            ReviewResponse {
                timesheet,
                invoice: Some(invoice),
            }
        }
        ReviewDecision::Rejected => {
            let timesheet = state
                .workflow
                .reject_timesheet(&actor, payload.timesheet_id, payload.reason)
                .await?;
            ReviewResponse {
                timesheet,
                invoice: None,
            }
        }
    };

    Ok(Json(response))
}

pub async fn list_timesheets(
    State(state): State<AppState>,
    actor: ActingUser,
) -> Result<impl IntoResponse, AppError> {
    let timesheets = state.db.list_timesheets(actor.company_id).await?;
    Ok(Json(timesheets))
}
