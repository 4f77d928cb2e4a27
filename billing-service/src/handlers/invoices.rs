use crate::models::{ActingUser, Invoice};
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

/// Read view of an invoice: `status` is the display status, so a sent
/// invoice past its due date reads as `overdue` without a stored transition.
#[derive(Debug, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub display_status: String,
    pub days_overdue: i64,
}

impl InvoiceView {
    fn build(invoice: Invoice) -> Result<Self, AppError> {
        let today = Utc::now().date_naive();
        let display_status = invoice.display_status(today)?.as_str().to_string();
        let days_overdue = invoice.days_overdue(today);
        Ok(Self {
            invoice,
            display_status,
            days_overdue,
        })
    }
}

pub async fn send_invoice(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state.workflow.send_invoice(&actor, invoice_id).await?;
    Ok(Json(InvoiceView::build(invoice)?))
}

pub async fn record_client_payment(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state
        .workflow
        .record_client_payment(&actor, invoice_id)
        .await?;
    Ok(Json(InvoiceView::build(invoice)?))
}

pub async fn record_freelancer_payout(
    State(state): State<AppState>,
    actor: ActingUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state
        .workflow
        .record_freelancer_payout(&actor, invoice_id)
        .await?;
    Ok(Json(InvoiceView::build(invoice)?))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    actor: ActingUser,
) -> Result<impl IntoResponse, AppError> {
    let invoices = state.db.list_invoices(actor.company_id).await?;
    let views = invoices
        .into_iter()
        .map(InvoiceView::build)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(views))
}
