use crate::models::{ActingUser, CreateContract};
use crate::services::payment_terms::PaymentTermsType;
use crate::startup::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContractPayload {
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub tjm: Decimal,
    pub commission_rate: Decimal,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3, message = "currency must be a 3-letter code"))]
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Payment delay in days; defaults to the French statutory 30.
    #[serde(default = "default_payment_terms")]
    #[validate(range(min = 0, max = 120, message = "payment terms must be 0-120 days"))]
    pub payment_terms: i32,
    #[serde(default)]
    pub payment_terms_type: Option<String>,
    #[serde(default = "default_vat_rate")]
    pub vat_rate: Decimal,
    #[serde(default = "default_vat_applicable")]
    pub vat_applicable: bool,
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_payment_terms() -> i32 {
    30
}

fn default_vat_rate() -> Decimal {
    Decimal::new(200, 1) // 20.0
}

fn default_vat_applicable() -> bool {
    true
}

pub async fn create_contract(
    State(state): State<AppState>,
    actor: ActingUser,
    Json(payload): Json<CreateContractPayload>,
) -> Result<impl IntoResponse, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only admins can create contracts"
        )));
    }
    payload.validate()?;

    if payload.tjm < Decimal::ZERO {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Daily rate cannot be negative"
        )));
    }
    if payload.commission_rate < Decimal::ZERO || payload.commission_rate > Decimal::ONE_HUNDRED {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Commission rate must be between 0 and 100"
        )));
    }

    let terms_type = match payload.payment_terms_type.as_deref() {
        Some(raw) => PaymentTermsType::parse(raw)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("{}", e)))?,
        None => PaymentTermsType::NetDays,
    };

    let contract = state
        .db
        .create_contract(&CreateContract {
            company_id: actor.company_id,
            client_id: payload.client_id,
            user_id: payload.user_id,
            tjm: payload.tjm,
            commission_rate: payload.commission_rate,
            currency: payload.currency,
            start_date: payload.start_date,
            end_date: payload.end_date,
            payment_terms: payload.payment_terms,
            payment_terms_type: terms_type,
            vat_rate: payload.vat_rate,
            vat_applicable: payload.vat_applicable,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn list_contracts(
    State(state): State<AppState>,
    actor: ActingUser,
) -> Result<impl IntoResponse, AppError> {
    let contracts = state.db.list_contracts(actor.company_id).await?;
    Ok(Json(contracts))
}
