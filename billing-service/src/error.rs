//! Domain error taxonomy for the billing workflow.

use crate::services::metrics::ERRORS_TOTAL;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No active contract links this freelancer to the selected client")]
    NoActiveContract,

    #[error("A timesheet for {month:02}/{year} already exists for this contract")]
    DuplicateTimesheet { month: i32, year: i32 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("Cannot {action} from the '{from}' state")]
    InvalidTransition { action: &'static str, from: String },

    #[error("Data layer error: {0}")]
    DataLayer(#[source] anyhow::Error),
}

impl BillingError {
    pub fn kind(&self) -> &'static str {
        match self {
            BillingError::Configuration(_) => "configuration",
            BillingError::InvalidInput(_) => "invalid_input",
            BillingError::NoActiveContract => "no_active_contract",
            BillingError::DuplicateTimesheet { .. } => "duplicate_timesheet",
            BillingError::NotFound(_) => "not_found",
            BillingError::Unauthorized(_) => "unauthorized",
            BillingError::InvalidTransition { .. } => "invalid_transition",
            BillingError::DataLayer(_) => "data_layer",
        }
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::DataLayer(anyhow::Error::new(err))
    }
}

impl From<BillingError> for AppError {
    fn from(err: BillingError) -> Self {
        ERRORS_TOTAL.with_label_values(&[err.kind()]).inc();

        let message = err.to_string();
        match err {
            BillingError::Configuration(_) => AppError::ConfigError(anyhow::anyhow!(message)),
            BillingError::InvalidInput(_) | BillingError::NoActiveContract => {
                AppError::BadRequest(anyhow::anyhow!(message))
            }
            BillingError::DuplicateTimesheet { .. } | BillingError::InvalidTransition { .. } => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            BillingError::NotFound(_) => AppError::NotFound(anyhow::anyhow!(message)),
            BillingError::Unauthorized(_) => AppError::Forbidden(anyhow::anyhow!(message)),
            BillingError::DataLayer(source) => AppError::DatabaseError(source),
        }
    }
}
