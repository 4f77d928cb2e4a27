//! Contract model: binds one freelancer to one client under one company.

use crate::error::BillingError;
use crate::services::payment_terms::{PaymentTerms, PaymentTermsType, VatConfig};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Contract status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Active,
    Expired,
    Renewed,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Active => "active",
            ContractStatus::Expired => "expired",
            ContractStatus::Renewed => "renewed",
        }
    }
}

/// A contract between a freelancer and a client.
///
/// `tjm` is the daily rate; `commission_rate` and `vat_rate` are percentages.
/// Downstream timesheets reference contracts, which are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Contract {
    pub id: Uuid,
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub tjm: Decimal,
    pub commission_rate: Decimal,
    pub currency: String,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub payment_terms: i32,
    pub payment_terms_type: String,
    pub vat_rate: Decimal,
    pub vat_applicable: bool,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    /// The contract's configured payment terms, used to compute invoice
    /// due dates. Fails with a configuration error on an unknown terms type.
    pub fn terms(&self) -> Result<PaymentTerms, BillingError> {
        if self.payment_terms < 0 {
            return Err(BillingError::Configuration(format!(
                "Negative payment terms ({}) on contract {}",
                self.payment_terms, self.id
            )));
        }
        Ok(PaymentTerms {
            days: self.payment_terms as u32,
            terms_type: PaymentTermsType::parse(&self.payment_terms_type)?,
        })
    }

    pub fn vat(&self) -> VatConfig {
        VatConfig {
            applicable: self.vat_applicable,
            rate: self.vat_rate,
        }
    }
}

/// Input for creating a contract.
#[derive(Debug, Clone)]
pub struct CreateContract {
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub user_id: Uuid,
    pub tjm: Decimal,
    pub commission_rate: Decimal,
    pub currency: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub payment_terms: i32,
    pub payment_terms_type: PaymentTermsType,
    pub vat_rate: Decimal,
    pub vat_applicable: bool,
}
