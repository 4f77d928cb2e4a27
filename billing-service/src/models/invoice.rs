//! Invoice model. Invoices are created exactly once, when a timesheet is
//! approved, and are one-to-one with their timesheet.

use crate::error::BillingError;
use crate::services::payment_terms;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status. `Overdue` is a derived read-time label, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Pending,
    Sent,
    Paid,
    PaidFreelancer,
    Overdue,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PaidFreelancer => "paid_freelancer",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn parse(s: &str) -> Result<Self, BillingError> {
        match s {
            "draft" => Ok(InvoiceStatus::Draft),
            "pending" => Ok(InvoiceStatus::Pending),
            "sent" => Ok(InvoiceStatus::Sent),
            "paid" => Ok(InvoiceStatus::Paid),
            "paid_freelancer" => Ok(InvoiceStatus::PaidFreelancer),
            "overdue" => Ok(InvoiceStatus::Overdue),
            other => Err(BillingError::Configuration(format!(
                "Unknown invoice status '{}'",
                other
            ))),
        }
    }
}

/// An invoice derived from an approved timesheet.
///
/// `amount` is the gross (HT) base; the `facturation_*` fields carry the
/// VAT-aware breakdown and the commission split.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub company_id: Uuid,
    pub timesheet_id: Uuid,
    pub contract_id: Uuid,
    pub number: String,
    pub amount: Decimal,
    pub commission_amount: Decimal,
    pub facturation_net: Decimal,
    pub facturation_ht: Decimal,
    pub facturation_ttc: Decimal,
    pub vat_amount: Decimal,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn status(&self) -> Result<InvoiceStatus, BillingError> {
        InvoiceStatus::parse(&self.status)
    }

    /// The status to display for `today`: a sent invoice past its due date
    /// reads as overdue. Recomputed on every read, never persisted.
    pub fn display_status(&self, today: NaiveDate) -> Result<InvoiceStatus, BillingError> {
        let status = self.status()?;
        if status == InvoiceStatus::Sent && payment_terms::is_overdue(self.due_date, today) {
            return Ok(InvoiceStatus::Overdue);
        }
        Ok(status)
    }

    pub fn days_overdue(&self, today: NaiveDate) -> i64 {
        payment_terms::days_overdue(self.due_date, today)
    }
}

/// Input for the invoice created at timesheet approval.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub company_id: Uuid,
    pub timesheet_id: Uuid,
    pub contract_id: Uuid,
    pub number: String,
    pub amount: Decimal,
    pub commission_amount: Decimal,
    pub facturation_net: Decimal,
    pub facturation_ht: Decimal,
    pub facturation_ttc: Decimal,
    pub vat_amount: Decimal,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
}
