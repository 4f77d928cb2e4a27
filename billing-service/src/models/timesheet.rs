//! Timesheet (CRA) model: one record per contract and month.

use crate::error::BillingError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Timesheet workflow status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimesheetStatus {
    Draft,
    Submitted,
    Approved,
    Rejected,
}

impl TimesheetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimesheetStatus::Draft => "draft",
            TimesheetStatus::Submitted => "submitted",
            TimesheetStatus::Approved => "approved",
            TimesheetStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Result<Self, BillingError> {
        match s {
            "draft" => Ok(TimesheetStatus::Draft),
            "submitted" => Ok(TimesheetStatus::Submitted),
            "approved" => Ok(TimesheetStatus::Approved),
            "rejected" => Ok(TimesheetStatus::Rejected),
            other => Err(BillingError::Configuration(format!(
                "Unknown timesheet status '{}'",
                other
            ))),
        }
    }
}

/// A monthly activity report. `worked_days` allows fractional half-days.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Timesheet {
    pub id: Uuid,
    pub company_id: Uuid,
    pub contract_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub worked_days: Decimal,
    pub status: String,
    pub submitted_at: Option<DateTime<Utc>>,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub admin_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Timesheet {
    pub fn status(&self) -> Result<TimesheetStatus, BillingError> {
        TimesheetStatus::parse(&self.status)
    }
}

/// Input for creating a timesheet (draft or directly submitted).
#[derive(Debug, Clone)]
pub struct CreateTimesheet {
    pub company_id: Uuid,
    pub contract_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub worked_days: Decimal,
    pub submitted: bool,
}
