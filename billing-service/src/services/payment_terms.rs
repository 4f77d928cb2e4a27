//! Payment terms and invoice amount calculator.
//!
//! Pure, side-effect-free computations: French due-date rules (net days /
//! end-of-month), VAT breakdown and commission splitting. All money math is
//! full-precision `Decimal`; display rounding is a presentation concern.

use crate::error::BillingError;
use chrono::{Datelike, Days, Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How a contract's payment delay is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentTermsType {
    /// Last day of the month following the issue month, plus the delay.
    EndOfMonth,
    /// Issue date plus the delay in calendar days.
    NetDays,
}

impl PaymentTermsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentTermsType::EndOfMonth => "end_of_month",
            PaymentTermsType::NetDays => "net_days",
        }
    }

    pub fn parse(s: &str) -> Result<Self, BillingError> {
        match s {
            "end_of_month" => Ok(PaymentTermsType::EndOfMonth),
            "net_days" => Ok(PaymentTermsType::NetDays),
            other => Err(BillingError::Configuration(format!(
                "Unknown payment terms type '{}'",
                other
            ))),
        }
    }
}

/// A payment delay: a number of days counted per `terms_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTerms {
    pub days: u32,
    pub terms_type: PaymentTermsType,
}

/// Named presets for the usual French payment terms. Data, not behavior.
pub const STANDARD_TERMS: [(&str, PaymentTerms); 4] = [
    (
        "30_end_month",
        PaymentTerms {
            days: 30,
            terms_type: PaymentTermsType::EndOfMonth,
        },
    ),
    (
        "45_end_month",
        PaymentTerms {
            days: 45,
            terms_type: PaymentTermsType::EndOfMonth,
        },
    ),
    (
        "60_end_month",
        PaymentTerms {
            days: 60,
            terms_type: PaymentTermsType::EndOfMonth,
        },
    ),
    (
        "30_net",
        PaymentTerms {
            days: 30,
            terms_type: PaymentTermsType::NetDays,
        },
    ),
];

/// Look up a standard terms preset by name.
pub fn standard_terms(name: &str) -> Option<PaymentTerms> {
    STANDARD_TERMS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, t)| *t)
}

/// VAT configuration carried by a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatConfig {
    pub applicable: bool,
    pub rate: Decimal,
}

/// Full-precision amount breakdown for one invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAmounts {
    pub amount_ht: Decimal,
    pub vat_amount: Decimal,
    pub amount_ttc: Decimal,
    pub commission: Decimal,
    pub net_amount: Decimal,
}

/// Amounts plus the computed due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullInvoice {
    pub amounts: InvoiceAmounts,
    pub due_date: NaiveDate,
}

/// Compute an invoice due date from its issue date and payment terms.
///
/// Calendar arithmetic is exact: month-end rollovers, leap years and year
/// boundaries follow the civil calendar, never a 30-day approximation.
pub fn calculate_due_date(
    issue_date: NaiveDate,
    terms: &PaymentTerms,
) -> Result<NaiveDate, BillingError> {
    let out_of_range =
        || BillingError::InvalidInput("Due date falls outside the supported calendar range".into());

    match terms.terms_type {
        PaymentTermsType::NetDays => issue_date
            .checked_add_days(Days::new(u64::from(terms.days)))
            .ok_or_else(out_of_range),
        PaymentTermsType::EndOfMonth => {
            let first_of_issue_month = issue_date
                .with_day(1)
                .ok_or_else(out_of_range)?;
            // First of month + 2 months - 1 day = last day of the following month.
            let end_of_next_month = first_of_issue_month
                .checked_add_months(Months::new(2))
                .and_then(|d| d.checked_sub_days(Days::new(1)))
                .ok_or_else(out_of_range)?;
            end_of_next_month
                .checked_add_days(Days::new(u64::from(terms.days)))
                .ok_or_else(out_of_range)
        }
    }
}

/// Compute the VAT breakdown and commission split for one invoice.
///
/// Commission is deliberately computed on the tax-inclusive (TTC) amount.
pub fn calculate_invoice_amounts(
    worked_days: Decimal,
    daily_rate: Decimal,
    vat: &VatConfig,
    commission_rate: Decimal,
) -> Result<InvoiceAmounts, BillingError> {
    if worked_days < Decimal::ZERO {
        return Err(BillingError::InvalidInput(
            "Worked days cannot be negative".into(),
        ));
    }
    if daily_rate < Decimal::ZERO {
        return Err(BillingError::InvalidInput(
            "Daily rate cannot be negative".into(),
        ));
    }
    if commission_rate < Decimal::ZERO || commission_rate > Decimal::ONE_HUNDRED {
        return Err(BillingError::InvalidInput(
            "Commission rate must be between 0 and 100".into(),
        ));
    }
    if vat.applicable && (vat.rate < Decimal::ZERO || vat.rate > Decimal::ONE_HUNDRED) {
        return Err(BillingError::InvalidInput(
            "VAT rate must be between 0 and 100".into(),
        ));
    }

    let amount_ht = worked_days * daily_rate;
    let (vat_amount, amount_ttc) = if vat.applicable {
        let vat_amount = amount_ht * vat.rate / Decimal::ONE_HUNDRED;
        (vat_amount, amount_ht + vat_amount)
    } else {
        (Decimal::ZERO, amount_ht)
    };

    let commission = amount_ttc * commission_rate / Decimal::ONE_HUNDRED;
    let net_amount = amount_ttc - commission;

    Ok(InvoiceAmounts {
        amount_ht,
        vat_amount,
        amount_ttc,
        commission,
        net_amount,
    })
}

/// Compose amounts and due date into one result. No additional logic.
pub fn calculate_full_invoice(
    issue_date: NaiveDate,
    worked_days: Decimal,
    daily_rate: Decimal,
    vat: &VatConfig,
    commission_rate: Decimal,
    terms: &PaymentTerms,
) -> Result<FullInvoice, BillingError> {
    Ok(FullInvoice {
        amounts: calculate_invoice_amounts(worked_days, daily_rate, vat, commission_rate)?,
        due_date: calculate_due_date(issue_date, terms)?,
    })
}

/// Whether a due date has passed as of `today`.
pub fn is_overdue(due_date: NaiveDate, today: NaiveDate) -> bool {
    today > due_date
}

/// Whole days past the due date as of `today`, never negative.
pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - due_date).num_days().max(0)
}
