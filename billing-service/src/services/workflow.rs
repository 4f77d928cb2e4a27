//! Timesheet workflow engine.
//!
//! Enforces the legal transitions of a timesheet (draft -> submitted ->
//! approved/rejected) and of its derived invoice (draft -> sent -> paid ->
//! paid_freelancer), generates the invoice at approval, and fires
//! best-effort notifications after each committed transition.

use crate::error::BillingError;
use crate::models::{
    ActingUser, Contract, CreateTimesheet, Invoice, NewInvoice, Role, Timesheet, TimesheetStatus,
    User,
};
use crate::models::InvoiceStatus;
use crate::services::metrics::{INVOICES_TOTAL, INVOICE_AMOUNT_TOTAL, TIMESHEETS_TOTAL};
use crate::services::notifications::NotificationDispatcher;
use crate::services::payment_terms;
use crate::services::store::WorkflowStore;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Request to create a timesheet, optionally submitting it directly.
#[derive(Debug, Clone)]
pub struct CreateTimesheetRequest {
    pub client_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub worked_days: Decimal,
    pub submit: bool,
}

pub struct TimesheetWorkflow {
    store: Arc<dyn WorkflowStore>,
    notifier: Arc<NotificationDispatcher>,
}

impl TimesheetWorkflow {
    pub fn new(store: Arc<dyn WorkflowStore>, notifier: Arc<NotificationDispatcher>) -> Self {
        Self { store, notifier }
    }

    /// Create a timesheet as draft, or submit it in the same operation.
    #[instrument(skip(self, actor, request), fields(user_id = %actor.user_id))]
    pub async fn create_timesheet(
        &self,
        actor: &ActingUser,
        request: CreateTimesheetRequest,
    ) -> Result<Timesheet, BillingError> {
        if actor.role != Role::Freelancer {
            return Err(BillingError::Unauthorized(
                "Only freelancers can file timesheets".into(),
            ));
        }
        if !(1..=12).contains(&request.month) {
            return Err(BillingError::InvalidInput(format!(
                "Month must be between 1 and 12, got {}",
                request.month
            )));
        }
        if request.worked_days < Decimal::ZERO {
            return Err(BillingError::InvalidInput(
                "Worked days cannot be negative".into(),
            ));
        }

        let contract = self
            .store
            .find_active_contract(actor.company_id, actor.user_id, request.client_id)
            .await?
            .ok_or(BillingError::NoActiveContract)?;

        // Pre-check for a friendly error; the storage unique index closes the
        // race window and maps to the same error.
        if self
            .store
            .timesheet_exists(contract.id, request.month, request.year)
            .await?
        {
            return Err(BillingError::DuplicateTimesheet {
                month: request.month,
                year: request.year,
            });
        }

        let timesheet = self
            .store
            .insert_timesheet(&CreateTimesheet {
                company_id: actor.company_id,
                contract_id: contract.id,
                month: request.month,
                year: request.year,
                worked_days: request.worked_days,
                submitted: request.submit,
            })
            .await?;

        TIMESHEETS_TOTAL
            .with_label_values(&[timesheet.status.as_str()])
            .inc();

        info!(timesheet_id = %timesheet.id, status = %timesheet.status, "Timesheet created");

        if request.submit {
            self.notify_admins_of_submission(actor, &timesheet).await;
        }

        Ok(timesheet)
    }

    /// draft -> submitted, by the owning freelancer.
    #[instrument(skip(self, actor), fields(user_id = %actor.user_id))]
    pub async fn submit_timesheet(
        &self,
        actor: &ActingUser,
        timesheet_id: Uuid,
    ) -> Result<Timesheet, BillingError> {
        let timesheet = self.load_timesheet(actor, timesheet_id).await?;
        let contract = self.load_contract(timesheet.contract_id).await?;

        if contract.user_id != actor.user_id {
            return Err(BillingError::Unauthorized(
                "Only the owning freelancer can submit this timesheet".into(),
            ));
        }
        self.expect_status(&timesheet, TimesheetStatus::Draft, "submit")?;

        let timesheet = self
            .store
            .mark_timesheet_submitted(timesheet_id)
            .await?
            .ok_or_else(|| concurrent_transition("submit"))?;

        TIMESHEETS_TOTAL.with_label_values(&["submitted"]).inc();

        info!(timesheet_id = %timesheet.id, "Timesheet submitted");

        self.notify_admins_of_submission(actor, &timesheet).await;

        Ok(timesheet)
    }

    /// submitted -> approved, admin only. Creates the invoice in the same
    /// storage transaction and notifies the freelancer afterwards.
    #[instrument(skip(self, actor), fields(admin_id = %actor.user_id))]
    pub async fn approve_timesheet(
        &self,
        actor: &ActingUser,
        timesheet_id: Uuid,
    ) -> Result<(Timesheet, Invoice), BillingError> {
        self.require_admin(actor, "approve timesheets")?;
        let timesheet = self.load_timesheet(actor, timesheet_id).await?;
        self.expect_status(&timesheet, TimesheetStatus::Submitted, "approve")?;

        let contract = self.load_contract(timesheet.contract_id).await?;

        let issue_date = Utc::now().date_naive();
        let full = payment_terms::calculate_full_invoice(
            issue_date,
            timesheet.worked_days,
            contract.tjm,
            &contract.vat(),
            contract.commission_rate,
            &contract.terms()?,
        )?;

        let number = self.next_invoice_number(issue_date).await;

        let (timesheet, invoice) = self
            .store
            .approve_and_invoice(
                timesheet_id,
                actor.user_id,
                &NewInvoice {
                    company_id: contract.company_id,
                    timesheet_id,
                    contract_id: contract.id,
                    number,
                    amount: full.amounts.amount_ht,
                    commission_amount: full.amounts.commission,
                    facturation_net: full.amounts.net_amount,
                    facturation_ht: full.amounts.amount_ht,
                    facturation_ttc: full.amounts.amount_ttc,
                    vat_amount: full.amounts.vat_amount,
                    currency: contract.currency.clone(),
                    issue_date,
                    due_date: full.due_date,
                },
            )
            .await?;

        TIMESHEETS_TOTAL.with_label_values(&["approved"]).inc();
        INVOICES_TOTAL.with_label_values(&["draft"]).inc();
        INVOICE_AMOUNT_TOTAL
            .with_label_values(&[invoice.currency.as_str()])
            .inc_by(invoice.amount.to_f64().unwrap_or(0.0));

        info!(
            timesheet_id = %timesheet.id,
            invoice_number = %invoice.number,
            "Timesheet approved, invoice created"
        );

        if let Some(freelancer) = self.lookup_user(contract.user_id).await {
            self.notifier
                .timesheet_approved(&freelancer, &timesheet, &invoice)
                .await;
        }

        Ok((timesheet, invoice))
    }

    /// submitted -> rejected, admin only.
    #[instrument(skip(self, actor, reason), fields(admin_id = %actor.user_id))]
    pub async fn reject_timesheet(
        &self,
        actor: &ActingUser,
        timesheet_id: Uuid,
        reason: Option<String>,
    ) -> Result<Timesheet, BillingError> {
        self.require_admin(actor, "reject timesheets")?;
        let timesheet = self.load_timesheet(actor, timesheet_id).await?;
        self.expect_status(&timesheet, TimesheetStatus::Submitted, "reject")?;

        let contract = self.load_contract(timesheet.contract_id).await?;

        let timesheet = self
            .store
            .reject_timesheet(timesheet_id, actor.user_id)
            .await?
            .ok_or_else(|| concurrent_transition("reject"))?;

        TIMESHEETS_TOTAL.with_label_values(&["rejected"]).inc();

        info!(timesheet_id = %timesheet.id, "Timesheet rejected");

        if let Some(freelancer) = self.lookup_user(contract.user_id).await {
            self.notifier
                .timesheet_rejected(&freelancer, &timesheet, reason.as_deref())
                .await;
        }

        Ok(timesheet)
    }

    /// Invoice draft|pending -> sent, admin only.
    #[instrument(skip(self, actor), fields(admin_id = %actor.user_id))]
    pub async fn send_invoice(
        &self,
        actor: &ActingUser,
        invoice_id: Uuid,
    ) -> Result<Invoice, BillingError> {
        self.require_admin(actor, "send invoices")?;
        let invoice = self.load_invoice(actor, invoice_id).await?;
        match invoice.status()? {
            InvoiceStatus::Draft | InvoiceStatus::Pending => {}
            other => {
                return Err(BillingError::InvalidTransition {
                    action: "send",
                    from: other.as_str().to_string(),
                })
            }
        }

        let invoice = self
            .store
            .mark_invoice_sent(invoice_id)
            .await?
            .ok_or_else(|| concurrent_transition("send"))?;

        INVOICES_TOTAL.with_label_values(&["sent"]).inc();

        info!(invoice_number = %invoice.number, "Invoice sent");

        self.notify_invoice_event(&invoice, InvoiceEvent::Sent).await;

        Ok(invoice)
    }

    /// Invoice sent -> paid, admin only.
    #[instrument(skip(self, actor), fields(admin_id = %actor.user_id))]
    pub async fn record_client_payment(
        &self,
        actor: &ActingUser,
        invoice_id: Uuid,
    ) -> Result<Invoice, BillingError> {
        self.require_admin(actor, "record payments")?;
        let invoice = self.load_invoice(actor, invoice_id).await?;
        self.expect_invoice_status(&invoice, InvoiceStatus::Sent, "record payment for")?;

        let invoice = self
            .store
            .mark_invoice_paid(invoice_id)
            .await?
            .ok_or_else(|| concurrent_transition("record payment for"))?;

        INVOICES_TOTAL.with_label_values(&["paid"]).inc();

        info!(invoice_number = %invoice.number, "Client payment recorded");

        self.notify_invoice_event(&invoice, InvoiceEvent::Paid).await;

        Ok(invoice)
    }

    /// Invoice paid -> paid_freelancer, admin only.
    ///
    /// The update only applies `WHERE status = 'paid'`: calling this on an
    /// invoice in any other state is a silent no-op that returns the invoice
    /// unchanged, protecting against double payouts.
    #[instrument(skip(self, actor), fields(admin_id = %actor.user_id))]
    pub async fn record_freelancer_payout(
        &self,
        actor: &ActingUser,
        invoice_id: Uuid,
    ) -> Result<Invoice, BillingError> {
        self.require_admin(actor, "record payouts")?;
        let invoice = self.load_invoice(actor, invoice_id).await?;

        match self.store.mark_invoice_paid_freelancer(invoice_id).await? {
            Some(updated) => {
                INVOICES_TOTAL.with_label_values(&["paid_freelancer"]).inc();
                info!(invoice_number = %updated.number, "Freelancer payout recorded");
                self.notify_invoice_event(&updated, InvoiceEvent::PaidFreelancer)
                    .await;
                Ok(updated)
            }
            None => {
                info!(
                    invoice_number = %invoice.number,
                    status = %invoice.status,
                    "Payout skipped: invoice is not in 'paid' state"
                );
                Ok(invoice)
            }
        }
    }

    // -------------------------------------------------------------------------
    // Invoice numbering
    // -------------------------------------------------------------------------

    /// Next sequential number for the current calendar month; falls back to
    /// an epoch-millis suffix when the count cannot be read, so invoicing is
    /// never blocked on the counter.
    async fn next_invoice_number(&self, issue_date: NaiveDate) -> String {
        match self
            .store
            .count_invoices_created_in(issue_date.year(), issue_date.month())
            .await
        {
            Ok(count) => invoice_number(issue_date, count),
            Err(e) => {
                warn!(error = %e, "Invoice count failed, using timestamp-based number");
                fallback_invoice_number(issue_date, Utc::now())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Shared guards and lookups
    // -------------------------------------------------------------------------

    fn require_admin(&self, actor: &ActingUser, action: &str) -> Result<(), BillingError> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(BillingError::Unauthorized(format!(
                "Only admins can {}",
                action
            )))
        }
    }

    fn expect_status(
        &self,
        timesheet: &Timesheet,
        expected: TimesheetStatus,
        action: &'static str,
    ) -> Result<(), BillingError> {
        let status = timesheet.status()?;
        if status == expected {
            Ok(())
        } else {
            Err(BillingError::InvalidTransition {
                action,
                from: status.as_str().to_string(),
            })
        }
    }

    fn expect_invoice_status(
        &self,
        invoice: &Invoice,
        expected: InvoiceStatus,
        action: &'static str,
    ) -> Result<(), BillingError> {
        let status = invoice.status()?;
        if status == expected {
            Ok(())
        } else {
            Err(BillingError::InvalidTransition {
                action,
                from: status.as_str().to_string(),
            })
        }
    }

    /// Fetch a timesheet scoped to the actor's company.
    async fn load_timesheet(
        &self,
        actor: &ActingUser,
        id: Uuid,
    ) -> Result<Timesheet, BillingError> {
        let timesheet = self
            .store
            .get_timesheet(id)
            .await?
            .ok_or(BillingError::NotFound("Timesheet"))?;
        if timesheet.company_id != actor.company_id {
            return Err(BillingError::NotFound("Timesheet"));
        }
        Ok(timesheet)
    }

    /// Fetch an invoice scoped to the actor's company.
    async fn load_invoice(&self, actor: &ActingUser, id: Uuid) -> Result<Invoice, BillingError> {
        let invoice = self
            .store
            .get_invoice(id)
            .await?
            .ok_or(BillingError::NotFound("Invoice"))?;
        if invoice.company_id != actor.company_id {
            return Err(BillingError::NotFound("Invoice"));
        }
        Ok(invoice)
    }

    async fn load_contract(&self, id: Uuid) -> Result<Contract, BillingError> {
        self.store
            .get_contract(id)
            .await?
            .ok_or(BillingError::NotFound("Contract"))
    }

    /// Best-effort user lookup for notification recipients.
    async fn lookup_user(&self, id: Uuid) -> Option<User> {
        match self.store.get_user(id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id = %id, error = %e, "Recipient lookup failed, skipping notification");
                None
            }
        }
    }

    async fn notify_admins_of_submission(&self, actor: &ActingUser, timesheet: &Timesheet) {
        let Some(freelancer) = self.lookup_user(actor.user_id).await else {
            return;
        };
        match self.store.list_admins(actor.company_id).await {
            Ok(admins) => {
                self.notifier
                    .timesheet_submitted(&admins, &freelancer, timesheet)
                    .await;
            }
            Err(e) => {
                warn!(error = %e, "Admin lookup failed, skipping submission notification");
            }
        }
    }

    async fn notify_invoice_event(&self, invoice: &Invoice, event: InvoiceEvent) {
        let Ok(Some(contract)) = self.store.get_contract(invoice.contract_id).await else {
            warn!(invoice_number = %invoice.number, "Contract lookup failed, skipping notification");
            return;
        };
        let Some(freelancer) = self.lookup_user(contract.user_id).await else {
            return;
        };
        match event {
            InvoiceEvent::Sent => self.notifier.invoice_sent(&freelancer, invoice).await,
            InvoiceEvent::Paid => self.notifier.payment_received(&freelancer, invoice).await,
            InvoiceEvent::PaidFreelancer => {
                self.notifier.freelancer_paid(&freelancer, invoice).await
            }
        }
    }
}

enum InvoiceEvent {
    Sent,
    Paid,
    PaidFreelancer,
}

fn concurrent_transition(action: &'static str) -> BillingError {
    BillingError::InvalidTransition {
        action,
        from: "concurrently modified".to_string(),
    }
}

/// `INV-{YYYY}{MM}-{NNN}`: sequential within the calendar month of creation.
fn invoice_number(issue_date: NaiveDate, existing_this_month: i64) -> String {
    format!(
        "INV-{:04}{:02}-{:03}",
        issue_date.year(),
        issue_date.month(),
        existing_this_month + 1
    )
}

/// Uniqueness fallback when the monthly count is unavailable.
fn fallback_invoice_number(issue_date: NaiveDate, now: DateTime<Utc>) -> String {
    format!(
        "INV-{:04}{:02}-{}",
        issue_date.year(),
        issue_date.month(),
        now.timestamp_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_numbers_are_sequential_and_padded() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let numbers: Vec<String> = (0..12).map(|n| invoice_number(date, n)).collect();

        assert_eq!(numbers[0], "INV-202403-001");
        assert_eq!(numbers[9], "INV-202403-010");
        assert_eq!(numbers[11], "INV-202403-012");

        let mut distinct = numbers.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), numbers.len());
    }

    #[test]
    fn fallback_number_carries_epoch_millis() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let now = DateTime::from_timestamp(1_735_800_000, 0).unwrap();
        assert_eq!(
            fallback_invoice_number(date, now),
            format!("INV-202501-{}", now.timestamp_millis())
        );
    }
}
