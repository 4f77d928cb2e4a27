//! Storage seam for the workflow engine.
//!
//! The engine talks to a `WorkflowStore` so its sequencing and authorization
//! logic can be exercised against an in-memory implementation in tests; the
//! production implementation lives on [`super::Database`].
//!
//! Contract for implementors: every state-changing operation is an atomic
//! conditional write keyed on the expected prior state, returning `None`
//! when the record was not in that state (lost-update protection).

use crate::error::BillingError;
use crate::models::{Contract, CreateTimesheet, Invoice, NewInvoice, Timesheet, User};
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// The single active contract linking a freelancer to a client within a
    /// company, if any.
    async fn find_active_contract(
        &self,
        company_id: Uuid,
        freelancer_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Contract>, BillingError>;

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, BillingError>;

    /// Whether a non-rejected timesheet already exists for the contract and
    /// period.
    async fn timesheet_exists(
        &self,
        contract_id: Uuid,
        month: i32,
        year: i32,
    ) -> Result<bool, BillingError>;

    /// Insert a new timesheet. A storage-level unique violation on
    /// (contract, month, year) must surface as `DuplicateTimesheet`.
    async fn insert_timesheet(&self, input: &CreateTimesheet) -> Result<Timesheet, BillingError>;

    async fn get_timesheet(&self, id: Uuid) -> Result<Option<Timesheet>, BillingError>;

    /// draft -> submitted; `None` if the timesheet was not draft.
    async fn mark_timesheet_submitted(&self, id: Uuid)
        -> Result<Option<Timesheet>, BillingError>;

    /// submitted -> rejected; `None` if the timesheet was not submitted.
    async fn reject_timesheet(
        &self,
        id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<Timesheet>, BillingError>;

    /// submitted -> approved plus the invoice insert, in one transaction.
    async fn approve_and_invoice(
        &self,
        timesheet_id: Uuid,
        admin_id: Uuid,
        invoice: &NewInvoice,
    ) -> Result<(Timesheet, Invoice), BillingError>;

    /// Invoices created (by `created_at`) during the given calendar month.
    async fn count_invoices_created_in(
        &self,
        year: i32,
        month: u32,
    ) -> Result<i64, BillingError>;

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, BillingError>;

    /// draft|pending -> sent; `None` if the invoice was in another state.
    async fn mark_invoice_sent(&self, id: Uuid) -> Result<Option<Invoice>, BillingError>;

    /// sent -> paid (sets `paid_at`); `None` if the invoice was not sent.
    async fn mark_invoice_paid(&self, id: Uuid) -> Result<Option<Invoice>, BillingError>;

    /// paid -> paid_freelancer; `None` if the invoice was not paid. The
    /// caller treats `None` as a silent no-op, not an error.
    async fn mark_invoice_paid_freelancer(
        &self,
        id: Uuid,
    ) -> Result<Option<Invoice>, BillingError>;

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, BillingError>;

    /// Admins of a company, the recipients of submission notifications.
    async fn list_admins(&self, company_id: Uuid) -> Result<Vec<User>, BillingError>;
}
