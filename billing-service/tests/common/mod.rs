//! Shared test fixtures: an in-memory `WorkflowStore` and workflow builders.

use async_trait::async_trait;
use billing_service::error::BillingError;
use billing_service::models::{
    Contract, ContractStatus, CreateTimesheet, Invoice, NewInvoice, Role, Timesheet, User,
};
use billing_service::services::notifications::{
    ChannelPreferences, EmailSender, MockEmailSender, MockWhatsAppSender, NotificationDispatcher,
    WhatsAppSender,
};
use billing_service::services::{TimesheetWorkflow, WorkflowStore};
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// In-memory store mirroring the conditional-update semantics of the
/// Postgres implementation.
#[derive(Default)]
pub struct MemoryStore {
    pub contracts: Mutex<HashMap<Uuid, Contract>>,
    pub timesheets: Mutex<HashMap<Uuid, Timesheet>>,
    pub invoices: Mutex<HashMap<Uuid, Invoice>>,
    pub users: Mutex<HashMap<Uuid, User>>,
    /// When set, `count_invoices_created_in` fails, exercising the
    /// timestamp-based numbering fallback.
    pub fail_invoice_count: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contract(&self, contract: Contract) {
        self.contracts
            .lock()
            .unwrap()
            .insert(contract.id, contract);
    }

    pub fn add_user(&self, user: User) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn invoice_count(&self) -> usize {
        self.invoices.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn find_active_contract(
        &self,
        company_id: Uuid,
        freelancer_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Contract>, BillingError> {
        Ok(self
            .contracts
            .lock()
            .unwrap()
            .values()
            .find(|c| {
                c.company_id == company_id
                    && c.user_id == freelancer_id
                    && c.client_id == client_id
                    && c.status == ContractStatus::Active.as_str()
            })
            .cloned())
    }

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, BillingError> {
        Ok(self.contracts.lock().unwrap().get(&id).cloned())
    }

    async fn timesheet_exists(
        &self,
        contract_id: Uuid,
        month: i32,
        year: i32,
    ) -> Result<bool, BillingError> {
        Ok(self.timesheets.lock().unwrap().values().any(|t| {
            t.contract_id == contract_id
                && t.month == month
                && t.year == year
                && t.status != "rejected"
        }))
    }

    async fn insert_timesheet(&self, input: &CreateTimesheet) -> Result<Timesheet, BillingError> {
        let mut timesheets = self.timesheets.lock().unwrap();
        // Mirrors the partial unique index on (contract_id, month, year).
        if timesheets.values().any(|t| {
            t.contract_id == input.contract_id
                && t.month == input.month
                && t.year == input.year
                && t.status != "rejected"
        }) {
            return Err(BillingError::DuplicateTimesheet {
                month: input.month,
                year: input.year,
            });
        }

        let now = Utc::now();
        let timesheet = Timesheet {
            id: Uuid::new_v4(),
            company_id: input.company_id,
            contract_id: input.contract_id,
            month: input.month,
            year: input.year,
            worked_days: input.worked_days,
            status: if input.submitted {
                "submitted".to_string()
            } else {
                "draft".to_string()
            },
            submitted_at: input.submitted.then_some(now),
            validated_at: None,
            rejected_at: None,
            admin_id: None,
            created_at: now,
        };
        timesheets.insert(timesheet.id, timesheet.clone());
        Ok(timesheet)
    }

    async fn get_timesheet(&self, id: Uuid) -> Result<Option<Timesheet>, BillingError> {
        Ok(self.timesheets.lock().unwrap().get(&id).cloned())
    }

    async fn mark_timesheet_submitted(
        &self,
        id: Uuid,
    ) -> Result<Option<Timesheet>, BillingError> {
        let mut timesheets = self.timesheets.lock().unwrap();
        match timesheets.get_mut(&id) {
            Some(t) if t.status == "draft" => {
                t.status = "submitted".to_string();
                t.submitted_at = Some(Utc::now());
                Ok(Some(t.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn reject_timesheet(
        &self,
        id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<Timesheet>, BillingError> {
        let mut timesheets = self.timesheets.lock().unwrap();
        match timesheets.get_mut(&id) {
            Some(t) if t.status == "submitted" => {
                t.status = "rejected".to_string();
                t.rejected_at = Some(Utc::now());
                t.admin_id = Some(admin_id);
                Ok(Some(t.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn approve_and_invoice(
        &self,
        timesheet_id: Uuid,
        admin_id: Uuid,
        invoice: &NewInvoice,
    ) -> Result<(Timesheet, Invoice), BillingError> {
        let mut timesheets = self.timesheets.lock().unwrap();
        let timesheet = match timesheets.get_mut(&timesheet_id) {
            Some(t) if t.status == "submitted" => {
                t.status = "approved".to_string();
                t.validated_at = Some(Utc::now());
                t.admin_id = Some(admin_id);
                t.clone()
            }
            Some(t) => {
                return Err(BillingError::InvalidTransition {
                    action: "approve",
                    from: t.status.clone(),
                })
            }
            None => return Err(BillingError::NotFound("Timesheet")),
        };

        let created = Invoice {
            id: Uuid::new_v4(),
            company_id: invoice.company_id,
            timesheet_id: invoice.timesheet_id,
            contract_id: invoice.contract_id,
            number: invoice.number.clone(),
            amount: invoice.amount,
            commission_amount: invoice.commission_amount,
            facturation_net: invoice.facturation_net,
            facturation_ht: invoice.facturation_ht,
            facturation_ttc: invoice.facturation_ttc,
            vat_amount: invoice.vat_amount,
            currency: invoice.currency.clone(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            status: "draft".to_string(),
            paid_at: None,
            created_at: Utc::now(),
        };
        self.invoices
            .lock()
            .unwrap()
            .insert(created.id, created.clone());
        Ok((timesheet, created))
    }

    async fn count_invoices_created_in(
        &self,
        year: i32,
        month: u32,
    ) -> Result<i64, BillingError> {
        if self.fail_invoice_count.load(Ordering::SeqCst) {
            return Err(BillingError::DataLayer(anyhow::anyhow!(
                "count unavailable"
            )));
        }
        Ok(self
            .invoices
            .lock()
            .unwrap()
            .values()
            .filter(|i| {
                i.created_at.year() == year && i.created_at.month() == month
            })
            .count() as i64)
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, BillingError> {
        Ok(self.invoices.lock().unwrap().get(&id).cloned())
    }

    async fn mark_invoice_sent(&self, id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let mut invoices = self.invoices.lock().unwrap();
        match invoices.get_mut(&id) {
            Some(i) if i.status == "draft" || i.status == "pending" => {
                i.status = "sent".to_string();
                Ok(Some(i.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_invoice_paid(&self, id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let mut invoices = self.invoices.lock().unwrap();
        match invoices.get_mut(&id) {
            Some(i) if i.status == "sent" => {
                i.status = "paid".to_string();
                i.paid_at = Some(Utc::now());
                Ok(Some(i.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_invoice_paid_freelancer(
        &self,
        id: Uuid,
    ) -> Result<Option<Invoice>, BillingError> {
        let mut invoices = self.invoices.lock().unwrap();
        match invoices.get_mut(&id) {
            Some(i) if i.status == "paid" => {
                i.status = "paid_freelancer".to_string();
                Ok(Some(i.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, BillingError> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn list_admins(&self, company_id: Uuid) -> Result<Vec<User>, BillingError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.company_id == company_id && u.role == Role::Admin.as_str())
            .cloned()
            .collect())
    }
}

// -----------------------------------------------------------------------------
// Fixtures
// -----------------------------------------------------------------------------

pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub workflow: TimesheetWorkflow,
    pub email: Arc<MockEmailSender>,
    pub whatsapp: Arc<MockWhatsAppSender>,
}

pub fn harness() -> TestHarness {
    harness_with_senders(
        Arc::new(MockEmailSender::new()),
        Arc::new(MockWhatsAppSender::new()),
    )
}

pub fn harness_with_senders(
    email: Arc<MockEmailSender>,
    whatsapp: Arc<MockWhatsAppSender>,
) -> TestHarness {
    harness_with(
        email,
        whatsapp,
        ChannelPreferences {
            email_enabled: true,
            whatsapp_enabled: true,
        },
    )
}

pub fn harness_with(
    email: Arc<MockEmailSender>,
    whatsapp: Arc<MockWhatsAppSender>,
    preferences: ChannelPreferences,
) -> TestHarness {
    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(NotificationDispatcher::new(
        email.clone() as Arc<dyn EmailSender>,
        whatsapp.clone() as Arc<dyn WhatsAppSender>,
        Arc::new(preferences),
    ));
    let workflow = TimesheetWorkflow::new(store.clone(), notifier);
    TestHarness {
        store,
        workflow,
        email,
        whatsapp,
    }
}

pub fn test_user(company_id: Uuid, role: &str) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        company_id,
        email: format!("{}@example.com", id),
        phone: Some("+33612345678".to_string()),
        first_name: "Test".to_string(),
        last_name: role.to_string(),
        role: role.to_string(),
        created_at: Utc::now(),
    }
}

#[allow(clippy::too_many_arguments)]
pub fn test_contract(
    company_id: Uuid,
    client_id: Uuid,
    user_id: Uuid,
    tjm: Decimal,
    commission_rate: Decimal,
    payment_terms: i32,
    payment_terms_type: &str,
    vat_applicable: bool,
) -> Contract {
    Contract {
        id: Uuid::new_v4(),
        company_id,
        client_id,
        user_id,
        tjm,
        commission_rate,
        currency: "EUR".to_string(),
        status: "active".to_string(),
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: None,
        payment_terms,
        payment_terms_type: payment_terms_type.to_string(),
        vat_rate: Decimal::new(200, 1),
        vat_applicable,
        created_at: Utc::now(),
    }
}
