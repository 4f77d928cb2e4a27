//! Postgres data layer for billing-service.

use crate::error::BillingError;
use crate::models::{
    Client, Contract, ContractStatus, CreateClient, CreateContract, CreateTimesheet, Invoice,
    NewInvoice, Role, Timesheet, User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::WorkflowStore;
use async_trait::async_trait;
use chrono::{DateTime, Months, NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const CONTRACT_COLUMNS: &str = "id, company_id, client_id, user_id, tjm, commission_rate, \
     currency, status, start_date, end_date, payment_terms, payment_terms_type, vat_rate, \
     vat_applicable, created_at";

const TIMESHEET_COLUMNS: &str = "id, company_id, contract_id, month, year, worked_days, status, \
     submitted_at, validated_at, rejected_at, admin_id, created_at";

const INVOICE_COLUMNS: &str = "id, company_id, timesheet_id, contract_id, number, amount, \
     commission_amount, facturation_net, facturation_ht, facturation_ttc, vat_amount, currency, \
     issue_date, due_date, status, paid_at, created_at";

const USER_COLUMNS: &str = "id, company_id, email, phone, first_name, last_name, role, created_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Client operations
    // -------------------------------------------------------------------------

    /// Create a new client.
    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    pub async fn create_client(&self, input: &CreateClient) -> Result<Client, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(
            "INSERT INTO clients (id, company_id, name, email) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, company_id, name, email, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(&input.name)
        .bind(&input.email)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();

        info!(client_id = %client.id, name = %client.name, "Client created");

        Ok(client)
    }

    /// List clients for a company.
    #[instrument(skip(self))]
    pub async fn list_clients(&self, company_id: Uuid) -> Result<Vec<Client>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(
            "SELECT id, company_id, name, email, created_at \
             FROM clients WHERE company_id = $1 ORDER BY name",
        )
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(clients)
    }

    // -------------------------------------------------------------------------
    // Contract operations
    // -------------------------------------------------------------------------

    /// Create a new contract.
    #[instrument(skip(self, input), fields(company_id = %input.company_id, user_id = %input.user_id))]
    pub async fn create_contract(&self, input: &CreateContract) -> Result<Contract, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_contract"])
            .start_timer();

        let contract = sqlx::query_as::<_, Contract>(&format!(
            "INSERT INTO contracts (id, company_id, client_id, user_id, tjm, commission_rate, \
                 currency, status, start_date, end_date, payment_terms, payment_terms_type, \
                 vat_rate, vat_applicable) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             RETURNING {CONTRACT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(input.client_id)
        .bind(input.user_id)
        .bind(input.tjm)
        .bind(input.commission_rate)
        .bind(&input.currency)
        .bind(ContractStatus::Active.as_str())
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.payment_terms)
        .bind(input.payment_terms_type.as_str())
        .bind(input.vat_rate)
        .bind(input.vat_applicable)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();

        info!(contract_id = %contract.id, "Contract created");

        Ok(contract)
    }

    /// List contracts for a company.
    #[instrument(skip(self))]
    pub async fn list_contracts(&self, company_id: Uuid) -> Result<Vec<Contract>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_contracts"])
            .start_timer();

        let contracts = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts \
             WHERE company_id = $1 ORDER BY created_at DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(contracts)
    }

    // -------------------------------------------------------------------------
    // Listing operations for dashboards
    // -------------------------------------------------------------------------

    /// List timesheets for a company, newest period first.
    #[instrument(skip(self))]
    pub async fn list_timesheets(&self, company_id: Uuid) -> Result<Vec<Timesheet>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_timesheets"])
            .start_timer();

        let timesheets = sqlx::query_as::<_, Timesheet>(&format!(
            "SELECT {TIMESHEET_COLUMNS} FROM timesheets \
             WHERE company_id = $1 ORDER BY year DESC, month DESC, created_at DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(timesheets)
    }

    /// List invoices for a company, newest first.
    #[instrument(skip(self))]
    pub async fn list_invoices(&self, company_id: Uuid) -> Result<Vec<Invoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices \
             WHERE company_id = $1 ORDER BY created_at DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(invoices)
    }
}

#[async_trait]
impl WorkflowStore for Database {
    #[instrument(skip(self))]
    async fn find_active_contract(
        &self,
        company_id: Uuid,
        freelancer_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Contract>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_active_contract"])
            .start_timer();

        let contract = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts \
             WHERE company_id = $1 AND user_id = $2 AND client_id = $3 AND status = $4 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(company_id)
        .bind(freelancer_id)
        .bind(client_id)
        .bind(ContractStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(contract)
    }

    #[instrument(skip(self))]
    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_contract"])
            .start_timer();

        let contract = sqlx::query_as::<_, Contract>(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(contract)
    }

    #[instrument(skip(self))]
    async fn timesheet_exists(
        &self,
        contract_id: Uuid,
        month: i32,
        year: i32,
    ) -> Result<bool, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["timesheet_exists"])
            .start_timer();

        // Rejected timesheets do not block refiling the same period.
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS( \
                 SELECT 1 FROM timesheets \
                 WHERE contract_id = $1 AND month = $2 AND year = $3 AND status <> 'rejected')",
        )
        .bind(contract_id)
        .bind(month)
        .bind(year)
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(exists)
    }

    #[instrument(skip(self, input), fields(contract_id = %input.contract_id))]
    async fn insert_timesheet(&self, input: &CreateTimesheet) -> Result<Timesheet, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_timesheet"])
            .start_timer();

        let status = if input.submitted { "submitted" } else { "draft" };
        let submitted_at: Option<DateTime<Utc>> = input.submitted.then(Utc::now);

        let timesheet = sqlx::query_as::<_, Timesheet>(&format!(
            "INSERT INTO timesheets (id, company_id, contract_id, month, year, worked_days, \
                 status, submitted_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {TIMESHEET_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(input.contract_id)
        .bind(input.month)
        .bind(input.year)
        .bind(input.worked_days)
        .bind(status)
        .bind(submitted_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                BillingError::DuplicateTimesheet {
                    month: input.month,
                    year: input.year,
                }
            }
            _ => BillingError::from(e),
        })?;

        timer.observe_duration();

        info!(timesheet_id = %timesheet.id, status = %timesheet.status, "Timesheet created");

        Ok(timesheet)
    }

    #[instrument(skip(self))]
    async fn get_timesheet(&self, id: Uuid) -> Result<Option<Timesheet>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_timesheet"])
            .start_timer();

        let timesheet = sqlx::query_as::<_, Timesheet>(&format!(
            "SELECT {TIMESHEET_COLUMNS} FROM timesheets WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(timesheet)
    }

    #[instrument(skip(self))]
    async fn mark_timesheet_submitted(
        &self,
        id: Uuid,
    ) -> Result<Option<Timesheet>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_timesheet_submitted"])
            .start_timer();

        let timesheet = sqlx::query_as::<_, Timesheet>(&format!(
            "UPDATE timesheets SET status = 'submitted', submitted_at = NOW() \
             WHERE id = $1 AND status = 'draft' \
             RETURNING {TIMESHEET_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(timesheet)
    }

    #[instrument(skip(self))]
    async fn reject_timesheet(
        &self,
        id: Uuid,
        admin_id: Uuid,
    ) -> Result<Option<Timesheet>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reject_timesheet"])
            .start_timer();

        let timesheet = sqlx::query_as::<_, Timesheet>(&format!(
            "UPDATE timesheets SET status = 'rejected', rejected_at = NOW(), admin_id = $2 \
             WHERE id = $1 AND status = 'submitted' \
             RETURNING {TIMESHEET_COLUMNS}"
        ))
        .bind(id)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(timesheet)
    }

    /// Approval and invoicing commit or roll back together.
    #[instrument(skip(self, invoice), fields(timesheet_id = %timesheet_id))]
    async fn approve_and_invoice(
        &self,
        timesheet_id: Uuid,
        admin_id: Uuid,
        invoice: &NewInvoice,
    ) -> Result<(Timesheet, Invoice), BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["approve_and_invoice"])
            .start_timer();

        let mut tx = self.pool.begin().await?;

        let timesheet = sqlx::query_as::<_, Timesheet>(&format!(
            "UPDATE timesheets SET status = 'approved', validated_at = NOW(), admin_id = $2 \
             WHERE id = $1 AND status = 'submitted' \
             RETURNING {TIMESHEET_COLUMNS}"
        ))
        .bind(timesheet_id)
        .bind(admin_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(timesheet) = timesheet else {
            // Lost-update race: somebody else moved the timesheet first.
            tx.rollback().await?;
            let current = self
                .get_timesheet(timesheet_id)
                .await?
                .map(|t| t.status)
                .unwrap_or_else(|| "missing".to_string());
            return Err(BillingError::InvalidTransition {
                action: "approve",
                from: current,
            });
        };

        let created = sqlx::query_as::<_, Invoice>(&format!(
            "INSERT INTO invoices (id, company_id, timesheet_id, contract_id, number, amount, \
                 commission_amount, facturation_net, facturation_ht, facturation_ttc, vat_amount, \
                 currency, issue_date, due_date, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 'draft') \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(invoice.company_id)
        .bind(invoice.timesheet_id)
        .bind(invoice.contract_id)
        .bind(&invoice.number)
        .bind(invoice.amount)
        .bind(invoice.commission_amount)
        .bind(invoice.facturation_net)
        .bind(invoice.facturation_ht)
        .bind(invoice.facturation_ttc)
        .bind(invoice.vat_amount)
        .bind(&invoice.currency)
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                BillingError::InvalidTransition {
                    action: "approve",
                    from: "approved".to_string(),
                }
            }
            _ => BillingError::from(e),
        })?;

        tx.commit().await?;

        timer.observe_duration();

        info!(
            timesheet_id = %timesheet.id,
            invoice_id = %created.id,
            number = %created.number,
            "Timesheet approved and invoice created"
        );

        Ok((timesheet, created))
    }

    #[instrument(skip(self))]
    async fn count_invoices_created_in(
        &self,
        year: i32,
        month: u32,
    ) -> Result<i64, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["count_invoices_created_in"])
            .start_timer();

        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| BillingError::InvalidInput(format!("Invalid month {}/{}", month, year)))?;
        let end = start
            .checked_add_months(Months::new(1))
            .ok_or_else(|| BillingError::InvalidInput("Month out of range".into()))?;

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM invoices WHERE created_at >= $1 AND created_at < $2",
        )
        .bind(start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        .bind(end.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
        .fetch_one(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(count)
    }

    #[instrument(skip(self))]
    async fn get_invoice(&self, id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn mark_invoice_sent(&self, id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_sent"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices SET status = 'sent' \
             WHERE id = $1 AND status IN ('draft', 'pending') \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn mark_invoice_paid(&self, id: Uuid) -> Result<Option<Invoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_paid"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices SET status = 'paid', paid_at = NOW() \
             WHERE id = $1 AND status = 'sent' \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn mark_invoice_paid_freelancer(
        &self,
        id: Uuid,
    ) -> Result<Option<Invoice>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_invoice_paid_freelancer"])
            .start_timer();

        // Atomic conditional write: double-payout protection.
        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "UPDATE invoices SET status = 'paid_freelancer' \
             WHERE id = $1 AND status = 'paid' \
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(invoice)
    }

    #[instrument(skip(self))]
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(user)
    }

    #[instrument(skip(self))]
    async fn list_admins(&self, company_id: Uuid) -> Result<Vec<User>, BillingError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_admins"])
            .start_timer();

        let admins = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE company_id = $1 AND role = $2"
        ))
        .bind(company_id)
        .bind(Role::Admin.as_str())
        .fetch_all(&self.pool)
        .await?;

        timer.observe_duration();

        Ok(admins)
    }
}
