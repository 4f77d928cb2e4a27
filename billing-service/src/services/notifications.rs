//! Workflow notifications: email and WhatsApp, dispatched best-effort.
//!
//! Delivery is at-most-once: a failed send is counted and logged, and never
//! blocks or reverses the workflow transition that triggered it.

use crate::config::{SmtpConfig, WhatsAppConfig};
use crate::models::{Invoice, Timesheet, User};
use crate::services::metrics::NOTIFICATIONS_TOTAL;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Sender not enabled: {0}")]
    NotEnabled(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Send error: {0}")]
    SendFailed(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),
}

/// Workflow events that produce notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowEvent {
    TimesheetSubmitted,
    TimesheetApproved,
    TimesheetRejected,
    InvoiceSent,
    PaymentReceived,
    FreelancerPaid,
}

impl WorkflowEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowEvent::TimesheetSubmitted => "timesheet_submitted",
            WorkflowEvent::TimesheetApproved => "timesheet_approved",
            WorkflowEvent::TimesheetRejected => "timesheet_rejected",
            WorkflowEvent::InvoiceSent => "invoice_sent",
            WorkflowEvent::PaymentReceived => "payment_received",
            WorkflowEvent::FreelancerPaid => "freelancer_paid",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    WhatsApp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::WhatsApp => "whatsapp",
        }
    }
}

/// Prepared email payload.
#[derive(Debug, Clone)]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Prepared WhatsApp payload.
#[derive(Debug, Clone)]
pub struct WhatsAppPayload {
    pub to: String,
    pub message: String,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, email: &EmailPayload) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait WhatsAppSender: Send + Sync {
    async fn send(&self, message: &WhatsAppPayload) -> Result<(), NotifyError>;
}

/// Per-user notification preferences gate, checked before every send.
#[async_trait]
pub trait NotificationPreferences: Send + Sync {
    async fn should_send(&self, user_id: Uuid, event: WorkflowEvent, channel: Channel) -> bool;
}

// -----------------------------------------------------------------------------
// SMTP email sender
// -----------------------------------------------------------------------------

pub struct SmtpEmailSender {
    config: SmtpConfig,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpEmailSender {
    pub fn new(config: SmtpConfig) -> Result<Self, NotifyError> {
        if !config.enabled {
            return Ok(Self {
                config,
                transport: None,
            });
        }

        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| {
                NotifyError::Configuration(format!("Failed to create SMTP relay: {}", e))
            })?
            .port(config.port)
            .credentials(creds)
            .build();

        Ok(Self {
            config,
            transport: Some(transport),
        })
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, email: &EmailPayload) -> Result<(), NotifyError> {
        if !self.config.enabled {
            return Err(NotifyError::NotEnabled(
                "SMTP email sender is not enabled".to_string(),
            ));
        }

        let transport = self.transport.as_ref().ok_or_else(|| {
            NotifyError::Configuration("SMTP transport not initialized".to_string())
        })?;

        let from_mailbox: Mailbox =
            format!("{} <{}>", self.config.from_name, self.config.from_email)
                .parse()
                .map_err(|e| NotifyError::Configuration(format!("Invalid from address: {}", e)))?;

        let to_mailbox: Mailbox = email
            .to
            .parse()
            .map_err(|e| NotifyError::InvalidRecipient(format!("Invalid recipient: {}", e)))?;

        let message = Message::builder()
            .from(from_mailbox)
            .to(to_mailbox)
            .subject(&email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| NotifyError::SendFailed(format!("Failed to build message: {}", e)))?;

        transport
            .send(message)
            .await
            .map_err(|e| NotifyError::SendFailed(format!("Failed to send email: {}", e)))?;

        tracing::info!(to = %email.to, subject = %email.subject, "Email sent");

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// WhatsApp gateway sender
// -----------------------------------------------------------------------------

pub struct HttpWhatsAppSender {
    config: WhatsAppConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GatewayRequest<'a> {
    to: &'a str,
    message: &'a str,
}

impl HttpWhatsAppSender {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }
}

#[async_trait]
impl WhatsAppSender for HttpWhatsAppSender {
    async fn send(&self, message: &WhatsAppPayload) -> Result<(), NotifyError> {
        if !self.config.enabled {
            return Err(NotifyError::NotEnabled(
                "WhatsApp sender is not enabled".to_string(),
            ));
        }

        // Normalize the phone number (digits plus a leading +).
        let normalized_phone = message
            .to
            .chars()
            .filter(|c| c.is_ascii_digit() || *c == '+')
            .collect::<String>();

        if normalized_phone.is_empty() {
            return Err(NotifyError::InvalidRecipient(
                "Phone number is empty".to_string(),
            ));
        }

        let request = GatewayRequest {
            to: &normalized_phone,
            message: &message.message,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("authkey", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                NotifyError::Connection(format!("Failed to reach WhatsApp gateway: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::SendFailed(format!(
                "WhatsApp gateway returned status {}: {}",
                status, body
            )));
        }

        tracing::info!(to = %message.to, "WhatsApp message sent");

        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Mocks for tests and disabled deployments
// -----------------------------------------------------------------------------

/// Mock email sender: records sends, optionally failing every one.
pub struct MockEmailSender {
    fail: bool,
    send_count: AtomicU64,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self {
            fail: false,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }
}

impl Default for MockEmailSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send(&self, email: &EmailPayload) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::SendFailed(
                "Mock email sender configured to fail".to_string(),
            ));
        }
        self.send_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!(to = %email.to, subject = %email.subject, "[MOCK] Email would be sent");
        Ok(())
    }
}

/// Mock WhatsApp sender.
pub struct MockWhatsAppSender {
    fail: bool,
    send_count: AtomicU64,
}

impl MockWhatsAppSender {
    pub fn new() -> Self {
        Self {
            fail: false,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            send_count: AtomicU64::new(0),
        }
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }
}

impl Default for MockWhatsAppSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WhatsAppSender for MockWhatsAppSender {
    async fn send(&self, message: &WhatsAppPayload) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::SendFailed(
                "Mock WhatsApp sender configured to fail".to_string(),
            ));
        }
        self.send_count.fetch_add(1, Ordering::SeqCst);
        tracing::info!(to = %message.to, "[MOCK] WhatsApp message would be sent");
        Ok(())
    }
}

/// Channel-level preferences backed by static configuration flags.
pub struct ChannelPreferences {
    pub email_enabled: bool,
    pub whatsapp_enabled: bool,
}

#[async_trait]
impl NotificationPreferences for ChannelPreferences {
    async fn should_send(&self, _user_id: Uuid, _event: WorkflowEvent, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_enabled,
            Channel::WhatsApp => self.whatsapp_enabled,
        }
    }
}

// -----------------------------------------------------------------------------
// Dispatcher
// -----------------------------------------------------------------------------

/// Assembles per-event payloads and dispatches them best-effort.
pub struct NotificationDispatcher {
    email: Arc<dyn EmailSender>,
    whatsapp: Arc<dyn WhatsAppSender>,
    preferences: Arc<dyn NotificationPreferences>,
}

impl NotificationDispatcher {
    pub fn new(
        email: Arc<dyn EmailSender>,
        whatsapp: Arc<dyn WhatsAppSender>,
        preferences: Arc<dyn NotificationPreferences>,
    ) -> Self {
        Self {
            email,
            whatsapp,
            preferences,
        }
    }

    pub async fn timesheet_submitted(
        &self,
        admins: &[User],
        freelancer: &User,
        timesheet: &Timesheet,
    ) {
        let period = format!("{:02}/{}", timesheet.month, timesheet.year);
        for admin in admins {
            self.dispatch(
                admin,
                WorkflowEvent::TimesheetSubmitted,
                format!("New timesheet submitted - {}", period),
                format!(
                    "<p>{} submitted a timesheet for {} ({} days worked).</p>\
                     <p>Please review it.</p>",
                    freelancer.full_name(),
                    period,
                    timesheet.worked_days
                ),
                format!(
                    "{} submitted a timesheet for {} ({} days). Please review it.",
                    freelancer.full_name(),
                    period,
                    timesheet.worked_days
                ),
            )
            .await;
        }
    }

    pub async fn timesheet_approved(
        &self,
        freelancer: &User,
        timesheet: &Timesheet,
        invoice: &Invoice,
    ) {
        let period = format!("{:02}/{}", timesheet.month, timesheet.year);
        self.dispatch(
            freelancer,
            WorkflowEvent::TimesheetApproved,
            format!("Timesheet approved - {}", period),
            format!(
                "<p>Your timesheet for {} was approved.</p>\
                 <p>Invoice {} was generated for {} {} (net: {} {}), due on {}.</p>",
                period,
                invoice.number,
                invoice.amount,
                invoice.currency,
                invoice.facturation_net,
                invoice.currency,
                invoice.due_date
            ),
            format!(
                "Your timesheet for {} was approved. Invoice {} (net {} {}) is due on {}.",
                period, invoice.number, invoice.facturation_net, invoice.currency, invoice.due_date
            ),
        )
        .await;
    }

    pub async fn timesheet_rejected(
        &self,
        freelancer: &User,
        timesheet: &Timesheet,
        reason: Option<&str>,
    ) {
        let period = format!("{:02}/{}", timesheet.month, timesheet.year);
        let reason_html = reason
            .map(|r| format!("<p>Reason: {}</p>", r))
            .unwrap_or_default();
        let reason_text = reason.map(|r| format!(" Reason: {}", r)).unwrap_or_default();
        self.dispatch(
            freelancer,
            WorkflowEvent::TimesheetRejected,
            format!("Timesheet rejected - {}", period),
            format!(
                "<p>Your timesheet for {} was rejected.</p>{}\
                 <p>You can file a corrected timesheet for the same period.</p>",
                period, reason_html
            ),
            format!("Your timesheet for {} was rejected.{}", period, reason_text),
        )
        .await;
    }

    pub async fn invoice_sent(&self, freelancer: &User, invoice: &Invoice) {
        self.dispatch(
            freelancer,
            WorkflowEvent::InvoiceSent,
            format!("Invoice {} sent", invoice.number),
            format!(
                "<p>Invoice {} ({} {}) was sent to the client. Payment is due on {}.</p>",
                invoice.number, invoice.amount, invoice.currency, invoice.due_date
            ),
            format!(
                "Invoice {} ({} {}) was sent to the client, due {}.",
                invoice.number, invoice.amount, invoice.currency, invoice.due_date
            ),
        )
        .await;
    }

    pub async fn payment_received(&self, freelancer: &User, invoice: &Invoice) {
        self.dispatch(
            freelancer,
            WorkflowEvent::PaymentReceived,
            format!("Payment received for invoice {}", invoice.number),
            format!(
                "<p>The client paid invoice {}. Your payout of {} {} is being prepared.</p>",
                invoice.number, invoice.facturation_net, invoice.currency
            ),
            format!(
                "The client paid invoice {}. Your payout of {} {} is being prepared.",
                invoice.number, invoice.facturation_net, invoice.currency
            ),
        )
        .await;
    }

    pub async fn freelancer_paid(&self, freelancer: &User, invoice: &Invoice) {
        self.dispatch(
            freelancer,
            WorkflowEvent::FreelancerPaid,
            format!("Payout completed for invoice {}", invoice.number),
            format!(
                "<p>Your payout of {} {} for invoice {} was sent.</p>",
                invoice.facturation_net, invoice.currency, invoice.number
            ),
            format!(
                "Your payout of {} {} for invoice {} was sent.",
                invoice.facturation_net, invoice.currency, invoice.number
            ),
        )
        .await;
    }

    /// Send one event to one user over every permitted channel. Failures are
    /// counted and logged; they never propagate to the workflow.
    async fn dispatch(
        &self,
        user: &User,
        event: WorkflowEvent,
        subject: String,
        html: String,
        message: String,
    ) {
        if self
            .preferences
            .should_send(user.id, event, Channel::Email)
            .await
        {
            let payload = EmailPayload {
                to: user.email.clone(),
                subject,
                html,
            };
            match self.email.send(&payload).await {
                Ok(()) => {
                    NOTIFICATIONS_TOTAL
                        .with_label_values(&[event.as_str(), "email", "sent"])
                        .inc();
                }
                Err(e) => {
                    NOTIFICATIONS_TOTAL
                        .with_label_values(&[event.as_str(), "email", "failed"])
                        .inc();
                    tracing::warn!(
                        user_id = %user.id,
                        event = event.as_str(),
                        error = %e,
                        "Failed to send email notification"
                    );
                }
            }
        }

        let Some(phone) = user.phone.as_deref() else {
            return;
        };
        if self
            .preferences
            .should_send(user.id, event, Channel::WhatsApp)
            .await
        {
            let payload = WhatsAppPayload {
                to: phone.to_string(),
                message,
            };
            match self.whatsapp.send(&payload).await {
                Ok(()) => {
                    NOTIFICATIONS_TOTAL
                        .with_label_values(&[event.as_str(), "whatsapp", "sent"])
                        .inc();
                }
                Err(e) => {
                    NOTIFICATIONS_TOTAL
                        .with_label_values(&[event.as_str(), "whatsapp", "failed"])
                        .inc();
                    tracing::warn!(
                        user_id = %user.id,
                        event = event.as_str(),
                        error = %e,
                        "Failed to send WhatsApp notification"
                    );
                }
            }
        }
    }
}
