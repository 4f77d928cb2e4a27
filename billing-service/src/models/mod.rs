//! Domain models for the billing platform.

mod client;
mod contract;
mod invoice;
mod timesheet;
mod user;

pub use client::{Client, CreateClient};
pub use contract::{Contract, ContractStatus, CreateContract};
pub use invoice::{Invoice, InvoiceStatus, NewInvoice};
pub use timesheet::{CreateTimesheet, Timesheet, TimesheetStatus};
pub use user::{ActingUser, Role, User};
