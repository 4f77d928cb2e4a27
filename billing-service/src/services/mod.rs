pub mod database;
pub mod metrics;
pub mod notifications;
pub mod payment_terms;
pub mod store;
pub mod workflow;

pub use database::Database;
pub use notifications::NotificationDispatcher;
pub use store::WorkflowStore;
pub use workflow::{CreateTimesheetRequest, TimesheetWorkflow};
