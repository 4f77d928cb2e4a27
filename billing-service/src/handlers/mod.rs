pub mod clients;
pub mod contracts;
pub mod health;
pub mod invoices;
pub mod timesheets;
