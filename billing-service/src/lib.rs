//! Freelancer/ESN billing platform.
//!
//! Admins manage clients, contracts and invoices; freelancers file monthly
//! timesheets (CRA) that flow through submission, review and invoicing.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
