//! User model and the explicit acting-user context.

use crate::error::BillingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Platform role. Closed enumeration; unknown role strings are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Freelancer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Freelancer => "freelancer",
        }
    }

    pub fn parse(s: &str) -> Result<Self, BillingError> {
        match s {
            "admin" => Ok(Role::Admin),
            "freelancer" => Ok(Role::Freelancer),
            other => Err(BillingError::Configuration(format!(
                "Unknown role '{}'",
                other
            ))),
        }
    }
}

/// A platform user (admin or freelancer) belonging to one company.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub company_id: Uuid,
    pub email: String,
    pub phone: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// The authenticated caller, passed explicitly into every workflow entry
/// point instead of being resolved from ambient session state.
#[derive(Debug, Clone, Copy)]
pub struct ActingUser {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: Role,
}

impl ActingUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
