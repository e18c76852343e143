//! Property and customer records.
//!
//! Only the fields the reconciliation engine needs: the calendar mapping on
//! properties, and email identity on customers. Everything else about these
//! aggregates lives in the surrounding CRM.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: u64,
    pub name: String,
    /// External calendar this property's bookings are reconciled against.
    pub calendar_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: u64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}
