//! Customer records, keyed by email.
//!
//! Identity resolution is email equality only; the reconciler's placeholder
//! guests are ordinary customers created once and reused.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::property::Customer;

#[derive(Default)]
pub struct CustomerStore {
    next_id: AtomicU64,
    inner: RwLock<HashMap<u64, Customer>>,
}

impl CustomerStore {
    pub fn new() -> Self {
        CustomerStore {
            next_id: AtomicU64::new(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the customer with this email, creating one with the given names
    /// if none exists. The lookup and insert happen under one write lock so
    /// two concurrent calls cannot both create.
    pub fn get_or_create(&self, email: &str, first_name: &str, last_name: &str) -> Customer {
        let mut customers = self.write();
        if let Some(existing) = customers.values().find(|c| c.email == email) {
            return existing.clone();
        }
        let customer = Customer {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            email: email.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
        };
        customers.insert(customer.id, customer.clone());
        customer
    }

    /// Like `get_or_create`, deriving the first name from the email's local
    /// part for guests we only know by address.
    pub fn get_or_create_from_email(&self, email: &str) -> Customer {
        let first_name = email.split('@').next().unwrap_or(email);
        self.get_or_create(email, first_name, "")
    }

    pub fn get(&self, id: u64) -> Option<Customer> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u64, Customer>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
