//! Property records and their calendar mapping.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::error::{SyncError, SyncResult};
use crate::property::Property;

#[derive(Default)]
pub struct PropertyStore {
    next_id: AtomicU64,
    inner: RwLock<HashMap<u64, Property>>,
}

impl PropertyStore {
    pub fn new() -> Self {
        PropertyStore {
            next_id: AtomicU64::new(1),
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn create(&self, name: &str, calendar_id: Option<String>) -> Property {
        let property = Property {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            calendar_id,
        };
        self.write().insert(property.id, property.clone());
        property
    }

    pub fn get(&self, id: u64) -> Option<Property> {
        self.read().get(&id).cloned()
    }

    pub fn list(&self) -> Vec<Property> {
        let mut properties: Vec<Property> = self.read().values().cloned().collect();
        properties.sort_by_key(|p| p.id);
        properties
    }

    /// The property a calendar's events are reconciled into, if any is mapped.
    pub fn find_by_calendar_id(&self, calendar_id: &str) -> Option<Property> {
        self.read()
            .values()
            .find(|p| p.calendar_id.as_deref() == Some(calendar_id))
            .cloned()
    }

    pub fn set_calendar_id(&self, id: u64, calendar_id: Option<String>) -> SyncResult<Property> {
        let mut properties = self.write();
        let property = properties
            .get_mut(&id)
            .ok_or(SyncError::PropertyNotFound(id))?;
        property.calendar_id = calendar_id;
        Ok(property.clone())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<u64, Property>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<u64, Property>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
