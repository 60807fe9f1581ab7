// src/store.rs

use crate::aggregate::{AggregateStats, aggregate};
use crate::record::{OrderField, OrderRecord};
use tracing::{info, warn};

/// Group label for records whose laundry service is blank.
pub const UNASSIGNED_SERVICE: &str = "Unassigned";

/// In-memory, newest-first collection of the orders of one session.
///
/// Ids are unique within the store. Records only change through
/// [`OrderStore::update`] and only disappear through [`OrderStore::delete`].
#[derive(Debug, Default)]
pub struct OrderStore {
    records: Vec<OrderRecord>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a batch of normalized records in front of the existing ones,
    /// keeping the batch's own order. Records with an id already in the
    /// store are dropped. Returns how many were inserted.
    pub fn ingest(&mut self, new_records: Vec<OrderRecord>) -> usize {
        let mut batch: Vec<OrderRecord> = Vec::with_capacity(new_records.len());
        for record in new_records {
            let duplicate = self.contains(&record.id) || batch.iter().any(|r| r.id == record.id);
            if duplicate {
                warn!(id = %record.id, "Skipping record with duplicate id");
                continue;
            }
            batch.push(record);
        }

        let inserted = batch.len();
        batch.append(&mut self.records);
        self.records = batch;

        info!(inserted, total = self.records.len(), "Records ingested");
        inserted
    }

    /// Overwrite one field of the record with this id.
    /// Returns `false` and changes nothing when the id is unknown.
    pub fn update(&mut self, id: &str, field: OrderField, value: impl Into<String>) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| r.id == id) else {
            warn!(id = %id, field = %field, "Update for unknown record");
            return false;
        };
        *record.field_mut(field) = value.into();
        info!(id = %id, field = %field, "Record updated");
        true
    }

    /// Remove the record with this id. Returns `false` when it was not there.
    pub fn delete(&mut self, id: &str) -> bool {
        let Some(pos) = self.records.iter().position(|r| r.id == id) else {
            warn!(id = %id, "Delete for unknown record");
            return false;
        };
        self.records.remove(pos);
        info!(id = %id, remaining = self.records.len(), "Record deleted");
        true
    }

    pub fn all(&self) -> &[OrderRecord] {
        &self.records
    }

    pub fn get(&self, id: &str) -> Option<&OrderRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> AggregateStats {
        aggregate(&self.records)
    }

    /// Case-insensitive substring search over customer, order number and
    /// laundry service. An empty term matches everything.
    pub fn search(&self, term: &str) -> Vec<&OrderRecord> {
        let needle = term.to_lowercase();
        self.records
            .iter()
            .filter(|r| {
                r.customer_name.to_lowercase().contains(&needle)
                    || r.order_number.to_lowercase().contains(&needle)
                    || r.laundry_service.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Records grouped by laundry service, groups in order of first
    /// appearance.
    pub fn group_by_service(&self) -> Vec<(&str, Vec<&OrderRecord>)> {
        group_by_service(self.records.iter())
    }
}

/// Group any run of records by laundry service. Blank services land in
/// [`UNASSIGNED_SERVICE`].
pub fn group_by_service<'a, I>(records: I) -> Vec<(&'a str, Vec<&'a OrderRecord>)>
where
    I: IntoIterator<Item = &'a OrderRecord>,
{
    let mut groups: Vec<(&str, Vec<&OrderRecord>)> = Vec::new();
    for record in records {
        let service = if record.laundry_service.is_empty() {
            UNASSIGNED_SERVICE
        } else {
            record.laundry_service.as_str()
        };
        match groups.iter_mut().find(|(name, _)| *name == service) {
            Some((_, members)) => members.push(record),
            None => groups.push((service, vec![record])),
        }
    }
    groups
}
