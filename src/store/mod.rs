//! Metrics store access.
//!
//! The durable key-value store holding raw experiment counters is an external
//! collaborator; this module defines the narrow contract we consume (key
//! enumeration by prefix, hash-read-all, raw get/set) and an in-memory
//! implementation used by tests and demo mode. Values are flat string maps;
//! numeric fields are strings and are parsed defensively downstream.

use crate::core::Result;
use dashmap::DashMap;
use std::collections::HashMap;

/// Trait for metrics store implementations.
#[async_trait::async_trait]
pub trait MetricsStore: Send + Sync {
    /// Enumerate keys starting with the given prefix.
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Read all fields of the hash at `key`. Missing keys read as None.
    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, String>>>;

    /// Read a raw string value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a raw string value.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory metrics store used by tests and demo mode.
#[derive(Debug, Default)]
pub struct MemoryMetricsStore {
    hashes: DashMap<String, HashMap<String, String>>,
    values: DashMap<String, String>,
}

impl MemoryMetricsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a hash record.
    pub fn put_hash(&self, key: &str, fields: &[(&str, &str)]) {
        let record = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.hashes.insert(key.to_string(), record);
    }

    /// Remove a hash record.
    pub fn remove_hash(&self, key: &str) {
        self.hashes.remove(key);
    }
}

#[async_trait::async_trait]
impl MetricsStore for MemoryMetricsStore {
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .hashes
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|k| k.starts_with(prefix))
            .collect();
        // DashMap iteration order is arbitrary; callers rely on a stable scan.
        keys.sort();
        Ok(keys)
    }

    async fn hash_get_all(&self, key: &str) -> Result<Option<HashMap<String, String>>> {
        Ok(self.hashes.get(key).map(|entry| entry.value().clone()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
