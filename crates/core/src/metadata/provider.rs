//! Metadata lookup providers

use std::collections::BTreeMap;

use super::persisted::key_variants;
use super::{MetadataValue, Scope};

/// One link of the metadata precedence chain.
///
/// `lookup` returns `None` when the provider does not know the item,
/// `Some(Err(reason))` when it knows the item but cannot interpret it.
pub trait MetadataProvider: Send {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    fn lookup(
        &self,
        key: &str,
        domain: &str,
        scope: Scope,
    ) -> Option<std::result::Result<MetadataValue, String>>;

    /// Domains this provider holds items for
    fn domains(&self) -> Vec<String>;

    /// Keys present for a domain and scope
    fn keys(&self, domain: &str, scope: Scope) -> Vec<String>;
}

type ItemMap<V> = BTreeMap<(String, Scope), BTreeMap<String, V>>;

/// Session-scoped metadata that takes precedence over persisted metadata.
///
/// Owned by a single reader. Cloning an overlay and handing it to another
/// reader is the only way two readers share overlay state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOverlay {
    items: ItemMap<MetadataValue>,
}

impl SessionOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) an item
    pub fn set(&mut self, key: &str, value: MetadataValue, domain: &str, scope: Scope) {
        self.items
            .entry((domain.to_string(), scope))
            .or_default()
            .insert(key.to_string(), value);
    }

    /// Item under `key`, or under `key` with spaces and underscores swapped
    pub fn get(&self, key: &str, domain: &str, scope: Scope) -> Option<&MetadataValue> {
        let items = self.items.get(&(domain.to_string(), scope))?;
        key_variants(key).iter().find_map(|k| items.get(k))
    }

    /// Remove an item, returning its previous value
    pub fn remove(&mut self, key: &str, domain: &str, scope: Scope) -> Option<MetadataValue> {
        let slot = (domain.to_string(), scope);
        let items = self.items.get_mut(&slot)?;
        let removed = key_variants(key).iter().find_map(|k| items.remove(k));
        if items.is_empty() {
            self.items.remove(&slot);
        }
        removed
    }

    /// Number of items across all domains and scopes
    pub fn len(&self) -> usize {
        self.items.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl MetadataProvider for SessionOverlay {
    fn name(&self) -> &str {
        "session overlay"
    }

    fn lookup(
        &self,
        key: &str,
        domain: &str,
        scope: Scope,
    ) -> Option<std::result::Result<MetadataValue, String>> {
        self.get(key, domain, scope).cloned().map(Ok)
    }

    fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.items.keys().map(|(d, _)| d.clone()).collect();
        domains.dedup();
        domains
    }

    fn keys(&self, domain: &str, scope: Scope) -> Vec<String> {
        self.items
            .get(&(domain.to_string(), scope))
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }
}
