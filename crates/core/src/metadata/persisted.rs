//! Metadata persisted in the raster file

use std::collections::BTreeMap;

use super::{MetadataProvider, MetadataValue, Scope};

/// Raw metadata items read from a file's embedded metadata blocks.
///
/// Values are kept as text and only interpreted on lookup, so one malformed
/// item never prevents the others from being read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedMetadata {
    items: BTreeMap<(String, Scope), BTreeMap<String, String>>,
}

impl PersistedMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        domain: &str,
        scope: Scope,
        key: impl Into<String>,
        raw: impl Into<String>,
    ) {
        self.items
            .entry((domain.to_string(), scope))
            .or_default()
            .insert(key.into(), raw.into());
    }

    /// Raw text of an item, trying the key variants of [`key_variants`]
    pub fn get_raw(&self, key: &str, domain: &str, scope: Scope) -> Option<&str> {
        let items = self.items.get(&(domain.to_string(), scope))?;
        key_variants(key)
            .iter()
            .find_map(|k| items.get(k.as_str()))
            .map(String::as_str)
    }

    /// Merge another set of items, `other` winning on conflicts
    pub fn extend(&mut self, other: PersistedMetadata) {
        for (slot, items) in other.items {
            self.items.entry(slot).or_default().extend(items);
        }
    }

    pub fn len(&self) -> usize {
        self.items.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Keys to try for a lookup: the key itself, then with spaces and
/// underscores swapped, so `wavelength_units` also finds ENVI's
/// `wavelength units`.
pub(super) fn key_variants(key: &str) -> Vec<String> {
    let mut variants = vec![key.to_string()];
    for candidate in [key.replace(' ', "_"), key.replace('_', " ")] {
        if !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

impl MetadataProvider for PersistedMetadata {
    fn name(&self) -> &str {
        "persisted metadata"
    }

    fn lookup(
        &self,
        key: &str,
        domain: &str,
        scope: Scope,
    ) -> Option<std::result::Result<MetadataValue, String>> {
        self.get_raw(key, domain, scope).map(MetadataValue::parse)
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
