//! Two-tier metadata store

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{keys, MetadataProvider, MetadataValue, Scope, SessionOverlay, DEFAULT_DOMAIN, ENVI_DOMAIN};
use crate::error::{Error, Result};

/// A metadata item that could not be interpreted.
///
/// Recorded by the store instead of aborting the lookup that hit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataIssue {
    pub key: String,
    pub domain: String,
    pub scope: Scope,
    pub reason: String,
}

impl MetadataIssue {
    pub fn new(key: &str, domain: &str, scope: Scope, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            domain: domain.to_string(),
            scope,
            reason: reason.into(),
        }
    }

    pub fn to_error(&self) -> Error {
        Error::MetadataFormat {
            key: self.key.clone(),
            domain: self.domain.clone(),
            scope: self.scope,
            reason: self.reason.clone(),
        }
    }
}

impl fmt::Display for MetadataIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' (domain '{}', {}): {}",
            self.key, self.domain, self.scope, self.reason
        )
    }
}

/// Metadata of one raster: a session overlay in front of an ordered list of
/// fallback providers (normally the file's persisted metadata).
///
/// Overlay items promoted from the dataset-wide spectral lists are tracked
/// and dropped again when the caller edits those lists, so they never
/// outlive the values they were derived from.
pub struct MetadataStore {
    band_count: usize,
    overlay: SessionOverlay,
    fallbacks: Vec<Box<dyn MetadataProvider>>,
    issues: Vec<MetadataIssue>,
    promoted: BTreeSet<(&'static str, usize)>,
}

impl MetadataStore {
    /// Empty overlay, no fallbacks
    pub fn new(band_count: usize) -> Self {
        Self {
            band_count,
            overlay: SessionOverlay::new(),
            fallbacks: Vec::new(),
            issues: Vec::new(),
            promoted: BTreeSet::new(),
        }
    }

    /// Replace the session overlay, e.g. with one cloned from another reader
    pub fn with_overlay(mut self, overlay: SessionOverlay) -> Self {
        self.replace_overlay(overlay);
        self
    }

    /// Swap in a new session overlay, returning the old one.
    /// Items of the new overlay are all treated as caller-set.
    pub fn replace_overlay(&mut self, overlay: SessionOverlay) -> SessionOverlay {
        self.promoted.clear();
        std::mem::replace(&mut self.overlay, overlay)
    }

    /// Append a provider consulted after the overlay and earlier providers
    pub fn push_provider(&mut self, provider: Box<dyn MetadataProvider>) {
        self.fallbacks.push(provider);
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn overlay(&self) -> &SessionOverlay {
        &self.overlay
    }

    /// Problems recorded by lookups so far, oldest first
    pub fn issues(&self) -> &[MetadataIssue] {
        &self.issues
    }

    /// Fail with `InvalidBand` unless `scope` addresses an existing band
    pub fn check_scope(&self, scope: Scope) -> Result<()> {
        match scope {
            Scope::Band(band) if band == 0 || band > self.band_count => Err(Error::InvalidBand {
                band,
                band_count: self.band_count,
            }),
            _ => Ok(()),
        }
    }

    /// Write an item to the session overlay
    pub fn set_item(
        &mut self,
        key: &str,
        value: impl Into<MetadataValue>,
        domain: &str,
        scope: Scope,
    ) -> Result<()> {
        self.check_scope(scope)?;
        self.invalidate_promoted(key, domain, scope);
        self.overlay.set(key, value.into(), domain, scope);
        Ok(())
    }

    /// Clear an overlay item; persisted items are never touched
    pub fn remove_item(
        &mut self,
        key: &str,
        domain: &str,
        scope: Scope,
    ) -> Result<Option<MetadataValue>> {
        self.check_scope(scope)?;
        self.invalidate_promoted(key, domain, scope);
        Ok(self.overlay.remove(key, domain, scope))
    }

    /// Look an item up through the precedence chain.
    ///
    /// `Ok(None)` when no provider knows the item; `MetadataFormat` when the
    /// first provider that knows it cannot interpret it.
    pub fn item(&self, key: &str, domain: &str, scope: Scope) -> Result<Option<MetadataValue>> {
        self.check_scope(scope)?;
        match self.lookup(key, domain, scope) {
            None => Ok(None),
            Some(Ok(value)) => Ok(Some(value)),
            Some(Err(issue)) => Err(issue.to_error()),
        }
    }

    /// Like [`item`](Self::item), but a malformed item is recorded as an
    /// issue and reported as absent. The scope must already be checked.
    pub(crate) fn item_or_report(
        &mut self,
        key: &str,
        domain: &str,
        scope: Scope,
    ) -> Option<MetadataValue> {
        match self.lookup(key, domain, scope)? {
            Ok(value) => Some(value),
            Err(issue) => {
                self.report(issue);
                None
            }
        }
    }

    pub(crate) fn report(&mut self, issue: MetadataIssue) {
        if self.issues.contains(&issue) {
            return;
        }
        warn!("Ignoring malformed metadata item {}", issue);
        self.issues.push(issue);
    }

    /// Write a value derived from a dataset list as a per-band overlay item
    pub(crate) fn promote(&mut self, key: &'static str, value: MetadataValue, band: usize) {
        self.overlay.set(key, value, DEFAULT_DOMAIN, Scope::Band(band));
        self.promoted.insert((key, band));
    }

    /// Keep promoted items consistent with an overlay edit of `key`.
    ///
    /// Editing a per-band item hands it over to the caller. Editing the
    /// dataset-wide wavelength list or units drops every promoted item.
    fn invalidate_promoted(&mut self, key: &str, domain: &str, scope: Scope) {
        if self.promoted.is_empty() {
            return;
        }
        let key = key.replace(' ', "_");
        match scope {
            Scope::Band(band) if domain == DEFAULT_DOMAIN => {
                self.promoted.retain(|(k, b)| !(*k == key && *b == band));
            }
            Scope::Dataset
                if domain == ENVI_DOMAIN
                    && (key == keys::WAVELENGTH || key == keys::WAVELENGTH_UNITS) =>
            {
                for (k, band) in std::mem::take(&mut self.promoted) {
                    self.overlay.remove(k, DEFAULT_DOMAIN, Scope::Band(band));
                }
            }
            _ => {}
        }
    }

    /// All domains known to any tier
    pub fn domains(&self) -> Vec<String> {
        let domains: BTreeSet<String> = self.providers().flat_map(|p| p.domains()).collect();
        domains.into_iter().collect()
    }

    /// Merged items of one domain and scope, higher tiers winning.
    /// Items that cannot be interpreted are left out.
    pub fn items(&self, domain: &str, scope: Scope) -> Result<BTreeMap<String, MetadataValue>> {
        self.check_scope(scope)?;
        let mut merged = BTreeMap::new();
        let providers: Vec<&dyn MetadataProvider> = self.providers().collect();
        for provider in providers.into_iter().rev() {
            for key in provider.keys(domain, scope) {
                if let Some(Ok(value)) = provider.lookup(&key, domain, scope) {
                    merged.insert(key, value);
                }
            }
        }
        Ok(merged)
    }

    fn providers(&self) -> impl Iterator<Item = &dyn MetadataProvider> + '_ {
        std::iter::once(&self.overlay as &dyn MetadataProvider)
            .chain(self.fallbacks.iter().map(|p| p.as_ref()))
    }

    fn lookup(
        &self,
        key: &str,
        domain: &str,
        scope: Scope,
    ) -> Option<std::result::Result<MetadataValue, MetadataIssue>> {
        self.providers().find_map(|provider| {
            provider.lookup(key, domain, scope).map(|found| {
                found.map_err(|reason| {
                    MetadataIssue::new(
                        key,
                        domain,
                        scope,
                        format!("{} in {}", reason, provider.name()),
                    )
                })
            })
        })
    }
}

impl fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers: Vec<&str> = self.fallbacks.iter().map(|p| p.name()).collect();
        f.debug_struct("MetadataStore")
            .field("band_count", &self.band_count)
            .field("overlay", &self.overlay)
            .field("fallbacks", &providers)
            .field("issues", &self.issues)
            .field("promoted", &self.promoted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PersistedMetadata, ENVI_DOMAIN};

    fn store_with(meta: PersistedMetadata) -> MetadataStore {
        let mut store = MetadataStore::new(3);
        store.push_provider(Box::new(meta));
        store
    }

    #[test]
    fn test_overlay_beats_persisted() {
        let mut meta = PersistedMetadata::new();
        meta.insert("", Scope::Band(1), "gain", "2.0");
        let mut store = store_with(meta);

        assert_eq!(
            store.item("gain", "", Scope::Band(1)).unwrap(),
            Some(MetadataValue::Number(2.0))
        );
        store.set_item("gain", 3.0, "", Scope::Band(1)).unwrap();
        assert_eq!(
            store.item("gain", "", Scope::Band(1)).unwrap(),
            Some(MetadataValue::Number(3.0))
        );
        // other scopes are unaffected
        assert_eq!(store.item("gain", "", Scope::Band(2)).unwrap(), None);

        store.remove_item("gain", "", Scope::Band(1)).unwrap();
        assert_eq!(
            store.item("gain", "", Scope::Band(1)).unwrap(),
            Some(MetadataValue::Number(2.0))
        );
    }

    #[test]
    fn test_missing_item_is_absent() {
        let store = MetadataStore::new(1);
        assert_eq!(store.item("anything", "", Scope::Dataset).unwrap(), None);
    }

    #[test]
    fn test_band_scope_is_checked() {
        let mut store = MetadataStore::new(2);
        assert!(matches!(
            store.item("x", "", Scope::Band(3)),
            Err(Error::InvalidBand { band: 3, band_count: 2 })
        ));
        assert!(store.set_item("x", 1.0, "", Scope::Band(0)).is_err());
    }

    #[test]
    fn test_malformed_item_is_localized() {
        let mut meta = PersistedMetadata::new();
        meta.insert(ENVI_DOMAIN, Scope::Dataset, "wavelength", "{1, 2");
        meta.insert(ENVI_DOMAIN, Scope::Dataset, "samples", "4");
        let mut store = store_with(meta);

        assert!(matches!(
            store.item("wavelength", ENVI_DOMAIN, Scope::Dataset),
            Err(Error::MetadataFormat { .. })
        ));
        assert_eq!(
            store.item_or_report("wavelength", ENVI_DOMAIN, Scope::Dataset),
            None
        );
        assert_eq!(
            store.item_or_report("samples", ENVI_DOMAIN, Scope::Dataset),
            Some(MetadataValue::Number(4.0))
        );
        assert_eq!(store.issues().len(), 1);
        assert_eq!(store.issues()[0].key, "wavelength");

        let items = store.items(ENVI_DOMAIN, Scope::Dataset).unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_domains_and_items_merge_tiers() {
        let mut meta = PersistedMetadata::new();
        meta.insert(ENVI_DOMAIN, Scope::Dataset, "bands", "3");
        meta.insert("", Scope::Dataset, "sensor", "EnMAP");
        let mut store = store_with(meta);
        store.set_item("sensor", "HyMap", "", Scope::Dataset).unwrap();
        store.set_item("note", "x", "custom", Scope::Dataset).unwrap();

        assert_eq!(store.domains(), vec!["", "ENVI", "custom"]);
        let items = store.items("", Scope::Dataset).unwrap();
        assert_eq!(items["sensor"], MetadataValue::from("HyMap"));
    }
}
