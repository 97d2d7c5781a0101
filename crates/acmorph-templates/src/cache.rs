use std::sync::Arc;

use acmorph_core::{AcmorphResult, AcmorphResultExt};
use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::basis::{BasisFingerprint, BasisKey, BuildContext, TemplateBasis};

/// Bases keyed by the configuration they were built for and by how they were filled.
///
/// The same [`BasisKey`] built in contexts with different selections, periods or binnings gives
/// separate entries. A basis is built on first request and kept until [`BasisCache::clear`].
/// Builds are not deduplicated across threads: the cache is meant to be filled by one job at a
/// time.
#[derive(Default)]
pub struct BasisCache {
    bases: RwLock<IndexMap<(BasisKey, BasisFingerprint), Arc<TemplateBasis>>>,
}

impl BasisCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }
    /// The basis for `key`, building it with `context` if it is not cached yet.
    pub fn get_or_build(
        &self,
        key: BasisKey,
        context: &BuildContext<'_>,
    ) -> AcmorphResult<Arc<TemplateBasis>> {
        let fingerprint = context.fingerprint(&key).in_configuration(&key.tuple())?;
        if let Some(basis) = self.get(&key, &fingerprint) {
            return Ok(basis);
        }
        let basis = Arc::new(TemplateBasis::build(key, context)?);
        Ok(self
            .bases
            .write()
            .entry((key, fingerprint))
            .or_insert(basis)
            .clone())
    }
    /// The cached basis for `key` filled as described by `fingerprint`, if any.
    pub fn get(&self, key: &BasisKey, fingerprint: &BasisFingerprint) -> Option<Arc<TemplateBasis>> {
        self.bases
            .read()
            .get(&(*key, fingerprint.clone()))
            .cloned()
    }
    /// Put an already built basis in the cache under its own key and fingerprint, returning the
    /// one it replaced.
    pub fn insert(&self, basis: TemplateBasis) -> Option<Arc<TemplateBasis>> {
        let entry = (basis.key(), basis.fingerprint().clone());
        self.bases.write().insert(entry, Arc::new(basis))
    }
    /// The key of every cached basis, in build order. A key built with several fingerprints is
    /// listed once per fingerprint.
    pub fn keys(&self) -> Vec<BasisKey> {
        self.bases.read().keys().map(|(key, _)| *key).collect()
    }
    /// Drop every cached basis.
    pub fn clear(&self) {
        let mut bases = self.bases.write();
        tracing::info!(bases = bases.len(), "clearing basis cache");
        bases.clear();
    }
    /// The number of cached bases.
    pub fn len(&self) -> usize {
        self.bases.read().len()
    }
    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
