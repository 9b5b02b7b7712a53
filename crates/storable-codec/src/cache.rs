//! Shared cache of built encoding strategies.
//!
//! Building an [`EncodingStrategy`] resolves a codec for every property, so a
//! binding layer builds each one once and hands out clones of the same `Arc`.
//! Entries are keyed the same way strategies compare: by type name and
//! [`StrategyConfig`]. Lookups borrow the type name; it is only copied into the
//! cache when a strategy is built.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{CodecError, CodecResult};
use crate::strategy::{EncodingStrategy, StrategyConfig};
use crate::types::PropertySchema;

type ByConfig = HashMap<StrategyConfig, Arc<EncodingStrategy>>;

/// A thread-safe map from `(type name, config)` to a built strategy.
#[derive(Debug, Default)]
pub struct StrategyCache {
    strategies: RwLock<HashMap<Arc<str>, ByConfig>>,
}

impl StrategyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached strategy for `type_name` and `config`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the cache lock is poisoned.
    pub fn get(
        &self,
        type_name: &str,
        config: StrategyConfig,
    ) -> CodecResult<Option<Arc<EncodingStrategy>>> {
        let strategies = self.strategies.read().map_err(|_| poisoned())?;
        Ok(lookup(&strategies, type_name, config))
    }

    /// Returns the cached strategy, building it from `schema` on a miss.
    ///
    /// The schema is only consulted on a miss; a hit returns whatever was built
    /// first for the same type name and config.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnsupportedPropertyType`] if the strategy cannot be
    /// built, and [`CodecError::IllegalArgument`] if the cache lock is poisoned.
    pub fn get_or_build(
        &self,
        type_name: &str,
        schema: &PropertySchema,
        config: StrategyConfig,
    ) -> CodecResult<Arc<EncodingStrategy>> {
        if let Some(strategy) = self.get(type_name, config)? {
            return Ok(strategy);
        }

        debug!(type_name, "strategy cache miss");
        // Built outside the lock; a racing builder may win, and its strategy is kept.
        let built = Arc::new(EncodingStrategy::new(type_name, schema.clone(), config)?);
        let mut strategies = self.strategies.write().map_err(|_| poisoned())?;
        if let Some(winner) = lookup(&strategies, type_name, config) {
            return Ok(winner);
        }
        strategies.entry(Arc::from(type_name)).or_default().insert(config, Arc::clone(&built));
        Ok(built)
    }

    /// Number of cached strategies.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the cache lock is poisoned.
    pub fn len(&self) -> CodecResult<usize> {
        let strategies = self.strategies.read().map_err(|_| poisoned())?;
        Ok(strategies.values().map(HashMap::len).sum())
    }

    /// Returns `true` if nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the cache lock is poisoned.
    pub fn is_empty(&self) -> CodecResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Drops every cached strategy. Outstanding `Arc`s stay valid.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IllegalArgument`] if the cache lock is poisoned.
    pub fn clear(&self) -> CodecResult<()> {
        self.strategies.write().map_err(|_| poisoned())?.clear();
        Ok(())
    }
}

fn lookup(
    strategies: &HashMap<Arc<str>, ByConfig>,
    type_name: &str,
    config: StrategyConfig,
) -> Option<Arc<EncodingStrategy>> {
    strategies.get(type_name)?.get(&config).cloned()
}

fn poisoned() -> CodecError {
    CodecError::illegal("strategy cache lock poisoned")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{LogicalType, PropertyDescriptor};
    use std::thread;

    fn schema() -> PropertySchema {
        PropertySchema::builder()
            .key(PropertyDescriptor::new("id", LogicalType::U64))
            .data(PropertyDescriptor::new("payload", LogicalType::Bytes))
            .build()
            .unwrap()
    }

    #[test]
    fn builds_once_per_key() {
        let cache = StrategyCache::new();
        assert!(cache.is_empty().unwrap());

        let a = cache.get_or_build("Blob", &schema(), StrategyConfig::new()).unwrap();
        let b = cache.get_or_build("Blob", &schema(), StrategyConfig::new()).unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let padded =
            cache.get_or_build("Blob", &schema(), StrategyConfig::new().key_prefix(4)).unwrap();
        assert!(!Arc::ptr_eq(&a, &padded));
        assert_eq!(cache.len().unwrap(), 2);
    }

    #[test]
    fn get_only_returns_cached() {
        let cache = StrategyCache::new();
        assert!(cache.get("Blob", StrategyConfig::new()).unwrap().is_none());
        cache.get_or_build("Blob", &schema(), StrategyConfig::new()).unwrap();
        assert!(cache.get("Blob", StrategyConfig::new()).unwrap().is_some());

        cache.clear().unwrap();
        assert!(cache.get("Blob", StrategyConfig::new()).unwrap().is_none());
    }

    #[test]
    fn lookups_separate_type_names_and_configs() {
        let cache = StrategyCache::new();
        let plain = StrategyConfig::new();
        let padded = StrategyConfig::new().data_suffix(2);
        cache.get_or_build("Blob", &schema(), plain).unwrap();
        cache.get_or_build("Blob", &schema(), padded).unwrap();
        cache.get_or_build("Chunk", &schema(), plain).unwrap();
        assert_eq!(cache.len().unwrap(), 3);

        let name = String::from("Blob");
        let hit = cache.get(&name, padded).unwrap().unwrap();
        assert_eq!(hit.type_name(), "Blob");
        assert_eq!(*hit.config(), padded);
        assert!(cache.get("Chunk", padded).unwrap().is_none());
    }

    #[test]
    fn build_failures_are_not_cached() {
        let cache = StrategyCache::new();
        let bad = PropertySchema::builder()
            .key(PropertyDescriptor::new("id", LogicalType::Opaque("Uuid".into())))
            .build()
            .unwrap();
        assert!(cache.get_or_build("Bad", &bad, StrategyConfig::new()).is_err());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn concurrent_callers_share_one_strategy() {
        let cache = Arc::new(StrategyCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    cache.get_or_build("Blob", &schema(), StrategyConfig::new()).unwrap()
                })
            })
            .collect();
        let strategies: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(strategies.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(cache.len().unwrap(), 1);
    }
}
