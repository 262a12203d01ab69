//! Read-through cache for principal directory lookups.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lru::LruCache;

use calvault_core::contract::PrincipalDirectory;
use calvault_core::entity::Principal;
use calvault_core::store::Result;

/// Caching decorator over a [`PrincipalDirectory`].
///
/// Hits may be stale; the directory is the source of truth and cache
/// entries are only ever replaced, never invalidated. Missing principals
/// are not cached, so a principal created after a miss is picked up on
/// the next lookup.
pub struct CachedPrincipalDirectory<D: PrincipalDirectory + ?Sized> {
    inner: Arc<D>,
    cache: Mutex<LruCache<String, Principal>>,
}

impl<D: PrincipalDirectory + ?Sized> CachedPrincipalDirectory<D> {
    /// Wraps the given directory with a cache of `capacity` entries.
    pub fn new(inner: Arc<D>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }
}

#[async_trait]
impl<D: PrincipalDirectory + ?Sized + 'static> PrincipalDirectory for CachedPrincipalDirectory<D> {
    async fn get_principal(&self, principal_uri: &str) -> Result<Option<Principal>> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(principal) = cache.get(principal_uri) {
                tracing::trace!(principal = %principal_uri, "Principal cache hit");
                return Ok(Some(principal.clone()));
            }
        }

        tracing::trace!(principal = %principal_uri, "Principal cache miss");
        let principal = self.inner.get_principal(principal_uri).await?;

        if let Some(ref p) = principal {
            match self.cache.lock() {
                Ok(mut cache) => {
                    cache.put(principal_uri.to_string(), p.clone());
                }
                Err(err) => {
                    tracing::warn!(principal = %principal_uri, error = %err, "Principal cache poisoned");
                }
            }
        }

        Ok(principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use calvault_core::entity::PrincipalKind;

    struct MockDirectory {
        principals: HashMap<String, Principal>,
        lookups: AtomicUsize,
    }

    impl MockDirectory {
        fn with(principals: Vec<Principal>) -> Self {
            Self {
                principals: principals.into_iter().map(|p| (p.uri.clone(), p)).collect(),
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PrincipalDirectory for MockDirectory {
        async fn get_principal(&self, principal_uri: &str) -> Result<Option<Principal>> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.principals.get(principal_uri).cloned())
        }
    }

    fn alice() -> Principal {
        Principal {
            uri: "principals/users/alice".to_string(),
            display_name: Some("Alice".to_string()),
            kind: PrincipalKind::User,
        }
    }

    #[tokio::test]
    async fn test_second_lookup_is_served_from_cache() {
        let directory = Arc::new(MockDirectory::with(vec![alice()]));
        let cached = CachedPrincipalDirectory::new(directory.clone(), 16);

        let first = cached.get_principal("principals/users/alice").await.unwrap();
        let second = cached.get_principal("principals/users/alice").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_principal_is_not_cached() {
        let directory = Arc::new(MockDirectory::with(vec![]));
        let cached = CachedPrincipalDirectory::new(directory.clone(), 16);

        assert!(cached.get_principal("principals/users/ghost").await.unwrap().is_none());
        assert!(cached.get_principal("principals/users/ghost").await.unwrap().is_none());

        // Both lookups reached the directory.
        assert_eq!(directory.lookups.load(Ordering::SeqCst), 2);
    }
}
