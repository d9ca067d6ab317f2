//! In-process feature flag snapshot.
//!
//! Flags load from the database into a shared snapshot that request paths
//! read without touching storage. Writers (the admin path and the auto-stop
//! monitor) update the table and refresh the snapshot.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::error::RepositoryError;
use crate::models::feature_flag;
use crate::repositories::FeatureFlagRepository;

/// Process-wide flag snapshot. Cloning shares the underlying map.
#[derive(Clone)]
pub struct FlagStore {
    repo: FeatureFlagRepository,
    snapshot: Arc<RwLock<HashMap<String, feature_flag::Model>>>,
}

impl FlagStore {
    pub fn new(repo: FeatureFlagRepository) -> Self {
        Self {
            repo,
            snapshot: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Reload every flag from storage into the snapshot.
    pub async fn refresh(&self) -> Result<(), RepositoryError> {
        let flags = self.repo.all().await?;
        let mut map = HashMap::with_capacity(flags.len());
        for flag in flags {
            map.insert(flag.flag_key.clone(), flag);
        }

        *self.snapshot.write().expect("flag snapshot lock") = map;
        Ok(())
    }

    /// Boolean flag reading from the snapshot; `default` when absent.
    pub fn get_bool(&self, flag_key: &str, default: bool) -> bool {
        self.snapshot
            .read()
            .expect("flag snapshot lock")
            .get(flag_key)
            .map(|flag| flag.as_bool())
            .unwrap_or(default)
    }

    /// Numeric flag reading from the snapshot; `default` when absent or not
    /// a double.
    pub fn get_f64(&self, flag_key: &str, default: f64) -> f64 {
        self.snapshot
            .read()
            .expect("flag snapshot lock")
            .get(flag_key)
            .and_then(|flag| flag.as_f64())
            .unwrap_or(default)
    }

    /// Persist a boolean flag and refresh the snapshot.
    pub async fn set_bool(
        &self,
        flag_key: &str,
        value: bool,
        environment: &str,
    ) -> Result<(), RepositoryError> {
        self.repo.set_bool(flag_key, value, environment).await?;
        if let Err(err) = self.refresh().await {
            warn!(flag_key, error = %err, "flag snapshot refresh failed after write");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn snapshot_reflects_writes() {
        let db = Arc::new(test_pool().await);
        let store = FlagStore::new(FeatureFlagRepository::new(db));

        assert!(store.get_bool("experiment.exp.enabled", true), "default wins before load");

        store
            .set_bool("experiment.exp.enabled", false, "test")
            .await
            .unwrap();
        assert!(!store.get_bool("experiment.exp.enabled", true));

        store
            .set_bool("experiment.exp.enabled", true, "test")
            .await
            .unwrap();
        assert!(store.get_bool("experiment.exp.enabled", false));
    }
}
