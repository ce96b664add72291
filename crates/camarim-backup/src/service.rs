//! # Backup Service
//!
//! Thin orchestration between the tiered store and the backup client:
//! pack the data set into a named blob on the way up, validate and save
//! it on the way down. The heavy lifting stays in the store and the
//! client; this module only sequences it.
//!
//! ## Backup Names
//! `<prefix>-<UTC timestamp>.json`, e.g.
//! `camarim-backup-20260806-101500.json`. The timestamp makes listings
//! sort the same way by name and by creation time.

use chrono::Utc;
use tracing::{info, warn};

use camarim_core::validation::validate_system_data;
use camarim_core::SystemData;
use camarim_store::TieredStore;

use crate::client::{BackupClient, BackupFile};
use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};

// =============================================================================
// Public Types
// =============================================================================

/// What a restore brought back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Remote file the data came from.
    pub name: String,
    /// Number of products restored.
    pub products: usize,
    /// Number of sales restored.
    pub sales: usize,
}

// =============================================================================
// Backup Service
// =============================================================================

/// Backup/restore orchestration over a [`TieredStore`] and a
/// [`BackupClient`].
pub struct BackupService<C: BackupClient> {
    client: C,
    prefix: String,
    keep_last: usize,
}

impl<C: BackupClient> BackupService<C> {
    /// Creates a service from a client and the backup configuration.
    pub fn new(client: C, config: &BackupConfig) -> Self {
        BackupService {
            client,
            prefix: config.backup.prefix.clone(),
            keep_last: config.backup.keep_last,
        }
    }

    /// Enumerates existing backups, newest first.
    pub async fn list(&self) -> BackupResult<Vec<BackupFile>> {
        self.client.list_backups().await
    }

    /// Deletes a named backup.
    pub async fn delete(&self, name: &str) -> BackupResult<()> {
        self.client.delete_backup(name).await
    }

    /// Uploads the current data set as a new backup, then prunes old
    /// backups beyond the retention limit.
    ///
    /// Pruning failures are logged, not propagated: the upload already
    /// succeeded and that is the result the caller cares about.
    pub async fn backup_now(&self, store: &TieredStore) -> BackupResult<BackupFile> {
        let data = store.load().await;
        let blob = serde_json::to_string(&data)?;
        let name = format!(
            "{}-{}.json",
            self.prefix,
            Utc::now().format("%Y%m%d-%H%M%S")
        );

        info!(
            name = %name,
            products = data.products.len(),
            sales = data.sales.len(),
            "Creating cloud backup"
        );

        let uploaded = self.client.upload_backup(&name, &blob).await?;

        if let Err(e) = self.prune().await {
            warn!(error = %e, "Pruning old backups failed");
        }

        Ok(uploaded)
    }

    /// Restores the newest backup.
    pub async fn restore_latest(&self, store: &TieredStore) -> BackupResult<RestoreReport> {
        let backups = self.client.list_backups().await?;
        let latest = backups
            .first()
            .map(|f| f.name.clone())
            .ok_or_else(|| BackupError::NotFound("no backups exist".to_string()))?;
        self.restore(store, &latest).await
    }

    /// Restores a named backup: download, parse, validate, save through
    /// the adapter.
    ///
    /// The downloaded data set is validated before it may overwrite the
    /// live one; a backup with duplicate ids or broken records is
    /// rejected untouched.
    pub async fn restore(&self, store: &TieredStore, name: &str) -> BackupResult<RestoreReport> {
        let blob = self.client.download_backup(name).await?;

        let mut data: SystemData = serde_json::from_str(&blob)
            .map_err(|e| BackupError::InvalidBackup(e.to_string()))?;
        data.settings.ensure_defaults();

        validate_system_data(&data)?;

        let outcome = store.save(&data).await;
        if !outcome.committed() {
            return Err(BackupError::LocalSaveFailed(format!(
                "backend {} rejected the restored data set",
                outcome.backend
            )));
        }

        info!(
            name = %name,
            products = data.products.len(),
            sales = data.sales.len(),
            "Backup restored"
        );

        Ok(RestoreReport {
            name: name.to_string(),
            products: data.products.len(),
            sales: data.sales.len(),
        })
    }

    /// Deletes backups beyond the retention limit (listing is newest
    /// first, so everything past `keep_last` goes).
    async fn prune(&self) -> BackupResult<()> {
        if self.keep_last == 0 {
            return Ok(());
        }

        let backups = self.client.list_backups().await?;
        for old in backups.iter().skip(self.keep_last) {
            match self.client.delete_backup(&old.name).await {
                Ok(()) => info!(name = %old.name, "Pruned old backup"),
                Err(e) => warn!(name = %old.name, error = %e, "Failed to prune backup"),
            }
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex;

    use camarim_core::types::Product;
    use camarim_store::{FallbackStore, MemoryKv, StoreConfig, TieredStore};

    /// In-memory stand-in for the cloud, with monotonically increasing
    /// creation times so listings have a defined order.
    struct MemoryBackupClient {
        files: Mutex<Vec<(BackupFile, String)>>,
        clock: AtomicI64,
    }

    impl MemoryBackupClient {
        fn new() -> Self {
            MemoryBackupClient {
                files: Mutex::new(Vec::new()),
                clock: AtomicI64::new(0),
            }
        }

        fn names(&self) -> Vec<String> {
            let mut files = self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(f, _)| f.clone())
                .collect::<Vec<_>>();
            files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            files.into_iter().map(|f| f.name).collect()
        }
    }

    #[async_trait]
    impl BackupClient for MemoryBackupClient {
        async fn list_backups(&self) -> BackupResult<Vec<BackupFile>> {
            let mut files: Vec<BackupFile> = self
                .files
                .lock()
                .unwrap()
                .iter()
                .map(|(f, _)| f.clone())
                .collect();
            files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(files)
        }

        async fn upload_backup(&self, name: &str, content: &str) -> BackupResult<BackupFile> {
            let tick = self.clock.fetch_add(1, Ordering::SeqCst);
            let file = BackupFile {
                name: name.to_string(),
                size: content.len() as u64,
                created_at: Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
                    + ChronoDuration::seconds(tick),
            };
            let mut files = self.files.lock().unwrap();
            files.retain(|(f, _)| f.name != name);
            files.push((file.clone(), content.to_string()));
            Ok(file)
        }

        async fn download_backup(&self, name: &str) -> BackupResult<String> {
            self.files
                .lock()
                .unwrap()
                .iter()
                .find(|(f, _)| f.name == name)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| BackupError::NotFound(name.to_string()))
        }

        async fn delete_backup(&self, name: &str) -> BackupResult<()> {
            let mut files = self.files.lock().unwrap();
            let before = files.len();
            files.retain(|(f, _)| f.name != name);
            if files.len() == before {
                return Err(BackupError::NotFound(name.to_string()));
            }
            Ok(())
        }
    }

    fn service_with(keep_last: usize) -> BackupService<MemoryBackupClient> {
        let mut config = BackupConfig::default();
        config.backup.keep_last = keep_last;
        BackupService::new(MemoryBackupClient::new(), &config)
    }

    async fn ready_store() -> TieredStore {
        let mut store = TieredStore::new(FallbackStore::new(Box::new(MemoryKv::new())));
        store.init(StoreConfig::in_memory()).await;
        store
    }

    fn data_with_products(count: i64) -> SystemData {
        SystemData {
            products: (1..=count)
                .map(|id| Product {
                    id,
                    name: format!("Product {id}"),
                    category: "General".to_string(),
                    price_cents: 500,
                    cost_cents: None,
                    stock: 10,
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_backup_then_restore_round_trips() {
        let service = service_with(10);
        let store = ready_store().await;

        let data = data_with_products(3);
        assert!(store.save(&data).await.committed());

        let uploaded = service.backup_now(&store).await.unwrap();
        assert!(uploaded.name.starts_with("camarim-backup-"));
        assert!(uploaded.name.ends_with(".json"));

        // Wipe local state, then restore
        assert!(store.save(&SystemData::default()).await.committed());
        assert!(store.load().await.is_empty());

        let report = service.restore_latest(&store).await.unwrap();
        assert_eq!(report.products, 3);
        assert_eq!(store.load().await, data);
    }

    #[tokio::test]
    async fn test_retention_prunes_oldest_backups() {
        let service = service_with(2);
        let store = ready_store().await;
        store.save(&data_with_products(1)).await;

        // Distinct names so retention has something to prune
        for i in 0..4 {
            let blob = serde_json::to_string(&store.load().await).unwrap();
            service
                .client
                .upload_backup(&format!("camarim-backup-2026080{i}-000000.json"), &blob)
                .await
                .unwrap();
        }

        // The next backup_now triggers pruning down to keep_last
        service.backup_now(&store).await.unwrap();

        let names = service.client.names();
        assert_eq!(names.len(), 2);
        // Newest first: the fresh upload plus the most recent synthetic one
        assert!(names[1].starts_with("camarim-backup-20260803"));
    }

    #[tokio::test]
    async fn test_restore_rejects_invalid_backup() {
        let service = service_with(10);
        let store = ready_store().await;

        let live = data_with_products(2);
        store.save(&live).await;

        // Duplicate product ids in the remote blob
        let mut bad = data_with_products(2);
        bad.products[1].id = bad.products[0].id;
        let blob = serde_json::to_string(&bad).unwrap();
        service
            .client
            .upload_backup("camarim-backup-bad.json", &blob)
            .await
            .unwrap();

        let err = service
            .restore(&store, "camarim-backup-bad.json")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidBackup(_)));

        // Live data untouched by the rejected restore
        assert_eq!(store.load().await, live);
    }

    #[tokio::test]
    async fn test_restore_latest_with_no_backups_errors() {
        let service = service_with(10);
        let store = ready_store().await;

        let err = service.restore_latest(&store).await.unwrap_err();
        assert!(matches!(err, BackupError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_restore_unparseable_blob_rejected() {
        let service = service_with(10);
        let store = ready_store().await;

        service
            .client
            .upload_backup("camarim-backup-trash.json", "not a data set")
            .await
            .unwrap();

        let err = service
            .restore(&store, "camarim-backup-trash.json")
            .await
            .unwrap_err();
        assert!(matches!(err, BackupError::InvalidBackup(_)));
    }
}
