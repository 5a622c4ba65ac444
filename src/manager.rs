//! Per-tenant vault lifecycle: lazily opens one vault per owner id and
//! caches it behind a read-mostly lock, double-checked so the common
//! case only takes a read lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::VaultManagerConfig;
use crate::error::{Error, Result};
use crate::lang::Language;
use crate::vault::Vault;

pub struct VaultManager {
    cfg: VaultManagerConfig,
    vaults: RwLock<HashMap<u64, Arc<Vault>>>,
    /// Advisory per-owner language cache; the per-vault
    /// `settings("language")` row is the authoritative value, this just
    /// saves a lookup on the hot path. Guarded by its own mutex, never the
    /// vault map's lock.
    language_cache: Mutex<HashMap<u64, Language>>,
}

impl VaultManager {
    pub fn new(cfg: VaultManagerConfig) -> Self {
        Self {
            cfg,
            vaults: RwLock::new(HashMap::new()),
            language_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_language(&self, owner_id: u64) -> Option<Language> {
        self.language_cache.lock().unwrap_or_else(|e| e.into_inner()).get(&owner_id).copied()
    }

    pub fn cache_language(&self, owner_id: u64, language: Language) {
        self.language_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(owner_id, language);
    }

    pub fn config(&self) -> &VaultManagerConfig {
        &self.cfg
    }

    pub fn user_dir(&self, owner_id: u64) -> PathBuf {
        self.cfg.data_dir.join("users").join(owner_id.to_string())
    }

    pub fn image_dir(&self, owner_id: u64) -> PathBuf {
        self.user_dir(owner_id).join("images")
    }

    /// Returns the owner's vault, opening and caching it on first access.
    /// Double-checked: the common case only takes a read lock.
    pub async fn get_vault(&self, owner_id: u64) -> Result<Arc<Vault>> {
        if let Some(vault) = self.vaults.read().await.get(&owner_id) {
            return Ok(Arc::clone(vault));
        }

        let mut vaults = self.vaults.write().await;
        if let Some(vault) = vaults.get(&owner_id) {
            return Ok(Arc::clone(vault));
        }

        let db_path = self.user_dir(owner_id).join("vault.db");
        debug!(owner_id, path = %db_path.display(), "opening vault");
        let open_path = db_path.clone();
        let vault = tokio::task::spawn_blocking(move || Vault::open(open_path))
            .await
            .expect("vault open task panicked")
            .map_err(|source| Error::VaultOpen { owner_id, path: db_path, source: Box::new(source) })?;
        let vault = Arc::new(vault);
        vaults.insert(owner_id, Arc::clone(&vault));
        Ok(vault)
    }

    /// Evicts and checkpoints every cached vault. Intended for graceful
    /// shutdown, not per-request use.
    pub async fn close(&self) -> Result<()> {
        let mut vaults = self.vaults.write().await;
        for (owner_id, vault) in vaults.drain() {
            let vault = Arc::clone(&vault);
            let result = tokio::task::spawn_blocking(move || vault.checkpoint())
                .await
                .expect("checkpoint task panicked");
            if let Err(err) = result {
                tracing::warn!(owner_id, %err, "failed to checkpoint vault on close");
            }
        }
        info!("vault manager closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn get_vault_caches_per_owner() {
        let dir = tempdir().unwrap();
        let cfg = VaultManagerConfig { data_dir: dir.path().to_path_buf(), ..Default::default() };
        let manager = VaultManager::new(cfg);

        let a1 = manager.get_vault(1).await.unwrap();
        let a2 = manager.get_vault(1).await.unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));

        let b = manager.get_vault(2).await.unwrap();
        assert!(!Arc::ptr_eq(&a1, &b));

        assert!(manager.user_dir(1).join("vault.db").exists());
    }

    #[tokio::test]
    async fn concurrent_get_vault_for_same_owner_opens_once() {
        let dir = tempdir().unwrap();
        let cfg = VaultManagerConfig { data_dir: dir.path().to_path_buf(), ..Default::default() };
        let manager = Arc::new(VaultManager::new(cfg));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move { manager.get_vault(7).await.unwrap() }));
        }

        let mut vaults = Vec::new();
        for h in handles {
            vaults.push(h.await.unwrap());
        }
        let first = &vaults[0];
        assert!(vaults.iter().all(|v| Arc::ptr_eq(v, first)));
    }
}
