// ============================================================================
// Draft Store - Pending wizard session persistence (redb)
// ============================================================================
// Holds at most one pending session so an interrupted trade-in can resume.
// Path comes from SwapConfig::draft_path, else ~/.tradein/drafts.redb
// ============================================================================

use anyhow::{anyhow, Result};
use redb::{Database, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::SwapConfig;
use crate::wizard::WizardSession;

const DRAFTS: TableDefinition<&str, &[u8]> = TableDefinition::new("drafts");
const PENDING_KEY: &str = "drafts:pending";

/// Where a pending session is kept between runs
pub trait DraftStore: Send + Sync {
    fn save(&self, session: &WizardSession) -> Result<()>;
    fn load(&self) -> Result<Option<WizardSession>>;
    fn clear(&self) -> Result<()>;
}

/// Draft store backed by an embedded redb file
pub struct RedbDraftStore {
    db: Database,
    path: PathBuf,
}

impl RedbDraftStore {
    /// Open the draft database named by `config`
    pub fn from_config(config: &SwapConfig) -> Result<Self> {
        Self::open(config.draft_path.as_deref())
    }

    /// Open (or create) the draft database.
    /// If `path` is None, uses ~/.tradein/drafts.redb
    pub fn open(path: Option<&str>) -> Result<Self> {
        let db_path = match path {
            Some(p) => PathBuf::from(p),
            None => default_path()?,
        };

        debug!("Opening draft store at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open draft store: {}", e))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(DRAFTS)
                .map_err(|e| anyhow!("Failed to create drafts table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn default_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
    let tradein_dir = home.join(".tradein");
    std::fs::create_dir_all(&tradein_dir)
        .map_err(|e| anyhow!("Failed to create .tradein directory: {}", e))?;
    Ok(tradein_dir.join("drafts.redb"))
}

impl DraftStore for RedbDraftStore {
    fn save(&self, session: &WizardSession) -> Result<()> {
        let value = bincode::serialize(session)
            .map_err(|e| anyhow!("Failed to serialize draft: {}", e))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(DRAFTS)
                .map_err(|e| anyhow!("Failed to open drafts table: {}", e))?;
            table.insert(PENDING_KEY, value.as_slice())
                .map_err(|e| anyhow!("Failed to insert draft: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        info!(
            "Saved draft at step {} with {} device(s)",
            session.step(),
            session.device_count()
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<WizardSession>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(DRAFTS)
            .map_err(|e| anyhow!("Failed to open drafts table: {}", e))?;

        let Some(value) = table
            .get(PENDING_KEY)
            .map_err(|e| anyhow!("Failed to get draft: {}", e))?
        else {
            return Ok(None);
        };

        match bincode::deserialize::<WizardSession>(value.value()) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                // unreadable drafts are treated as absent
                warn!("Ignoring unreadable draft: {}", e);
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<()> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed = {
            let mut table = write_txn.open_table(DRAFTS)
                .map_err(|e| anyhow!("Failed to open drafts table: {}", e))?;
            let removed = table
                .remove(PENDING_KEY)
                .map_err(|e| anyhow!("Failed to remove draft: {}", e))?
                .is_some();
            removed
        };
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        if removed {
            info!("Cleared pending draft");
        }
        Ok(())
    }
}

/// Draft store that lives only as long as the process
#[derive(Default)]
pub struct MemoryDraftStore {
    slot: Mutex<Option<WizardSession>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DraftStore for MemoryDraftStore {
    fn save(&self, session: &WizardSession) -> Result<()> {
        let mut slot = self.slot.lock().map_err(|_| anyhow!("Draft lock poisoned"))?;
        *slot = Some(session.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<WizardSession>> {
        let slot = self.slot.lock().map_err(|_| anyhow!("Draft lock poisoned"))?;
        Ok(slot.clone())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self.slot.lock().map_err(|_| anyhow!("Draft lock poisoned"))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DevicePatch;
    use crate::types::{Contact, TargetSelection, WizardStep};

    fn sample_session() -> WizardSession {
        let session = WizardSession::new().with_device_count(2).go_next();
        let id = session.devices()[0].id.clone();
        session
            .with_device_update(
                &id,
                DevicePatch {
                    brand: Some("Apple".into()),
                    storage: Some("256GB".into()),
                    issues: Some(vec!["Camera".into()]),
                    battery_health: Some(Some(87.5)),
                    ..DevicePatch::default()
                },
            )
            .with_images(&id, vec!["data:image/png;base64,AAAA".into()])
            .with_contact(Contact {
                email: "jane@example.com".into(),
                ..Contact::default()
            })
            .with_target(TargetSelection {
                id: "12".into(),
                price: 500.0,
            })
    }

    fn open_temp(dir: &tempfile::TempDir) -> RedbDraftStore {
        let path = dir.path().join("drafts.redb");
        RedbDraftStore::open(Some(path.to_str().unwrap())).unwrap()
    }

    #[test]
    fn test_from_config_uses_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configured.redb");
        let config = SwapConfig::from_lookup(|key| match key {
            "TRADEIN_DRAFT_PATH" => Some(path.to_str().unwrap().to_string()),
            _ => None,
        });
        assert_eq!(config.draft_path.as_deref(), path.to_str());

        let store = RedbDraftStore::from_config(&config).unwrap();
        assert_eq!(store.path(), path.as_path());
        assert!(path.exists());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_redb_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_temp(&dir);

        assert!(store.load().unwrap().is_none());

        let session = sample_session();
        store.save(&session).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(loaded.step(), WizardStep::Details);
    }

    #[test]
    fn test_redb_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let session = sample_session();
        {
            let store = open_temp(&dir);
            store.save(&session).unwrap();
        }
        let store = open_temp(&dir);
        assert_eq!(store.load().unwrap(), Some(session));
    }

    #[test]
    fn test_redb_save_overwrites_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_temp(&dir);

        store.save(&WizardSession::new()).unwrap();
        let session = sample_session();
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_draft_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_temp(&dir);

        let write_txn = store.db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(DRAFTS).unwrap();
            table.insert(PENDING_KEY, [0xffu8, 0x01].as_slice()).unwrap();
        }
        write_txn.commit().unwrap();

        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryDraftStore::new();
        assert!(store.load().unwrap().is_none());
        let session = sample_session();
        store.save(&session).unwrap();
        assert_eq!(store.load().unwrap(), Some(session));
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
