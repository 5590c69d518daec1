//! Record store for prescription documents.
//!
//! [`JsonFileStore`] keeps every document in one JSON file keyed by
//! document id. A sibling `.lock` file serialises access: readers take a
//! shared lock, and [`RecordStore::transact`] holds an exclusive lock across
//! the whole read-modify-write so concurrent toggles cannot overwrite each
//! other. Writes go through a temp file that is synced and renamed over the
//! original.
//!
//! Documents are kept as raw JSON text until they are parsed, so a document
//! that fails to parse is skipped on read (with a warning) and written back
//! byte for byte. One bad record never takes the others down, and a bad
//! record can still be deleted by its owner.

use crate::{Error, Medicine, Prescription, Result, StoredPrescription};
use fs2::FileExt;
use serde::Deserialize;
use serde_json::value::{to_raw_value, RawValue};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use uuid::Uuid;

/// Document-store operations the pillbox needs
pub trait RecordStore {
    /// All prescriptions owned by `owner_id`, oldest first
    fn query_by_owner(&self, owner_id: &str) -> Result<Vec<StoredPrescription>>;

    fn get(&self, id: Uuid) -> Result<Option<StoredPrescription>>;

    /// Store a new document and return its id
    fn insert(&mut self, prescription: Prescription) -> Result<Uuid>;

    /// Owner of a stored document. Only the owner field has to be readable,
    /// so documents that are otherwise malformed can still be removed.
    fn owner_of(&self, id: Uuid) -> Result<Option<String>>;

    /// Returns false if there was nothing to delete
    fn delete(&mut self, id: Uuid) -> Result<bool>;

    /// Read the latest copy of one document, apply `f`, and write it back
    /// as one step. Nothing is written if `f` fails.
    fn transact(
        &mut self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Prescription) -> Result<()>,
    ) -> Result<Prescription>;

    /// Replace a document's medicine list
    fn replace_medicines(&mut self, id: Uuid, medicines: Vec<Medicine>) -> Result<()> {
        let mut medicines = Some(medicines);
        self.transact(id, &mut |p| {
            if let Some(list) = medicines.take() {
                p.medicines = list;
            }
            Ok(())
        })
        .map(|_| ())
    }
}

fn sort_oldest_first(list: &mut [StoredPrescription]) {
    list.sort_by(|a, b| {
        a.prescription
            .created_at
            .cmp(&b.prescription.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ============================================================================
// JSON file store
// ============================================================================

type Documents = BTreeMap<String, Box<RawValue>>;

/// Single-file JSON document store with file locking
pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by the given file. Nothing is touched on disk
    /// until the first operation.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock_path = path.with_extension("json.lock");
        Self { path, lock_path }
    }

    fn open_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        Ok(file)
    }

    fn read_documents(&self) -> Result<Documents> {
        if !self.path.exists() {
            return Ok(Documents::new());
        }

        let contents = std::fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(Documents::new());
        }

        serde_json::from_str(&contents).map_err(|e| {
            Error::Store(format!(
                "{:?} is not a valid document file: {}",
                self.path, e
            ))
        })
    }

    fn write_documents(&self, documents: &Documents) -> Result<()> {
        let parent = self.path.parent().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "store path missing parent")
        })?;
        std::fs::create_dir_all(parent)?;

        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, documents)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        temp.as_file().sync_all()?;
        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Wrote {} documents to {:?}", documents.len(), self.path);
        Ok(())
    }

    fn read_shared<T>(&self, f: impl FnOnce(&Documents) -> Result<T>) -> Result<T> {
        let lock = self.open_lock()?;
        lock.lock_shared()?;
        let result = self.read_documents().and_then(|docs| f(&docs));
        lock.unlock()?;
        result
    }

    /// Run `f` under the exclusive lock; the documents are written back
    /// only when `f` succeeds and reports a change.
    fn modify<T>(&self, f: impl FnOnce(&mut Documents) -> Result<(T, bool)>) -> Result<T> {
        let lock = self.open_lock()?;
        lock.lock_exclusive()?;
        let result = self.read_documents().and_then(|mut docs| {
            let (value, changed) = f(&mut docs)?;
            if changed {
                self.write_documents(&docs)?;
            }
            Ok(value)
        });
        lock.unlock()?;
        result
    }
}

fn parse_document(key: &str, raw: &RawValue) -> Option<StoredPrescription> {
    let id = match Uuid::parse_str(key) {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Skipping document with invalid id {:?}: {}", key, e);
            return None;
        }
    };

    match serde_json::from_str::<Prescription>(raw.get()) {
        Ok(prescription) => Some(StoredPrescription { id, prescription }),
        Err(e) => {
            tracing::warn!("Skipping malformed document {}: {}", id, e);
            None
        }
    }
}

/// Just the owner field, for documents whose body does not parse
#[derive(Deserialize)]
struct OwnerField {
    #[serde(rename = "ownerId", alias = "userId")]
    owner_id: Option<String>,
}

fn document_owner(raw: &RawValue) -> Option<String> {
    serde_json::from_str::<OwnerField>(raw.get())
        .ok()
        .and_then(|doc| doc.owner_id)
}

impl RecordStore for JsonFileStore {
    fn query_by_owner(&self, owner_id: &str) -> Result<Vec<StoredPrescription>> {
        let mut found = self.read_shared(|docs| {
            Ok(docs
                .iter()
                .filter_map(|(key, value)| parse_document(key, value))
                .filter(|doc| doc.prescription.owner_id == owner_id)
                .collect::<Vec<_>>())
        })?;
        sort_oldest_first(&mut found);
        tracing::debug!("Found {} prescriptions for {}", found.len(), owner_id);
        Ok(found)
    }

    fn get(&self, id: Uuid) -> Result<Option<StoredPrescription>> {
        self.read_shared(|docs| {
            Ok(docs
                .get(&id.to_string())
                .and_then(|raw| parse_document(&id.to_string(), raw)))
        })
    }

    fn owner_of(&self, id: Uuid) -> Result<Option<String>> {
        self.read_shared(|docs| Ok(docs.get(&id.to_string()).and_then(|raw| document_owner(raw))))
    }

    fn insert(&mut self, prescription: Prescription) -> Result<Uuid> {
        let value = to_raw_value(&prescription)?;
        let id = self.modify(|docs| {
            let mut id = Uuid::new_v4();
            while docs.contains_key(&id.to_string()) {
                id = Uuid::new_v4();
            }
            docs.insert(id.to_string(), value);
            Ok((id, true))
        })?;
        tracing::info!("Inserted prescription {}", id);
        Ok(id)
    }

    fn delete(&mut self, id: Uuid) -> Result<bool> {
        let removed = self.modify(|docs| {
            let removed = docs.remove(&id.to_string()).is_some();
            Ok((removed, removed))
        })?;
        if removed {
            tracing::info!("Deleted prescription {}", id);
        }
        Ok(removed)
    }

    fn transact(
        &mut self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Prescription) -> Result<()>,
    ) -> Result<Prescription> {
        self.modify(|docs| {
            let key = id.to_string();
            let raw = docs
                .get(&key)
                .ok_or_else(|| Error::NotFound(format!("prescription {}", id)))?;
            let mut prescription = serde_json::from_str::<Prescription>(raw.get()).map_err(|e| {
                Error::Store(format!("prescription {} is malformed: {}", id, e))
            })?;

            f(&mut prescription)?;

            docs.insert(key, to_raw_value(&prescription)?);
            Ok((prescription, true))
        })
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Store that lives only as long as the value; useful for tests and
/// embedding
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    documents: BTreeMap<Uuid, Prescription>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl RecordStore for MemoryStore {
    fn query_by_owner(&self, owner_id: &str) -> Result<Vec<StoredPrescription>> {
        let mut found: Vec<_> = self
            .documents
            .iter()
            .filter(|(_, p)| p.owner_id == owner_id)
            .map(|(id, p)| StoredPrescription {
                id: *id,
                prescription: p.clone(),
            })
            .collect();
        sort_oldest_first(&mut found);
        Ok(found)
    }

    fn get(&self, id: Uuid) -> Result<Option<StoredPrescription>> {
        Ok(self.documents.get(&id).map(|p| StoredPrescription {
            id,
            prescription: p.clone(),
        }))
    }

    fn insert(&mut self, prescription: Prescription) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.documents.insert(id, prescription);
        Ok(id)
    }

    fn owner_of(&self, id: Uuid) -> Result<Option<String>> {
        Ok(self.documents.get(&id).map(|p| p.owner_id.clone()))
    }

    fn delete(&mut self, id: Uuid) -> Result<bool> {
        Ok(self.documents.remove(&id).is_some())
    }

    fn transact(
        &mut self,
        id: Uuid,
        f: &mut dyn FnMut(&mut Prescription) -> Result<()>,
    ) -> Result<Prescription> {
        let current = self
            .documents
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prescription {}", id)))?;
        let mut updated = current.clone();
        f(&mut updated)?;
        self.documents.insert(id, updated.clone());
        Ok(updated)
    }
}
