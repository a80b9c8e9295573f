use std::collections::{BTreeMap, HashMap};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, error};

use crate::domain::PxFileType;
use crate::error::PxError;
use crate::naming::normalize_file_name;

/// One physical file considered for submission. Created once per
/// distinct normalized name and never deleted during a run.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub file_id: u32,
    pub normalized_name: String,
    pub length_bytes: u64,
    pub content_hash: Option<String>,
    /// Job that first registered the file; diagnostics only.
    pub owning_job: u64,
    pub local_path: Utf8PathBuf,
}

/// The registry's "listed in the submission" view of a file. Raw files
/// referenced only as parents stay plain FileRecords.
#[derive(Debug, Clone)]
pub struct ResultFileEntry {
    pub file_id: u32,
    pub px_file_type: PxFileType,
    /// Parent ids this entry derives from, insertion-ordered, no
    /// duplicates.
    pub parent_file_ids: Vec<u32>,
}

/// Central file graph: synthetic 1-based ids, case-insensitive name
/// deduplication, and directed derived-from edges.
#[derive(Debug, Default)]
pub struct FileGraph {
    records: Vec<FileRecord>,
    ids_by_name: HashMap<String, u32>,
    entries: BTreeMap<u32, ResultFileEntry>,
}

impl FileGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a file, returning the existing id when a file with the
    /// same normalized name (compared case-insensitively) was already
    /// registered. A path that does not exist on disk is valid and
    /// records a zero length; placeholder raw entries rely on this.
    pub fn register_file(&mut self, path: &Utf8Path, dataset_name: &str, job: u64) -> u32 {
        let file_name = path.file_name().unwrap_or(path.as_str());
        let normalized = normalize_file_name(file_name, dataset_name);
        let key = normalized.to_lowercase();

        if let Some(&existing) = self.ids_by_name.get(&key) {
            debug!(file = %normalized, id = existing, "file already registered");
            return existing;
        }

        let length_bytes = fs::metadata(path.as_std_path())
            .map(|meta| meta.len())
            .unwrap_or(0);
        let file_id = self.records.len() as u32 + 1;
        self.records.push(FileRecord {
            file_id,
            normalized_name: normalized,
            length_bytes,
            content_hash: None,
            owning_job: job,
            local_path: path.to_owned(),
        });
        self.ids_by_name.insert(key, file_id);
        file_id
    }

    /// Marks a registered file as a submission entry of the given type.
    /// Registering the same id twice is a no-op success; the first type
    /// wins.
    pub fn register_result(&mut self, file_id: u32, px_file_type: PxFileType) -> Result<(), PxError> {
        if self.record(file_id).is_none() {
            error!(file_id, "register_result called for an unregistered file id");
            return Err(PxError::UnregisteredFile(file_id));
        }
        self.entries.entry(file_id).or_insert_with(|| ResultFileEntry {
            file_id,
            px_file_type,
            parent_file_ids: Vec::new(),
        });
        Ok(())
    }

    /// Records a derived-from edge. The child must already be a result
    /// entry and the parent must at least be a registered file; the
    /// parent does not have to be listed in the submission itself.
    pub fn add_mapping(&mut self, child_id: u32, parent_id: u32) -> Result<(), PxError> {
        if self.record(parent_id).is_none() {
            error!(child_id, parent_id, "mapping parent was never registered");
            return Err(PxError::UnregisteredParent(parent_id));
        }
        let Some(entry) = self.entries.get_mut(&child_id) else {
            error!(child_id, parent_id, "mapping child has no result entry");
            return Err(PxError::MappingWithoutEntry(child_id));
        };
        if !entry.parent_file_ids.contains(&parent_id) {
            entry.parent_file_ids.push(parent_id);
        }
        Ok(())
    }

    pub fn count_by_type(&self, px_file_type: PxFileType) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.px_file_type == px_file_type)
            .count()
    }

    pub fn record(&self, file_id: u32) -> Option<&FileRecord> {
        let index = file_id.checked_sub(1)? as usize;
        self.records.get(index)
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Result entries in file-id order.
    pub fn entries(&self) -> impl Iterator<Item = &ResultFileEntry> {
        self.entries.values()
    }

    pub fn entry(&self, file_id: u32) -> Option<&ResultFileEntry> {
        self.entries.get(&file_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
