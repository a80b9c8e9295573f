use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{DatasetInfo, JobDescriptor};
use crate::error::PxError;

/// On-disk shape of the data-package descriptor.
#[derive(Debug, Serialize, Deserialize)]
pub struct Descriptor {
    pub package_id: u64,
    pub package_name: String,
    #[serde(default)]
    pub jobs: Vec<JobDescriptor>,
    #[serde(default)]
    pub datasets: Vec<DatasetInfo>,
    /// Dataset name to instrument-file path, for datasets whose raw
    /// file is already available locally.
    #[serde(default)]
    pub raw_files: HashMap<String, Utf8PathBuf>,
}

/// Validated package: every job references a known dataset, and dataset
/// lookups are keyed for the classifier.
#[derive(Debug, Clone)]
pub struct DataPackage {
    pub package_id: u64,
    pub package_name: String,
    pub jobs: Vec<JobDescriptor>,
    pub datasets: HashMap<u64, DatasetInfo>,
    pub raw_files: HashMap<String, Utf8PathBuf>,
}

impl DataPackage {
    pub fn dataset_for_job(&self, job: &JobDescriptor) -> Option<&DatasetInfo> {
        self.datasets.get(&job.dataset_id)
    }

    /// Raw-file path for a dataset, preferring the explicit map over
    /// the dataset record.
    pub fn raw_file_path(&self, dataset_name: &str) -> Option<&Utf8Path> {
        if let Some(path) = self.raw_files.get(dataset_name) {
            return Some(path.as_path());
        }
        self.datasets
            .values()
            .find(|info| info.dataset_name == dataset_name)
            .and_then(|info| info.raw_file_path.as_deref())
    }
}

pub struct DescriptorLoader;

impl DescriptorLoader {
    pub fn resolve(path: &Utf8Path) -> Result<DataPackage, PxError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| PxError::DescriptorRead(path.to_owned()))?;
        let descriptor: Descriptor = serde_json::from_str(&content)
            .map_err(|err| PxError::DescriptorParse(err.to_string()))?;
        Self::resolve_descriptor(descriptor)
    }

    pub fn resolve_descriptor(descriptor: Descriptor) -> Result<DataPackage, PxError> {
        let datasets: HashMap<u64, DatasetInfo> = descriptor
            .datasets
            .into_iter()
            .map(|info| (info.dataset_id, info))
            .collect();

        for job in &descriptor.jobs {
            if !datasets.contains_key(&job.dataset_id) {
                return Err(PxError::UnknownDataset {
                    job: job.job,
                    dataset_id: job.dataset_id,
                });
            }
        }

        Ok(DataPackage {
            package_id: descriptor.package_id,
            package_name: descriptor.package_name,
            jobs: descriptor.jobs,
            datasets,
            raw_files: descriptor.raw_files,
        })
    }
}
