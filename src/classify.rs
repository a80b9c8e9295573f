use std::collections::{HashMap, HashSet};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::config::DataPackage;
use crate::domain::{DatasetInfo, JobDescriptor, PxFileType};
use crate::error::PxError;
use crate::registry::FileGraph;
use crate::sample::SampleAccumulator;
use crate::staging::StagingArea;
use crate::template::TemplateParameters;

/// Modification annotation parsed out of a search-result file by the
/// result-rewriting collaborator.
#[derive(Debug, Clone)]
pub struct ModificationRef {
    pub accession: String,
    pub cv: String,
}

/// Search-result files for one job, one path per shard for split
/// searches, plus the modification metadata parsed from them.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub paths: Vec<Utf8PathBuf>,
    pub modifications: Vec<ModificationRef>,
}

/// Produces (or finds) the peak-list file for a dataset.
pub trait PeakListProvider {
    /// A peak list that already exists for the dataset, if any.
    fn existing(&self, dataset: &DatasetInfo) -> Option<Utf8PathBuf>;
    /// Converts the dataset's raw file into a peak list.
    fn convert(&self, job: &JobDescriptor, dataset: &DatasetInfo) -> Result<Utf8PathBuf, PxError>;
}

/// Produces the deprecated aggregate XML result file for a job.
pub trait LegacyResultProvider {
    fn convert(&self, job: &JobDescriptor) -> Result<Utf8PathBuf, PxError>;
}

/// Locates a job's search-result files and their parsed metadata.
pub trait SearchResultProvider {
    fn locate(&self, job: &JobDescriptor) -> Result<SearchResults, PxError>;
}

/// Locates the protein-collection search database a job ran against.
/// `Ok(None)` means database packaging is not configured for this run;
/// a configured provider that cannot find the database fails with
/// `NoFastaAvailable`.
pub trait FastaProvider {
    fn locate(&self, job: &JobDescriptor) -> Result<Option<Utf8PathBuf>, PxError>;
}

#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    /// Produce peak-list files for datasets that lack one.
    pub create_peak_files: bool,
    /// Produce the deprecated aggregate XML result file per job.
    pub include_legacy_results: bool,
    /// Move classified files into the transfer directory on dataset
    /// transitions. Disabled for dry runs.
    pub stage_files: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            create_peak_files: true,
            include_legacy_results: false,
            stage_files: true,
        }
    }
}

/// Search-database combination a job ran against; jobs sharing the
/// combination reuse the first job's registered database file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FastaKey {
    organism_db: String,
    protein_collection_list: String,
    protein_options: String,
}

impl FastaKey {
    fn for_job(job: &JobDescriptor) -> Option<Self> {
        if job.organism_db.is_none() && job.protein_collection_list.is_none() {
            return None;
        }
        Some(Self {
            organism_db: job.organism_db.clone().unwrap_or_default(),
            protein_collection_list: job.protein_collection_list.clone().unwrap_or_default(),
            protein_options: job.protein_options.clone().unwrap_or_default(),
        })
    }
}

/// Tracks which dataset the classifier is currently accumulating. Jobs
/// must arrive grouped by dataset; a dataset that reappears after the
/// cursor moved past it is an ordering bug in the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DatasetCursor {
    Idle,
    Accumulating(String),
}

/// Classifies each job's output files into the file graph and sample
/// accumulator, one job at a time, in dataset-sorted order.
pub struct Classifier<'a, P, L, S, F> {
    peak_lists: &'a P,
    legacy_results: &'a L,
    search_results: &'a S,
    fasta: &'a F,
    options: ClassifyOptions,
    pub graph: FileGraph,
    pub samples: SampleAccumulator,
    staging: StagingArea,
    cursor: DatasetCursor,
    completed_datasets: HashSet<String>,
    /// Dataset name (lower-cased) to peak file id; conversion happens at
    /// most once per dataset per run.
    peak_cache: HashMap<String, u32>,
    fasta_memo: HashMap<FastaKey, u32>,
}

impl<'a, P, L, S, F> Classifier<'a, P, L, S, F>
where
    P: PeakListProvider,
    L: LegacyResultProvider,
    S: SearchResultProvider,
    F: FastaProvider,
{
    pub fn new(
        peak_lists: &'a P,
        legacy_results: &'a L,
        search_results: &'a S,
        fasta: &'a F,
        options: ClassifyOptions,
        transfer_dir: Utf8PathBuf,
    ) -> Self {
        Self {
            peak_lists,
            legacy_results,
            search_results,
            fasta,
            options,
            graph: FileGraph::new(),
            samples: SampleAccumulator::new(),
            staging: StagingArea::new(transfer_dir),
            cursor: DatasetCursor::Idle,
            completed_datasets: HashSet::new(),
            peak_cache: HashMap::new(),
            fasta_memo: HashMap::new(),
        }
    }

    /// Processes one job. Errors abort this job only; the caller decides
    /// when accumulated failures abort the run.
    pub fn process_job(
        &mut self,
        job: &JobDescriptor,
        package: &DataPackage,
        template: &TemplateParameters,
    ) -> Result<(), PxError> {
        self.enter_dataset(&job.dataset_name)?;
        let dataset = package
            .dataset_for_job(job)
            .ok_or(PxError::UnknownDataset {
                job: job.job,
                dataset_id: job.dataset_id,
            })?;

        let peak_id = self.ensure_peak_list(job, dataset)?;

        let legacy_id = if self.options.include_legacy_results {
            Some(self.produce_legacy_result(job)?)
        } else {
            None
        };

        let raw_id = package
            .raw_file_path(&job.dataset_name)
            .map(|path| self.graph.register_file(path, &job.dataset_name, job.job));
        if let Some(id) = raw_id {
            self.graph.register_result(id, PxFileType::Raw)?;
        }

        let search_ids = self.register_search_results(job, dataset, template)?;

        self.build_edges(legacy_id, peak_id, raw_id, &search_ids)?;
        self.ensure_fasta(job)?;

        debug!(
            job = job.job,
            dataset = %job.dataset_name,
            searches = search_ids.len(),
            "job classified"
        );
        Ok(())
    }

    /// Flushes the final dataset and synthesizes a placeholder Raw entry
    /// for every dataset that contributed no jobs, so the reviewer sees
    /// which datasets were silently excluded.
    pub fn finish(&mut self, package: &DataPackage) -> Result<(), PxError> {
        if let DatasetCursor::Accumulating(name) = std::mem::replace(&mut self.cursor, DatasetCursor::Idle)
        {
            self.flush_staging().map_err(|err| PxError::DatasetFlush {
                dataset: name.clone(),
                source: Box::new(err),
            })?;
            self.completed_datasets.insert(name.to_lowercase());
        }

        let mut datasets: Vec<&DatasetInfo> = package.datasets.values().collect();
        datasets.sort_by(|a, b| a.dataset_name.cmp(&b.dataset_name));
        for dataset in datasets {
            if self
                .completed_datasets
                .contains(&dataset.dataset_name.to_lowercase())
            {
                continue;
            }
            let path = package
                .raw_file_path(&dataset.dataset_name)
                .map(Utf8Path::to_owned)
                .unwrap_or_else(|| Utf8PathBuf::from(format!("{}.raw", dataset.dataset_name)));
            let id = self.graph.register_file(&path, &dataset.dataset_name, 0);
            self.graph.register_result(id, PxFileType::Raw)?;
            info!(dataset = %dataset.dataset_name, "no jobs for dataset; placeholder raw entry added");
        }
        Ok(())
    }

    /// Files that could not be removed from the staging area; excluded
    /// from the transfer set.
    pub fn excluded_files(&self) -> &[Utf8PathBuf] {
        self.staging.excluded()
    }

    fn stage(&mut self, path: Utf8PathBuf) {
        if self.options.stage_files {
            self.staging.stage(path);
        }
    }

    fn flush_staging(&mut self) -> Result<(), PxError> {
        if self.options.stage_files {
            self.staging.flush()?;
        }
        Ok(())
    }

    fn enter_dataset(&mut self, dataset_name: &str) -> Result<(), PxError> {
        let key = dataset_name.to_lowercase();
        let previous = match &self.cursor {
            DatasetCursor::Accumulating(current) if current.to_lowercase() == key => {
                return Ok(());
            }
            DatasetCursor::Accumulating(current) => Some(current.clone()),
            DatasetCursor::Idle => None,
        };
        if self.completed_datasets.contains(&key) {
            return Err(PxError::JobOrdering {
                dataset: dataset_name.to_string(),
                current: previous.unwrap_or_else(|| "<idle>".to_string()),
            });
        }
        if let Some(previous) = previous {
            self.flush_staging().map_err(|err| PxError::DatasetFlush {
                dataset: previous.clone(),
                source: Box::new(err),
            })?;
            self.completed_datasets.insert(previous.to_lowercase());
        }
        self.cursor = DatasetCursor::Accumulating(dataset_name.to_string());
        Ok(())
    }

    fn ensure_peak_list(
        &mut self,
        job: &JobDescriptor,
        dataset: &DatasetInfo,
    ) -> Result<Option<u32>, PxError> {
        let key = job.dataset_name.to_lowercase();
        if let Some(&id) = self.peak_cache.get(&key) {
            return Ok(Some(id));
        }

        let path = if let Some(existing) = self.peak_lists.existing(dataset) {
            existing
        } else if !self.options.create_peak_files {
            return Ok(None);
        } else if job.searched_mzml {
            // The search consumed a pre-converted file the provider can
            // no longer find.
            return Err(PxError::FileNotFound(Utf8PathBuf::from(format!(
                "{}.mzML",
                job.dataset_name
            ))));
        } else {
            self.peak_lists.convert(job, dataset)?
        };

        let id = self.graph.register_file(&path, &job.dataset_name, job.job);
        self.graph.register_result(id, PxFileType::Peak)?;
        self.stage(path);
        self.peak_cache.insert(key, id);
        Ok(Some(id))
    }

    fn produce_legacy_result(&mut self, job: &JobDescriptor) -> Result<u32, PxError> {
        let path = self.legacy_results.convert(job)?;
        let id = self.graph.register_file(&path, &job.dataset_name, job.job);
        self.graph.register_result(id, PxFileType::Result)?;
        self.stage(path);
        Ok(id)
    }

    fn register_search_results(
        &mut self,
        job: &JobDescriptor,
        dataset: &DatasetInfo,
        template: &TemplateParameters,
    ) -> Result<Vec<u32>, PxError> {
        let results = self.search_results.locate(job)?;
        if results.paths.is_empty() {
            warn!(job = job.job, "no search-result files located");
            return Ok(Vec::new());
        }
        if job.split_count > 1 && results.paths.len() != job.split_count as usize {
            warn!(
                job = job.job,
                expected = job.split_count,
                found = results.paths.len(),
                "split search shard count mismatch"
            );
        }

        let px_type = if job.result_type.produces_mzid() {
            PxFileType::ResultSearchId
        } else {
            PxFileType::Search
        };

        let sample = self.samples.build_for_job(job, Some(dataset), template);
        let mut ids = Vec::with_capacity(results.paths.len());
        for path in results.paths {
            let id = self.graph.register_file(&path, &job.dataset_name, job.job);
            self.graph.register_result(id, px_type)?;
            let name = self
                .graph
                .record(id)
                .map(|record| record.normalized_name.clone())
                .unwrap_or_default();
            self.samples.assign(&name, sample.clone());
            for modification in &results.modifications {
                self.samples
                    .record_modification(&name, &modification.accession, &modification.cv);
            }
            self.stage(path);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Edge precedence: a legacy aggregate result subsumes the raw/peak
    /// link once present, because the repository infers how a file was
    /// identified from the parent chain.
    fn build_edges(
        &mut self,
        legacy_id: Option<u32>,
        peak_id: Option<u32>,
        raw_id: Option<u32>,
        search_ids: &[u32],
    ) -> Result<(), PxError> {
        if let Some(result_id) = legacy_id {
            if let Some(peak) = peak_id {
                self.graph.add_mapping(result_id, peak)?;
            }
            for &search in search_ids {
                self.graph.add_mapping(result_id, search)?;
            }
            if let Some(raw) = raw_id
                && peak_id.is_none()
                && search_ids.is_empty()
            {
                self.graph.add_mapping(result_id, raw)?;
            }
            return Ok(());
        }

        if let (Some(peak), Some(raw)) = (peak_id, raw_id)
            && search_ids.is_empty()
        {
            self.graph.add_mapping(peak, raw)?;
        }
        for &search in search_ids {
            if let Some(peak) = peak_id {
                self.graph.add_mapping(search, peak)?;
            }
            if let Some(raw) = raw_id {
                self.graph.add_mapping(search, raw)?;
            }
        }
        Ok(())
    }

    fn ensure_fasta(&mut self, job: &JobDescriptor) -> Result<(), PxError> {
        let Some(key) = FastaKey::for_job(job) else {
            return Ok(());
        };
        if self.fasta_memo.contains_key(&key) {
            return Ok(());
        }
        let Some(path) = self.fasta.locate(job)? else {
            return Ok(());
        };
        let id = self.graph.register_file(&path, &job.dataset_name, job.job);
        self.graph.register_result(id, PxFileType::Undefined)?;
        self.stage(path);
        self.fasta_memo.insert(key, id);
        Ok(())
    }
}
