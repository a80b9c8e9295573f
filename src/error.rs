use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum PxError {
    #[error("failed to read package descriptor at {0}")]
    DescriptorRead(Utf8PathBuf),

    #[error("failed to parse package descriptor: {0}")]
    DescriptorParse(String),

    #[error("missing template file at {0}")]
    MissingTemplate(Utf8PathBuf),

    #[error("failed to read template file at {0}")]
    TemplateRead(Utf8PathBuf),

    #[error("malformed template line {line}: {reason}")]
    TemplateParse { line: usize, reason: String },

    #[error("job {job} references unknown dataset id {dataset_id}")]
    UnknownDataset { job: u64, dataset_id: u64 },

    #[error("expected file not found: {0}")]
    FileNotFound(Utf8PathBuf),

    #[error("no search database available for job {job}: {detail}")]
    NoFastaAvailable { job: u64, detail: String },

    #[error("peak list conversion failed for dataset {dataset}: {detail}")]
    PeakListConversion { dataset: String, detail: String },

    #[error("legacy result conversion failed for job {job}: {detail}")]
    LegacyResultConversion { job: u64, detail: String },

    #[error("search result lookup failed for job {job}: {detail}")]
    SearchResultLookup { job: u64, detail: String },

    #[error("file id {0} has no registered file record")]
    UnregisteredFile(u32),

    #[error("mapping parent id {0} has no registered file record")]
    UnregisteredParent(u32),

    #[error("file id {0} has no result entry to attach a mapping to")]
    MappingWithoutEntry(u32),

    #[error("jobs are not grouped by dataset: {dataset} reappeared after {current}")]
    JobOrdering { dataset: String, current: String },

    #[error("failed to flush staged files for dataset {dataset}: {source}")]
    DatasetFlush {
        dataset: String,
        #[source]
        source: Box<PxError>,
    },

    #[error("{failed} jobs failed, exceeding the limit of {limit}")]
    TooManyFailures { failed: usize, limit: usize },

    #[error("failed to write manifest at {path}: {detail}")]
    ManifestWrite { path: Utf8PathBuf, detail: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
