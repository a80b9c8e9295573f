use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Repository-side classification of a submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PxFileType {
    Result,
    ResultSearchId,
    Raw,
    Search,
    Peak,
    Undefined,
}

impl PxFileType {
    /// Column value used in the manifest file table. Both result flavors
    /// are listed as RESULT; the repository does not distinguish them.
    pub fn manifest_name(&self) -> &'static str {
        match self {
            PxFileType::Result | PxFileType::ResultSearchId => "RESULT",
            PxFileType::Raw => "RAW",
            PxFileType::Search => "SEARCH",
            PxFileType::Peak => "PEAK",
            PxFileType::Undefined => "OTHER",
        }
    }

    pub fn is_result(&self) -> bool {
        matches!(self, PxFileType::Result | PxFileType::ResultSearchId)
    }
}

impl fmt::Display for PxFileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manifest_name())
    }
}

/// Result-file family produced by a search tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// MS-GF+ style peptide hits; search results are mzIdentML.
    MsgPeptideHit,
    /// X!Tandem peptide hits.
    XtPeptideHit,
    /// Generic peptide-hit results from other engines.
    PeptideHit,
    Other,
}

impl ResultType {
    /// mzIdentML-producing jobs register their search files as
    /// ResultSearchId; everything else registers plain Search entries.
    pub fn produces_mzid(&self) -> bool {
        matches!(self, ResultType::MsgPeptideHit)
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultType::MsgPeptideHit => "msg_peptide_hit",
            ResultType::XtPeptideHit => "xt_peptide_hit",
            ResultType::PeptideHit => "peptide_hit",
            ResultType::Other => "other",
        };
        write!(f, "{name}")
    }
}

/// One completed analysis job from the data package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job: u64,
    pub dataset_id: u64,
    pub dataset_name: String,
    pub tool_name: String,
    pub result_type: ResultType,
    pub instrument_group: String,
    pub instrument_name: String,
    pub experiment_name: String,
    pub organism_id: u32,
    pub organism_name: String,
    /// Number of shards for a split search; 1 for a normal search.
    #[serde(default = "default_split_count")]
    pub split_count: u32,
    /// True when the search consumed an already-converted mzML file,
    /// in which case no peak list needs to be produced for it.
    #[serde(default)]
    pub searched_mzml: bool,
    #[serde(default)]
    pub organism_db: Option<String>,
    #[serde(default)]
    pub protein_collection_list: Option<String>,
    #[serde(default)]
    pub protein_options: Option<String>,
}

fn default_split_count() -> u32 {
    1
}

/// Dataset-level attributes shared by every job of the dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub dataset_id: u64,
    pub dataset_name: String,
    #[serde(default)]
    pub tissue_id: Option<String>,
    #[serde(default)]
    pub tissue_name: Option<String>,
    #[serde(default)]
    pub raw_file_path: Option<Utf8PathBuf>,
}

/// Sort priority for search tools sharing a dataset. MS-GF+ jobs sort
/// first so the peak-list/raw pairing they establish is reused by the
/// other tools' jobs for the same dataset.
pub fn tool_priority(tool_name: &str) -> u8 {
    let lower = tool_name.to_ascii_lowercase();
    if lower.starts_with("msgfplus") {
        0
    } else if lower.starts_with("xtandem") {
        1
    } else {
        2
    }
}

/// Orders jobs by dataset, then tool priority, then job id. The
/// classifier requires this grouping; see `DatasetCursor`.
pub fn sort_jobs(jobs: &mut [JobDescriptor]) {
    jobs.sort_by(|a, b| {
        a.dataset_name
            .to_ascii_lowercase()
            .cmp(&b.dataset_name.to_ascii_lowercase())
            .then_with(|| tool_priority(&a.tool_name).cmp(&tool_priority(&b.tool_name)))
            .then_with(|| a.job.cmp(&b.job))
    });
}
