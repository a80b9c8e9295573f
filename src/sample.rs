use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::cv::{format_cv, validate_cv};
use crate::domain::{DatasetInfo, JobDescriptor};
use crate::template::TemplateParameters;

/// NEWT id used when a job's organism was never classified.
pub const UNCLASSIFIED_SPECIES_ID: u32 = 2323;
pub const UNCLASSIFIED_SPECIES_NAME: &str = "unclassified Bacteria";

/// Default tissue term when neither the dataset nor the template names
/// one.
pub const DEFAULT_TISSUE_CV: &str = "[PRIDE, PRIDE:0000442, Tissue not applicable to dataset, ]";

/// Biological and instrument annotation carried by one result file.
#[derive(Debug, Clone, Default)]
pub struct SampleMetadata {
    pub species: String,
    pub tissue: String,
    pub cell_type: String,
    pub disease: String,
    /// Modification CV strings keyed by ontology accession.
    pub modifications: BTreeMap<String, String>,
    pub instrument_group: String,
    pub instrument_name: String,
    pub quantification: String,
    pub experimental_factor: String,
}

/// Per-file sample records plus the submission-wide accumulator sets
/// consumed by the manifest serializer. Insertion is idempotent by key;
/// nothing is ever removed.
#[derive(Debug, Default)]
pub struct SampleAccumulator {
    samples: HashMap<String, SampleMetadata>,
    pub search_tools: BTreeSet<String>,
    pub instruments: BTreeMap<String, BTreeSet<String>>,
    pub species: BTreeMap<u32, String>,
    pub tissues: BTreeMap<String, String>,
    pub modifications: BTreeMap<String, String>,
    pub quantifications: BTreeSet<String>,
}

impl SampleAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derives the sample record for one job, folding the job's
    /// annotations into the submission-wide sets as a side effect.
    pub fn build_for_job(
        &mut self,
        job: &JobDescriptor,
        dataset: Option<&DatasetInfo>,
        template: &TemplateParameters,
    ) -> SampleMetadata {
        let (species_id, species_name) = if job.organism_id == 0 {
            (UNCLASSIFIED_SPECIES_ID, UNCLASSIFIED_SPECIES_NAME.to_string())
        } else {
            (job.organism_id, job.organism_name.clone())
        };
        self.species.entry(species_id).or_insert_with(|| species_name.clone());
        let species = validate_cv(&format_cv("NEWT", &species_id.to_string(), &species_name, ""));

        let tissue = tissue_cv(dataset, template);
        if let Some(dataset) = dataset
            && let (Some(id), Some(name)) = (&dataset.tissue_id, &dataset.tissue_name)
        {
            self.tissues
                .entry(rewrite_tissue_namespace(id))
                .or_insert_with(|| name.clone());
        }

        let cell_type = validate_cv(template.get_or("cell_type", ""));
        let disease = validate_cv(template.get_or("disease", ""));
        let quantification = validate_cv(template.get_or("quantification", ""));
        if !quantification.is_empty() {
            self.quantifications.insert(quantification.clone());
        }

        self.search_tools.insert(job.tool_name.clone());
        self.instruments
            .entry(job.instrument_group.clone())
            .or_default()
            .insert(job.instrument_name.clone());

        SampleMetadata {
            species,
            tissue,
            cell_type,
            disease,
            modifications: BTreeMap::new(),
            instrument_group: job.instrument_group.clone(),
            instrument_name: job.instrument_name.clone(),
            quantification,
            experimental_factor: job.experiment_name.clone(),
        }
    }

    /// Files the record under the normalized file name. Overwrites any
    /// previous record for the same name; jobs are processed in a
    /// deterministic order, so the outcome is stable.
    pub fn assign(&mut self, normalized_file_name: &str, metadata: SampleMetadata) {
        self.samples
            .insert(normalized_file_name.to_lowercase(), metadata);
    }

    /// Records a modification against one sample and the submission-wide
    /// map. First write wins per accession; accessions are treated as
    /// immutable once seen.
    pub fn record_modification(&mut self, normalized_file_name: &str, accession: &str, cv: &str) {
        let cv = validate_cv(cv);
        self.modifications
            .entry(accession.to_string())
            .or_insert_with(|| cv.clone());
        if let Some(sample) = self.samples.get_mut(&normalized_file_name.to_lowercase()) {
            sample
                .modifications
                .entry(accession.to_string())
                .or_insert(cv);
        } else {
            debug!(file = normalized_file_name, accession, "modification recorded before sample");
        }
    }

    pub fn lookup(&self, normalized_file_name: &str) -> Option<&SampleMetadata> {
        self.samples.get(&normalized_file_name.to_lowercase())
    }
}

fn tissue_cv(dataset: Option<&DatasetInfo>, template: &TemplateParameters) -> String {
    if let Some(dataset) = dataset
        && let (Some(id), Some(name)) = (&dataset.tissue_id, &dataset.tissue_name)
    {
        let namespace = rewrite_tissue_namespace(id)
            .split(':')
            .next()
            .unwrap_or("BTO")
            .to_string();
        return validate_cv(&format_cv(&namespace, &rewrite_tissue_namespace(id), name, ""));
    }
    match template.get("tissue") {
        Some(value) if !value.is_empty() => {
            validate_cv(&rewrite_tissue_namespace(value))
        }
        _ => DEFAULT_TISSUE_CV.to_string(),
    }
}

/// The tissue ontology was published under the BRENDA namespace before
/// it moved to BTO; stored annotations may still carry the old code.
fn rewrite_tissue_namespace(text: &str) -> String {
    text.replace("BRENDA", "BTO")
}
