use std::collections::BTreeSet;
use std::fs;

use camino::Utf8Path;
use tracing::warn;

use crate::cv::{format_cv, validate_cv};
use crate::domain::PxFileType;
use crate::error::PxError;
use crate::instrument;
use crate::registry::FileGraph;
use crate::sample::{
    DEFAULT_TISSUE_CV, SampleAccumulator, UNCLASSIFIED_SPECIES_ID, UNCLASSIFIED_SPECIES_NAME,
};
use crate::template::TemplateParameters;

/// Fixed CV line emitted when no modifications were accumulated.
pub const NO_PTMS_CV: &str = "[PRIDE, PRIDE:0000398, No PTMs are included in the dataset, ]";

const DEFAULT_EXPERIMENT_TYPE_CV: &str = "[PRIDE, PRIDE:0000429, Shotgun proteomics, ]";
const DEFAULT_CELL_TYPE_CV: &str = "[CL, , Update cell type here, ]";
const DEFAULT_DISEASE_CV: &str = "[DOID, , Update disease here, ]";
const DEFAULT_QUANTIFICATION_CV: &str = "[PRIDE, , Update quantification here, ]";

/// Free-text header fields, in emission order, with the human-actionable
/// default used when the template does not override them.
const HEADER_FIELDS: &[(&str, &str)] = &[
    ("submitter_name", "Update submitter name"),
    ("submitter_email", "Update submitter e-mail"),
    ("submitter_affiliation", "Update submitter affiliation"),
    ("submitter_pride_login", "Update PRIDE login"),
    ("lab_head_name", "Update lab head name"),
    ("lab_head_email", "Update lab head e-mail"),
    ("lab_head_affiliation", "Update lab head affiliation"),
    ("project_title", "Update project title"),
    ("project_description", "Update project description"),
    ("keywords", "proteomics"),
    ("sample_processing_protocol", "Update sample processing protocol"),
    ("data_processing_protocol", "Update data processing protocol"),
];

#[derive(Debug, Clone)]
pub struct ManifestOptions {
    /// Repository-side root the files will be uploaded under.
    pub upload_root: String,
    /// Name of the results directory below the upload root.
    pub results_dir: String,
}

/// Classifies the submission as COMPLETE only when at least as many
/// search/result files exist as aggregate Result files and the
/// identification-bearing types are present. The repository evaluates
/// the overlapping conditions as a literal union; do not simplify.
pub fn submission_type(graph: &FileGraph) -> &'static str {
    let search_total =
        graph.count_by_type(PxFileType::Search) + graph.count_by_type(PxFileType::ResultSearchId);
    let result_total = graph.count_by_type(PxFileType::Result);
    let raw_total = graph.count_by_type(PxFileType::Raw);

    let partial = search_total == 0
        || result_total == 0
        || search_total < result_total
        || raw_total < result_total;
    if partial { "PARTIAL" } else { "COMPLETE" }
}

/// Walks the completed file graph and sample accumulator and renders the
/// tab-delimited submission manifest.
pub struct ManifestSerializer<'a> {
    graph: &'a FileGraph,
    samples: &'a SampleAccumulator,
    template: &'a TemplateParameters,
    options: ManifestOptions,
}

impl<'a> ManifestSerializer<'a> {
    pub fn new(
        graph: &'a FileGraph,
        samples: &'a SampleAccumulator,
        template: &'a TemplateParameters,
        options: ManifestOptions,
    ) -> Self {
        Self {
            graph,
            samples,
            template,
            options,
        }
    }

    pub fn write(&self, path: &Utf8Path) -> Result<(), PxError> {
        let content = self.render();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path()).map_err(|err| PxError::ManifestWrite {
                path: path.to_owned(),
                detail: err.to_string(),
            })?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(tmp.as_std_path(), content.as_bytes()).map_err(|err| PxError::ManifestWrite {
            path: path.to_owned(),
            detail: err.to_string(),
        })?;
        fs::rename(tmp.as_std_path(), path.as_std_path()).map_err(|err| PxError::ManifestWrite {
            path: path.to_owned(),
            detail: err.to_string(),
        })?;
        Ok(())
    }

    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        self.render_header(&mut lines);
        lines.push(String::new());
        self.render_file_table(&mut lines);
        lines.push(String::new());
        self.render_sample_table(&mut lines);
        let mut content = lines.join("\n");
        content.push('\n');
        content
    }

    fn render_header(&self, lines: &mut Vec<String>) {
        for (key, default) in HEADER_FIELDS {
            lines.push(meta_line(key, self.template.get_or(key, default)));
        }
        // Emitted only when supplied; the repository rejects an empty
        // pubmed id.
        if let Some(value) = self.template.get("project_pubmed_id")
            && !value.is_empty()
        {
            lines.push(meta_line("project_pubmed_id", value));
        }
        lines.push(meta_line(
            "experiment_type",
            &validate_cv(self.template.get_or("experiment_type", DEFAULT_EXPERIMENT_TYPE_CV)),
        ));
        lines.push(meta_line("submission_type", submission_type(self.graph)));

        if self.samples.species.is_empty() {
            lines.push(meta_line(
                "species",
                &format_cv(
                    "NEWT",
                    &UNCLASSIFIED_SPECIES_ID.to_string(),
                    UNCLASSIFIED_SPECIES_NAME,
                    "",
                ),
            ));
        } else {
            for (id, name) in &self.samples.species {
                lines.push(meta_line("species", &format_cv("NEWT", &id.to_string(), name, "")));
            }
        }

        if self.samples.tissues.is_empty() {
            lines.push(meta_line("tissue", DEFAULT_TISSUE_CV));
        } else {
            for (id, name) in &self.samples.tissues {
                let namespace = id.split(':').next().unwrap_or("BTO");
                lines.push(meta_line("tissue", &format_cv(namespace, id, name, "")));
            }
        }

        lines.push(meta_line(
            "cell_type",
            &validate_cv(self.template.get_or("cell_type", DEFAULT_CELL_TYPE_CV)),
        ));
        lines.push(meta_line(
            "disease",
            &validate_cv(self.template.get_or("disease", DEFAULT_DISEASE_CV)),
        ));

        if self.samples.quantifications.is_empty() {
            lines.push(meta_line("quantification", DEFAULT_QUANTIFICATION_CV));
        } else {
            for value in &self.samples.quantifications {
                lines.push(meta_line("quantification", &validate_cv(value)));
            }
        }

        // One line per distinct accession, even when several instrument
        // groups resolve to the same model.
        let mut instrument_lines = BTreeSet::new();
        for (group, names) in &self.samples.instruments {
            for name in names {
                let (accession, description) = instrument::resolve(group, name);
                instrument_lines.insert(instrument::resolve_or_default(accession, description));
            }
        }
        if instrument_lines.is_empty() {
            instrument_lines.insert(instrument::resolve_or_default("", ""));
        }
        for line in instrument_lines {
            lines.push(meta_line("instrument", &line));
        }

        if self.samples.modifications.is_empty() {
            lines.push(meta_line("modification", NO_PTMS_CV));
        } else {
            for cv in self.samples.modifications.values() {
                lines.push(meta_line("modification", cv));
            }
        }
    }

    fn render_file_table(&self, lines: &mut Vec<String>) {
        lines.push("FMH\tfile_id\tfile_type\tfile_path\tfile_mapping".to_string());
        for entry in self.graph.entries() {
            let Some(record) = self.graph.record(entry.file_id) else {
                warn!(file_id = entry.file_id, "result entry without file record; skipping row");
                continue;
            };
            let path = format!(
                "{}/{}/{}",
                self.options.upload_root, self.options.results_dir, record.normalized_name
            );
            let parents = entry
                .parent_file_ids
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(",");
            lines.push(format!(
                "FME\t{}\t{}\t{}\t{}",
                entry.file_id,
                entry.px_file_type.manifest_name(),
                path,
                parents
            ));
        }
    }

    fn render_sample_table(&self, lines: &mut Vec<String>) {
        lines.push(
            "SMH\tfile_id\tspecies\ttissue\tcell_type\tdisease\tmodification\tinstrument\tquantification\texperimental_factor"
                .to_string(),
        );
        for entry in self.graph.entries() {
            if !entry.px_file_type.is_result() {
                continue;
            }
            let Some(record) = self.graph.record(entry.file_id) else {
                continue;
            };
            let row = match self.samples.lookup(&record.normalized_name) {
                Some(sample) => {
                    let modifications = if sample.modifications.is_empty() {
                        NO_PTMS_CV.to_string()
                    } else {
                        sample
                            .modifications
                            .values()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(",")
                    };
                    let (accession, description) =
                        instrument::resolve(&sample.instrument_group, &sample.instrument_name);
                    format!(
                        "SME\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                        entry.file_id,
                        sample.species,
                        sample.tissue,
                        sample.cell_type,
                        sample.disease,
                        modifications,
                        instrument::resolve_or_default(accession, description),
                        sample.quantification,
                        sample.experimental_factor
                    )
                }
                None => {
                    warn!(
                        file = %record.normalized_name,
                        "no sample metadata for result file; emitting blank annotation columns"
                    );
                    format!("SME\t{}\t\t\t\t\t\t\t\t", entry.file_id)
                }
            };
            lines.push(row);
        }
    }
}

fn meta_line(key: &str, value: &str) -> String {
    format!("MTD\t{key}\t{value}")
}
