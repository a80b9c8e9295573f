use std::time::Duration;

use camino::Utf8PathBuf;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info};

use crate::classify::{
    Classifier, ClassifyOptions, FastaProvider, LegacyResultProvider, PeakListProvider,
    SearchResultProvider,
};
use crate::config::DataPackage;
use crate::domain::sort_jobs;
use crate::error::PxError;
use crate::manifest::{ManifestOptions, ManifestSerializer, submission_type};
use crate::template::TemplateParameters;

/// Failures tolerated before the run is abandoned.
pub const DEFAULT_MAX_FAILED_JOBS: usize = 10;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub output_dir: Utf8PathBuf,
    pub upload_root: String,
    /// Results directory below the upload root; defaults to the package
    /// name.
    pub results_dir: Option<String>,
    pub create_peak_files: bool,
    pub include_legacy_results: bool,
    pub max_failed_jobs: usize,
    /// Classify without flushing files or writing the manifest.
    pub dry_run: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            output_dir: Utf8PathBuf::from("px_output"),
            upload_root: ".".to_string(),
            results_dir: None,
            create_peak_files: true,
            include_legacy_results: false,
            max_failed_jobs: DEFAULT_MAX_FAILED_JOBS,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedJob {
    pub job: u64,
    pub dataset: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub package_id: u64,
    pub package_name: String,
    pub submission_type: String,
    pub manifest_path: Option<String>,
    pub files_registered: usize,
    pub result_entries: usize,
    pub jobs_processed: usize,
    pub jobs_failed: Vec<FailedJob>,
    pub excluded_files: Vec<String>,
    pub completed_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub package_id: u64,
    pub package_name: String,
    pub jobs: usize,
    pub datasets: usize,
    pub template_keys: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Orchestrates one submission run: sorted job loop, failure budget,
/// placeholder pass, final flush, single manifest serialization.
pub struct App<P, L, S, F> {
    peak_lists: P,
    legacy_results: L,
    search_results: S,
    fasta: F,
}

impl<P, L, S, F> App<P, L, S, F>
where
    P: PeakListProvider,
    L: LegacyResultProvider,
    S: SearchResultProvider,
    F: FastaProvider,
{
    pub fn new(peak_lists: P, legacy_results: L, search_results: S, fasta: F) -> Self {
        Self {
            peak_lists,
            legacy_results,
            search_results,
            fasta,
        }
    }

    pub fn build(
        &self,
        package: &DataPackage,
        template: &TemplateParameters,
        options: BuildOptions,
        sink: &dyn ProgressSink,
    ) -> Result<BuildResult, PxError> {
        let results_dir = options
            .results_dir
            .clone()
            .unwrap_or_else(|| package.package_name.clone());
        let transfer_dir = options.output_dir.join(&results_dir);

        let mut jobs = package.jobs.clone();
        sort_jobs(&mut jobs);

        let mut classifier = Classifier::new(
            &self.peak_lists,
            &self.legacy_results,
            &self.search_results,
            &self.fasta,
            ClassifyOptions {
                create_peak_files: options.create_peak_files,
                include_legacy_results: options.include_legacy_results,
                stage_files: !options.dry_run,
            },
            transfer_dir,
        );

        let mut failed = Vec::new();
        for job in &jobs {
            sink.event(ProgressEvent {
                message: format!("phase=Classify; job {} ({})", job.job, job.dataset_name),
                elapsed: None,
            });
            match classifier.process_job(job, package, template) {
                Ok(()) => {}
                Err(err @ (PxError::JobOrdering { .. } | PxError::DatasetFlush { .. })) => {
                    return Err(err);
                }
                Err(err) => {
                    error!(job = job.job, dataset = %job.dataset_name, %err, "job failed");
                    failed.push(FailedJob {
                        job: job.job,
                        dataset: job.dataset_name.clone(),
                        message: err.to_string(),
                    });
                    if failed.len() > options.max_failed_jobs {
                        return Err(PxError::TooManyFailures {
                            failed: failed.len(),
                            limit: options.max_failed_jobs,
                        });
                    }
                }
            }
        }

        classifier.finish(package)?;

        let manifest_path = if options.dry_run {
            None
        } else {
            sink.event(ProgressEvent {
                message: "phase=Serialize; writing manifest".to_string(),
                elapsed: None,
            });
            let path = options.output_dir.join("px.txt");
            let serializer = ManifestSerializer::new(
                &classifier.graph,
                &classifier.samples,
                template,
                ManifestOptions {
                    upload_root: options.upload_root.clone(),
                    results_dir,
                },
            );
            serializer.write(&path)?;
            Some(path.to_string())
        };

        let result = BuildResult {
            package_id: package.package_id,
            package_name: package.package_name.clone(),
            submission_type: submission_type(&classifier.graph).to_string(),
            manifest_path,
            files_registered: classifier.graph.len(),
            result_entries: classifier.graph.entries().count(),
            jobs_processed: jobs.len() - failed.len(),
            jobs_failed: failed,
            excluded_files: classifier
                .excluded_files()
                .iter()
                .map(|path| path.to_string())
                .collect(),
            completed_at: Utc::now().to_rfc3339(),
        };
        info!(
            package = package.package_id,
            files = result.files_registered,
            entries = result.result_entries,
            submission_type = %result.submission_type,
            "submission package built"
        );
        Ok(result)
    }

    pub fn check(
        &self,
        package: &DataPackage,
        template: &TemplateParameters,
        sink: &dyn ProgressSink,
    ) -> Result<CheckResult, PxError> {
        sink.event(ProgressEvent {
            message: "phase=Check; validating package descriptor".to_string(),
            elapsed: None,
        });
        Ok(CheckResult {
            package_id: package.package_id,
            package_name: package.package_name.clone(),
            jobs: package.jobs.len(),
            datasets: package.datasets.len(),
            template_keys: template.len(),
        })
    }
}
