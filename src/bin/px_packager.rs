use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use px_packager::app::{App, BuildOptions, DEFAULT_MAX_FAILED_JOBS};
use px_packager::classify::{
    FastaProvider, LegacyResultProvider, PeakListProvider, SearchResultProvider, SearchResults,
};
use px_packager::config::DescriptorLoader;
use px_packager::domain::{DatasetInfo, JobDescriptor};
use px_packager::error::PxError;
use px_packager::output::JsonOutput;
use px_packager::template::TemplateParameters;

#[derive(Parser)]
#[command(name = "px-packager")]
#[command(about = "Packages data-package analysis results into a ProteomeXchange submission")]
#[command(version, author)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Classify job outputs and write the px.txt manifest")]
    Build(BuildArgs),
    #[command(about = "Validate the package descriptor and template without writing output")]
    Check(CheckArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Data-package descriptor (JSON).
    #[arg(long)]
    package: Utf8PathBuf,

    /// px template parameter file.
    #[arg(long)]
    template: Utf8PathBuf,

    /// Directory that receives the manifest and the transfer set.
    #[arg(long, default_value = "px_output")]
    output_dir: Utf8PathBuf,

    /// Root directory holding per-dataset job results.
    #[arg(long, default_value = ".")]
    data_root: Utf8PathBuf,

    /// Directory holding protein-collection FASTA files.
    #[arg(long)]
    fasta_root: Option<Utf8PathBuf>,

    /// Repository-side upload root written into the file table.
    #[arg(long, default_value = ".")]
    upload_root: String,

    /// Results directory name below the upload root (defaults to the
    /// package name).
    #[arg(long)]
    results_dir: Option<String>,

    #[arg(long)]
    no_peak_files: bool,

    #[arg(long)]
    include_legacy_results: bool,

    #[arg(long, default_value_t = DEFAULT_MAX_FAILED_JOBS)]
    max_failed_jobs: usize,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(long)]
    package: Utf8PathBuf,

    #[arg(long)]
    template: Utf8PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(px) = report.downcast_ref::<PxError>() {
            return ExitCode::from(map_exit_code(px));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &PxError) -> u8 {
    match error {
        PxError::FileNotFound(_)
        | PxError::MissingTemplate(_)
        | PxError::DescriptorRead(_)
        | PxError::TemplateRead(_) => 2,
        PxError::NoFastaAvailable { .. } => 3,
        PxError::DatasetFlush { source, .. } => map_exit_code(source),
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => run_build(args),
        Commands::Check(args) => run_check(args),
    }
}

fn run_build(args: BuildArgs) -> miette::Result<()> {
    let package = DescriptorLoader::resolve(&args.package).into_diagnostic()?;
    let template = TemplateParameters::load(&args.template).into_diagnostic()?;

    let app = App::new(
        LocalPeakLists {
            data_root: args.data_root.clone(),
        },
        UnavailableLegacyResults,
        LocalSearchResults {
            data_root: args.data_root,
        },
        LocalFasta {
            fasta_root: args.fasta_root,
        },
    );

    let options = BuildOptions {
        output_dir: args.output_dir,
        upload_root: args.upload_root,
        results_dir: args.results_dir,
        create_peak_files: !args.no_peak_files,
        include_legacy_results: args.include_legacy_results,
        max_failed_jobs: args.max_failed_jobs,
        dry_run: args.dry_run,
    };

    let result = app
        .build(&package, &template, options, &JsonOutput)
        .into_diagnostic()?;
    JsonOutput::print_build(&result).into_diagnostic()?;
    Ok(())
}

fn run_check(args: CheckArgs) -> miette::Result<()> {
    let package = DescriptorLoader::resolve(&args.package).into_diagnostic()?;
    let template = TemplateParameters::load(&args.template).into_diagnostic()?;
    let app = App::new(
        LocalPeakLists {
            data_root: Utf8PathBuf::from("."),
        },
        UnavailableLegacyResults,
        LocalSearchResults {
            data_root: Utf8PathBuf::from("."),
        },
        LocalFasta { fasta_root: None },
    );
    let result = app
        .check(&package, &template, &JsonOutput)
        .into_diagnostic()?;
    JsonOutput::print_check(&result).into_diagnostic()?;
    Ok(())
}

/// Finds pre-converted peak lists below the data root. Conversion itself
/// is delegated to the pipeline that retrieves the raw files; this
/// binary only packages what already exists locally.
struct LocalPeakLists {
    data_root: Utf8PathBuf,
}

impl PeakListProvider for LocalPeakLists {
    fn existing(&self, dataset: &DatasetInfo) -> Option<Utf8PathBuf> {
        let dir = self.data_root.join(&dataset.dataset_name);
        for extension in ["mzML", "mzML.gz", "mzml", "mzml.gz"] {
            let candidate = dir.join(format!("{}.{extension}", dataset.dataset_name));
            if candidate.as_std_path().exists() {
                return Some(candidate);
            }
        }
        None
    }

    fn convert(&self, job: &JobDescriptor, dataset: &DatasetInfo) -> Result<Utf8PathBuf, PxError> {
        let _ = job;
        Err(PxError::PeakListConversion {
            dataset: dataset.dataset_name.clone(),
            detail: "no converter available; stage a pre-converted mzML under the data root"
                .to_string(),
        })
    }
}

struct UnavailableLegacyResults;

impl LegacyResultProvider for UnavailableLegacyResults {
    fn convert(&self, job: &JobDescriptor) -> Result<Utf8PathBuf, PxError> {
        Err(PxError::LegacyResultConversion {
            job: job.job,
            detail: "legacy XML result generation is not available".to_string(),
        })
    }
}

/// Collects search-result files from `<data_root>/<dataset>/job_<id>/`.
struct LocalSearchResults {
    data_root: Utf8PathBuf,
}

impl SearchResultProvider for LocalSearchResults {
    fn locate(&self, job: &JobDescriptor) -> Result<SearchResults, PxError> {
        let dir = self
            .data_root
            .join(&job.dataset_name)
            .join(format!("job_{}", job.job));
        if !dir.as_std_path().exists() {
            return Err(PxError::SearchResultLookup {
                job: job.job,
                detail: format!("results directory not found: {dir}"),
            });
        }
        let mut paths = Vec::new();
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| PxError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| PxError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|_| PxError::Filesystem("non-UTF-8 path in results dir".to_string()))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(SearchResults {
            paths,
            modifications: Vec::new(),
        })
    }
}

struct LocalFasta {
    fasta_root: Option<Utf8PathBuf>,
}

impl FastaProvider for LocalFasta {
    fn locate(&self, job: &JobDescriptor) -> Result<Option<Utf8PathBuf>, PxError> {
        let Some(root) = &self.fasta_root else {
            return Ok(None);
        };
        let Some(name) = &job.organism_db else {
            return Ok(None);
        };
        let candidate = root.join(name);
        if candidate.as_std_path().exists() {
            Ok(Some(candidate))
        } else {
            Err(PxError::NoFastaAvailable {
                job: job.job,
                detail: name.clone(),
            })
        }
    }
}
