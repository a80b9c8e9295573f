use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use px_packager::app::{App, BuildOptions};
use px_packager::classify::{
    Classifier, ClassifyOptions, FastaProvider, LegacyResultProvider, PeakListProvider,
    SearchResultProvider, SearchResults,
};
use px_packager::config::{DataPackage, Descriptor, DescriptorLoader};
use px_packager::domain::{DatasetInfo, JobDescriptor, PxFileType, ResultType};
use px_packager::error::PxError;
use px_packager::output::JsonOutput;
use px_packager::template::TemplateParameters;

struct MockPeakLists {
    output_dir: Utf8PathBuf,
    conversions: Arc<Mutex<usize>>,
}

impl PeakListProvider for MockPeakLists {
    fn existing(&self, _dataset: &DatasetInfo) -> Option<Utf8PathBuf> {
        None
    }

    fn convert(&self, _job: &JobDescriptor, dataset: &DatasetInfo) -> Result<Utf8PathBuf, PxError> {
        let mut guard = self.conversions.lock().unwrap();
        *guard += 1;
        let path = self.output_dir.join(format!("{}.mzML", dataset.dataset_name));
        std::fs::write(path.as_std_path(), b"peaks")
            .map_err(|err| PxError::Filesystem(err.to_string()))?;
        Ok(path)
    }
}

struct NoLegacyResults;

impl LegacyResultProvider for NoLegacyResults {
    fn convert(&self, job: &JobDescriptor) -> Result<Utf8PathBuf, PxError> {
        Err(PxError::LegacyResultConversion {
            job: job.job,
            detail: "not available".to_string(),
        })
    }
}

struct MockSearchResults {
    paths_by_job: HashMap<u64, Vec<Utf8PathBuf>>,
}

impl SearchResultProvider for MockSearchResults {
    fn locate(&self, job: &JobDescriptor) -> Result<SearchResults, PxError> {
        let paths = self
            .paths_by_job
            .get(&job.job)
            .cloned()
            .ok_or_else(|| PxError::SearchResultLookup {
                job: job.job,
                detail: "no results staged".to_string(),
            })?;
        Ok(SearchResults {
            paths,
            modifications: Vec::new(),
        })
    }
}

struct NoFasta;

impl FastaProvider for NoFasta {
    fn locate(&self, _job: &JobDescriptor) -> Result<Option<Utf8PathBuf>, PxError> {
        Ok(None)
    }
}

fn job(id: u64, dataset_id: u64, dataset: &str, tool: &str, result_type: ResultType) -> JobDescriptor {
    JobDescriptor {
        job: id,
        dataset_id,
        dataset_name: dataset.to_string(),
        tool_name: tool.to_string(),
        result_type,
        instrument_group: "QExactive".to_string(),
        instrument_name: "QExactP04".to_string(),
        experiment_name: "Exp_1".to_string(),
        organism_id: 0,
        organism_name: String::new(),
        split_count: 1,
        searched_mzml: false,
        organism_db: None,
        protein_collection_list: None,
        protein_options: None,
    }
}

fn dataset(id: u64, name: &str) -> DatasetInfo {
    DatasetInfo {
        dataset_id: id,
        dataset_name: name.to_string(),
        tissue_id: None,
        tissue_name: None,
        raw_file_path: None,
    }
}

fn package(jobs: Vec<JobDescriptor>, datasets: Vec<DatasetInfo>, work: &Utf8PathBuf) -> DataPackage {
    let mut raw_files = HashMap::new();
    for info in &datasets {
        let raw = work.join(format!("{}.raw", info.dataset_name));
        std::fs::write(raw.as_std_path(), b"raw").unwrap();
        raw_files.insert(info.dataset_name.clone(), raw);
    }
    DescriptorLoader::resolve_descriptor(Descriptor {
        package_id: 42,
        package_name: "PX_Test".to_string(),
        jobs,
        datasets,
        raw_files,
    })
    .unwrap()
}

fn write_search_file(work: &Utf8PathBuf, name: &str) -> Utf8PathBuf {
    let path = work.join(name);
    std::fs::write(path.as_std_path(), b"search results").unwrap();
    path
}

#[test]
fn shared_dataset_converts_peak_list_once_and_maps_both_searches_to_it() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    // Deliberately unsorted: the X!Tandem job comes first and must be
    // processed second.
    let jobs = vec![
        job(200, 1, "Dataset_A", "XTandem_HPC", ResultType::XtPeptideHit),
        job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
    ];
    let package = package(jobs, vec![dataset(1, "Dataset_A")], &work);

    let mut paths_by_job = HashMap::new();
    paths_by_job.insert(
        100,
        vec![write_search_file(&work, "Dataset_A_msgfplus.mzid.gz")],
    );
    paths_by_job.insert(200, vec![write_search_file(&work, "Dataset_A_xt.txt")]);

    let peak_lists = MockPeakLists {
        output_dir: work.clone(),
        conversions: Arc::new(Mutex::new(0)),
    };
    let app = App::new(
        peak_lists,
        NoLegacyResults,
        MockSearchResults { paths_by_job },
        NoFasta,
    );

    let options = BuildOptions {
        output_dir: work.join("out"),
        ..BuildOptions::default()
    };
    let template = TemplateParameters::empty();
    let result = app.build(&package, &template, options, &JsonOutput).unwrap();

    assert!(result.jobs_failed.is_empty());
    assert_eq!(result.jobs_processed, 2);

    let manifest = std::fs::read_to_string(
        Utf8PathBuf::from(result.manifest_path.unwrap()).as_std_path(),
    )
    .unwrap();

    let peak_row = manifest
        .lines()
        .find(|line| line.starts_with("FME") && line.contains("\tPEAK\t"))
        .expect("peak row present");
    let peak_id = peak_row.split('\t').nth(1).unwrap();

    let search_rows: Vec<&str> = manifest
        .lines()
        .filter(|line| {
            line.starts_with("FME")
                && (line.contains("\tRESULT\t") || line.contains("\tSEARCH\t"))
        })
        .collect();
    assert_eq!(search_rows.len(), 2);
    for row in search_rows {
        let mapping = row.split('\t').nth(4).unwrap();
        let parents: Vec<&str> = mapping.split(',').collect();
        assert!(parents.contains(&peak_id), "row {row} should map to peak {peak_id}");
    }
}

#[test]
fn peak_conversion_called_once_per_dataset() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let jobs = vec![
        job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
        job(200, 1, "Dataset_A", "XTandem_HPC", ResultType::XtPeptideHit),
    ];
    let package = package(jobs, vec![dataset(1, "Dataset_A")], &work);

    let mut paths_by_job = HashMap::new();
    paths_by_job.insert(
        100,
        vec![write_search_file(&work, "Dataset_A_msgfplus.mzid.gz")],
    );
    paths_by_job.insert(200, vec![write_search_file(&work, "Dataset_A_xt.txt")]);

    let conversions = Arc::new(Mutex::new(0));
    let app = App::new(
        MockPeakLists {
            output_dir: work.clone(),
            conversions: Arc::clone(&conversions),
        },
        NoLegacyResults,
        MockSearchResults { paths_by_job },
        NoFasta,
    );
    let options = BuildOptions {
        output_dir: work.join("out"),
        ..BuildOptions::default()
    };
    app.build(&package, &TemplateParameters::empty(), options, &JsonOutput)
        .unwrap();

    // The first (MS-GF+) job converts; the X!Tandem job reuses.
    assert_eq!(*conversions.lock().unwrap(), 1);
}

#[test]
fn uncovered_dataset_gets_placeholder_raw_entry() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let jobs = vec![
        job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
        job(200, 2, "Dataset_B", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
    ];
    let package = package(
        jobs,
        vec![
            dataset(1, "Dataset_A"),
            dataset(2, "Dataset_B"),
            dataset(3, "Dataset_C"),
        ],
        &work,
    );

    let mut paths_by_job = HashMap::new();
    paths_by_job.insert(
        100,
        vec![write_search_file(&work, "Dataset_A_msgfplus.mzid.gz")],
    );
    paths_by_job.insert(
        200,
        vec![write_search_file(&work, "Dataset_B_msgfplus.mzid.gz")],
    );

    let app = App::new(
        MockPeakLists {
            output_dir: work.clone(),
            conversions: Arc::new(Mutex::new(0)),
        },
        NoLegacyResults,
        MockSearchResults { paths_by_job },
        NoFasta,
    );
    let options = BuildOptions {
        output_dir: work.join("out"),
        ..BuildOptions::default()
    };
    let result = app
        .build(&package, &TemplateParameters::empty(), options, &JsonOutput)
        .unwrap();

    let manifest = std::fs::read_to_string(
        Utf8PathBuf::from(result.manifest_path.unwrap()).as_std_path(),
    )
    .unwrap();

    let placeholder_rows: Vec<&str> = manifest
        .lines()
        .filter(|line| line.starts_with("FME") && line.contains("Dataset_C.raw"))
        .collect();
    assert_eq!(placeholder_rows.len(), 1);
    let columns: Vec<&str> = placeholder_rows[0].split('\t').collect();
    assert_eq!(columns[2], "RAW");
    assert_eq!(columns[4], "", "placeholder raw entry has no parents");
}

#[test]
fn failed_jobs_are_counted_not_fatal_until_limit() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let jobs = vec![
        job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
        job(200, 2, "Dataset_B", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
    ];
    let package = package(jobs, vec![dataset(1, "Dataset_A"), dataset(2, "Dataset_B")], &work);

    // Only Dataset_B's job has results; Dataset_A's job fails lookup.
    let mut paths_by_job = HashMap::new();
    paths_by_job.insert(
        200,
        vec![write_search_file(&work, "Dataset_B_msgfplus.mzid.gz")],
    );

    let app = App::new(
        MockPeakLists {
            output_dir: work.clone(),
            conversions: Arc::new(Mutex::new(0)),
        },
        NoLegacyResults,
        MockSearchResults { paths_by_job },
        NoFasta,
    );
    let options = BuildOptions {
        output_dir: work.join("out"),
        ..BuildOptions::default()
    };
    let result = app
        .build(&package, &TemplateParameters::empty(), options, &JsonOutput)
        .unwrap();

    assert_eq!(result.jobs_failed.len(), 1);
    assert_eq!(result.jobs_failed[0].job, 100);
    assert_eq!(result.jobs_processed, 1);
}

#[test]
fn exceeding_the_failure_limit_aborts_the_run() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let jobs = vec![
        job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
        job(200, 2, "Dataset_B", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
    ];
    let package = package(jobs, vec![dataset(1, "Dataset_A"), dataset(2, "Dataset_B")], &work);

    // Neither job has search results, so both fail lookup.
    let app = App::new(
        MockPeakLists {
            output_dir: work.clone(),
            conversions: Arc::new(Mutex::new(0)),
        },
        NoLegacyResults,
        MockSearchResults {
            paths_by_job: HashMap::new(),
        },
        NoFasta,
    );
    let options = BuildOptions {
        output_dir: work.join("out"),
        max_failed_jobs: 1,
        ..BuildOptions::default()
    };
    let err = app
        .build(&package, &TemplateParameters::empty(), options, &JsonOutput)
        .unwrap_err();

    assert_matches!(err, PxError::TooManyFailures { failed: 2, limit: 1 });
}

#[test]
fn unconfigured_database_provider_does_not_fail_jobs() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let mut searched = job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit);
    searched.organism_db = Some("E_coli_K12.fasta".to_string());
    let package = package(vec![searched], vec![dataset(1, "Dataset_A")], &work);

    let mut paths_by_job = HashMap::new();
    paths_by_job.insert(
        100,
        vec![write_search_file(&work, "Dataset_A_msgfplus.mzid.gz")],
    );

    let app = App::new(
        MockPeakLists {
            output_dir: work.clone(),
            conversions: Arc::new(Mutex::new(0)),
        },
        NoLegacyResults,
        MockSearchResults { paths_by_job },
        NoFasta,
    );
    let options = BuildOptions {
        output_dir: work.join("out"),
        ..BuildOptions::default()
    };
    let result = app
        .build(&package, &TemplateParameters::empty(), options, &JsonOutput)
        .unwrap();

    assert!(result.jobs_failed.is_empty());

    // No database entry is registered when packaging is unconfigured.
    let manifest = std::fs::read_to_string(
        Utf8PathBuf::from(result.manifest_path.unwrap()).as_std_path(),
    )
    .unwrap();
    assert!(!manifest.lines().any(|line| line.contains("\tOTHER\t")));
}

#[test]
fn dataset_reappearing_after_cursor_moved_is_an_ordering_error() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let jobs = vec![
        job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
        job(200, 2, "Dataset_B", "MSGFPlus_MzML", ResultType::MsgPeptideHit),
        job(300, 1, "Dataset_A", "XTandem_HPC", ResultType::XtPeptideHit),
    ];
    let package = package(
        jobs,
        vec![dataset(1, "Dataset_A"), dataset(2, "Dataset_B")],
        &work,
    );

    let mut paths_by_job = HashMap::new();
    paths_by_job.insert(
        100,
        vec![write_search_file(&work, "Dataset_A_msgfplus.mzid.gz")],
    );
    paths_by_job.insert(
        200,
        vec![write_search_file(&work, "Dataset_B_msgfplus.mzid.gz")],
    );

    let peak_lists = MockPeakLists {
        output_dir: work.clone(),
        conversions: Arc::new(Mutex::new(0)),
    };
    let legacy = NoLegacyResults;
    let search = MockSearchResults { paths_by_job };
    let fasta = NoFasta;
    let mut classifier = Classifier::new(
        &peak_lists,
        &legacy,
        &search,
        &fasta,
        ClassifyOptions::default(),
        work.join("transfer"),
    );
    let template = TemplateParameters::empty();

    classifier
        .process_job(&package.jobs[0], &package, &template)
        .unwrap();
    classifier
        .process_job(&package.jobs[1], &package, &template)
        .unwrap();
    let err = classifier
        .process_job(&package.jobs[2], &package, &template)
        .unwrap_err();
    assert_matches!(err, PxError::JobOrdering { .. });
}

#[test]
fn split_search_registers_one_entry_per_shard() {
    let temp = tempfile::tempdir().unwrap();
    let work = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();

    let mut split = job(100, 1, "Dataset_A", "MSGFPlus_MzML", ResultType::MsgPeptideHit);
    split.split_count = 3;
    let package = package(vec![split], vec![dataset(1, "Dataset_A")], &work);

    let mut paths_by_job = HashMap::new();
    paths_by_job.insert(
        100,
        vec![
            write_search_file(&work, "Dataset_A_part1_msgfplus.mzid.gz"),
            write_search_file(&work, "Dataset_A_part2_msgfplus.mzid.gz"),
            write_search_file(&work, "Dataset_A_part3_msgfplus.mzid.gz"),
        ],
    );

    let peak_lists = MockPeakLists {
        output_dir: work.clone(),
        conversions: Arc::new(Mutex::new(0)),
    };
    let legacy = NoLegacyResults;
    let search = MockSearchResults { paths_by_job };
    let fasta = NoFasta;
    let mut classifier = Classifier::new(
        &peak_lists,
        &legacy,
        &search,
        &fasta,
        ClassifyOptions::default(),
        work.join("transfer"),
    );

    classifier
        .process_job(&package.jobs[0], &package, &TemplateParameters::empty())
        .unwrap();

    let peak_id = classifier
        .graph
        .entries()
        .find(|entry| entry.px_file_type == PxFileType::Peak)
        .map(|entry| entry.file_id)
        .unwrap();
    let raw_id = classifier
        .graph
        .entries()
        .find(|entry| entry.px_file_type == PxFileType::Raw)
        .map(|entry| entry.file_id)
        .unwrap();

    let shards: Vec<_> = classifier
        .graph
        .entries()
        .filter(|entry| entry.px_file_type == PxFileType::ResultSearchId)
        .collect();
    assert_eq!(shards.len(), 3);
    for shard in shards {
        assert!(shard.parent_file_ids.contains(&peak_id));
        assert!(shard.parent_file_ids.contains(&raw_id));
    }
}
