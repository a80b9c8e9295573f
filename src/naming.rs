use std::sync::LazyLock;

use regex::Regex;

// Matched as a unit so gzipped peak lists keep both extensions together.
static MZML_EXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.mzml(\.gz)?$").expect("valid regex"));

/// Normalizes a file name for registration. The repository stores names
/// case-sensitively and the DMS dataset name is the canonical casing
/// authority, so a base name that starts with the dataset name in the
/// wrong case is rewritten to the dataset's casing. `.mzML`/`.mzML.gz`
/// extensions are lower-cased in full; other extensions are lower-cased
/// but leave the base name alone.
pub fn normalize_file_name(file_name: &str, dataset_name: &str) -> String {
    let (base, extension) = split_extension(file_name);
    let base = align_dataset_prefix(base, dataset_name);
    format!("{base}{extension}")
}

fn split_extension(file_name: &str) -> (&str, String) {
    if let Some(found) = MZML_EXT.find(file_name) {
        return (
            &file_name[..found.start()],
            found.as_str().to_ascii_lowercase(),
        );
    }
    match file_name.rfind('.') {
        Some(dot) if dot > 0 => (
            &file_name[..dot],
            file_name[dot..].to_ascii_lowercase(),
        ),
        _ => (file_name, String::new()),
    }
}

fn align_dataset_prefix(base: &str, dataset_name: &str) -> String {
    if dataset_name.is_empty() || base.len() < dataset_name.len() {
        return base.to_string();
    }
    match base.get(..dataset_name.len()) {
        Some(prefix)
            if prefix.eq_ignore_ascii_case(dataset_name) && prefix != dataset_name =>
        {
            format!("{dataset_name}{}", &base[dataset_name.len()..])
        }
        _ => base.to_string(),
    }
}
