use std::collections::HashMap;
use std::fs;

use camino::Utf8Path;
use tracing::{debug, warn};

use crate::error::PxError;

/// Tag carried by every parameter line of a px template file.
const LINE_TAG: &str = "MTD";

/// Template keys renamed between px format versions; stored templates
/// may still use the old names.
const LEGACY_KEYS: &[(&str, &str)] = &[
    ("name", "submitter_name"),
    ("email", "submitter_email"),
    ("affiliation", "submitter_affiliation"),
    ("pride_login", "submitter_pride_login"),
    ("title", "project_title"),
    ("description", "project_description"),
    ("pubmed_id", "project_pubmed_id"),
    ("type", "submission_type"),
];

/// Keys dropped from the format entirely; values under these names are
/// discarded on load.
const OBSOLETE_KEYS: &[&str] = &["comment", "pride_project"];

/// Read-only submission-wide field overrides, loaded once before
/// processing begins.
#[derive(Debug, Clone, Default)]
pub struct TemplateParameters {
    values: HashMap<String, String>,
}

impl TemplateParameters {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(path: &Utf8Path) -> Result<Self, PxError> {
        if !path.as_std_path().exists() {
            return Err(PxError::MissingTemplate(path.to_owned()));
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| PxError::TemplateRead(path.to_owned()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PxError> {
        let mut values = HashMap::new();
        for (index, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            let tag = fields.next().unwrap_or_default();
            if tag != LINE_TAG {
                debug!(line = index + 1, tag, "skipping non-parameter template line");
                continue;
            }
            let key = fields.next().map(str::trim).ok_or(PxError::TemplateParse {
                line: index + 1,
                reason: "missing key field".to_string(),
            })?;
            if key.is_empty() {
                return Err(PxError::TemplateParse {
                    line: index + 1,
                    reason: "empty key field".to_string(),
                });
            }
            let value = fields.next().unwrap_or_default().trim().to_string();

            if OBSOLETE_KEYS.contains(&key) {
                warn!(key, "dropping obsolete template key");
                continue;
            }
            let key = LEGACY_KEYS
                .iter()
                .find(|(old, _)| *old == key)
                .map(|(_, new)| new.to_string())
                .unwrap_or_else(|| key.to_string());
            values.insert(key, value);
        }
        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the override for `key`, or `default` when the template
    /// does not set it.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
