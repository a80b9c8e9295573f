use crate::cv::format_cv;

/// Fallback term emitted when an instrument group cannot be resolved.
/// The generic "instrument model" accession is intentionally visible in
/// the manifest so a reviewer can fill in the real model.
pub const UNKNOWN_INSTRUMENT_ACCESSION: &str = "MS:1000031";
pub const UNKNOWN_INSTRUMENT_NAME: &str = "instrument model";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NameFilter {
    Any,
    Prefix(&'static str),
    Contains(&'static str),
}

impl NameFilter {
    fn matches(&self, instrument_name: &str) -> bool {
        let lower = instrument_name.to_ascii_lowercase();
        match self {
            NameFilter::Any => true,
            NameFilter::Prefix(prefix) => lower.starts_with(&prefix.to_ascii_lowercase()),
            NameFilter::Contains(text) => lower.contains(&text.to_ascii_lowercase()),
        }
    }
}

/// One resolution rule; rules are evaluated in order and the first match
/// wins, so the name-specific entries for a group must precede that
/// group's catch-all entry.
struct InstrumentRule {
    group: &'static str,
    name: NameFilter,
    accession: &'static str,
    description: &'static str,
}

const RULES: &[InstrumentRule] = &[
    InstrumentRule {
        group: "QExactive",
        name: NameFilter::Prefix("QExactP"),
        accession: "MS:1002634",
        description: "Q Exactive Plus",
    },
    InstrumentRule {
        group: "QExactive",
        name: NameFilter::Contains("HF"),
        accession: "MS:1002523",
        description: "Q Exactive HF",
    },
    InstrumentRule {
        group: "QExactive",
        name: NameFilter::Any,
        accession: "MS:1001911",
        description: "Q Exactive",
    },
    InstrumentRule {
        group: "QEHFX",
        name: NameFilter::Any,
        accession: "MS:1002877",
        description: "Q Exactive HF-X",
    },
    InstrumentRule {
        group: "Exactive",
        name: NameFilter::Any,
        accession: "MS:1000649",
        description: "Exactive",
    },
    InstrumentRule {
        group: "Exploris",
        name: NameFilter::Any,
        accession: "MS:1003028",
        description: "Orbitrap Exploris 480",
    },
    InstrumentRule {
        group: "Lumos",
        name: NameFilter::Any,
        accession: "MS:1002732",
        description: "Orbitrap Fusion Lumos",
    },
    InstrumentRule {
        group: "Eclipse",
        name: NameFilter::Any,
        accession: "MS:1003029",
        description: "Orbitrap Eclipse",
    },
    InstrumentRule {
        group: "Ascend",
        name: NameFilter::Any,
        accession: "MS:1003356",
        description: "Orbitrap Ascend",
    },
    InstrumentRule {
        group: "VelosOrbi",
        name: NameFilter::Contains("Elite"),
        accession: "MS:1001910",
        description: "LTQ Orbitrap Elite",
    },
    InstrumentRule {
        group: "VelosOrbi",
        name: NameFilter::Any,
        accession: "MS:1001742",
        description: "LTQ Orbitrap Velos",
    },
    InstrumentRule {
        group: "VelosPro",
        name: NameFilter::Any,
        accession: "MS:1000855",
        description: "LTQ Velos",
    },
    InstrumentRule {
        group: "Orbitrap",
        name: NameFilter::Contains("XL"),
        accession: "MS:1000556",
        description: "LTQ Orbitrap XL",
    },
    InstrumentRule {
        group: "Orbitrap",
        name: NameFilter::Any,
        accession: "MS:1000449",
        description: "LTQ Orbitrap",
    },
    InstrumentRule {
        group: "LCQ",
        name: NameFilter::Any,
        accession: "MS:1000554",
        description: "LCQ Deca",
    },
    InstrumentRule {
        group: "LTQ-ETD",
        name: NameFilter::Any,
        accession: "MS:1000638",
        description: "LTQ XL ETD",
    },
    InstrumentRule {
        group: "LTQ-FT",
        name: NameFilter::Any,
        accession: "MS:1000448",
        description: "LTQ FT",
    },
    InstrumentRule {
        group: "LTQ",
        name: NameFilter::Any,
        accession: "MS:1000447",
        description: "LTQ",
    },
    InstrumentRule {
        group: "TSQ",
        name: NameFilter::Contains("Altis"),
        accession: "MS:1002874",
        description: "TSQ Altis",
    },
    InstrumentRule {
        group: "TSQ",
        name: NameFilter::Any,
        accession: "MS:1001510",
        description: "TSQ Vantage",
    },
    InstrumentRule {
        group: "timsTOF",
        name: NameFilter::Any,
        accession: "MS:1003005",
        description: "timsTOF Pro",
    },
];

/// Maps an internal instrument group plus instrument name to the MS
/// ontology. Unrecognized groups yield empty strings; the caller
/// substitutes the unknown-instrument term when formatting.
pub fn resolve(instrument_group: &str, instrument_name: &str) -> (&'static str, &'static str) {
    for rule in RULES {
        if rule.group.eq_ignore_ascii_case(instrument_group) && rule.name.matches(instrument_name)
        {
            return (rule.accession, rule.description);
        }
    }
    ("", "")
}

/// Formats a resolved accession under the MS namespace, falling back to
/// the unknown-instrument term when resolution came up empty.
pub fn resolve_or_default(accession: &str, description: &str) -> String {
    if accession.is_empty() {
        format_cv("MS", UNKNOWN_INSTRUMENT_ACCESSION, UNKNOWN_INSTRUMENT_NAME, "")
    } else {
        format_cv("MS", accession, description, "")
    }
}
