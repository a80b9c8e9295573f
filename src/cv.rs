use tracing::warn;

/// Longest value the repository accepts inside a CV tuple.
pub const MAX_CV_VALUE_LEN: usize = 200;

/// Placeholder written into the label slot when a user-edited CV string
/// arrives with too few parts; it is meant to be replaced during the
/// manual review of the manifest.
pub const CV_LABEL_PLACEHOLDER: &str = "Update_Label_Here";

/// Formats a 4-field controlled-vocabulary tuple as the bracketed string
/// the submission format requires: `[namespace, code, label, value]`.
pub fn format_cv(namespace: &str, code: &str, label: &str, value: &str) -> String {
    let value = if value.chars().count() > MAX_CV_VALUE_LEN {
        warn!(namespace, code, "CV value exceeds {MAX_CV_VALUE_LEN} characters; truncating");
        value.chars().take(MAX_CV_VALUE_LEN).collect::<String>()
    } else {
        value.to_string()
    };
    format!("[{namespace}, {code}, {label}, {value}]")
}

/// Repairs a user-edited CV string so it carries exactly four
/// comma-separated parts. Well-formed strings pass through unchanged, as
/// does anything that is not bracket-delimited.
pub fn validate_cv(text: &str) -> String {
    let trimmed = text.trim();
    if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
        return text.to_string();
    }

    let inner = &trimmed[1..trimmed.len() - 1];
    let parts: Vec<&str> = inner.split(',').collect();
    if parts.len() == 4 {
        return text.to_string();
    }

    let mut fixed: Vec<String> = parts.iter().map(|part| part.trim().to_string()).collect();
    if fixed.len() > 4 {
        // Commas inside the value; fold the extras back into slot 4.
        let tail = fixed.split_off(3).join(", ");
        fixed.push(tail);
    }
    while fixed.len() < 3 {
        fixed.push(CV_LABEL_PLACEHOLDER.to_string());
    }
    if fixed.len() < 4 {
        fixed.push(String::new());
    }

    format!("[{}]", fixed.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_basic() {
        assert_eq!(
            format_cv("NEWT", "2323", "unclassified Bacteria", ""),
            "[NEWT, 2323, unclassified Bacteria, ]"
        );
    }

    #[test]
    fn format_truncates_long_value() {
        let long = "x".repeat(MAX_CV_VALUE_LEN + 50);
        let cv = format_cv("MS", "MS:1000031", "instrument model", &long);
        assert!(cv.ends_with(&format!("{}]", "x".repeat(MAX_CV_VALUE_LEN))));
    }

    #[test]
    fn validate_passes_four_parts_unchanged() {
        let text = "[MS, MS:1000031, instrument model, ]";
        assert_eq!(validate_cv(text), text);
    }

    #[test]
    fn validate_pads_short_strings() {
        let fixed = validate_cv("[MS, MS:1000031]");
        assert_eq!(
            fixed,
            format!("[MS, MS:1000031, {CV_LABEL_PLACEHOLDER}, ]")
        );
    }

    #[test]
    fn validate_pads_single_part_strings() {
        assert_eq!(
            validate_cv("[MS]"),
            format!("[MS, {CV_LABEL_PLACEHOLDER}, {CV_LABEL_PLACEHOLDER}, ]")
        );
    }

    #[test]
    fn validate_folds_extra_commas_into_value() {
        let fixed = validate_cv("[PRIDE,PRIDE:0000398,No PTMs,extra,detail]");
        assert_eq!(fixed, "[PRIDE, PRIDE:0000398, No PTMs, extra, detail]");
    }

    #[test]
    fn validate_ignores_plain_text() {
        assert_eq!(validate_cv("not a cv string"), "not a cv string");
        assert_eq!(validate_cv(""), "");
    }
}
