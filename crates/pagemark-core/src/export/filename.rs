use chrono::{DateTime, Utc};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Reduce a file name to `[A-Za-z0-9._-]`.
///
/// Diacritics are stripped ("Número" becomes "Numero"), whitespace becomes
/// `_`, and anything else outside the allowed set is dropped.
pub fn sanitize_filename(name: &str) -> String {
    let sanitized: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    if sanitized.trim_matches(|c| c == '.' || c == '_').is_empty() {
        "document".to_string()
    } else {
        sanitized
    }
}

/// Artifact name for an export of `original` made at `stamp`.
pub fn artifact_filename(stamp: DateTime<Utc>, original: &str) -> String {
    let mut name = sanitize_filename(original);
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    format!("annotated_{}_{}", stamp.timestamp_millis(), name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_strips_diacritics() {
        assert_eq!(sanitize_filename("Tarea Número 1.pdf"), "Tarea_Numero_1.pdf");
        assert_eq!(sanitize_filename("ensayo_crítico-final.pdf"), "ensayo_critico-final.pdf");
        assert_eq!(sanitize_filename("Ñandú.pdf"), "Nandu.pdf");
    }

    #[test]
    fn test_sanitize_drops_disallowed() {
        assert_eq!(sanitize_filename("a/b\\c:d?.pdf"), "abcd.pdf");
        assert_eq!(sanitize_filename("report (v2).pdf"), "report_v2.pdf");
        assert_eq!(sanitize_filename("tab\there"), "tab_here");
    }

    #[test]
    fn test_sanitize_empty() {
        assert_eq!(sanitize_filename(""), "document");
        assert_eq!(sanitize_filename("???"), "document");
        assert_eq!(sanitize_filename("日本語"), "document");
    }

    #[test]
    fn test_artifact_filename() {
        let stamp = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(
            artifact_filename(stamp, "Tarea Número 1.pdf"),
            "annotated_1700000000123_Tarea_Numero_1.pdf"
        );
        assert_eq!(artifact_filename(stamp, "notes"), "annotated_1700000000123_notes.pdf");
        assert_eq!(artifact_filename(stamp, "SCAN.PDF"), "annotated_1700000000123_SCAN.PDF");
    }
}
