//! Parser for `rpmdiff` output.
//!
//! rpmdiff prints one difference per line as an 11-column first field and
//! the subject:
//!
//! ```text
//! added       REQUIRES libfoo.so.2()(64bit)
//! removed     /usr/share/doc/python3/README
//! S.5.......T /usr/bin/python3.6
//! S.5........ RELEASE
//! ```
//!
//! The first field is `added`/`removed` or a verify-flags string
//! (`S M 5 D N L V U G F T`, `.` where unchanged).

use std::sync::LazyLock;

use archdiffer_core::comparison::DiffRecord;
use regex::Regex;

use super::{Category, DiffType};
use crate::plugin::{PluginError, ResultParser};

/// Dependency kinds rpmdiff reports under `PRCO`.
const PRCO_NAMES: &str =
    "REQUIRES|PROVIDES|CONFLICTS|OBSOLETES|RECOMMENDS|SUGGESTS|ENHANCES|SUPPLEMENTS";

static PRCO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(added|removed)\s+((?:{PRCO_NAMES})\s+.+)$")).expect("valid regex")
});

static FILE_PRESENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(added|removed)\s+(/.*)$").expect("valid regex"));

static FILE_CHANGED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([SM5DNLVUGFT.]{11})\s+(/.*)$").expect("valid regex"));

static TAG_CHANGED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([SM5DNLVUGFT.]{11})\s+([A-Z][A-Z0-9_]*)$").expect("valid regex"));

#[derive(Debug, Clone, Copy, Default)]
pub struct RpmdiffParser;

impl RpmdiffParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_line(line: &str) -> Option<DiffRecord> {
        let record = |category: Category, diff_type: DiffType, info: &str| DiffRecord {
            category: category.as_str().to_string(),
            diff_type: diff_type.as_str().to_string(),
            diff_info: info.trim_end().to_string(),
        };

        if let Some(caps) = PRCO_RE.captures(line) {
            let diff_type = DiffType::from_word(&caps[1])?;
            return Some(record(Category::Prco, diff_type, &caps[2]));
        }
        if let Some(caps) = FILE_PRESENCE_RE.captures(line) {
            let diff_type = DiffType::from_word(&caps[1])?;
            return Some(record(Category::Files, diff_type, &caps[2]));
        }
        if let Some(caps) = FILE_CHANGED_RE.captures(line) {
            let info = format!("{} {}", &caps[1], &caps[2]);
            return Some(record(Category::Files, DiffType::Changed, &info));
        }
        if let Some(caps) = TAG_CHANGED_RE.captures(line) {
            return Some(record(Category::Tags, DiffType::Changed, &caps[2]));
        }
        None
    }
}

impl ResultParser for RpmdiffParser {
    fn parse(&self, output: &[u8]) -> Result<Vec<DiffRecord>, PluginError> {
        let text = std::str::from_utf8(output)
            .map_err(|e| PluginError::Parse(format!("rpmdiff output is not UTF-8: {e}")))?;

        let mut records = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            match Self::parse_line(line) {
                Some(record) => records.push(record),
                None => tracing::debug!(line, "Skipping unrecognised rpmdiff line"),
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<(String, String, String)> {
        RpmdiffParser::new()
            .parse(text.as_bytes())
            .unwrap()
            .into_iter()
            .map(|r| (r.category, r.diff_type, r.diff_info))
            .collect()
    }

    fn triple(c: &str, t: &str, i: &str) -> (String, String, String) {
        (c.into(), t.into(), i.into())
    }

    #[test]
    fn parses_every_line_shape() {
        let out = "\
added       REQUIRES libfoo.so.2()(64bit)
removed     PROVIDES python3-libs = 3.6.1-8.fc26
removed     /usr/share/doc/python3/README
added       /usr/bin/python3.6m
S.5.......T /usr/bin/python3.6
S.5........ RELEASE
";
        assert_eq!(
            parse(out),
            vec![
                triple("PRCO", "added", "REQUIRES libfoo.so.2()(64bit)"),
                triple("PRCO", "removed", "PROVIDES python3-libs = 3.6.1-8.fc26"),
                triple("files", "removed", "/usr/share/doc/python3/README"),
                triple("files", "added", "/usr/bin/python3.6m"),
                triple("files", "changed", "S.5.......T /usr/bin/python3.6"),
                triple("tags", "changed", "RELEASE"),
            ]
        );
    }

    #[test]
    fn empty_output_means_no_differences() {
        assert!(parse("").is_empty());
        assert!(parse("\n\n").is_empty());
    }

    #[test]
    fn unrecognised_lines_are_skipped() {
        let out = "warning: something odd\nS.5........ VERSION\n";
        assert_eq!(parse(out), vec![triple("tags", "changed", "VERSION")]);
    }

    #[test]
    fn invalid_utf8_is_a_parse_error() {
        let err = RpmdiffParser::new().parse(&[0xff, 0xfe, b'\n']).unwrap_err();
        assert!(matches!(err, PluginError::Parse(_)));
    }
}
