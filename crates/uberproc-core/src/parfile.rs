//! Parser for the bracketed-section parameter file.
//!
//! ```text
//! [main]
//! ifile=A2010001003500.L0_LAC
//!
//! [l2gen]
//! l2prod=chlor_a
//! ```

use crate::error::{Result, UberError};
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub name: String,
    /// Line the `[name]` header appeared on.
    pub line: usize,
    pub entries: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParFile {
    pub sections: Vec<Section>,
}

impl ParFile {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(UberError::MissingInput(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut sections: Vec<Section> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(rest) = line.strip_prefix('[') {
                let name = rest
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| syntax(line_no, format!("malformed section header '{line}'")))?;
                if sections.iter().any(|s| s.name.eq_ignore_ascii_case(name)) {
                    return Err(syntax(line_no, format!("duplicate section [{name}]")));
                }
                sections.push(Section {
                    name: name.to_string(),
                    line: line_no,
                    entries: Vec::new(),
                });
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(syntax(line_no, format!("expected key=value, found '{line}'")));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(syntax(line_no, "empty key".to_string()));
            }
            let Some(section) = sections.last_mut() else {
                return Err(syntax(line_no, format!("'{key}' appears before any section")));
            };
            section
                .entries
                .push((key.to_string(), value.trim().to_string()));
        }

        Ok(Self { sections })
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

fn syntax(line: usize, message: String) -> UberError {
    UberError::ParFileSyntax { line, message }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_in_order() {
        let text = "# run\n[main]\nifile = a.L0, b.L0\n\n[level 1b]\n[l2gen]\nl2prod=chlor_a\nsuite=OC\n";
        let par = ParFile::parse(text).unwrap();
        let names: Vec<_> = par.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["main", "level 1b", "l2gen"]);
        assert_eq!(par.section("main").unwrap().get("ifile"), Some("a.L0, b.L0"));
        assert_eq!(par.section("L2GEN").unwrap().entries.len(), 2);
        assert!(par.section("level 1b").unwrap().entries.is_empty());
    }

    #[test]
    fn value_may_contain_equals() {
        let par = ParFile::parse("[l2gen]\nextra=a=b\n").unwrap();
        assert_eq!(par.section("l2gen").unwrap().get("extra"), Some("a=b"));
    }

    #[test]
    fn last_duplicate_key_wins() {
        let par = ParFile::parse("[main]\nkeepfiles=0\nkeepfiles=1\n").unwrap();
        assert_eq!(par.section("main").unwrap().get("keepfiles"), Some("1"));
    }

    #[test]
    fn key_outside_section_is_rejected() {
        let err = ParFile::parse("ifile=a\n[main]\n").unwrap_err();
        assert!(matches!(err, UberError::ParFileSyntax { line: 1, .. }));
    }

    #[test]
    fn malformed_lines_report_line_numbers() {
        let err = ParFile::parse("[main]\nifile=a\nbogus\n").unwrap_err();
        assert!(matches!(err, UberError::ParFileSyntax { line: 3, .. }));
        let err = ParFile::parse("[main\n").unwrap_err();
        assert!(matches!(err, UberError::ParFileSyntax { line: 1, .. }));
    }

    #[test]
    fn duplicate_sections_are_rejected() {
        let err = ParFile::parse("[l2gen]\n[L2gen]\n").unwrap_err();
        assert!(matches!(err, UberError::ParFileSyntax { line: 2, .. }));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = ParFile::load(Path::new("/nonexistent/run.par")).unwrap_err();
        assert!(matches!(err, UberError::MissingInput(_)));
    }
}
