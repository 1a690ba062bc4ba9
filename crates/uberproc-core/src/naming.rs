use crate::datafile::DataFile;
use crate::types::{platform_letter, TargetType};
use std::collections::BTreeMap;

/// Stem used for composites built from more than one platform.
pub const GENERIC_STEM: &str = "multi";

/// Derives the output file name for a per-file step.
pub trait NameOutputs {
    fn next_name(
        &self,
        source: &DataFile,
        target: TargetType,
        options: &BTreeMap<String, String>,
    ) -> String;
}

/// OBPG-style names: `<platform><YYYYDDDHHMMSS>.<suffix>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObpgNamer;

pub fn suffix(target: TargetType) -> &'static str {
    match target {
        TargetType::Level0 => "L0",
        TargetType::Level1A => "L1A_LAC",
        TargetType::Geo => "GEO",
        TargetType::L1AExtract => "L1A_SUB",
        TargetType::L1BrsGen => "L1_BRS",
        TargetType::L1MapGen => "L1_MAP.png",
        TargetType::Level1B => "L1B_LAC",
        TargetType::L2Gen => "L2_LAC",
        TargetType::L2Extract => "L2_SUB",
        TargetType::L2BrsGen => "L2_BRS",
        TargetType::L2MapGen => "L2_MAP.png",
        TargetType::L2Bin => "L3b",
        TargetType::L3Bin => "L3b_MERGED",
        TargetType::L3MapGen => "L3m",
        TargetType::SmiGen => "L3m_SMI",
    }
}

impl NameOutputs for ObpgNamer {
    fn next_name(
        &self,
        source: &DataFile,
        target: TargetType,
        options: &BTreeMap<String, String>,
    ) -> String {
        let stem = match platform_letter(&source.sensor) {
            Some(letter) => format!(
                "{letter}{}",
                source.start_time.format("%Y%j%H%M%S")
            ),
            // Unknown platform: keep whatever precedes the first dot.
            None => source
                .name
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.split('.').next())
                .unwrap_or("output")
                .to_string(),
        };
        match options.get("suite") {
            Some(suite) if !suite.is_empty() => format!("{stem}.{}_{suite}", suffix(target)),
            _ => format!("{stem}.{}", suffix(target)),
        }
    }
}

/// Name for a batch step's single output: earliest start and latest end day,
/// prefixed by the shared platform letter or [`GENERIC_STEM`] when the
/// inputs come from different platforms.
pub fn batch_output_name(records: &[&DataFile], target: TargetType) -> String {
    let start = records.iter().map(|r| r.start_time).min();
    let end = records.iter().map(|r| r.end_time).max();
    let letters: Vec<Option<char>> = records.iter().map(|r| platform_letter(&r.sensor)).collect();

    let prefix = match letters.first() {
        Some(Some(first)) if letters.iter().all(|l| *l == Some(*first)) => first.to_string(),
        _ => GENERIC_STEM.to_string(),
    };
    let span = match (start, end) {
        (Some(s), Some(e)) => format!("{}{}", s.format("%Y%j"), e.format("%Y%j")),
        _ => String::new(),
    };
    format!("{prefix}{span}.{}", suffix(target))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
