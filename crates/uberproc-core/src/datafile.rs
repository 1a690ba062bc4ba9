//! Input file records and the classifier that produces them.
//!
//! Classification is a collaborator: the orchestrator only needs a file's
//! type, sensor and time span. [`NameClassifier`] reads those from OBPG-style
//! file names; other classifiers (e.g. metadata sniffers) plug in through
//! [`Classify`].

use crate::error::{Result, UberError};
use crate::types::{sensor_for_letter, TargetType};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// DataFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DataFile {
    pub name: PathBuf,
    pub file_type: TargetType,
    pub sensor: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub metadata: BTreeMap<String, String>,
}

impl DataFile {
    /// Record for a file produced from `self`: same sensor and time span.
    pub fn derived(&self, name: PathBuf, file_type: TargetType) -> DataFile {
        DataFile {
            name,
            file_type,
            sensor: self.sensor.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            metadata: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Classify
// ---------------------------------------------------------------------------

pub trait Classify {
    fn classify(&self, path: &Path) -> Result<DataFile>;
}

/// Classifies files by their OBPG names, e.g. `A2010001000000.L1A_LAC` or the
/// composite form `A20100012010008.L3b_8D`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameClassifier;

static GRANULE_RE: OnceLock<Regex> = OnceLock::new();
static COMPOSITE_RE: OnceLock<Regex> = OnceLock::new();

fn granule_re() -> &'static Regex {
    GRANULE_RE.get_or_init(|| {
        Regex::new(r"^(?P<stem>[A-Z])(?P<start>\d{13})\.(?P<level>L1A|L1B|L0|GEO|L2|L3b|L3m)(?:[_.].*)?$")
            .unwrap()
    })
}

fn composite_re() -> &'static Regex {
    COMPOSITE_RE.get_or_init(|| {
        Regex::new(r"^(?P<stem>[A-Z]|multi)(?P<start>\d{7})(?P<end>\d{7})\.(?P<level>L2|L3b|L3m)(?:[_.].*)?$")
            .unwrap()
    })
}

fn level_type(token: &str) -> Option<TargetType> {
    match token {
        "L0" => Some(TargetType::Level0),
        "L1A" => Some(TargetType::Level1A),
        "GEO" => Some(TargetType::Geo),
        "L1B" => Some(TargetType::Level1B),
        "L2" => Some(TargetType::L2Gen),
        "L3b" => Some(TargetType::L2Bin),
        "L3m" => Some(TargetType::L3MapGen),
        _ => None,
    }
}

/// `YYYYDDD` or `YYYYDDDHHMMSS`.
fn parse_obpg_time(s: &str) -> Option<NaiveDateTime> {
    let year: i32 = s.get(0..4)?.parse().ok()?;
    let doy: u32 = s.get(4..7)?.parse().ok()?;
    let date = NaiveDate::from_yo_opt(year, doy)?;
    if s.len() == 7 {
        return date.and_hms_opt(0, 0, 0);
    }
    let h: u32 = s.get(7..9)?.parse().ok()?;
    let m: u32 = s.get(9..11)?.parse().ok()?;
    let sec: u32 = s.get(11..13)?.parse().ok()?;
    date.and_hms_opt(h, m, sec)
}

fn sensor_for_stem(stem: &str) -> String {
    stem.chars()
        .next()
        .filter(|_| stem.len() == 1)
        .and_then(sensor_for_letter)
        .unwrap_or("unknown")
        .to_string()
}

impl Classify for NameClassifier {
    fn classify(&self, path: &Path) -> Result<DataFile> {
        let unclassified = || UberError::Unclassified(path.to_path_buf());
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(unclassified)?;

        let (caps, start, end) = if let Some(caps) = granule_re().captures(file_name) {
            let start = parse_obpg_time(&caps["start"]).ok_or_else(unclassified)?;
            (caps, start, start)
        } else if let Some(caps) = composite_re().captures(file_name) {
            let start = parse_obpg_time(&caps["start"]).ok_or_else(unclassified)?;
            let end = parse_obpg_time(&caps["end"]).ok_or_else(unclassified)?;
            (caps, start, end)
        } else {
            return Err(unclassified());
        };

        let file_type = level_type(&caps["level"]).ok_or_else(unclassified)?;
        let mut metadata = BTreeMap::new();
        metadata.insert("level".to_string(), caps["level"].to_string());
        metadata.insert("stem".to_string(), caps["stem"].to_string());

        Ok(DataFile {
            name: path.to_path_buf(),
            file_type,
            sensor: sensor_for_stem(&caps["stem"]),
            start_time: start,
            end_time: end,
            metadata,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
