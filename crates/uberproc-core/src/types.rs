use std::fmt;

// ---------------------------------------------------------------------------
// TargetType
// ---------------------------------------------------------------------------

/// A pipeline stage. Classified input files carry the target type of the step
/// that would have produced them, so a Level-2 file is `L2Gen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetType {
    Level0,
    Level1A,
    Geo,
    L1AExtract,
    L1BrsGen,
    L1MapGen,
    Level1B,
    L2Gen,
    L2Extract,
    L2BrsGen,
    L2MapGen,
    L2Bin,
    L3Bin,
    L3MapGen,
    SmiGen,
}

impl TargetType {
    pub fn all() -> &'static [TargetType] {
        &[
            TargetType::Level0,
            TargetType::Level1A,
            TargetType::Geo,
            TargetType::L1AExtract,
            TargetType::L1BrsGen,
            TargetType::L1MapGen,
            TargetType::Level1B,
            TargetType::L2Gen,
            TargetType::L2Extract,
            TargetType::L2BrsGen,
            TargetType::L2MapGen,
            TargetType::L2Bin,
            TargetType::L3Bin,
            TargetType::L3MapGen,
            TargetType::SmiGen,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Level0 => "level 0",
            TargetType::Level1A => "level 1a",
            TargetType::Geo => "geo",
            TargetType::L1AExtract => "l1aextract",
            TargetType::L1BrsGen => "l1brsgen",
            TargetType::L1MapGen => "l1mapgen",
            TargetType::Level1B => "level 1b",
            TargetType::L2Gen => "l2gen",
            TargetType::L2Extract => "l2extract",
            TargetType::L2BrsGen => "l2brsgen",
            TargetType::L2MapGen => "l2mapgen",
            TargetType::L2Bin => "l2bin",
            TargetType::L3Bin => "l3bin",
            TargetType::L3MapGen => "l3mapgen",
            TargetType::SmiGen => "smigen",
        }
    }

    /// File-name safe form, used for generated parameter and list files.
    pub fn slug(self) -> String {
        self.as_str().replace(' ', "_")
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TargetType {
    type Err = crate::error::UberError;

    /// Section names are matched case-insensitively with runs of whitespace
    /// collapsed, so `[Level 1B]` and `[level  1b]` both name `level 1b`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        TargetType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| crate::error::UberError::UnknownTarget(s.trim().to_string()))
    }
}

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instrument {
    Modis,
    Seawifs,
    Viirs,
    General,
}

impl Instrument {
    /// Map a sensor description such as `MODIS Aqua` or `VIIRS J1` onto the
    /// instrument family that selects a rule set.
    pub fn from_sensor(sensor: &str) -> Instrument {
        let s = sensor.to_lowercase();
        if s.contains("modis") {
            Instrument::Modis
        } else if s.contains("seawifs") {
            Instrument::Seawifs
        } else if s.contains("viirs") {
            Instrument::Viirs
        } else {
            Instrument::General
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Instrument::Modis => "modis",
            Instrument::Seawifs => "seawifs",
            Instrument::Viirs => "viirs",
            Instrument::General => "general",
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-letter platform prefix used in OBPG file names.
pub fn platform_letter(sensor: &str) -> Option<char> {
    match sensor.to_lowercase().as_str() {
        "modis aqua" => Some('A'),
        "modis terra" => Some('T'),
        "seawifs" => Some('S'),
        "viirs npp" => Some('V'),
        "viirs j1" => Some('J'),
        _ => None,
    }
}

/// Inverse of [`platform_letter`].
pub fn sensor_for_letter(letter: char) -> Option<&'static str> {
    match letter {
        'A' => Some("MODIS Aqua"),
        'T' => Some("MODIS Terra"),
        'S' => Some("SeaWiFS"),
        'V' => Some("VIIRS NPP"),
        'J' => Some("VIIRS J1"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
