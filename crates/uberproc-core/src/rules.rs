use crate::actions::ActionKind;
use crate::error::{Result, UberError};
use crate::types::TargetType;
use std::collections::HashMap;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// How one target type is produced. Plain data, never mutated.
#[derive(Debug, Clone)]
pub struct Rule {
    pub target_type: TargetType,
    pub src_file_types: &'static [TargetType],
    pub action: ActionKind,
    pub requires_batch: bool,
    pub requires_all_sources: bool,
}

impl Rule {
    /// A rule whose first source is its own target needs no precursor.
    pub fn is_base(&self) -> bool {
        self.src_file_types.first() == Some(&self.target_type)
    }
}

// ---------------------------------------------------------------------------
// Helper macro for concise rule definitions
// ---------------------------------------------------------------------------

macro_rules! rule {
    (
        target: $target:expr,
        sources: [$($src:expr),+ $(,)?],
        action: $action:expr
        $(, batch: $batch:expr)?
        $(, all_sources: $all:expr)?
    ) => {
        Rule {
            target_type: $target,
            src_file_types: &[$($src),+],
            action: $action,
            requires_batch: {
                #[allow(unused_assignments, unused_mut)]
                let mut v = false;
                $(v = $batch;)?
                v
            },
            requires_all_sources: {
                #[allow(unused_assignments, unused_mut)]
                let mut v = false;
                $(v = $all;)?
                v
            },
        }
    };
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// The pipeline for one instrument family: its rules plus a total stage order.
#[derive(Debug)]
pub struct RuleSet {
    pub name: &'static str,
    pub requires_geo: bool,
    rules: HashMap<TargetType, Rule>,
    order: Vec<TargetType>,
    ranks: HashMap<TargetType, usize>,
}

impl RuleSet {
    /// `order` must list every rule's target exactly once.
    pub fn new(
        name: &'static str,
        rules: Vec<Rule>,
        order: Vec<TargetType>,
        requires_geo: bool,
    ) -> Self {
        let rules: HashMap<TargetType, Rule> =
            rules.into_iter().map(|r| (r.target_type, r)).collect();
        let ranks = order.iter().enumerate().map(|(i, t)| (*t, i)).collect();
        debug_assert_eq!(rules.len(), order.len(), "{name}: order/rules mismatch");
        Self {
            name,
            requires_geo,
            rules,
            order,
            ranks,
        }
    }

    pub fn order(&self) -> &[TargetType] {
        &self.order
    }

    pub fn contains(&self, target: TargetType) -> bool {
        self.rules.contains_key(&target)
    }

    pub fn get(&self, target: TargetType) -> Option<&Rule> {
        self.rules.get(&target)
    }

    pub fn rule(&self, target: TargetType) -> Result<&Rule> {
        self.rules.get(&target).ok_or_else(|| self.not_in_order(target))
    }

    /// Position of `target` in the stage order.
    pub fn rank(&self, target: TargetType) -> Result<usize> {
        self.ranks
            .get(&target)
            .copied()
            .ok_or_else(|| self.not_in_order(target))
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.values()
    }

    fn not_in_order(&self, target: TargetType) -> UberError {
        UberError::NotInOrder {
            target: target.to_string(),
            rule_set: self.name.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub const GENERAL: &str = "general";

static CATALOG: OnceLock<[RuleSet; 4]> = OnceLock::new();

/// The general rule set comes first.
fn catalog() -> &'static [RuleSet; 4] {
    CATALOG.get_or_init(|| {
        [
            level1a_pipeline(GENERAL),
            level1a_pipeline("seawifs"),
            geolocated_pipeline("modis"),
            geolocated_pipeline("viirs"),
        ]
    })
}

/// All rule sets in the catalog.
pub fn rule_sets() -> &'static [RuleSet] {
    catalog()
}

/// Rule set for `instrument`, or the general one when the instrument has no
/// dedicated pipeline.
pub fn get_ruleset(instrument: &str) -> &'static RuleSet {
    let [general, dedicated @ ..] = catalog();
    let wanted = instrument.to_lowercase();
    dedicated
        .iter()
        .find(|s| s.name == wanted)
        .unwrap_or(general)
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

/// Level-2 and above: identical for every instrument.
fn level2_rules() -> Vec<Rule> {
    use TargetType::*;
    vec![
        rule! {
            target: L2Extract,
            sources: [L2Gen],
            action: ActionKind::L2Extract
        },
        rule! {
            target: L2BrsGen,
            sources: [L2Gen],
            action: ActionKind::L2BrsGen
        },
        rule! {
            target: L2MapGen,
            sources: [L2Gen],
            action: ActionKind::L2MapGen
        },
        rule! {
            target: L2Bin,
            sources: [L2Gen],
            action: ActionKind::L2Bin,
            batch: true
        },
        rule! {
            target: L3Bin,
            sources: [L2Bin],
            action: ActionKind::L3Bin,
            batch: true
        },
        rule! {
            target: L3MapGen,
            sources: [L3Bin],
            action: ActionKind::L3MapGen
        },
        rule! {
            target: SmiGen,
            sources: [L3Bin],
            action: ActionKind::SmiGen
        },
    ]
}

const LEVEL2_ORDER: [TargetType; 7] = [
    TargetType::L2Extract,
    TargetType::L2BrsGen,
    TargetType::L2MapGen,
    TargetType::L2Bin,
    TargetType::L3Bin,
    TargetType::L3MapGen,
    TargetType::SmiGen,
];

/// Instruments whose Level-1A files feed l2gen directly.
fn level1a_pipeline(name: &'static str) -> RuleSet {
    use TargetType::*;
    let mut rules = vec![
        rule! {
            target: Level0,
            sources: [Level0],
            action: ActionKind::Nothing
        },
        rule! {
            target: Level1A,
            sources: [Level0],
            action: ActionKind::L1aGen
        },
        rule! {
            target: L1AExtract,
            sources: [Level1A],
            action: ActionKind::L1aExtract
        },
        rule! {
            target: L1BrsGen,
            sources: [Level1A],
            action: ActionKind::L1BrsGen
        },
        rule! {
            target: L1MapGen,
            sources: [Level1A],
            action: ActionKind::L1MapGen
        },
        rule! {
            target: L2Gen,
            sources: [Level1A],
            action: ActionKind::L2Gen
        },
    ];
    rules.extend(level2_rules());

    let mut order = vec![Level0, Level1A, L1AExtract, L1BrsGen, L1MapGen, L2Gen];
    order.extend(LEVEL2_ORDER);
    RuleSet::new(name, rules, order, false)
}

/// Instruments that need a geolocation file alongside Level-1 data.
fn geolocated_pipeline(name: &'static str) -> RuleSet {
    use TargetType::*;
    let mut rules = vec![
        rule! {
            target: Level0,
            sources: [Level0],
            action: ActionKind::Nothing
        },
        rule! {
            target: Level1A,
            sources: [Level0],
            action: ActionKind::L1aGen
        },
        rule! {
            target: Geo,
            sources: [Level1A],
            action: ActionKind::GeoGen
        },
        rule! {
            target: L1AExtract,
            sources: [Level1A],
            action: ActionKind::L1aExtract
        },
        rule! {
            target: Level1B,
            sources: [Level1A, Geo],
            action: ActionKind::L1bGen,
            all_sources: true
        },
        rule! {
            target: L1BrsGen,
            sources: [Level1B],
            action: ActionKind::L1BrsGen
        },
        rule! {
            target: L1MapGen,
            sources: [Level1B],
            action: ActionKind::L1MapGen
        },
        rule! {
            target: L2Gen,
            sources: [Level1B],
            action: ActionKind::L2Gen
        },
    ];
    rules.extend(level2_rules());

    let mut order = vec![
        Level0, Level1A, Geo, L1AExtract, Level1B, L1BrsGen, L1MapGen, L2Gen,
    ];
    order.extend(LEVEL2_ORDER);
    RuleSet::new(name, rules, order, true)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
