use crate::actions::{self, ActionEnv};
use crate::config::{RunConfig, StepConfig};
use crate::error::{Result, UberError};
use crate::rules::{Rule, RuleSet};
use crate::types::{Instrument, TargetType};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One step of a plan: a target type bound to its rule, options and I/O.
///
/// Processors order by the stage rank of their target type, computed once
/// when the processor is built.
#[derive(Debug, Clone)]
pub struct Processor {
    pub instrument: Instrument,
    pub rule_set: &'static RuleSet,
    pub target_type: TargetType,
    pub par_data: BTreeMap<String, String>,
    pub out_dir: PathBuf,
    pub input_file: Option<PathBuf>,
    pub geo_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub keepfiles: bool,
    /// Requested by the user rather than inferred by the resolver.
    pub explicit: bool,
    rule: &'static Rule,
    rank: usize,
}

impl Processor {
    /// Fails with a dependency error if `target_type` is not a stage of
    /// `rule_set`.
    pub fn new(
        instrument: Instrument,
        rule_set: &'static RuleSet,
        target_type: TargetType,
        par_data: BTreeMap<String, String>,
        out_dir: PathBuf,
        keepfiles: bool,
        explicit: bool,
    ) -> Result<Self> {
        let rank = rule_set.rank(target_type)?;
        let rule = rule_set.rule(target_type)?;
        Ok(Self {
            instrument,
            rule_set,
            target_type,
            par_data,
            out_dir,
            input_file: None,
            geo_file: None,
            output_file: None,
            keepfiles,
            explicit,
            rule,
            rank,
        })
    }

    /// A processor for a section of the parameter file.
    pub fn requested(
        step: &StepConfig,
        config: &RunConfig,
        instrument: Instrument,
        rule_set: &'static RuleSet,
    ) -> Result<Self> {
        Self::new(
            instrument,
            rule_set,
            step.target,
            step.options.clone(),
            step.out_dir.clone().unwrap_or_else(|| config.out_dir.clone()),
            step.keepfiles || config.keepfiles,
            true,
        )
    }

    /// A processor the resolver added to bridge a gap in the chain.
    pub fn inferred(
        target_type: TargetType,
        config: &RunConfig,
        instrument: Instrument,
        rule_set: &'static RuleSet,
    ) -> Result<Self> {
        Self::new(
            instrument,
            rule_set,
            target_type,
            BTreeMap::new(),
            config.out_dir.clone(),
            config.keepfiles,
            false,
        )
    }

    pub fn rule(&self) -> &'static Rule {
        self.rule
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn requires_batch_processing(&self) -> bool {
        self.rule.requires_batch
    }

    /// Whether this step needs a geolocation file next to its input.
    pub fn takes_geo(&self) -> bool {
        self.rule_set.requires_geo && self.rule.action.takes_geo()
    }

    /// Whether files of type `target` are an input to this step.
    pub fn consumes(&self, target: TargetType) -> bool {
        self.rule.src_file_types.contains(&target) || (target == TargetType::Geo && self.takes_geo())
    }

    pub fn program(&self) -> &'static str {
        actions::handler(self.rule.action).program(self.instrument)
    }

    pub fn accepts_status(&self, status: i32) -> bool {
        actions::handler(self.rule.action).accepts(status)
    }

    /// Run the bound action and return the program's exit status.
    pub fn execute(&self, env: &mut ActionEnv<'_>) -> Result<i32> {
        actions::run(self, env)
    }

    pub(crate) fn io(&self) -> Result<(&Path, &Path)> {
        match (&self.input_file, &self.output_file) {
            (Some(input), Some(output)) => Ok((input, output)),
            _ => Err(UberError::Unresolvable {
                target: self.target_type.to_string(),
                reason: "no input/output file bound".to_string(),
            }),
        }
    }
}

impl PartialEq for Processor {
    fn eq(&self, other: &Self) -> bool {
        self.rank == other.rank && self.target_type == other.target_type
    }
}

impl Eq for Processor {}

impl PartialOrd for Processor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Processor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| self.target_type.cmp(&other.target_type))
    }
}
