//! Turns the requested targets into a complete, ordered plan.
//!
//! Requested processors come from the parameter file; the resolver walks each
//! target's rule back toward the level of the input files and adds a
//! processor for every stage that must still be produced. The plan is then
//! de-duplicated, sorted by stage rank and checked so that every step has its
//! sources before anything is run.

use crate::config::RunConfig;
use crate::datafile::DataFile;
use crate::error::{Result, UberError};
use crate::processor::Processor;
use crate::rules::RuleSet;
use crate::types::{Instrument, TargetType};
use std::collections::HashSet;

/// Stages that must run before `target` can be built from files at
/// `lowest_source_level`, innermost first. May contain duplicates.
pub fn get_required_programs(
    target: TargetType,
    rule_set: &RuleSet,
    lowest_source_level: TargetType,
) -> Result<Vec<TargetType>> {
    let rule = rule_set.rule(target)?;
    if rule.is_base() {
        return Ok(Vec::new());
    }
    let sources = rule.src_file_types;
    if sources.len() > 2 {
        return Err(UberError::Unresolvable {
            target: target.to_string(),
            reason: format!("rules with {} source types are not supported", sources.len()),
        });
    }

    let lowest_rank = rule_set.rank(lowest_source_level)?;
    let mut programs = Vec::new();
    for src in sources {
        if !rule_set.contains(*src) || rule_set.rank(*src)? <= lowest_rank {
            continue;
        }
        // Both sources of a two-source rule are produced together, minus any
        // at or below the input level.
        let unit: Vec<TargetType> = if sources.len() == 2 {
            sources
                .iter()
                .copied()
                .filter(|s| rule_set.rank(*s).map(|r| r > lowest_rank).unwrap_or(false))
                .collect()
        } else {
            vec![*src]
        };
        let mut chain = get_required_programs(*src, rule_set, lowest_source_level)?;
        chain.extend(unit);
        chain.append(&mut programs);
        programs = chain;
    }
    Ok(programs)
}

/// Lowest-ranked input type. Geolocation files accompany Level-1 data and do
/// not count toward the source level.
pub fn lowest_source_level(inputs: &[DataFile], rule_set: &RuleSet) -> Result<TargetType> {
    let mut lowest: Option<(usize, TargetType)> = None;
    for file in inputs.iter().filter(|f| f.file_type != TargetType::Geo) {
        let rank = rule_set.rank(file.file_type)?;
        if lowest.map(|(r, _)| rank < r).unwrap_or(true) {
            lowest = Some((rank, file.file_type));
        }
    }
    lowest.map(|(_, t)| t).ok_or_else(|| {
        UberError::InvalidConfig("no data files among the inputs, only geolocation".to_string())
    })
}

/// Geolocation files among the inputs replace the geolocation stage, but
/// only when no input sits below that stage's own sources. Lower inputs
/// produce new Level-1A files that still need geolocating.
fn geo_supplied(
    rule_set: &RuleSet,
    lowest_rank: usize,
    available: &HashSet<TargetType>,
) -> Result<bool> {
    if !available.contains(&TargetType::Geo) {
        return Ok(false);
    }
    let Some(rule) = rule_set.get(TargetType::Geo) else {
        return Ok(false);
    };
    for src in rule.src_file_types {
        if rule_set.rank(*src)? > lowest_rank {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Requested processors plus everything needed to reach them, sorted by
/// stage rank. Every stage ranked above the lowest input is inferred, since
/// the lowest files must be carried through it, even when files of that type
/// are among the inputs too. Supplied geolocation is the one exception.
pub fn build_plan(
    requested: Vec<Processor>,
    rule_set: &'static RuleSet,
    lowest_source_level: TargetType,
    available: &HashSet<TargetType>,
    config: &RunConfig,
    instrument: Instrument,
) -> Result<Vec<Processor>> {
    let lowest_rank = rule_set.rank(lowest_source_level)?;
    let mut needed = Vec::new();
    for p in &requested {
        if p.rank() <= lowest_rank {
            return Err(UberError::Unresolvable {
                target: p.target_type.to_string(),
                reason: format!("the input files are already at {lowest_source_level}"),
            });
        }
        needed.extend(get_required_programs(
            p.target_type,
            rule_set,
            lowest_source_level,
        )?);
    }

    let skip_geo = geo_supplied(rule_set, lowest_rank, available)?;
    let mut plan = requested;
    for target in needed {
        let supplied = skip_geo && target == TargetType::Geo;
        if supplied || plan.iter().any(|p| p.target_type == target) {
            continue;
        }
        plan.push(Processor::inferred(target, config, instrument, rule_set)?);
    }
    plan.sort();
    Ok(plan)
}

/// Walk the sorted plan forward and confirm each step has what it consumes,
/// either from the inputs or from an earlier step.
pub fn check_sources(plan: &[Processor], inputs: &[DataFile]) -> Result<()> {
    let mut available: HashSet<TargetType> = inputs.iter().map(|f| f.file_type).collect();
    for step in plan {
        let rule = step.rule();
        let sources = rule.src_file_types;
        let satisfied = if rule.requires_all_sources {
            sources.iter().all(|s| available.contains(s))
        } else {
            sources.iter().any(|s| available.contains(s))
        };
        if !satisfied {
            let names: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
            return Err(UberError::Unresolvable {
                target: step.target_type.to_string(),
                reason: format!("no {} files are available", names.join(" or ")),
            });
        }
        if step.takes_geo() && !available.contains(&TargetType::Geo) {
            return Err(UberError::Unresolvable {
                target: step.target_type.to_string(),
                reason: "a geolocation file is required".to_string(),
            });
        }
        available.insert(step.target_type);
    }
    Ok(())
}

/// Requested processors for every step section, resolved into a checked plan.
pub fn plan_for(
    config: &RunConfig,
    inputs: &[DataFile],
    instrument: Instrument,
    rule_set: &'static RuleSet,
) -> Result<Vec<Processor>> {
    let requested = config
        .steps
        .iter()
        .map(|step| Processor::requested(step, config, instrument, rule_set))
        .collect::<Result<Vec<_>>>()?;
    let lowest = lowest_source_level(inputs, rule_set)?;
    let available: HashSet<TargetType> = inputs.iter().map(|f| f.file_type).collect();
    let plan = build_plan(requested, rule_set, lowest, &available, config, instrument)?;
    check_sources(&plan, inputs)?;
    tracing::debug!(
        rule_set = rule_set.name,
        lowest = %lowest,
        plan = ?plan.iter().map(|p| p.target_type.as_str()).collect::<Vec<_>>(),
        "resolved plan"
    );
    Ok(plan)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
