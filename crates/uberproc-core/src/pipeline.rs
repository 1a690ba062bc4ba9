//! One complete run: classify the inputs, pick the instrument's rule set,
//! resolve the plan, drive it, and archive what was kept. Stale working
//! files are purged first, whether or not the rest succeeds.

use crate::archive;
use crate::config::RunConfig;
use crate::datafile::{Classify, DataFile};
use crate::driver::{Collaborators, Driver, RunSummary};
use crate::error::{Result, UberError};
use crate::resolver;
use crate::rules::get_ruleset;
use crate::types::Instrument;
use crate::workdir::WorkDir;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Classify every input, failing on the first that is missing or unknown.
pub fn classify_inputs(files: &[PathBuf], classifier: &dyn Classify) -> Result<Vec<DataFile>> {
    files
        .iter()
        .map(|path| {
            if !path.exists() {
                return Err(UberError::MissingInput(path.clone()));
            }
            classifier.classify(path)
        })
        .collect()
}

/// The single instrument the inputs come from.
pub fn instrument_of(inputs: &[DataFile]) -> Result<Instrument> {
    let found: BTreeSet<&'static str> = inputs
        .iter()
        .map(|f| Instrument::from_sensor(&f.sensor).as_str())
        .collect();
    let mut iter = found.iter();
    match (iter.next(), iter.next()) {
        (Some(only), None) => Ok(Instrument::from_sensor(only)),
        (None, _) => Err(UberError::InvalidConfig("no input files".to_string())),
        _ => Err(UberError::MixedInstruments(
            found.into_iter().collect::<Vec<_>>().join(", "),
        )),
    }
}

/// Best effort, so a failed purge never stops a run.
fn purge_stale(work_dir: &WorkDir, config: &RunConfig) {
    match work_dir.purge_older_than(config.settings.max_file_age()) {
        Ok(purged) if !purged.is_empty() => {
            tracing::debug!(count = purged.len(), "purged stale working files")
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "could not purge working directory"),
    }
}

pub fn run(
    config: &RunConfig,
    classifier: &dyn Classify,
    collab: Collaborators<'_>,
) -> Result<RunSummary> {
    let work_dir = WorkDir::create(config.work_dir())?;
    purge_stale(&work_dir, config);
    let inputs = classify_inputs(&config.ifiles, classifier)?;
    let instrument = instrument_of(&inputs)?;
    let rule_set = get_ruleset(instrument.as_str());
    tracing::info!(
        instrument = %instrument,
        rule_set = rule_set.name,
        inputs = inputs.len(),
        "classified inputs"
    );

    let mut plan = resolver::plan_for(config, &inputs, instrument, rule_set)?;
    tracing::info!(
        steps = %plan
            .iter()
            .map(|p| p.target_type.as_str())
            .collect::<Vec<_>>()
            .join(" -> "),
        "processing plan"
    );

    let summary = Driver::new(config, &work_dir, &inputs, collab).run(&mut plan)?;
    if let Some(dest) = &config.tar {
        archive::write_archive(dest, &summary.kept)?;
    }
    tracing::info!(
        invocations = summary.invocations,
        reused = summary.reused.len(),
        kept = summary.kept.len(),
        deleted = summary.deleted.len(),
        "run complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datafile::NameClassifier;
    use std::path::Path;
    use tempfile::TempDir;

    fn record(name: &str) -> DataFile {
        NameClassifier.classify(Path::new(name)).unwrap()
    }

    #[test]
    fn aqua_and_terra_are_one_instrument() {
        let inputs = [
            record("A2010001000000.L2_LAC"),
            record("T2010001000000.L2_LAC"),
        ];
        assert_eq!(instrument_of(&inputs).unwrap(), Instrument::Modis);
    }

    #[test]
    fn mixed_instruments_are_rejected() {
        let inputs = [
            record("A2010001000000.L2_LAC"),
            record("S2010001000000.L2_LAC"),
        ];
        let err = instrument_of(&inputs).unwrap_err();
        assert!(matches!(err, UberError::MixedInstruments(ref s) if s.contains("modis")));
    }

    #[test]
    fn missing_input_is_reported() {
        let dir = TempDir::new().unwrap();
        let files = vec![dir.path().join("A2010001000000.L2_LAC")];
        let err = classify_inputs(&files, &NameClassifier).unwrap_err();
        assert!(matches!(err, UberError::MissingInput(_)));
    }

    #[test]
    fn unclassifiable_input_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "").unwrap();
        let err = classify_inputs(&[path], &NameClassifier).unwrap_err();
        assert!(matches!(err, UberError::Unclassified(_)));
    }
}
