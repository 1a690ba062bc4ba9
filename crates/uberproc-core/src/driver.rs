//! Walks a resolved plan, dispatching each step per file or as one batch.
//!
//! The driver keeps a pool of available files keyed by target type, seeded
//! from the classified inputs and extended with every step's outputs. Each
//! step draws its inputs from that pool, so a step always sees the outputs of
//! the steps before it.
//!
//! Policy for outputs that already exist:
//! - `overwrite`: run the step anyway
//! - `use_existing`: reuse the file and skip the program
//! - neither: abort with [`UberError::OutputExists`]
//!
//! With `use_existing`, inferred steps that only feed reused outputs are
//! skipped without running, so a rerun after cleanup starts nothing.
//!
//! Cleanup runs whether the plan succeeded or not.

use crate::actions::{ActionEnv, CommandRunner};
use crate::ancillary::AncillaryResolver;
use crate::config::RunConfig;
use crate::datafile::DataFile;
use crate::error::{Result, UberError};
use crate::naming::{batch_output_name, NameOutputs};
use crate::processor::Processor;
use crate::types::TargetType;
use crate::workdir::{remove_if_present, WorkDir};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// The swappable pieces a run talks to.
pub struct Collaborators<'a> {
    pub runner: &'a mut dyn CommandRunner,
    pub ancillary: &'a mut dyn AncillaryResolver,
    pub namer: &'a dyn NameOutputs,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// External programs run.
    pub invocations: usize,
    /// Existing outputs reused instead of regenerated.
    pub reused: Vec<PathBuf>,
    /// Outputs that stay on disk after the run.
    pub kept: Vec<PathBuf>,
    /// Intermediate outputs removed by cleanup.
    pub deleted: Vec<PathBuf>,
}

/// Files a step can draw from, keyed by target type, with the record of each.
#[derive(Debug, Clone, Default)]
struct Pool {
    files: BTreeMap<TargetType, Vec<PathBuf>>,
    records: HashMap<PathBuf, DataFile>,
    completed: Vec<TargetType>,
}

impl Pool {
    fn seeded(inputs: &[DataFile]) -> Self {
        let mut pool = Self::default();
        for file in inputs {
            pool.add(file.clone());
        }
        pool
    }

    fn add(&mut self, record: DataFile) {
        self.files
            .entry(record.file_type)
            .or_default()
            .push(record.name.clone());
        self.records.insert(record.name.clone(), record);
    }

    fn has(&self, target: TargetType) -> bool {
        self.files
            .get(&target)
            .map(|files| !files.is_empty())
            .unwrap_or(false)
    }

    fn files_of(&self, target: TargetType) -> Vec<PathBuf> {
        self.files.get(&target).cloned().unwrap_or_default()
    }

    fn record(&self, path: &Path) -> Result<&DataFile> {
        self.records
            .get(path)
            .ok_or_else(|| UberError::MissingInput(path.to_path_buf()))
    }

    /// Which pooled file type feeds `step`.
    fn source_key(&self, step: &Processor) -> Result<TargetType> {
        let rule = step.rule();
        let sources = rule.src_file_types;
        if let Some(first) = sources.first() {
            if self.has(*first) {
                return Ok(*first);
            }
        }
        if !rule.requires_all_sources {
            let recent = self
                .completed
                .iter()
                .rev()
                .find(|t| sources.contains(t) && self.has(**t));
            if let Some(t) = recent {
                return Ok(*t);
            }
            if let Some(t) = sources.iter().find(|t| self.has(**t)) {
                return Ok(*t);
            }
        }
        Err(UberError::Unresolvable {
            target: step.target_type.to_string(),
            reason: "none of its source files are available".to_string(),
        })
    }

    fn matching_geo(&self, step: &Processor, record: &DataFile) -> Result<PathBuf> {
        self.files
            .get(&TargetType::Geo)
            .into_iter()
            .flatten()
            .find(|p| {
                self.records
                    .get(*p)
                    .map(|g| g.sensor == record.sensor && g.start_time == record.start_time)
                    .unwrap_or(false)
            })
            .cloned()
            .ok_or_else(|| UberError::Unresolvable {
                target: step.target_type.to_string(),
                reason: format!("no geolocation file matches {}", record.name.display()),
            })
    }
}

pub struct Driver<'a, 'c> {
    config: &'a RunConfig,
    work_dir: &'a WorkDir,
    collab: Collaborators<'c>,
    pool: Pool,
    transient: Vec<PathBuf>,
    summary: RunSummary,
}

impl<'a, 'c> Driver<'a, 'c> {
    pub fn new(
        config: &'a RunConfig,
        work_dir: &'a WorkDir,
        inputs: &[DataFile],
        collab: Collaborators<'c>,
    ) -> Self {
        Self {
            config,
            work_dir,
            collab,
            pool: Pool::seeded(inputs),
            transient: Vec::new(),
            summary: RunSummary::default(),
        }
    }

    /// Execute `plan` in order, then clean up. The first failing step ends
    /// the run; later steps never start.
    pub fn run(mut self, plan: &mut [Processor]) -> Result<RunSummary> {
        let outcome = self.execute_plan(plan);
        self.cleanup();
        outcome.map(|()| self.summary)
    }

    fn execute_plan(&mut self, plan: &mut [Processor]) -> Result<()> {
        let skipped = if self.config.use_existing {
            self.unneeded_steps(plan)?
        } else {
            vec![false; plan.len()]
        };
        for (step, skip) in plan.iter_mut().zip(skipped) {
            let key = self.pool.source_key(step)?;
            if skip {
                tracing::debug!(
                    target_type = %step.target_type,
                    "skipping step, later outputs already exist"
                );
                for record in self.projected_outputs(&self.pool, step, key)? {
                    self.pool.add(record);
                }
            } else {
                tracing::debug!(
                    target_type = %step.target_type,
                    source = %key,
                    batch = step.requires_batch_processing(),
                    "starting step"
                );
                if step.requires_batch_processing() {
                    self.run_batch(step, key)?;
                } else {
                    self.run_per_file(step, key)?;
                }
            }
            self.pool.completed.push(step.target_type);
        }
        Ok(())
    }

    /// Output records `step` would produce from the files pooled under `key`.
    fn projected_outputs(
        &self,
        pool: &Pool,
        step: &Processor,
        key: TargetType,
    ) -> Result<Vec<DataFile>> {
        let inputs = pool.files_of(key);
        let records = inputs
            .iter()
            .map(|p| pool.record(p))
            .collect::<Result<Vec<&DataFile>>>()?;
        if step.requires_batch_processing() {
            let output = step
                .out_dir
                .join(batch_output_name(&records, step.target_type));
            return Ok(vec![merged_record(&records, output, step.target_type)]);
        }
        Ok(records
            .into_iter()
            .map(|record| {
                let name = self
                    .collab
                    .namer
                    .next_name(record, step.target_type, &step.par_data);
                record.derived(step.out_dir.join(name), step.target_type)
            })
            .collect())
    }

    /// Steps whose outputs nobody needs this run. Walking backward, a step
    /// is needed when it was requested, keeps its files, or feeds a later
    /// step that has to run because one of its outputs is missing.
    fn unneeded_steps(&self, plan: &[Processor]) -> Result<Vec<bool>> {
        let mut pool = self.pool.clone();
        let mut complete = Vec::with_capacity(plan.len());
        for step in plan {
            let key = pool.source_key(step)?;
            let outputs = self.projected_outputs(&pool, step, key)?;
            complete.push(outputs.iter().all(|r| r.name.exists()));
            for record in outputs {
                pool.add(record);
            }
            pool.completed.push(step.target_type);
        }

        let mut runs = vec![false; plan.len()];
        let mut unneeded = vec![false; plan.len()];
        for i in (0..plan.len()).rev() {
            let step = &plan[i];
            let feeds_a_run =
                (i + 1..plan.len()).any(|k| runs[k] && plan[k].consumes(step.target_type));
            let needed = step.explicit || step.keepfiles || feeds_a_run;
            unneeded[i] = !needed;
            runs[i] = needed && !complete[i];
        }
        Ok(unneeded)
    }

    fn run_per_file(&mut self, step: &mut Processor, key: TargetType) -> Result<()> {
        let inputs = self.pool.files_of(key);
        let outputs = self.projected_outputs(&self.pool, step, key)?;
        for (input, output) in inputs.into_iter().zip(outputs) {
            let geo = if step.takes_geo() {
                let record = self.pool.record(&input)?;
                Some(self.pool.matching_geo(step, record)?)
            } else {
                None
            };

            step.input_file = Some(input);
            step.geo_file = geo;
            step.output_file = Some(output.name.clone());

            let ran = if self.should_run(&output.name)? {
                self.invoke(step)?;
                true
            } else {
                false
            };
            self.add_output(step, output, ran);
        }
        Ok(())
    }

    fn run_batch(&mut self, step: &mut Processor, key: TargetType) -> Result<()> {
        let inputs = self.pool.files_of(key);
        let merged = self
            .projected_outputs(&self.pool, step, key)?
            .into_iter()
            .next()
            .ok_or_else(|| UberError::Unresolvable {
                target: step.target_type.to_string(),
                reason: "no input files to join".to_string(),
            })?;
        let output = merged.name.clone();
        step.geo_file = None;
        step.output_file = Some(output.clone());

        let ran = if self.should_run(&output)? {
            let mut listing = inputs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join("\n");
            listing.push('\n');
            let list = self
                .work_dir
                .write_timestamped(&step.target_type.slug(), "txt", &listing)?;
            tracing::debug!(files = inputs.len(), list = %list.display(), "wrote batch file list");
            step.input_file = Some(list);
            self.invoke(step)?;
            true
        } else {
            false
        };
        self.add_output(step, merged, ran);
        Ok(())
    }

    /// Apply the existing-output policy. `false` means reuse.
    fn should_run(&mut self, output: &Path) -> Result<bool> {
        if !output.exists() || self.config.overwrite {
            return Ok(true);
        }
        if self.config.use_existing {
            tracing::info!(output = %output.display(), "reusing existing output");
            self.summary.reused.push(output.to_path_buf());
            return Ok(false);
        }
        Err(UberError::OutputExists(output.to_path_buf()))
    }

    fn invoke(&mut self, step: &Processor) -> Result<()> {
        std::fs::create_dir_all(&step.out_dir)?;
        let mut env = ActionEnv {
            runner: &mut *self.collab.runner,
            ancillary: &mut *self.collab.ancillary,
            work_dir: self.work_dir,
            use_ancillary: self.config.use_ancillary,
            use_nrt_anc: self.config.use_nrt_anc,
        };
        let status = step.execute(&mut env)?;
        self.summary.invocations += 1;
        if !step.accepts_status(status) {
            return Err(UberError::ProgramFailed {
                program: step.program().to_string(),
                status,
            });
        }
        Ok(())
    }

    fn add_output(&mut self, step: &Processor, record: DataFile, ran: bool) {
        let path = record.name.clone();
        if step.explicit || step.keepfiles {
            if !self.summary.kept.contains(&path) {
                self.summary.kept.push(path);
            }
        } else if ran {
            self.transient.push(path);
        }
        self.pool.add(record);
    }

    /// Best effort: failures are logged and never change the run's outcome.
    fn cleanup(&mut self) {
        for path in std::mem::take(&mut self.transient) {
            match remove_if_present(&path) {
                Ok(true) => {
                    tracing::debug!(file = %path.display(), "removed intermediate file");
                    self.summary.deleted.push(path);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "could not remove intermediate file"),
            }
        }
    }
}

/// Record for a batch output spanning all of `records`.
fn merged_record(records: &[&DataFile], name: PathBuf, file_type: TargetType) -> DataFile {
    let sensor = match records.first() {
        Some(first) if records.iter().all(|r| r.sensor == first.sensor) => first.sensor.clone(),
        _ => "multiple".to_string(),
    };
    let start_time = records.iter().map(|r| r.start_time).min().unwrap_or_default();
    let end_time = records.iter().map(|r| r.end_time).max().unwrap_or_default();
    DataFile {
        name,
        file_type,
        sensor,
        start_time,
        end_time,
        metadata: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::ProgramCall;
    use crate::ancillary::NoAncillary;
    use crate::datafile::{Classify, NameClassifier};
    use crate::naming::ObpgNamer;
    use crate::rules::get_ruleset;
    use crate::types::Instrument;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Touch {
        calls: Vec<ProgramCall>,
    }

    impl CommandRunner for Touch {
        fn run(&mut self, call: &ProgramCall) -> Result<Option<i32>> {
            self.calls.push(call.clone());
            if let Some(out) = call.args.iter().find_map(|a| a.strip_prefix("ofile=")) {
                std::fs::write(out, "").unwrap();
            }
            Ok(Some(0))
        }
    }

    fn config(dir: &Path) -> RunConfig {
        let text = format!("[main]\nifile=x\nodir={}\n[l2brsgen]\n", dir.display());
        RunConfig::from_par(
            &crate::parfile::ParFile::parse(&text).unwrap(),
            &Default::default(),
            Default::default(),
        )
        .unwrap()
    }

    fn step(target: TargetType, dir: &Path, explicit: bool) -> Processor {
        Processor::new(
            Instrument::Modis,
            get_ruleset("modis"),
            target,
            BTreeMap::new(),
            dir.to_path_buf(),
            false,
            explicit,
        )
        .unwrap()
    }

    fn input(dir: &Path, name: &str) -> DataFile {
        let path = dir.join(name);
        std::fs::write(&path, "").unwrap();
        NameClassifier.classify(&path).unwrap()
    }

    #[test]
    fn geo_is_paired_by_start_time() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let wd = WorkDir::create(cfg.work_dir()).unwrap();
        let inputs = vec![
            input(dir.path(), "A2010001003500.L1A_LAC"),
            input(dir.path(), "A2010001004000.L1A_LAC"),
            input(dir.path(), "A2010001004000.GEO"),
            input(dir.path(), "A2010001003500.GEO"),
        ];
        let mut runner = Touch::default();
        let mut anc = NoAncillary;
        let driver = Driver::new(
            &cfg,
            &wd,
            &inputs,
            Collaborators {
                runner: &mut runner,
                ancillary: &mut anc,
                namer: &ObpgNamer,
            },
        );
        let mut plan = vec![step(TargetType::Level1B, dir.path(), true)];
        let summary = driver.run(&mut plan).unwrap();
        assert_eq!(summary.invocations, 2);
        for call in &runner.calls {
            let stamp = &call.args[0]["ifile=".len()..];
            let stamp = Path::new(stamp).file_name().unwrap().to_str().unwrap()[..14].to_string();
            assert!(call.args[1].ends_with(&format!("{stamp}.GEO")), "{call}");
        }
    }

    #[test]
    fn missing_geo_partner_is_unresolvable() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let wd = WorkDir::create(cfg.work_dir()).unwrap();
        let inputs = vec![
            input(dir.path(), "A2010001003500.L1A_LAC"),
            input(dir.path(), "A2010001005500.GEO"),
        ];
        let mut runner = Touch::default();
        let mut anc = NoAncillary;
        let driver = Driver::new(
            &cfg,
            &wd,
            &inputs,
            Collaborators {
                runner: &mut runner,
                ancillary: &mut anc,
                namer: &ObpgNamer,
            },
        );
        let mut plan = vec![step(TargetType::Level1B, dir.path(), true)];
        let err = driver.run(&mut plan).unwrap_err();
        assert!(matches!(err, UberError::Unresolvable { .. }));
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn merged_record_spans_all_inputs() {
        let dir = TempDir::new().unwrap();
        let a = input(dir.path(), "A2010001000000.L2_LAC");
        let t = input(dir.path(), "T2010003120000.L2_LAC");
        let merged = merged_record(&[&a, &t], dir.path().join("out"), TargetType::L2Bin);
        assert_eq!(merged.sensor, "multiple");
        assert_eq!(merged.start_time, a.start_time);
        assert_eq!(merged.end_time, t.end_time);
    }
}
