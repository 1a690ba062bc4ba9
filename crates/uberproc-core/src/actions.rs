//! One action per target type: which program runs, how its command line is
//! built, and which exit statuses count as success.
//!
//! # Invocation conventions
//! - per-file: `<prog> ifile=<in> [geofile=<geo>] ofile=<out> [k=v ...]`
//! - batch:    `<prog> infile=<filelist> ofile=<out> [k=v ...]`
//! - l2gen:    `l2gen par=<generated parameter file>`
//!
//! Programs are run synchronously through a [`CommandRunner`]; the driver
//! blocks until each one exits.

use crate::ancillary::{AncillaryRequest, AncillaryResolver};
use crate::config::Settings;
use crate::error::{Result, UberError};
use crate::processor::Processor;
use crate::types::Instrument;
use crate::workdir::WorkDir;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Raw inputs: nothing to run.
    Nothing,
    L1aGen,
    GeoGen,
    L1aExtract,
    L1bGen,
    L1BrsGen,
    L1MapGen,
    L2Gen,
    L2Extract,
    L2BrsGen,
    L2MapGen,
    L2Bin,
    L3Bin,
    L3MapGen,
    SmiGen,
}

impl ActionKind {
    /// Steps that take a `geofile=` when the instrument is geolocated.
    pub fn takes_geo(self) -> bool {
        matches!(
            self,
            ActionKind::L1bGen | ActionKind::L1BrsGen | ActionKind::L1MapGen | ActionKind::L2Gen
        )
    }
}

// ---------------------------------------------------------------------------
// ProgramCall / CommandRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramCall {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for ProgramCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

pub trait CommandRunner {
    /// Run `call` to completion. `None` means the process ended without an
    /// exit status (killed by a signal).
    fn run(&mut self, call: &ProgramCall) -> Result<Option<i32>>;
}

/// Runs programs as child processes with inherited stdout/stderr.
///
/// Lookup order: a `programs` override from the settings, then `bin_dir`,
/// then `PATH`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    bin_dir: Option<PathBuf>,
    programs: BTreeMap<String, PathBuf>,
}

impl SystemRunner {
    pub fn new(settings: &Settings) -> Self {
        Self {
            bin_dir: settings.bin_dir.clone(),
            programs: settings.programs.clone(),
        }
    }

    pub fn resolve(&self, program: &str) -> Result<PathBuf> {
        if let Some(path) = self.programs.get(program) {
            return Ok(path.clone());
        }
        if let Some(dir) = &self.bin_dir {
            let candidate = dir.join(program);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        which::which(program).map_err(|_| UberError::ProgramNotFound(program.to_string()))
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, call: &ProgramCall) -> Result<Option<i32>> {
        let exe = self.resolve(&call.program)?;
        let status = Command::new(&exe)
            .args(&call.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| UberError::ProgramSpawn {
                program: exe.display().to_string(),
                reason: e.to_string(),
            })?;
        Ok(status.code())
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// What an action may use while building and running its command.
pub struct ActionEnv<'a> {
    pub runner: &'a mut dyn CommandRunner,
    pub ancillary: &'a mut dyn AncillaryResolver,
    pub work_dir: &'a WorkDir,
    pub use_ancillary: bool,
    pub use_nrt_anc: bool,
}

pub trait Action: Sync {
    fn program(&self, instrument: Instrument) -> &'static str;

    fn runs_program(&self) -> bool {
        true
    }

    fn command(&self, program: &str, step: &Processor, _env: &mut ActionEnv<'_>) -> Result<ProgramCall> {
        per_file_call(program, step)
    }

    fn accepts(&self, status: i32) -> bool {
        status == 0
    }
}

/// Run the action bound to `step` and return the program's exit status.
pub fn run(step: &Processor, env: &mut ActionEnv<'_>) -> Result<i32> {
    let action = handler(step.rule().action);
    if !action.runs_program() {
        tracing::debug!(target_type = %step.target_type, "nothing to run");
        return Ok(0);
    }
    let program = action.program(step.instrument);
    let call = action.command(program, step, env)?;
    tracing::info!(command = %call, "running {}", step.target_type);
    env.runner
        .run(&call)?
        .ok_or_else(|| UberError::ProgramKilled(program.to_string()))
}

fn per_file_call(program: &str, step: &Processor) -> Result<ProgramCall> {
    let (input, output) = step.io()?;
    let mut args = vec![format!("ifile={}", input.display())];
    if let Some(geo) = &step.geo_file {
        args.push(format!("geofile={}", geo.display()));
    }
    args.push(format!("ofile={}", output.display()));
    args.extend(step.par_data.iter().map(|(k, v)| format!("{k}={v}")));
    Ok(ProgramCall {
        program: program.to_string(),
        args,
    })
}

fn batch_call(program: &str, step: &Processor) -> Result<ProgramCall> {
    let (list, output) = step.io()?;
    let mut args = vec![
        format!("infile={}", list.display()),
        format!("ofile={}", output.display()),
    ];
    args.extend(step.par_data.iter().map(|(k, v)| format!("{k}={v}")));
    Ok(ProgramCall {
        program: program.to_string(),
        args,
    })
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

macro_rules! fixed_program {
    ($name:ident, $program:expr) => {
        pub struct $name;

        impl Action for $name {
            fn program(&self, _instrument: Instrument) -> &'static str {
                $program
            }
        }
    };
}

pub struct Level0Source;

impl Action for Level0Source {
    fn program(&self, _instrument: Instrument) -> &'static str {
        ""
    }

    fn runs_program(&self) -> bool {
        false
    }
}

pub struct L1aGenStep;

impl Action for L1aGenStep {
    fn program(&self, instrument: Instrument) -> &'static str {
        match instrument {
            Instrument::Modis => "modis_L0_to_L1A",
            Instrument::Viirs => "l1agen_viirs",
            Instrument::Seawifs => "l1agen_seawifs",
            Instrument::General => "l1agen",
        }
    }
}

pub struct GeoGenStep;

impl Action for GeoGenStep {
    fn program(&self, instrument: Instrument) -> &'static str {
        match instrument {
            Instrument::Viirs => "geolocate_viirs",
            _ => "modis_GEO",
        }
    }
}

pub struct L1aExtractStep;

impl Action for L1aExtractStep {
    fn program(&self, instrument: Instrument) -> &'static str {
        match instrument {
            Instrument::Modis => "l1aextract_modis",
            Instrument::Viirs => "l1aextract_viirs",
            Instrument::Seawifs => "l1aextract_seawifs",
            Instrument::General => "l1aextract",
        }
    }
}

pub struct L1bGenStep;

impl Action for L1bGenStep {
    fn program(&self, instrument: Instrument) -> &'static str {
        match instrument {
            Instrument::Viirs => "calibrate_viirs",
            _ => "modis_L1B",
        }
    }
}

fixed_program!(L1BrsGenStep, "l1brsgen");
fixed_program!(L2ExtractStep, "l2extract");
fixed_program!(L2BrsGenStep, "l2brsgen");
fixed_program!(L2MapGenStep, "l2mapgen");
fixed_program!(L3MapGenStep, "l3mapgen");
fixed_program!(SmiGenStep, "smigen");

/// l1mapgen exits with the percentage of pixels mapped, so only statuses
/// between 2 and 100 mean success.
pub struct L1MapGenStep;

impl Action for L1MapGenStep {
    fn program(&self, _instrument: Instrument) -> &'static str {
        "l1mapgen"
    }

    fn accepts(&self, status: i32) -> bool {
        (2..=100).contains(&status)
    }
}

/// l2gen reads a generated parameter file, optionally pointing at an
/// ancillary parameter file fetched beforehand.
pub struct L2GenStep;

impl Action for L2GenStep {
    fn program(&self, _instrument: Instrument) -> &'static str {
        "l2gen"
    }

    fn command(&self, program: &str, step: &Processor, env: &mut ActionEnv<'_>) -> Result<ProgramCall> {
        let (input, output) = step.io()?;
        let mut lines = vec![format!("ifile={}", input.display())];
        if let Some(geo) = &step.geo_file {
            lines.push(format!("geofile={}", geo.display()));
        }
        lines.push(format!("ofile={}", output.display()));

        if env.use_ancillary {
            let request = AncillaryRequest {
                input,
                geo: step.geo_file.as_deref(),
                nrt: env.use_nrt_anc,
                work_dir: env.work_dir.path(),
            };
            match env.ancillary.retrieve(&request, &mut *env.runner)? {
                Some(anc) => lines.push(format!("par={}", anc.display())),
                None => tracing::warn!(input = %input.display(), "no ancillary data found, using climatology"),
            }
        }

        lines.extend(step.par_data.iter().map(|(k, v)| format!("{k}={v}")));
        let mut contents = lines.join("\n");
        contents.push('\n');
        let par = env.work_dir.write_timestamped(program, "par", &contents)?;
        Ok(ProgramCall {
            program: program.to_string(),
            args: vec![format!("par={}", par.display())],
        })
    }
}

pub struct L2BinStep;

impl Action for L2BinStep {
    fn program(&self, _instrument: Instrument) -> &'static str {
        "l2bin"
    }

    fn command(&self, program: &str, step: &Processor, _env: &mut ActionEnv<'_>) -> Result<ProgramCall> {
        batch_call(program, step)
    }
}

pub struct L3BinStep;

impl Action for L3BinStep {
    fn program(&self, _instrument: Instrument) -> &'static str {
        "l3bin"
    }

    fn command(&self, program: &str, step: &Processor, _env: &mut ActionEnv<'_>) -> Result<ProgramCall> {
        batch_call(program, step)
    }
}

/// Static dispatch table: one handler per action kind.
pub fn handler(kind: ActionKind) -> &'static dyn Action {
    match kind {
        ActionKind::Nothing => &Level0Source,
        ActionKind::L1aGen => &L1aGenStep,
        ActionKind::GeoGen => &GeoGenStep,
        ActionKind::L1aExtract => &L1aExtractStep,
        ActionKind::L1bGen => &L1bGenStep,
        ActionKind::L1BrsGen => &L1BrsGenStep,
        ActionKind::L1MapGen => &L1MapGenStep,
        ActionKind::L2Gen => &L2GenStep,
        ActionKind::L2Extract => &L2ExtractStep,
        ActionKind::L2BrsGen => &L2BrsGenStep,
        ActionKind::L2MapGen => &L2MapGenStep,
        ActionKind::L2Bin => &L2BinStep,
        ActionKind::L3Bin => &L3BinStep,
        ActionKind::L3MapGen => &L3MapGenStep,
        ActionKind::SmiGen => &SmiGenStep,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
