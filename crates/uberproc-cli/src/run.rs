use crate::{logging, output, Cli};
use anyhow::Context;
use std::path::{Path, PathBuf};
use uberproc_core::actions::SystemRunner;
use uberproc_core::ancillary::GetAnc;
use uberproc_core::config::{Overrides, RunConfig, Settings, MAIN_SECTION};
use uberproc_core::datafile::NameClassifier;
use uberproc_core::driver::Collaborators;
use uberproc_core::naming::ObpgNamer;
use uberproc_core::parfile::ParFile;
use uberproc_core::pipeline;

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = load_settings()?;
    let par = ParFile::load(&cli.par_file)
        .with_context(|| format!("cannot read parameter file {}", cli.par_file.display()))?;

    let log_file = if cli.debug {
        Some(debug_log_path(&par, &settings)?)
    } else {
        None
    };
    logging::init(logging::level(cli.verbose, cli.debug), log_file.as_deref())?;
    if let Some(path) = &log_file {
        tracing::debug!(log = %path.display(), "debug log enabled");
    }

    let overrides = Overrides {
        keepfiles: cli.keepfiles,
        overwrite: cli.overwrite,
        use_existing: cli.use_existing,
        tar: cli.tar,
    };
    let config = RunConfig::from_par(&par, &overrides, settings)
        .with_context(|| format!("invalid parameter file {}", cli.par_file.display()))?;

    let mut runner = SystemRunner::new(&config.settings);
    let mut ancillary = GetAnc::default();
    let summary = pipeline::run(
        &config,
        &NameClassifier,
        Collaborators {
            runner: &mut runner,
            ancillary: &mut ancillary,
            namer: &ObpgNamer,
        },
    )?;

    output::print_summary(&summary);
    Ok(())
}

fn load_settings() -> anyhow::Result<Settings> {
    let settings = match Settings::default_path() {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("cannot load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    Ok(settings.with_env())
}

/// `<odir>/<work dir>/uberproc_<timestamp>.log`, creating the directory.
fn debug_log_path(par: &ParFile, settings: &Settings) -> anyhow::Result<PathBuf> {
    let out_dir = par
        .section(MAIN_SECTION)
        .and_then(|main| main.get("odir"))
        .filter(|d| !d.is_empty())
        .unwrap_or(".");
    let dir = Path::new(out_dir).join(&settings.work_dir);
    std::fs::create_dir_all(&dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    Ok(dir.join(format!("uberproc_{stamp}.log")))
}
