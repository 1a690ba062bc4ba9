//! Ancillary-data retrieval for l2gen.
//!
//! Lookup and download live in the external `getanc` program; this module
//! only runs it and reports the ancillary parameter file it wrote.

use crate::actions::{CommandRunner, ProgramCall};
use crate::error::{Result, UberError};
use std::path::{Path, PathBuf};

pub struct AncillaryRequest<'a> {
    pub input: &'a Path,
    pub geo: Option<&'a Path>,
    /// Accept near-real-time ancillary data instead of waiting for refined.
    pub nrt: bool,
    pub work_dir: &'a Path,
}

pub trait AncillaryResolver {
    /// Returns the path of an ancillary parameter file for l2gen, or `None`
    /// when nothing was found.
    fn retrieve(
        &mut self,
        request: &AncillaryRequest<'_>,
        runner: &mut dyn CommandRunner,
    ) -> Result<Option<PathBuf>>;
}

/// Resolver used when ancillary retrieval is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAncillary;

impl AncillaryResolver for NoAncillary {
    fn retrieve(
        &mut self,
        _request: &AncillaryRequest<'_>,
        _runner: &mut dyn CommandRunner,
    ) -> Result<Option<PathBuf>> {
        Ok(None)
    }
}

/// Runs `getanc ifile=<in> [geofile=<geo>] ofile=<work_dir>/<in>.anc [nrt=1]`.
#[derive(Debug, Clone)]
pub struct GetAnc {
    program: String,
}

impl Default for GetAnc {
    fn default() -> Self {
        Self {
            program: "getanc".to_string(),
        }
    }
}

impl AncillaryResolver for GetAnc {
    fn retrieve(
        &mut self,
        request: &AncillaryRequest<'_>,
        runner: &mut dyn CommandRunner,
    ) -> Result<Option<PathBuf>> {
        let name = request
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let anc_file = request.work_dir.join(format!("{name}.anc"));

        let mut args = vec![format!("ifile={}", request.input.display())];
        if let Some(geo) = request.geo {
            args.push(format!("geofile={}", geo.display()));
        }
        args.push(format!("ofile={}", anc_file.display()));
        if request.nrt {
            args.push("nrt=1".to_string());
        }
        let call = ProgramCall {
            program: self.program.clone(),
            args,
        };

        tracing::info!(command = %call, "retrieving ancillary data");
        match runner.run(&call)? {
            Some(0) => Ok(anc_file.exists().then_some(anc_file)),
            Some(status) => Err(UberError::ProgramFailed {
                program: self.program.clone(),
                status,
            }),
            None => Err(UberError::ProgramKilled(self.program.clone())),
        }
    }
}
