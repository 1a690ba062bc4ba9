use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UberError {
    // -- configuration ------------------------------------------------------
    #[error("parameter file line {line}: {message}")]
    ParFileSyntax { line: usize, message: String },

    #[error("missing section [{0}] in parameter file")]
    MissingSection(String),

    #[error("unknown target type '{0}'")]
    UnknownTarget(String),

    #[error("'{key}' may not be set in section [{section}]")]
    ReservedKey { section: String, key: String },

    #[error("conflicting options: {0}")]
    ConflictingOptions(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no processing targets requested")]
    NoTargets,

    #[error("input files come from more than one instrument: {0}")]
    MixedInstruments(String),

    #[error("cannot determine the type of input file {0}")]
    Unclassified(PathBuf),

    // -- dependency -------------------------------------------------------
    #[error("'{target}' is not a stage of the {rule_set} pipeline")]
    NotInOrder { target: String, rule_set: String },

    #[error("cannot produce '{target}': {reason}")]
    Unresolvable { target: String, reason: String },

    // -- external program -----------------------------------------------
    #[error("{program} exited with status {status}")]
    ProgramFailed { program: String, status: i32 },

    #[error("{0} was terminated without an exit status")]
    ProgramKilled(String),

    #[error("program not found: {0}")]
    ProgramNotFound(String),

    #[error("failed to start {program}: {reason}")]
    ProgramSpawn { program: String, reason: String },

    // -- io ---------------------------------------------------------------
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("output file {0} already exists (use --overwrite or --use_existing)")]
    OutputExists(PathBuf),

    #[error("cannot read file list {path}: {reason}")]
    FileList { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Coarse grouping used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Dependency,
    ExternalProgram,
    Io,
}

impl UberError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UberError::ParFileSyntax { .. }
            | UberError::MissingSection(_)
            | UberError::UnknownTarget(_)
            | UberError::ReservedKey { .. }
            | UberError::ConflictingOptions(_)
            | UberError::InvalidConfig(_)
            | UberError::NoTargets
            | UberError::MixedInstruments(_)
            | UberError::Unclassified(_)
            | UberError::Yaml(_) => ErrorKind::Configuration,
            UberError::NotInOrder { .. } | UberError::Unresolvable { .. } => ErrorKind::Dependency,
            UberError::ProgramFailed { .. }
            | UberError::ProgramKilled(_)
            | UberError::ProgramNotFound(_)
            | UberError::ProgramSpawn { .. } => ErrorKind::ExternalProgram,
            UberError::MissingInput(_)
            | UberError::OutputExists(_)
            | UberError::FileList { .. }
            | UberError::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, UberError>;
