pub mod actions;
pub mod ancillary;
pub mod archive;
pub mod config;
pub mod datafile;
pub mod driver;
pub mod error;
pub mod naming;
pub mod parfile;
pub mod pipeline;
pub mod processor;
pub mod resolver;
pub mod rules;
pub mod types;
pub mod workdir;

pub use error::{ErrorKind, Result, UberError};
