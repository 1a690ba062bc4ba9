mod logging;
mod output;
mod run;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "uberproc",
    about = "Run the minimal chain of processing programs that turns input files into the requested products",
    version
)]
pub struct Cli {
    /// Parameter file: a [main] section plus one section per requested product
    par_file: PathBuf,

    /// Log each step and command
    #[arg(short, long)]
    verbose: bool,

    /// Keep intermediate files
    #[arg(long)]
    keepfiles: bool,

    /// Regenerate outputs that already exist
    #[arg(long)]
    overwrite: bool,

    /// Reuse outputs that already exist instead of regenerating them
    #[arg(long = "use_existing")]
    use_existing: bool,

    /// Debug logging, also written to a log file in the working directory
    #[arg(long)]
    debug: bool,

    /// Archive the kept files into PATH (.tar.gz or .tgz to compress)
    #[arg(long, value_name = "PATH")]
    tar: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run::run(cli) {
        tracing::debug!(error = ?e, "run failed");
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
