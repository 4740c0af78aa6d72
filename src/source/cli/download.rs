//! Implementation of `source download` sub command.

use clap::Parser;

use crate::db::Database;
use crate::source::SourceContext;
use crate::{common, source};

/// Command line arguments for `source download` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "download the input files of source adapters", long_about = None)]
pub struct Args {
    /// Path to the knowledge base file.
    #[arg(long)]
    pub path_db: String,
    /// Path to the working directory holding downloaded files.
    #[arg(long, default_value = ".")]
    pub path_dir: String,
    /// Name(s) of the source adapter(s) to run.
    #[arg(long, required = true)]
    pub source: Vec<String>,
}

/// Implementation of `source download` sub command.
pub fn run(common: &common::cli::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting 'source download' command");
    tracing::info!("common = {:#?}", &common);
    tracing::info!("args = {:#?}", &args);

    let db = Database::open(&args.path_db)?;
    for name in &args.source {
        let adapter = source::create(name)?;
        let ctx = SourceContext::new(&db, adapter.name(), &args.path_dir)?;

        tracing::info!("Downloading '{}' ...", name);
        let before_download = std::time::Instant::now();
        adapter.download(&ctx)?;
        tracing::info!(
            "... done downloading '{}' in {:?}",
            name,
            before_download.elapsed()
        );
    }

    Ok(())
}
