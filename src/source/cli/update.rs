//! Implementation of `source update` sub command.

use clap::Parser;

use crate::db::Database;
use crate::source::SourceContext;
use crate::{common, source};

/// Command line arguments for `source update` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "parse downloaded files and update the knowledge base", long_about = None)]
pub struct Args {
    /// Path to the knowledge base file.
    #[arg(long)]
    pub path_db: String,
    /// Path to the working directory holding downloaded files.
    #[arg(long, default_value = ".")]
    pub path_dir: String,
    /// Name(s) of the source adapter(s) to run, sequentially.
    #[arg(long, required = true)]
    pub source: Vec<String>,
}

/// Implementation of `source update` sub command.
pub fn run(common: &common::cli::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting 'source update' command");
    tracing::info!("common = {:#?}", &common);
    tracing::info!("args = {:#?}", &args);

    let db = Database::open(&args.path_db)?;
    for name in &args.source {
        let adapter = source::create(name)?;
        let ctx = SourceContext::new(&db, adapter.name(), &args.path_dir)?;

        tracing::info!("Updating from '{}' ...", name);
        let before_update = std::time::Instant::now();
        adapter.update(&ctx)?;
        tracing::info!(
            "... done updating from '{}' in {:?}",
            name,
            before_update.elapsed()
        );
    }

    Ok(())
}
