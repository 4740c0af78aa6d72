//! Implementation of `source list` sub command.

use clap::Parser;

use crate::{common, source};

/// Command line arguments for `source list` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "list the registered source adapters", long_about = None)]
pub struct Args {}

/// Implementation of `source list` sub command.
pub fn run(common: &common::cli::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting 'source list' command");
    tracing::info!("common = {:#?}", &common);
    tracing::info!("args = {:#?}", &args);

    for name in source::names() {
        println!("{}", name);
    }

    Ok(())
}
