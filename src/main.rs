use biokb::{common, db, source};
use anyhow::Error;
use clap::{command, Args, Parser, Subcommand};

/// CLI parser based on clap.
#[derive(Debug, Clone, Parser)]
#[command(
    author,
    version,
    about = "SQLite-based biomedical knowledge base",
    long_about = "Ingestion core of a biomedical knowledge base stored in SQLite."
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::cli::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[derive(Debug, Subcommand, Clone)]
enum Commands {
    /// "db" sub commands
    Db(Db),
    /// "source" sub commands
    Source(Source),
}

/// Parsing of "db" subcommand
#[derive(Debug, Args, Clone)]
struct Db {
    /// The sub command to run
    #[command(subcommand)]
    command: DbCommands,
}

/// Enum supporting the parsing of "db *" subcommands.
#[derive(Debug, Subcommand, Clone)]
enum DbCommands {
    /// "init" sub command
    Init(db::cli::init::Args),
}

/// Parsing of "source" subcommand
#[derive(Debug, Args, Clone)]
struct Source {
    /// The sub command to run
    #[command(subcommand)]
    command: SourceCommands,
}

/// Enum supporting the parsing of "source *" subcommands.
#[derive(Debug, Subcommand, Clone)]
enum SourceCommands {
    /// "list" sub command
    List(source::cli::list::Args),
    /// "download" sub command
    Download(source::cli::download::Args),
    /// "update" sub command
    Update(source::cli::update::Args),
}

pub fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Db(args) => match &args.command {
                DbCommands::Init(args) => db::cli::init::run(&cli.common, args)?,
            },
            Commands::Source(args) => match &args.command {
                SourceCommands::List(args) => source::cli::list::run(&cli.common, args)?,
                SourceCommands::Download(args) => source::cli::download::run(&cli.common, args)?,
                SourceCommands::Update(args) => source::cli::update::run(&cli.common, args)?,
            },
        }

        Ok::<(), Error>(())
    })?;

    tracing::info!("All done! Have a nice day.");

    Ok(())
}
