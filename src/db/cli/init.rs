//! Implementation of `db init` sub command.

use clap::Parser;

use crate::{common, db::Database};

/// Command line arguments for `db init` sub command.
#[derive(Parser, Debug, Clone)]
#[command(about = "create an empty knowledge base", long_about = None)]
pub struct Args {
    /// Path to the knowledge base file to create.
    #[arg(long)]
    pub path_db: String,
}

/// Implementation of `db init` sub command.
pub fn run(common: &common::cli::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting 'db init' command");
    tracing::info!("common = {:#?}", &common);
    tracing::info!("args = {:#?}", &args);

    let before_init = std::time::Instant::now();
    Database::create(&args.path_db)?;
    tracing::info!(
        "... done creating knowledge base at {} in {:?}",
        &args.path_db,
        before_init.elapsed()
    );

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    use clap_verbosity_flag::Verbosity;
    use temp_testdir::TempDir;

    #[test]
    fn smoke_test_init() {
        let tmp_dir = TempDir::default();
        let common = common::cli::Args {
            verbose: Verbosity::new(1, 0),
        };
        let args = Args {
            path_db: format!("{}", tmp_dir.join("kb.db").display()),
        };

        run(&common, &args).unwrap();

        // re-opening and re-initializing is fine; DDL is IF NOT EXISTS
        let db = Database::open(&args.path_db).unwrap();
        db.init_schema().unwrap();
        assert_eq!(db.count_rows("namespace").unwrap(), 0);
    }
}
