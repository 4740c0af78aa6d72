//! Source adapter framework.
//!
//! Every external dataset is handled by one adapter implementing
//! [`Source`]: `download()` materializes the raw files in the working
//! directory (conditional on remote size+mtime, see [`crate::fetch`]),
//! `update()` re-stages the source's rows inside a bulk-update envelope.
//! Adapters are registered explicitly in [`create`], keyed by source name.

pub mod cli;
mod context;
pub mod go;
pub mod netpath;
pub mod ucsc_ecr;

pub use context::{BulkTables, SourceContext};

use crate::error::Error;

/// Contract every source adapter implements.
///
/// The framework instantiates the adapter together with a
/// [`SourceContext`] bound to the knowledge base; the context carries the
/// adapter's `source_id`, materialized via the `source` vocabulary on
/// construction.
pub trait Source {
    /// The adapter's name; doubles as its `source` vocabulary entry.
    fn name(&self) -> &'static str;

    /// Populate the working directory with this source's input files.
    ///
    /// Must be safely re-runnable; unchanged remote files are skipped.
    fn download(&self, ctx: &SourceContext) -> Result<(), Error>;

    /// Parse the local files and replace this source's staged rows.
    fn update(&self, ctx: &SourceContext) -> Result<(), Error>;
}

/// Names of all registered source adapters.
pub fn names() -> &'static [&'static str] {
    &["go", "netpath", "ucsc_ecr"]
}

/// Instantiate the adapter registered under `name`.
pub fn create(name: &str) -> Result<Box<dyn Source>, Error> {
    match name {
        "go" => Ok(Box::new(go::GoSource)),
        "netpath" => Ok(Box::new(netpath::NetPathSource)),
        "ucsc_ecr" => Ok(Box::new(ucsc_ecr::UcscEcrSource)),
        _ => Err(Error::UnknownSource(name.to_string())),
    }
}
