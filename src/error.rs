//! Error type definition.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for `biokb`
#[derive(Error, Debug)]
pub enum Error {
    /// Error in the underlying relational store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    /// Error in underlying I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Error talking to a file-transfer server.
    #[error("FTP transport error: {0}")]
    Ftp(#[from] suppaftp::FtpError),
    /// Error talking to a hypertext server.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// Problem with a downloaded archive, e.g., a CRC mismatch.
    #[error("archive error in {0}: {1}")]
    Archive(PathBuf, #[source] zip::result::ZipError),
    /// Unexpected header line in an input file.
    #[error("unrecognized header in {0}: {1}")]
    UnexpectedHeader(String, String),
    /// Malformed line in an input file.
    #[error("malformed input in {0}: {1}")]
    InvalidFormat(String, String),
    /// No source adapter is registered under the given name.
    #[error("unknown source: {0}")]
    UnknownSource(String),
}
