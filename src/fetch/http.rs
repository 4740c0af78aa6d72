//! Conditional download over the hypertext protocol.
//!
//! The remote is probed with one `HEAD` request per file, reading
//! `Content-Length` and `Last-Modified`. Request failures abort the
//! adapter run.

use std::path::Path;

use chrono::{DateTime, Utc};
use reqwest::header::{CONTENT_LENGTH, LAST_MODIFIED};

use crate::error::Error;
use crate::fetch::{is_up_to_date, local_meta, set_mtime, FileMap, RemoteMeta};

/// Download the given files from `host` into `dir`, skipping files whose
/// local copy matches the remote size and mtime.
pub fn download_files_from_http(host: &str, dir: &Path, files: &FileMap) -> Result<(), Error> {
    let client = reqwest::blocking::Client::new();
    let now = Utc::now();

    // probe remote metadata, one HEAD per file
    tracing::info!("identifying changed files on {} ...", host);
    let mut remote: std::collections::HashMap<&str, RemoteMeta> =
        std::collections::HashMap::with_capacity(files.len());
    for (local_name, remote_path) in files {
        let response = client
            .head(format!("http://{}{}", host, remote_path))
            .send()?
            .error_for_status()?;
        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let mtime = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(|value| parse_http_date(value, now));
        remote.insert(local_name.as_str(), RemoteMeta { size, mtime });
    }

    // download files as needed
    tracing::info!("downloading changed files ...");
    for (local_name, remote_path) in files {
        let local_path = dir.join(local_name);
        let meta = remote.get(local_name.as_str()).copied().unwrap_or_default();
        if is_up_to_date(local_meta(&local_path)?, &meta) {
            tracing::info!("{}: up to date", local_name);
        } else {
            tracing::info!("{}: downloading ...", local_name);
            let mut response = client
                .get(format!("http://{}{}", host, remote_path))
                .send()?
                .error_for_status()?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            response.copy_to(tmp.as_file_mut())?;
            tmp.persist(&local_path).map_err(|e| Error::Io(e.error))?;
        }
        if let Some(mtime) = meta.mtime {
            set_mtime(&local_path, mtime)?;
        }
    }

    tracing::info!("... done downloading from {}", host);
    Ok(())
}

/// Parse an RFC-1123-ish `Last-Modified` value; parse failures fall back
/// to `now`.
fn parse_http_date(value: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc2822(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .unwrap_or(now)
}
