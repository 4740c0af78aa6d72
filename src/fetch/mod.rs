//! Conditional file download over file-transfer and hypertext protocols.
//!
//! Both transports share the same contract: given a remote host and a
//! mapping from local file name to remote path, probe the remote metadata,
//! skip files whose local copy matches the remote size and is not older
//! than the remote mtime, download the rest, and stamp every local file
//! with the remote mtime. Re-running a download is therefore cheap and
//! idempotent.

pub mod ftp;
pub mod http;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Error;

/// Mapping from local file name to remote path, ordered for stable logs.
pub type FileMap = BTreeMap<String, String>;

/// Size and mtime of a remote file, as far as the remote reported them.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteMeta {
    /// Size in bytes.
    pub size: Option<u64>,
    /// Modification time.
    pub mtime: Option<DateTime<Utc>>,
}

/// Stat a local file, returning `(size, mtime)` or `None` if absent.
pub(crate) fn local_meta(path: &Path) -> Result<Option<(u64, DateTime<Utc>)>, Error> {
    match std::fs::metadata(path) {
        Ok(meta) => {
            let mtime = meta.modified()?;
            Ok(Some((meta.len(), DateTime::<Utc>::from(mtime))))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Decide whether the local copy can be kept.
///
/// Only when the remote reported both size and mtime, the sizes match,
/// and the remote mtime is not newer than the local one (compared at
/// second precision, which is what the stamped mtimes carry).
pub(crate) fn is_up_to_date(local: Option<(u64, DateTime<Utc>)>, remote: &RemoteMeta) -> bool {
    match (local, remote.size, remote.mtime) {
        (Some((local_size, local_mtime)), Some(remote_size), Some(remote_mtime)) => {
            remote_size == local_size && remote_mtime.timestamp() <= local_mtime.timestamp()
        }
        _ => false,
    }
}

/// Stamp the local file with the remote mtime.
pub(crate) fn set_mtime(path: &Path, mtime: DateTime<Utc>) -> Result<(), Error> {
    filetime::set_file_mtime(path, filetime::FileTime::from_unix_time(mtime.timestamp(), 0))?;
    Ok(())
}

/// Split a remote path into directory and file name.
pub(crate) fn split_remote_path(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;
    use rstest::rstest;
    use temp_testdir::TempDir;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[rstest]
    #[case(None, Some(1024), Some(1_000), false)] // no local file
    #[case(Some((1024, 1_000)), Some(1024), Some(1_000), true)] // exact match
    #[case(Some((1024, 2_000)), Some(1024), Some(1_000), true)] // local newer
    #[case(Some((1024, 1_000)), Some(1024), Some(2_000), false)] // remote newer
    #[case(Some((1024, 1_000)), Some(512), Some(1_000), false)] // size differs
    #[case(Some((1024, 1_000)), None, Some(1_000), false)] // size unknown
    #[case(Some((1024, 1_000)), Some(1024), None, false)] // mtime unknown
    fn up_to_date_decision(
        #[case] local: Option<(u64, i64)>,
        #[case] remote_size: Option<u64>,
        #[case] remote_mtime: Option<i64>,
        #[case] expected: bool,
    ) {
        let local = local.map(|(size, secs)| (size, at(secs)));
        let remote = RemoteMeta {
            size: remote_size,
            mtime: remote_mtime.map(at),
        };
        assert_eq!(is_up_to_date(local, &remote), expected);
    }

    #[test]
    fn stamped_file_is_up_to_date_on_second_run() {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("data.bin");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();

        let remote = RemoteMeta {
            size: Some(1024),
            mtime: Some(at(1_600_000_000)),
        };
        set_mtime(&path, remote.mtime.unwrap()).unwrap();

        let local = local_meta(&path).unwrap();
        assert_eq!(local.unwrap().0, 1024);
        // local mtime now equals the remote mtime to second precision
        assert_eq!(local.unwrap().1.timestamp(), 1_600_000_000);
        assert!(is_up_to_date(local, &remote));
    }

    #[test]
    fn local_meta_of_missing_file() {
        let tmp_dir = TempDir::default();
        assert!(local_meta(&tmp_dir.join("nope")).unwrap().is_none());
    }

    #[test]
    fn remote_path_splitting() {
        assert_eq!(
            split_remote_path("/go/ontology/gene_ontology.obo"),
            ("/go/ontology", "gene_ontology.obo")
        );
        assert_eq!(split_remote_path("plain.txt"), ("", "plain.txt"));
    }
}
