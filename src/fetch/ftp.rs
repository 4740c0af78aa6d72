//! Conditional download over the file-transfer protocol.
//!
//! The remote is probed with one directory listing per distinct remote
//! directory; the Unix-style `ls -l` lines are parsed for size and
//! timestamp. Listing or retrieval failures are fatal to the adapter run.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use suppaftp::FtpStream;

use crate::error::Error;
use crate::fetch::{is_up_to_date, local_meta, set_mtime, split_remote_path, FileMap, RemoteMeta};

/// Download the given files from `host` into `dir`, skipping files whose
/// local copy matches the remote size and mtime.
pub fn download_files_from_ftp(host: &str, dir: &Path, files: &FileMap) -> Result<(), Error> {
    tracing::info!("connecting to FTP server {} ...", host);
    let mut ftp = FtpStream::connect(format!("{}:21", host))?;
    ftp.login("anonymous", "anonymous")?;

    // probe remote metadata, one listing per distinct remote directory
    tracing::info!("identifying changed files ...");
    let now = Utc::now();
    let mut remote: HashMap<&str, RemoteMeta> = HashMap::with_capacity(files.len());
    let remote_dirs: std::collections::BTreeSet<&str> = files
        .values()
        .map(|path| split_remote_path(path).0)
        .collect();
    for remote_dir in remote_dirs {
        let wanted: HashMap<&str, &str> = files
            .iter()
            .filter(|(_, remote_path)| split_remote_path(remote_path).0 == remote_dir)
            .map(|(local_name, remote_path)| (split_remote_path(remote_path).1, local_name.as_str()))
            .collect();
        for line in ftp.list(Some(remote_dir))? {
            if let Some((name, size, mtime)) = parse_list_line(&line, now) {
                if let Some(&local_name) = wanted.get(name) {
                    remote.insert(
                        local_name,
                        RemoteMeta {
                            size: Some(size),
                            mtime: Some(mtime),
                        },
                    );
                }
            }
        }
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
            let (remote_dir, remote_name) = split_remote_path(remote_path);
            ftp.cwd(remote_dir)?;
            let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
            {
                let mut stream = ftp.retr_as_stream(remote_name)?;
                std::io::copy(&mut stream, tmp.as_file_mut())?;
                ftp.finalize_retr_stream(stream)?;
            }
            tmp.persist(&local_path).map_err(|e| Error::Io(e.error))?;
        }
        if let Some(mtime) = meta.mtime {
            set_mtime(&local_path, mtime)?;
        }
    }

    if ftp.quit().is_err() {
        // connection teardown failures do not invalidate the downloads
        tracing::debug!("FTP QUIT failed; closing connection anyway");
    }
    tracing::info!("... done downloading from {}", host);
    Ok(())
}

/// Parse one Unix-style `ls -l` line into `(name, size, mtime)`.
///
/// Columns: perms, links, owner, group, size, month, day, year-or-HH:MM,
/// name. Lines with fewer columns or a non-numeric size column are
/// skipped.
fn parse_list_line(line: &str, now: DateTime<Utc>) -> Option<(&str, u64, DateTime<Utc>)> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 9 {
        return None;
    }
    let size: u64 = words[4].parse().ok()?;
    let mtime = parse_list_date(words[5], words[6], words[7], now);
    Some((words[8], size, mtime))
}

/// Parse the three timestamp columns of an `ls -l` line.
///
/// Either `Mon DD YYYY`, or `Mon DD HH:MM` meaning "within the last 12
/// months": the current year is assumed and rolled back by one year if
/// the resulting date lies in the future. Unparseable timestamps fall
/// back to `now`.
fn parse_list_date(month: &str, day: &str, year_or_time: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let stamp = format!("{} {} {}", month, day, year_or_time);
    if let Ok(date) = NaiveDate::parse_from_str(&stamp, "%b %d %Y") {
        return Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    }

    // Feb 29 only parses against the leap year, hence the two attempts.
    for year in [now.year(), now.year() - 1] {
        if let Ok(parsed) =
            NaiveDateTime::parse_from_str(&format!("{} {}", stamp, year), "%b %d %H:%M %Y")
        {
            let mut parsed = parsed;
            if year == now.year() && parsed.date() > now.date_naive() {
                parsed = parsed
                    .with_year(now.year() - 1)
                    .unwrap_or(parsed);
            }
            return Utc.from_utc_datetime(&parsed);
        }
    }

    now
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn list_line_with_year() {
        let line = "-rw-r--r--   1 ftp  ftp   7340032 Sep  3 2011 NetPath_GeneReg_TSV1.zip";
        let (name, size, mtime) = parse_list_line(line, now()).unwrap();
        assert_eq!(name, "NetPath_GeneReg_TSV1.zip");
        assert_eq!(size, 7340032);
        assert_eq!(
            mtime,
            Utc.with_ymd_and_hms(2011, 9, 3, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn list_line_with_recent_time() {
        let line = "-rw-r--r--   1 ftp  ftp   1024 Mar 10 08:30 gene_ontology.1_2.obo";
        let (_, _, mtime) = parse_list_line(line, now()).unwrap();
        // March 10 lies in the past of June 15, so the current year stands
        assert_eq!(
            mtime,
            Utc.with_ymd_and_hms(2024, 3, 10, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn list_line_future_date_rolls_back_one_year() {
        let line = "-rw-r--r--   1 ftp  ftp   1024 Nov  2 10:15 fresh.gz";
        let (_, _, mtime) = parse_list_line(line, now()).unwrap();
        // November 2 is in the future of June 15, so it was last year
        assert_eq!(
            mtime,
            Utc.with_ymd_and_hms(2023, 11, 2, 10, 15, 0).unwrap()
        );
    }

    #[test]
    fn list_line_garbage_timestamp_falls_back_to_now() {
        let line = "-rw-r--r--   1 ftp  ftp   1024 ??? ?? ??:?? odd.gz";
        let (_, _, mtime) = parse_list_line(line, now()).unwrap();
        assert_eq!(mtime, now());
    }

    #[test]
    fn short_and_malformed_lines_are_skipped() {
        assert!(parse_list_line("total 1234", now()).is_none());
        assert!(parse_list_line(
            "drwxr-xr-x   2 ftp  ftp  notasize Sep  3 2011 subdir",
            now()
        )
        .is_none());
    }
}
