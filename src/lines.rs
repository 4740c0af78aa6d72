//! Stream utilities for adapter input files.
//!
//! Input files arrive gzip-compressed, zlib-compressed, or plain,
//! depending on the source; [`LineReader`] sniffs the framing and yields
//! text lines either way. [`split_escape`] is the shared tokenizer for
//! formats with escape characters and bounded splits.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use flate2::read::{GzDecoder, ZlibDecoder};

use crate::error::Error;

/// Chunk size for reads from the (decompressed) stream.
const CHUNK_SIZE: usize = 1024 * 1024;

/// Lazy line iterator over a possibly-compressed local file.
///
/// The compression is detected from the first two bytes: gzip magic,
/// zlib header, or neither (plain text). Lines are split on a single-byte
/// delimiter, newline by default; a final chunk without trailing
/// delimiter is flushed as the last line.
pub struct LineReader {
    reader: Box<dyn Read>,
    chunk: Vec<u8>,
    buffer: Vec<u8>,
    lines: std::collections::VecDeque<String>,
    delimiter: u8,
    finished: bool,
}

impl LineReader {
    /// Open `path` with newline as the line delimiter.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Self::open_delimited(path, b'\n')
    }

    /// Open `path` with the given line delimiter.
    pub fn open_delimited(path: impl AsRef<Path>, delimiter: u8) -> Result<Self, Error> {
        let mut file = File::open(path)?;

        let mut prefix = [0u8; 2];
        let mut have = 0;
        while have < prefix.len() {
            let n = file.read(&mut prefix[have..])?;
            if n == 0 {
                break;
            }
            have += n;
        }
        let head = &prefix[..have];
        let source: Box<dyn Read> = Box::new(Cursor::new(head.to_vec()).chain(file));
        let reader: Box<dyn Read> = if head.starts_with(&[0x1f, 0x8b]) {
            Box::new(GzDecoder::new(source))
        } else if have == 2
            && head[0] & 0x0f == 8
            && (u16::from(head[0]) << 8 | u16::from(head[1])) % 31 == 0
        {
            Box::new(ZlibDecoder::new(source))
        } else {
            source
        };

        Ok(Self {
            reader,
            chunk: vec![0u8; CHUNK_SIZE],
            buffer: Vec::new(),
            lines: std::collections::VecDeque::new(),
            delimiter,
            finished: false,
        })
    }

    /// Split the complete lines out of the carry buffer.
    fn drain_buffer(&mut self) {
        let mut start = 0;
        while let Some(pos) = self.buffer[start..]
            .iter()
            .position(|&b| b == self.delimiter)
        {
            self.lines
                .push_back(String::from_utf8_lossy(&self.buffer[start..start + pos]).into_owned());
            start += pos + 1;
        }
        self.buffer.drain(..start);
    }
}

impl Iterator for LineReader {
    type Item = Result<String, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Some(Ok(line));
            }
            if self.finished {
                return None;
            }
            match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    self.finished = true;
                    if !self.buffer.is_empty() {
                        let rest = std::mem::take(&mut self.buffer);
                        return Some(Ok(String::from_utf8_lossy(&rest).into_owned()));
                    }
                    return None;
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&self.chunk[..n]);
                    self.drain_buffer();
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// Split `string` on `delimiter`, honoring `escape` (the following
/// character is taken literally).
///
/// With `limit > 0`, surplus tokens are re-joined so that at most
/// `limit + 1` tokens result; `reverse` joins the surplus on the left
/// instead of the right. A trailing empty token is dropped.
pub fn split_escape(
    string: &str,
    delimiter: char,
    escape: Option<char>,
    limit: usize,
    reverse: bool,
) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut escaping = false;

    for ch in string.chars() {
        if escaping {
            current.push(ch);
            escaping = false;
        } else if escape == Some(ch) {
            escaping = true;
        } else if ch == delimiter {
            tokens.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }

    if limit > 0 && tokens.len() > limit + 1 {
        let delimiter = delimiter.to_string();
        if reverse {
            let tail = tokens.split_off(tokens.len() - limit);
            tokens = std::iter::once(tokens.join(&delimiter))
                .chain(tail)
                .collect();
        } else {
            let tail = tokens.split_off(limit);
            tokens.push(tail.join(&delimiter));
        }
    }

    tokens
}

/// [`split_escape`] with the surplus joined on the left.
pub fn rsplit_escape(
    string: &str,
    delimiter: char,
    escape: Option<char>,
    limit: usize,
) -> Vec<String> {
    split_escape(string, delimiter, escape, limit, true)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;
    use temp_testdir::TempDir;

    use super::*;

    fn collect_lines(reader: LineReader) -> Vec<String> {
        reader.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn reads_plain_text() {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("plain.txt");
        std::fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();

        let lines = collect_lines(LineReader::open(&path).unwrap());
        assert_eq!(lines, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn flushes_final_partial_line() {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("partial.txt");
        std::fs::write(&path, "alpha\nbeta").unwrap();

        let lines = collect_lines(LineReader::open(&path).unwrap());
        assert_eq!(lines, vec!["alpha", "beta"]);
    }

    #[test]
    fn reads_gzip() {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("data.txt.gz");
        let mut encoder = flate2::write::GzEncoder::new(
            std::fs::File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"first\nsecond\n").unwrap();
        encoder.finish().unwrap();

        let lines = collect_lines(LineReader::open(&path).unwrap());
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn reads_zlib() {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("data.txt.z");
        let mut encoder = flate2::write::ZlibEncoder::new(
            std::fs::File::create(&path).unwrap(),
            flate2::Compression::default(),
        );
        encoder.write_all(b"first\nsecond").unwrap();
        encoder.finish().unwrap();

        let lines = collect_lines(LineReader::open(&path).unwrap());
        assert_eq!(lines, vec!["first", "second"]);
    }

    #[test]
    fn honors_custom_delimiter() {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("fields.txt");
        std::fs::write(&path, "a|b|c").unwrap();

        let lines = collect_lines(LineReader::open_delimited(&path, b'|').unwrap());
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_file_yields_nothing() {
        let tmp_dir = TempDir::default();
        let path = tmp_dir.join("empty.txt");
        std::fs::write(&path, "").unwrap();

        let lines = collect_lines(LineReader::open(&path).unwrap());
        assert!(lines.is_empty());
    }

    #[test]
    fn split_escape_basic() {
        assert_eq!(
            split_escape("a,b,c", ',', None, 0, false),
            vec!["a", "b", "c"]
        );
        // trailing empty token is dropped
        assert_eq!(split_escape("a,b,", ',', None, 0, false), vec!["a", "b"]);
        // leading empty token is kept
        assert_eq!(split_escape(",a", ',', None, 0, false), vec!["", "a"]);
    }

    #[test]
    fn split_escape_escapes_delimiter() {
        assert_eq!(
            split_escape("a\\,b,c", ',', Some('\\'), 0, false),
            vec!["a,b", "c"]
        );
        // escape also hides itself
        assert_eq!(
            split_escape("a\\\\,b", ',', Some('\\'), 0, false),
            vec!["a\\", "b"]
        );
    }

    #[test]
    fn split_escape_limits() {
        assert_eq!(
            split_escape("a,b,c,d", ',', None, 2, false),
            vec!["a", "b", "c,d"]
        );
        assert_eq!(
            rsplit_escape("a,b,c,d", ',', None, 2),
            vec!["a,b", "c", "d"]
        );
        // within the limit nothing is re-joined
        assert_eq!(
            split_escape("a,b,c", ',', None, 2, false),
            vec!["a", "b", "c"]
        );
    }
}
