use std::io::{self, Write};

use crate::error::TailError;
use crate::file::{FileKind, FileRecord, DEFAULT_BLOCK_SIZE};
use crate::follow::FollowEngine;
use crate::tail::{copier, offset, window, TailSpec};

/// Decides when `==> name <==` headers are printed, replacing the
/// original's process-wide "first file" flag with explicit state.
#[derive(Debug)]
pub struct HeaderState {
    enabled: bool,
    printed_any: bool,
    last: Option<usize>,
}

impl HeaderState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            printed_any: false,
            last: None,
        }
    }

    /// Print a header before output from file `idx`, unless it was also the
    /// previous file to produce output. Headers after the first are
    /// separated from earlier output by a blank line.
    pub fn maybe_print<W: Write>(
        &mut self,
        idx: usize,
        name: &str,
        out: &mut W,
    ) -> Result<(), TailError> {
        if !self.enabled || self.last == Some(idx) {
            return Ok(());
        }
        let sep = if self.printed_any { "\n" } else { "" };
        writeln!(out, "{sep}==> {name} <==").map_err(|_| TailError::SinkClosed)?;
        self.printed_any = true;
        self.last = Some(idx);
        Ok(())
    }
}

/// Orchestrates the per-file initial tail and the shared follow loop.
pub struct Session {
    records: Vec<FileRecord>,
    spec: TailSpec,
    follow: bool,
    headers: HeaderState,
    failed: bool,
}

impl Session {
    pub fn new(names: Vec<String>, spec: TailSpec, follow: bool, headers: bool) -> Self {
        Self {
            records: names.into_iter().map(FileRecord::new).collect(),
            spec,
            follow,
            headers: HeaderState::new(headers),
            failed: false,
        }
    }

    /// True if any file could not be tailed.
    pub fn failed(&self) -> bool {
        self.failed
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn run<W: Write>(&mut self, out: &mut W) -> Result<(), TailError> {
        for idx in 0..self.records.len() {
            if let Err(err) = self.tail_initial(idx, out) {
                if err.is_fatal() {
                    return Err(err);
                }
                tracing::error!(
                    file = %self.records[idx].pretty_name(),
                    error = %err,
                    "cannot tail file"
                );
                self.records[idx].retire();
                self.failed = true;
            }
        }
        out.flush().map_err(|_| TailError::SinkClosed)?;

        if !self.follow {
            return Ok(());
        }

        // Only regular files can be watched for growth.
        for record in self.records.iter_mut() {
            if record.active && record.kind != FileKind::Regular {
                tracing::info!(file = %record.pretty_name(), "not a regular file; cannot follow");
                record.retire();
            }
        }

        let mut engine = FollowEngine::new()?;
        engine.register(&mut self.records);
        engine.run(&mut self.records, &mut self.headers, out)
    }

    /// Open one file, resolve the window start and drain it to the sink.
    fn tail_initial<W: Write>(&mut self, idx: usize, out: &mut W) -> Result<(), TailError> {
        let Self {
            records,
            spec,
            headers,
            ..
        } = self;
        let record = &mut records[idx];

        if record.is_stdin() {
            record.kind = FileKind::PipeLike;
            headers.maybe_print(idx, record.pretty_name(), out)?;
            let stdin = io::stdin();
            window::pipe_tail(&mut stdin.lock(), spec, DEFAULT_BLOCK_SIZE, out)?;
            return Ok(());
        }

        record.open()?;
        headers.maybe_print(idx, record.pretty_name(), out)?;

        match record.kind {
            FileKind::Regular => {
                let size = record.size;
                let block_size = record.block_size;
                let file = record.handle.as_mut().ok_or_else(|| {
                    TailError::Io(io::Error::new(io::ErrorKind::NotConnected, "file is not open"))
                })?;
                let start = offset::resolve(file, size, block_size, spec)?;
                let copied = copier::copy_from(file, start, block_size, out)?;
                record.size = start.min(size) + copied;
            }
            FileKind::PipeLike | FileKind::Character => {
                let block_size = record.block_size;
                let file = record.handle.as_mut().ok_or_else(|| {
                    TailError::Io(io::Error::new(io::ErrorKind::NotConnected, "file is not open"))
                })?;
                window::pipe_tail(file, spec, block_size, out)?;
            }
            FileKind::Unsupported => return Err(TailError::UnsupportedFileKind),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::tail::{Anchor, Unit};

    fn named_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(content).unwrap();
        tmp
    }

    fn lines_spec(count: u64) -> TailSpec {
        TailSpec {
            unit: Unit::Lines,
            count,
            anchor: Anchor::FromEnd,
        }
    }

    #[test]
    fn test_single_file_no_header() {
        let tmp = named_file(b"a\nb\nc\n");
        let mut session = Session::new(
            vec![tmp.path().to_string_lossy().into_owned()],
            lines_spec(2),
            false,
            false,
        );
        let mut out = Vec::new();
        session.run(&mut out).unwrap();
        assert_eq!(out, b"b\nc\n");
        assert!(!session.failed());
    }

    #[test]
    fn test_multiple_files_with_headers() {
        let one = named_file(b"first\n");
        let two = named_file(b"second\n");
        let mut session = Session::new(
            vec![
                one.path().to_string_lossy().into_owned(),
                two.path().to_string_lossy().into_owned(),
            ],
            lines_spec(10),
            false,
            true,
        );
        let mut out = Vec::new();
        session.run(&mut out).unwrap();

        let expected = format!(
            "==> {} <==\nfirst\n\n==> {} <==\nsecond\n",
            one.path().display(),
            two.path().display()
        );
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_missing_file_is_reported_not_fatal() {
        let good = named_file(b"ok\n");
        let mut session = Session::new(
            vec![
                "/nonexistent/tailr-missing".to_string(),
                good.path().to_string_lossy().into_owned(),
            ],
            lines_spec(10),
            false,
            false,
        );
        let mut out = Vec::new();
        session.run(&mut out).unwrap();
        assert_eq!(out, b"ok\n");
        assert!(session.failed());
        assert!(!session.records()[0].active);
    }

    #[test]
    fn test_header_not_repeated_for_same_file() {
        let mut headers = HeaderState::new(true);
        let mut out = Vec::new();
        headers.maybe_print(0, "a.log", &mut out).unwrap();
        headers.maybe_print(0, "a.log", &mut out).unwrap();
        headers.maybe_print(1, "b.log", &mut out).unwrap();
        headers.maybe_print(0, "a.log", &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "==> a.log <==\n\n==> b.log <==\n\n==> a.log <==\n"
        );
    }

    #[test]
    fn test_headers_disabled() {
        let mut headers = HeaderState::new(false);
        let mut out = Vec::new();
        headers.maybe_print(0, "a.log", &mut out).unwrap();
        assert!(out.is_empty());
    }
}
