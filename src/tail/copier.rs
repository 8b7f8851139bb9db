use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};

use crate::error::TailError;
use crate::file::FileRecord;

use super::read_retry;

/// Copy everything from `start` to the current end of available data,
/// verbatim, in blocks of `block_size`. Returns the number of bytes copied.
///
/// A zero-length read ends the copy; for a growing file that is the end of
/// data at the time of the call, not necessarily end of file forever.
pub fn copy_from<W: Write>(
    file: &mut File,
    start: u64,
    block_size: usize,
    out: &mut W,
) -> Result<u64, TailError> {
    file.seek(SeekFrom::Start(start))?;

    let mut buf = vec![0u8; block_size];
    let mut copied = 0u64;
    loop {
        let n = read_retry(file, &mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(|_| TailError::SinkClosed)?;
        copied += n as u64;
    }
    Ok(copied)
}

/// Follow-mode variant: drain the bytes appended since the last read and
/// advance the record's size bookkeeping to the post-read position.
pub fn copy_delta<W: Write>(record: &mut FileRecord, out: &mut W) -> Result<u64, TailError> {
    let start = record.size;
    let block_size = record.block_size;
    let file = record.handle.as_mut().ok_or_else(|| {
        TailError::Io(io::Error::new(io::ErrorKind::NotConnected, "file is not open"))
    })?;

    let copied = copy_from(file, start, block_size, out)?;
    record.size = start + copied;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::file::FileRecord;

    fn file_with(content: &[u8]) -> File {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(content).unwrap();
        f
    }

    #[test]
    fn test_copy_from_offset() {
        let mut f = file_with(b"0123456789");
        let mut out = Vec::new();
        let copied = copy_from(&mut f, 6, 4, &mut out).unwrap();
        assert_eq!(copied, 4);
        assert_eq!(out, b"6789");
    }

    #[test]
    fn test_copy_from_is_idempotent() {
        let mut f = file_with(b"a\nb\nc\n");
        let mut first = Vec::new();
        let mut second = Vec::new();
        copy_from(&mut f, 2, 8192, &mut first).unwrap();
        copy_from(&mut f, 2, 8192, &mut second).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, b"b\nc\n");
    }

    #[test]
    fn test_copy_from_past_end_is_empty() {
        let mut f = file_with(b"short");
        let mut out = Vec::new();
        assert_eq!(copy_from(&mut f, 100, 8192, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_copy_delta_advances_size() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"first line\n").unwrap();

        let mut record = FileRecord::new(tmp.path().to_string_lossy().into_owned());
        record.open().unwrap();
        assert_eq!(record.size, 11);

        tmp.write_all(b"appended\n").unwrap();
        tmp.flush().unwrap();

        let mut out = Vec::new();
        let copied = copy_delta(&mut record, &mut out).unwrap();
        assert_eq!(copied, 9);
        assert_eq!(out, b"appended\n");
        assert_eq!(record.size, 20);

        // No further growth: the next delta is empty.
        let mut out = Vec::new();
        assert_eq!(copy_delta(&mut record, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
