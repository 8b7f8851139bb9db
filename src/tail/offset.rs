use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use memchr::{memchr_iter, memrchr_iter};

use crate::error::TailError;

use super::{Anchor, TailSpec, Unit};

/// Resolve the byte offset at which streaming should begin, without reading
/// the whole file. Any read or seek failure aborts resolution; the caller
/// must retire the file rather than fall back to a default offset.
pub fn resolve(
    file: &mut File,
    size: u64,
    block_size: usize,
    spec: &TailSpec,
) -> Result<u64, TailError> {
    match (spec.anchor, spec.unit) {
        (Anchor::FromEnd, Unit::Bytes) => Ok(size.saturating_sub(spec.count)),
        (Anchor::FromEnd, Unit::Lines) => lines_from_end(file, size, block_size, spec.count),
        // 1-based externally: "+N" starts at the Nth byte.
        (Anchor::FromStart, Unit::Bytes) => Ok(spec.count.saturating_sub(1)),
        (Anchor::FromStart, Unit::Lines) => lines_from_start(file, size, block_size, spec.count),
    }
}

/// Scan backward from end-of-file in non-overlapping blocks, counting line
/// terminators until the window start is found.
fn lines_from_end(
    file: &mut File,
    size: u64,
    block_size: usize,
    count: u64,
) -> Result<u64, TailError> {
    if count == 0 {
        return Ok(size);
    }
    if size == 0 {
        return Ok(0);
    }

    let mut buf = vec![0u8; block_size];
    // One extra terminator precedes the first byte of the window.
    let mut remaining = count + 1;
    let mut pos = size;
    let mut endmost = true;

    while pos > 0 {
        let block = (block_size as u64).min(pos) as usize;
        pos -= block as u64;
        file.seek(SeekFrom::Start(pos))?;
        let chunk = &mut buf[..block];
        file.read_exact(chunk)?;

        // A file not ending in a terminator still holds one partial line.
        if endmost {
            endmost = false;
            if chunk[block - 1] != b'\n' {
                remaining -= 1;
            }
        }

        for nl in memrchr_iter(b'\n', chunk) {
            remaining -= 1;
            if remaining == 0 {
                return Ok(pos + nl as u64 + 1);
            }
        }
    }

    // Fewer lines than requested: emit the whole file.
    Ok(0)
}

/// Scan forward from offset 0, skipping `count - 1` terminators. Reaching
/// end-of-file first yields the end offset (nothing further to emit).
fn lines_from_start(
    file: &mut File,
    size: u64,
    block_size: usize,
    count: u64,
) -> Result<u64, TailError> {
    let mut to_skip = count.saturating_sub(1);
    if to_skip == 0 {
        return Ok(0);
    }

    let mut buf = vec![0u8; block_size];
    let mut pos = 0u64;
    file.seek(SeekFrom::Start(0))?;

    while pos < size {
        let block = (block_size as u64).min(size - pos) as usize;
        let chunk = &mut buf[..block];
        file.read_exact(chunk)?;

        for nl in memchr_iter(b'\n', chunk) {
            to_skip -= 1;
            if to_skip == 0 {
                return Ok(pos + nl as u64 + 1);
            }
        }
        pos += block as u64;
    }

    Ok(size)
}
