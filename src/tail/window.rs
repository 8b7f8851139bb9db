use std::collections::VecDeque;
use std::io::{Read, Write};

use memchr::memchr_iter;

use crate::error::TailError;

use super::{read_retry, Anchor, TailSpec, Unit};

/// One fixed-size block of buffered stream data, annotated with how many
/// bytes and line terminators it holds.
struct Chunk {
    buf: Vec<u8>,
    len: usize,
    lines: u64,
}

impl Chunk {
    fn new(block_size: usize) -> Self {
        Self {
            buf: vec![0u8; block_size],
            len: 0,
            lines: 0,
        }
    }

    fn reset(&mut self) {
        self.len = 0;
        self.lines = 0;
    }

    fn data(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Tail a non-seekable source (pipe, socket, standard input).
///
/// `FromEnd` buffers a bounded window of recent chunks; `FromStart` streams
/// immediately, skipping the leading portion. Returns bytes emitted.
pub fn pipe_tail<R: Read, W: Write>(
    reader: &mut R,
    spec: &TailSpec,
    block_size: usize,
    out: &mut W,
) -> Result<u64, TailError> {
    match spec.anchor {
        Anchor::FromStart => stream_from_start(reader, spec, block_size, out),
        Anchor::FromEnd => buffer_from_end(reader, spec, block_size, out),
    }
}

/// Read to end of stream keeping only as many chunks as the requested
/// window can span; retired chunks are reused for subsequent reads so
/// memory stays bounded to the window plus one block.
fn buffer_from_end<R: Read, W: Write>(
    reader: &mut R,
    spec: &TailSpec,
    block_size: usize,
    out: &mut W,
) -> Result<u64, TailError> {
    if spec.count == 0 {
        // Still drain the source so a writer on the far end is not stalled.
        let mut buf = vec![0u8; block_size];
        while read_retry(reader, &mut buf)? > 0 {}
        return Ok(0);
    }

    let mut chunks: VecDeque<Chunk> = VecDeque::new();
    let mut spare: Vec<Chunk> = Vec::new();
    let mut total_lines = 0u64;
    let mut total_bytes = 0u64;
    let mut cur = Chunk::new(block_size);

    loop {
        if cur.len == cur.buf.len() {
            chunks.push_back(cur);
            cur = spare.pop().unwrap_or_else(|| Chunk::new(block_size));
        }

        let n = read_retry(reader, &mut cur.buf[cur.len..])?;
        if n == 0 {
            break;
        }
        let newly = memchr_iter(b'\n', &cur.buf[cur.len..cur.len + n]).count() as u64;
        cur.len += n;
        cur.lines += newly;
        total_lines += newly;
        total_bytes += n as u64;

        // Retire head chunks the window can no longer reach back into.
        while let Some(head) = chunks.front() {
            let droppable = match spec.unit {
                Unit::Lines => total_lines - head.lines > spec.count,
                Unit::Bytes => total_bytes - head.len as u64 >= spec.count,
            };
            if !droppable {
                break;
            }
            if let Some(mut retired) = chunks.pop_front() {
                total_lines -= retired.lines;
                total_bytes -= retired.len as u64;
                retired.reset();
                spare.push(retired);
            }
        }
    }

    if cur.len > 0 {
        chunks.push_back(cur);
    }

    // A stream not ending in a terminator holds one partial trailing line.
    if spec.unit == Unit::Lines {
        if let Some(last) = chunks.back() {
            if last.buf[last.len - 1] != b'\n' {
                total_lines += 1;
            }
        }
    }

    let mut skip = match spec.unit {
        Unit::Lines => total_lines.saturating_sub(spec.count),
        Unit::Bytes => total_bytes.saturating_sub(spec.count),
    };

    let mut emitted = 0u64;
    for chunk in &chunks {
        let data = chunk.data();
        let start = if skip == 0 {
            0
        } else {
            match spec.unit {
                Unit::Bytes => {
                    if data.len() as u64 <= skip {
                        skip -= data.len() as u64;
                        continue;
                    }
                    let s = skip as usize;
                    skip = 0;
                    s
                }
                Unit::Lines => {
                    if chunk.lines < skip {
                        skip -= chunk.lines;
                        continue;
                    }
                    // Trim the head chunk at the skip-th terminator.
                    let mut seen = 0u64;
                    let mut s = data.len();
                    for pos in memchr_iter(b'\n', data) {
                        seen += 1;
                        if seen == skip {
                            s = pos + 1;
                            break;
                        }
                    }
                    skip = 0;
                    s
                }
            }
        };
        out.write_all(&data[start..]).map_err(|_| TailError::SinkClosed)?;
        emitted += (data.len() - start) as u64;
    }

    Ok(emitted)
}

/// `+N` anchoring on a stream: skip the leading `count - 1` lines or bytes,
/// then copy verbatim. No buffering required.
fn stream_from_start<R: Read, W: Write>(
    reader: &mut R,
    spec: &TailSpec,
    block_size: usize,
    out: &mut W,
) -> Result<u64, TailError> {
    let mut to_skip = spec.count.saturating_sub(1);
    let mut buf = vec![0u8; block_size];
    let mut emitted = 0u64;

    loop {
        let n = read_retry(reader, &mut buf)?;
        if n == 0 {
            break;
        }
        let data = &buf[..n];

        let start = if to_skip == 0 {
            0
        } else {
            match spec.unit {
                Unit::Bytes => {
                    if n as u64 <= to_skip {
                        to_skip -= n as u64;
                        continue;
                    }
                    let s = to_skip as usize;
                    to_skip = 0;
                    s
                }
                Unit::Lines => {
                    let mut s = None;
                    for pos in memchr_iter(b'\n', data) {
                        to_skip -= 1;
                        if to_skip == 0 {
                            s = Some(pos + 1);
                            break;
                        }
                    }
                    match s {
                        Some(s) => s,
                        None => continue,
                    }
                }
            }
        };

        out.write_all(&data[start..]).map_err(|_| TailError::SinkClosed)?;
        emitted += (n - start) as u64;
    }

    Ok(emitted)
}
