pub mod copier;
pub mod offset;
pub mod window;

use std::io::{self, Read};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Lines,
    Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Count backward from the end of the resource (tail).
    FromEnd,
    /// Count forward from the start (the `+N` form).
    FromStart,
}

/// What to emit: `count` units anchored at one end of the resource.
#[derive(Debug, Clone, Copy)]
pub struct TailSpec {
    pub unit: Unit,
    pub count: u64,
    pub anchor: Anchor,
}

impl Default for TailSpec {
    /// The classic default: last 10 lines.
    fn default() -> Self {
        Self {
            unit: Unit::Lines,
            count: 10,
            anchor: Anchor::FromEnd,
        }
    }
}

/// `read` that retries transient signal interruptions.
pub(crate) fn read_retry<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
