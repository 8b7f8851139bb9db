use std::io::Write;
use std::path::Path;

use crate::error::TailError;
use crate::file::FileRecord;
use crate::session::HeaderState;
use crate::tail::copier;
use crate::watch::{self, WatchChannel, WatchEvent};

/// Multiplexes filesystem change notifications across every watched file,
/// streaming appended deltas until all records are retired.
///
/// Each record moves `Tailing -> Watching -> Retired`; `Retired` is
/// terminal. With a file that only ever grows the loop runs until the
/// process is terminated externally, which is the intended behavior.
pub struct FollowEngine {
    channel: WatchChannel,
}

impl FollowEngine {
    pub fn new() -> Result<Self, TailError> {
        Ok(Self {
            channel: WatchChannel::new()?,
        })
    }

    /// Subscribe every surviving record to change notifications. A file
    /// that cannot be watched is retired with a diagnostic; it does not
    /// abort the others.
    pub fn register(&mut self, records: &mut [FileRecord]) {
        for record in records.iter_mut().filter(|r| r.active) {
            match self.channel.watch(Path::new(&record.name)) {
                Ok(id) => record.watch = Some(id),
                Err(err) => {
                    tracing::error!(
                        file = %record.pretty_name(),
                        error = %err,
                        "cannot watch file"
                    );
                    record.retire();
                }
            }
        }
    }

    /// Run the shared event loop: block for the next batch, dispatch every
    /// event in delivery order, repeat until no record is left active.
    pub fn run<W: Write>(
        &mut self,
        records: &mut [FileRecord],
        headers: &mut HeaderState,
        out: &mut W,
    ) -> Result<(), TailError> {
        while records.iter().any(|r| r.active) {
            let events = self.channel.wait()?;
            dispatch(records, &events, headers, out)?;
        }
        Ok(())
    }
}

/// Route one fully-drained batch of events to the records they name.
/// Only a sink failure propagates; per-file trouble retires that file.
fn dispatch<W: Write>(
    records: &mut [FileRecord],
    events: &[WatchEvent],
    headers: &mut HeaderState,
    out: &mut W,
) -> Result<(), TailError> {
    for event in events {
        let Some(idx) = records
            .iter()
            .position(|r| r.active && r.watch == Some(event.watch))
        else {
            // A retirement raced with an in-flight notification.
            tracing::debug!(mask = event.mask, "event for unknown watch, discarding");
            continue;
        };

        if event.mask & watch::EVENT_MODIFY != 0 {
            handle_modify(&mut records[idx], idx, headers, out)?;
        }

        if event.mask & (watch::EVENT_DELETE_SELF | watch::EVENT_MOVE_SELF | watch::EVENT_UNMOUNT)
            != 0
        {
            let record = &mut records[idx];
            let reason = if event.mask & watch::EVENT_DELETE_SELF != 0 {
                "file deleted"
            } else if event.mask & watch::EVENT_MOVE_SELF != 0 {
                "file renamed"
            } else {
                "filesystem unmounted"
            };
            tracing::info!(file = %record.pretty_name(), "{reason}; no longer following");
            record.retire();
        }
    }

    out.flush().map_err(|_| TailError::SinkClosed)?;
    Ok(())
}

/// Re-stat the file and emit the appended delta, treating a shrinking size
/// as truncation rather than a negative-length read.
fn handle_modify<W: Write>(
    record: &mut FileRecord,
    idx: usize,
    headers: &mut HeaderState,
    out: &mut W,
) -> Result<(), TailError> {
    let new_size = match record.restat() {
        Ok(size) => size,
        Err(err) => {
            tracing::error!(file = %record.pretty_name(), error = %err, "cannot stat file");
            record.retire();
            return Ok(());
        }
    };

    if new_size < record.size {
        tracing::warn!(file = %record.pretty_name(), "file truncated");
        record.size = new_size;
        return Ok(());
    }
    if new_size == record.size {
        return Ok(());
    }

    headers.maybe_print(idx, record.pretty_name(), out)?;
    match copier::copy_delta(record, out) {
        Ok(_) => Ok(()),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            tracing::error!(file = %record.pretty_name(), error = %err, "read failed");
            record.retire();
            Ok(())
        }
    }
}
