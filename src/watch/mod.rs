use std::ffi::{CString, OsStr, OsString};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd};
use std::path::Path;

use nix::errno::Errno;
use nix::libc;

use crate::error::TailError;

pub const EVENT_MODIFY: u32 = libc::IN_MODIFY;
pub const EVENT_DELETE_SELF: u32 = libc::IN_DELETE_SELF;
pub const EVENT_MOVE_SELF: u32 = libc::IN_MOVE_SELF;
pub const EVENT_UNMOUNT: u32 = libc::IN_UNMOUNT;

/// Events a tailed file is subscribed to.
const WATCH_MASK: u32 = EVENT_MODIFY | EVENT_DELETE_SELF | EVENT_MOVE_SELF | EVENT_UNMOUNT;

/// Size of the reusable batch read buffer. Large enough for a burst of
/// events; the kernel never splits a single event across reads.
const EVENT_BUF_LEN: usize = 4096;

/// Fixed part of an event record: wd (i32), mask, cookie, len (u32 each).
const EVENT_HEADER_LEN: usize = 16;

/// Opaque token correlating a notification event with the file that
/// produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(i32);

impl WatchId {
    #[cfg(test)]
    pub(crate) fn from_raw(wd: i32) -> Self {
        WatchId(wd)
    }
}

/// One filesystem change notification.
#[derive(Debug)]
pub struct WatchEvent {
    pub watch: WatchId,
    pub mask: u32,
    /// Only set for directory watches; file watches carry no name.
    pub name: Option<OsString>,
}

/// Blocking inotify channel shared by all watched files.
pub struct WatchChannel {
    fd: OwnedFd,
    buf: Vec<u8>,
}

impl WatchChannel {
    pub fn new() -> Result<Self, TailError> {
        let fd = unsafe { libc::inotify_init1(libc::IN_CLOEXEC) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::ENOSYS) | Some(libc::EINVAL) => TailError::NotificationUnsupported,
                _ => TailError::ChannelFailure(err),
            });
        }
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
            buf: vec![0u8; EVENT_BUF_LEN],
        })
    }

    /// Subscribe `path` to modification, self-delete, self-rename and
    /// unmount events.
    pub fn watch(&self, path: &Path) -> Result<WatchId, TailError> {
        let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
            TailError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                "path contains a NUL byte",
            ))
        })?;

        let wd = unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), WATCH_MASK) };
        if wd < 0 {
            return Err(TailError::Io(io::Error::last_os_error()));
        }
        Ok(WatchId(wd))
    }

    /// Block until the kernel delivers the next batch of events.
    ///
    /// Signal interruptions are retried; any other read failure is a
    /// channel failure and fatal for the session. The returned batch is
    /// fully parsed, so the reusable buffer carries no state across calls.
    pub fn wait(&mut self) -> Result<Vec<WatchEvent>, TailError> {
        loop {
            match nix::unistd::read(self.fd.as_raw_fd(), &mut self.buf) {
                Ok(0) => {
                    return Err(TailError::ChannelFailure(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "notification descriptor closed",
                    )))
                }
                Ok(n) => return Ok(parse_events(&self.buf[..n])),
                Err(Errno::EINTR) => continue,
                Err(errno) => return Err(TailError::ChannelFailure(errno.into())),
            }
        }
    }
}

/// Walk a raw event batch: a fixed-size header followed by `len` bytes of
/// NUL-padded name, repeated. Truncated or malformed batches end the walk;
/// they must never cause an out-of-bounds read.
pub fn parse_events(batch: &[u8]) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    let mut cursor = 0usize;

    while cursor + EVENT_HEADER_LEN <= batch.len() {
        let h = &batch[cursor..cursor + EVENT_HEADER_LEN];
        let wd = i32::from_ne_bytes([h[0], h[1], h[2], h[3]]);
        let mask = u32::from_ne_bytes([h[4], h[5], h[6], h[7]]);
        let name_len = u32::from_ne_bytes([h[12], h[13], h[14], h[15]]) as usize;

        let end = match (cursor + EVENT_HEADER_LEN).checked_add(name_len) {
            Some(end) if end <= batch.len() => end,
            _ => break,
        };

        let name_bytes = &batch[cursor + EVENT_HEADER_LEN..end];
        let trimmed = match name_bytes.iter().position(|&b| b == 0) {
            Some(nul) => &name_bytes[..nul],
            None => name_bytes,
        };
        let name = if trimmed.is_empty() {
            None
        } else {
            Some(OsStr::from_bytes(trimmed).to_os_string())
        };

        events.push(WatchEvent {
            watch: WatchId(wd),
            mask,
            name,
        });
        cursor = end;
    }

    if cursor != batch.len() {
        tracing::warn!(
            leftover = batch.len() - cursor,
            "discarding truncated notification records"
        );
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serialize one event the way the kernel lays it out.
    fn event_bytes(wd: i32, mask: u32, name: &[u8], name_len: usize) -> Vec<u8> {
        assert!(name.len() <= name_len);
        let mut buf = Vec::new();
        buf.extend_from_slice(&wd.to_ne_bytes());
        buf.extend_from_slice(&mask.to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes()); // cookie
        buf.extend_from_slice(&(name_len as u32).to_ne_bytes());
        buf.extend_from_slice(name);
        buf.resize(EVENT_HEADER_LEN + name_len, 0); // NUL padding
        buf
    }

    #[test]
    fn test_parse_single_event_without_name() {
        let batch = event_bytes(3, EVENT_MODIFY, b"", 0);
        let events = parse_events(&batch);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].watch, WatchId(3));
        assert_eq!(events[0].mask, EVENT_MODIFY);
        assert!(events[0].name.is_none());
    }

    #[test]
    fn test_parse_batch_preserves_delivery_order() {
        let mut batch = event_bytes(1, EVENT_MODIFY, b"", 0);
        batch.extend(event_bytes(2, EVENT_DELETE_SELF, b"", 0));
        batch.extend(event_bytes(1, EVENT_MODIFY, b"", 0));

        let events = parse_events(&batch);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].watch, WatchId(1));
        assert_eq!(events[1].watch, WatchId(2));
        assert_eq!(events[1].mask, EVENT_DELETE_SELF);
        assert_eq!(events[2].watch, WatchId(1));
    }

    #[test]
    fn test_variable_length_names_are_skipped_exactly() {
        let mut batch = event_bytes(7, EVENT_MODIFY, b"child.log", 16);
        batch.extend(event_bytes(8, EVENT_MOVE_SELF, b"", 0));

        let events = parse_events(&batch);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name.as_deref().unwrap(), "child.log");
        assert_eq!(events[1].watch, WatchId(8));
        assert!(events[1].name.is_none());
    }

    #[test]
    fn test_truncated_header_ends_walk() {
        let mut batch = event_bytes(1, EVENT_MODIFY, b"", 0);
        batch.extend_from_slice(&[1, 2, 3]); // not even a full header
        let events = parse_events(&batch);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_overlong_name_length_ends_walk() {
        let mut batch = event_bytes(1, EVENT_MODIFY, b"", 0);
        // Header claims 64 name bytes but only 4 follow.
        let mut bogus = Vec::new();
        bogus.extend_from_slice(&2i32.to_ne_bytes());
        bogus.extend_from_slice(&EVENT_MODIFY.to_ne_bytes());
        bogus.extend_from_slice(&0u32.to_ne_bytes());
        bogus.extend_from_slice(&64u32.to_ne_bytes());
        bogus.extend_from_slice(&[0, 0, 0, 0]);
        batch.extend(bogus);

        let events = parse_events(&batch);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].watch, WatchId(1));
    }

    #[test]
    fn test_empty_batch() {
        assert!(parse_events(&[]).is_empty());
    }
}
