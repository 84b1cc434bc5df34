// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::sync::Arc;

use async_io::Async;
use log::{debug, trace, warn};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;

/// Size of one record on the wire: `kind: u32` followed by `id: u64`, native
/// endian.
pub const RECORD_LEN: usize = 12;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[repr(u32)]
pub enum NotificationKind {
    /// A job finished; `id` is its job id.
    Job = 0x01,
    /// A signal notice is waiting; `id` is the subscription id.
    Signal = 0x02,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Notification {
    pub kind: NotificationKind,
    pub id: u64,
}

impl Notification {
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        buf[..4].copy_from_slice(&(self.kind as u32).to_ne_bytes());
        buf[4..].copy_from_slice(&self.id.to_ne_bytes());
        buf
    }

    pub fn decode(record: &[u8]) -> Option<Self> {
        if record.len() != RECORD_LEN {
            return None;
        }
        let kind = u32::from_ne_bytes(record[..4].try_into().ok()?);
        let kind = match kind {
            0x01 => NotificationKind::Job,
            0x02 => NotificationKind::Signal,
            _ => return None,
        };
        let id = u64::from_ne_bytes(record[4..].try_into().ok()?);
        Some(Self { kind, id })
    }
}

/// Write side, owned by the dispatcher. Dropping it closes the pipe for
/// every reader.
#[derive(Debug)]
pub(crate) struct NotificationChannel {
    writer: File,
    receiver: Arc<NotificationReceiver>,
}

impl NotificationChannel {
    pub fn open() -> nix::Result<Self> {
        let (read_end, write_end) = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
        debug!(
            "Opened notification pipe (read fd {}, write fd {})",
            read_end.as_raw_fd(),
            write_end.as_raw_fd()
        );
        Ok(Self {
            writer: File::from(write_end),
            receiver: Arc::new(NotificationReceiver {
                reader: File::from(read_end),
            }),
        })
    }

    pub fn receiver(&self) -> Arc<NotificationReceiver> {
        self.receiver.clone()
    }

    /// Never blocks. A full pipe means the reader is far behind; the record
    /// is only a wake-up hint, so it is dropped.
    pub fn post(&self, notification: Notification) {
        match (&self.writer).write(&notification.encode()) {
            Ok(_) => trace!("Posted {:?}", notification),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                debug!("Notification pipe full, dropping {:?}", notification);
            }
            Err(e) => {
                warn!("Failed to write notification {:?}: {e}", notification);
            }
        }
    }
}

/// Read side of the notification pipe. Readable means at least one job result
/// or signal awaits collection on some thread; EOF means the channel has been
/// released.
#[derive(Debug)]
pub struct NotificationReceiver {
    reader: File,
}

impl NotificationReceiver {
    /// Drains whatever is currently in the pipe without blocking.
    pub fn read_notifications(&self) -> io::Result<Vec<Notification>> {
        let mut buf = [0u8; RECORD_LEN * 64];
        let mut notifications = Vec::new();
        loop {
            match (&self.reader).read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    notifications.extend(
                        buf[..n]
                            .chunks_exact(RECORD_LEN)
                            .filter_map(Notification::decode),
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(notifications)
    }

    /// Resolves once the pipe is readable, on any executor.
    pub async fn readable(&self) -> io::Result<()> {
        let watched = Async::new(self)?;
        watched.readable().await
    }
}

impl AsFd for NotificationReceiver {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.reader.as_fd()
    }
}

impl AsRawFd for NotificationReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_have_fixed_layout() {
        let n = Notification {
            kind: NotificationKind::Signal,
            id: 0x0102_0304_0506_0708,
        };
        let bytes = n.encode();
        assert_eq!(&bytes[..4], &2u32.to_ne_bytes());
        assert_eq!(Notification::decode(&bytes), Some(n));
        assert_eq!(Notification::decode(&bytes[..8]), None);
        assert_eq!(Notification::decode(&[0xff; RECORD_LEN]), None);
    }

    #[test]
    fn posted_records_can_be_drained() {
        let channel = NotificationChannel::open().unwrap();
        let receiver = channel.receiver();
        assert!(receiver.read_notifications().unwrap().is_empty());

        channel.post(Notification {
            kind: NotificationKind::Job,
            id: 1,
        });
        channel.post(Notification {
            kind: NotificationKind::Signal,
            id: 9,
        });
        let drained = receiver.read_notifications().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind, NotificationKind::Job);
        assert_eq!(drained[1].id, 9);
    }

    #[test]
    fn full_pipe_drops_records_instead_of_blocking() {
        let channel = NotificationChannel::open().unwrap();
        let receiver = channel.receiver();
        // default pipe capacity on Linux is 64 KiB
        for id in 0..20_000 {
            channel.post(Notification {
                kind: NotificationKind::Job,
                id,
            });
        }
        let drained = receiver.read_notifications().unwrap();
        assert!(!drained.is_empty());
        assert!(drained.len() < 20_000);
    }

    #[test]
    fn readable_resolves_after_post() {
        let channel = NotificationChannel::open().unwrap();
        let receiver = channel.receiver();
        channel.post(Notification {
            kind: NotificationKind::Job,
            id: 3,
        });
        futures::executor::block_on(receiver.readable()).unwrap();
        assert_eq!(receiver.read_notifications().unwrap().len(), 1);
    }
}
