//! Pseudo-terminal channel
//!
//! Interactive assistant CLIs check whether their standard streams are a
//! terminal and refuse to run a REPL on plain pipes. The child gets the slave
//! side of a pty; the bridge keeps the master side, registered with the tokio
//! reactor in non-blocking mode.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, OwnedFd};
use std::process::Stdio;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::pty::{openpty, Winsize};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, OutputFlags, SetArg, Termios};
use tokio::io::unix::AsyncFd;

use super::channel::{ReadOutcome, TerminalChannel};
use crate::types::{BridgeError, Result};

/// Wide enough that the assistant does not hard-wrap its answers
const PTY_ROWS: u16 = 50;
const PTY_COLS: u16 = 200;

/// Slave side of a freshly opened pty, consumed when the child is spawned
#[derive(Debug)]
pub struct PtySlave {
    fd: OwnedFd,
}

impl PtySlave {
    /// Turn the slave into stdin/stdout/stderr for a child process
    ///
    /// The parent's copies are closed once the spawned command is dropped,
    /// which is what lets the master observe EOF when the child exits.
    pub fn into_stdio(self) -> io::Result<(Stdio, Stdio, Stdio)> {
        let stdin = self.fd.try_clone()?;
        let stdout = self.fd.try_clone()?;
        Ok((Stdio::from(stdin), Stdio::from(stdout), Stdio::from(self.fd)))
    }
}

/// Master side of a pseudo-terminal
#[derive(Debug)]
pub struct PtyChannel {
    master: RwLock<Option<Arc<AsyncFd<File>>>>,
}

impl PtyChannel {
    /// Allocate a pty pair with echo disabled on the slave side
    ///
    /// Must be called from within a tokio runtime.
    pub fn open() -> Result<(Self, PtySlave)> {
        let winsize = Winsize {
            ws_row: PTY_ROWS,
            ws_col: PTY_COLS,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(Some(&winsize), None::<&Termios>)
            .map_err(|e| BridgeError::terminal_unavailable(format!("openpty failed: {e}")))?;

        configure_slave(&pty.slave)
            .map_err(|e| BridgeError::terminal_unavailable(format!("termios setup failed: {e}")))?;
        configure_master(&pty.master)
            .map_err(|e| BridgeError::terminal_unavailable(format!("fcntl failed: {e}")))?;

        let master = AsyncFd::new(File::from(pty.master)).map_err(|e| {
            BridgeError::terminal_unavailable(format!("failed to register pty master: {e}"))
        })?;

        tracing::debug!(
            rows = PTY_ROWS,
            cols = PTY_COLS,
            "Allocated pseudo-terminal"
        );

        Ok((
            Self {
                master: RwLock::new(Some(Arc::new(master))),
            },
            PtySlave { fd: pty.slave },
        ))
    }

    fn master(&self) -> Option<Arc<AsyncFd<File>>> {
        self.master
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TerminalChannel for PtyChannel {
    async fn write(&self, bytes: &[u8]) -> Result<()> {
        let master = self.master().ok_or(BridgeError::TerminalClosed)?;

        let mut written = 0;
        while written < bytes.len() {
            let mut guard = master.writable().await?;
            let result = guard.try_io(|inner| {
                let mut file: &File = inner.get_ref();
                file.write(&bytes[written..])
            });
            match result {
                Ok(Ok(0)) => return Err(BridgeError::TerminalClosed),
                Ok(Ok(n)) => written += n,
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
                Ok(Err(e)) if is_hangup(&e) => return Err(BridgeError::TerminalClosed),
                Ok(Err(e)) => return Err(e.into()),
                Err(_would_block) => {}
            }
        }
        Ok(())
    }

    async fn read_chunk(&self, max_bytes: usize, timeout: Duration) -> Result<ReadOutcome> {
        let Some(master) = self.master() else {
            return Ok(ReadOutcome::Closed);
        };

        let mut buf = vec![0u8; max_bytes.max(1)];
        match tokio::time::timeout(timeout, read_ready(&master, &mut buf)).await {
            Err(_elapsed) => Ok(ReadOutcome::Timeout),
            Ok(Ok(0)) => Ok(ReadOutcome::Closed),
            Ok(Ok(n)) => {
                buf.truncate(n);
                Ok(ReadOutcome::Data(buf))
            }
            // Linux reports EIO on the master once every slave fd is closed
            Ok(Err(e)) if is_hangup(&e) => Ok(ReadOutcome::Closed),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    fn close(&self) {
        let released = self
            .master
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            tracing::debug!("Released pseudo-terminal master");
        }
    }

    fn is_closed(&self) -> bool {
        self.master
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

async fn read_ready(master: &AsyncFd<File>, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let mut guard = master.readable().await?;
        match guard.try_io(|inner| {
            let mut file: &File = inner.get_ref();
            file.read(&mut *buf)
        }) {
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
            Ok(result) => return result,
            Err(_would_block) => {}
        }
    }
}

fn is_hangup(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::EIO as i32)
}

fn configure_slave(slave: &OwnedFd) -> nix::Result<()> {
    let mut termios = tcgetattr(slave)?;
    termios
        .local_flags
        .remove(LocalFlags::ECHO | LocalFlags::ECHONL);
    // Keep "\n" as "\n" instead of "\r\n" so chat output has no stray carriage returns
    termios.output_flags.remove(OutputFlags::ONLCR);
    tcsetattr(slave, SetArg::TCSANOW, &termios)
}

fn configure_master(master: &OwnedFd) -> nix::Result<()> {
    let fd = master.as_raw_fd();
    fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_and_close_is_idempotent() {
        let (channel, _slave) = PtyChannel::open().expect("pty should be available");
        assert!(!channel.is_closed());

        channel.close();
        assert!(channel.is_closed());
        channel.close();
        assert!(channel.is_closed());

        let outcome = channel
            .read_chunk(16, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Closed);
        assert!(matches!(
            channel.write(b"x").await,
            Err(BridgeError::TerminalClosed)
        ));
    }

    #[tokio::test]
    async fn test_read_times_out_without_data() {
        let (channel, _slave) = PtyChannel::open().unwrap();
        let outcome = channel
            .read_chunk(16, Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_slave_output_reaches_master_without_newline_translation() {
        let (channel, slave) = PtyChannel::open().unwrap();
        let mut slave_file = File::from(slave.fd);
        slave_file.write_all(b"hello\n").unwrap();

        let outcome = channel
            .read_chunk(64, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Data(b"hello\n".to_vec()));
    }

    #[tokio::test]
    async fn test_master_reports_closed_after_slave_hangup() {
        let (channel, slave) = PtyChannel::open().unwrap();
        drop(slave);

        let outcome = channel
            .read_chunk(64, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Closed);
    }
}
