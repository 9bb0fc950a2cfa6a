//! Wrapped child process with process session support
//!
//! Provides a small interface over process-wrap's ChildWrapper for the
//! assistant process, which runs as the leader of its own session so that
//! signals reach it and everything it spawned.

use std::io;
use std::pin::Pin;
use std::process::ExitStatus;

use nix::sys::signal::Signal;
use process_wrap::tokio::{ChildWrapper, CommandWrap, KillOnDrop, ProcessSession};
use tokio::process::Command;

use crate::terminal::PtySlave;

/// Wrapper around Box<dyn ChildWrapper>
#[derive(Debug)]
pub struct WrappedChild {
    inner: Box<dyn ChildWrapper>,
}

impl WrappedChild {
    /// Create a new wrapped child from a process-wrap ChildWrapper
    pub fn new(inner: Box<dyn ChildWrapper>) -> Self {
        Self { inner }
    }

    /// Spawn `program` with its standard streams on the terminal slave
    ///
    /// The program is executed directly, never through a shell. It becomes
    /// the leader of a new session and is killed if the handle is dropped.
    pub fn spawn_on_terminal(program: &str, args: &[String], slave: PtySlave) -> io::Result<Self> {
        let (stdin, stdout, stderr) = slave.into_stdio()?;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(stdin)
            .stdout(stdout)
            .stderr(stderr)
            .env("TERM", "dumb");

        let inner = CommandWrap::from(command)
            .wrap(ProcessSession)
            .wrap(KillOnDrop)
            .spawn()?;
        Ok(Self::new(inner))
    }

    /// Kill the process session and wait for exit
    pub async fn kill(&mut self) -> io::Result<()> {
        Pin::from(self.inner.kill()).await
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        Pin::from(self.inner.wait()).await
    }

    /// Try to wait without blocking
    ///
    /// Returns Some(status) if the process has exited, None if still running.
    pub fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.inner.try_wait()
    }

    /// Send a signal to the process group
    pub fn signal(&self, signal: Signal) -> io::Result<()> {
        self.inner.signal(signal as i32)
    }

    /// Get the process ID
    pub fn id(&self) -> u32 {
        self.inner.id().unwrap_or(0)
    }
}
