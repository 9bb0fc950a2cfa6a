//! Assistant process session
//!
//! Owns the pseudo-terminal, the child process and at most one streaming
//! task, and drives them through the `Idle → Starting → Running → Stopping →
//! Stopped` lifecycle.

use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;

use super::stream_task::StreamTask;
use super::wrapped_child::WrappedChild;
use crate::stream::{ChunkSink, DiscardSink, StreamSettings};
use crate::terminal::{PtyChannel, TerminalChannel};
use crate::tracing::ErrorTraceExt;
use crate::types::{BridgeConfig, BridgeError, Result, SessionState, StreamOutcome};

/// One interactive assistant process behind a pseudo-terminal
#[derive(Debug)]
pub struct ProcessSession {
    config: BridgeConfig,
    state: SessionState,
    terminal: Option<Arc<dyn TerminalChannel>>,
    child: Option<WrappedChild>,
    active_stream: Option<StreamTask>,
    turns: u64,
}

impl ProcessSession {
    /// Create an idle session; nothing is spawned until [`start`](Self::start)
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            terminal: None,
            child: None,
            active_stream: None,
            turns: 0,
        }
    }

    /// Running session over an existing channel, without a child process
    #[cfg(test)]
    pub(crate) fn with_channel(config: BridgeConfig, channel: Arc<dyn TerminalChannel>) -> Self {
        let mut session = Self::new(config);
        session.state = SessionState::Running;
        session.terminal = Some(channel);
        session
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process id of the assistant, while it runs
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(WrappedChild::id)
    }

    /// Number of prompts sent so far
    pub fn turns(&self) -> u64 {
        self.turns
    }

    /// Whether a streaming task (drain or turn) is still running
    pub fn has_active_stream(&self) -> bool {
        self.active_stream
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Session configuration
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    fn stream_settings(&self) -> StreamSettings {
        StreamSettings::from(&self.config)
    }

    /// Allocate the terminal and spawn the assistant
    ///
    /// Only valid from `Idle`. On failure the session is left `Stopped`.
    /// Output produced before the first prompt is drained and discarded.
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(BridgeError::session_not_ready(self.state));
        }
        self.state = SessionState::Starting;
        tracing::info!(cli_path = %self.config.cli_path, args = ?self.config.cli_args, "Starting assistant process");

        let (terminal, child) = match self.spawn_child() {
            Ok(spawned) => spawned,
            Err(e) => {
                self.state = SessionState::Stopped;
                e.trace_error();
                return Err(e);
            }
        };

        tracing::info!(pid = child.id(), "Assistant process started");

        self.active_stream = Some(StreamTask::spawn(
            "drain",
            Arc::clone(&terminal),
            self.stream_settings(),
            Box::new(DiscardSink::new()),
        ));
        self.terminal = Some(terminal);
        self.child = Some(child);
        self.state = SessionState::Running;
        Ok(())
    }

    fn spawn_child(&self) -> Result<(Arc<dyn TerminalChannel>, WrappedChild)> {
        let (channel, slave) = PtyChannel::open()?;
        let child =
            WrappedChild::spawn_on_terminal(&self.config.cli_path, &self.config.cli_args, slave)
                .map_err(|e| BridgeError::process_start(&self.config.cli_path, e))?;
        Ok((Arc::new(channel), child))
    }

    /// Send one prompt and start streaming its output into `sink`
    ///
    /// Any previous streaming task is cancelled and awaited before the prompt
    /// is written, so only one task ever feeds a sink. Returns once the
    /// prompt is written; output arrives asynchronously.
    pub async fn send(&mut self, prompt: &str, sink: Box<dyn ChunkSink>) -> Result<()> {
        if !self.state.accepts_prompts() {
            return Err(BridgeError::session_not_ready(self.state));
        }
        let line = frame_prompt(prompt)?;
        let terminal = self.terminal.clone().ok_or(BridgeError::TerminalClosed)?;

        self.cancel_active_stream().await;

        terminal.write(line.as_bytes()).await?;
        self.turns += 1;
        tracing::info!(turn = self.turns, chars = line.chars().count() - 1, "Prompt sent");

        self.active_stream = Some(StreamTask::spawn(
            format!("turn-{}", self.turns),
            terminal,
            self.stream_settings(),
            sink,
        ));
        Ok(())
    }

    /// Wait up to `limit` for the active streaming task to finish on its own
    ///
    /// Returns `None` when there is no task or it is still running at the
    /// deadline; the task is left untouched in that case.
    pub async fn wait_for_stream(&mut self, limit: Duration) -> Option<StreamOutcome> {
        let task = self.active_stream.as_mut()?;
        match tokio::time::timeout(limit, &mut task.handle).await {
            Ok(joined) => {
                self.active_stream = None;
                joined.ok()
            }
            Err(_) => None,
        }
    }

    async fn cancel_active_stream(&mut self) {
        if let Some(task) = self.active_stream.take() {
            task.cancel(self.config.cancel_timeout).await;
        }
    }

    /// Stop the assistant and release the terminal
    ///
    /// Sends SIGTERM, waits for the grace period and kills the process on
    /// timeout. The terminal is closed in every case. Calling it again, or on
    /// a session that never started, is a no-op apart from the state change.
    pub async fn stop(&mut self) {
        match self.state {
            SessionState::Stopped => return,
            SessionState::Idle => {
                self.state = SessionState::Stopped;
                return;
            }
            _ => {}
        }

        self.state = SessionState::Stopping;
        tracing::info!(pid = ?self.pid(), "Stopping session");

        self.cancel_active_stream().await;

        if let Some(mut child) = self.child.take() {
            self.terminate(&mut child).await;
        }
        if let Some(terminal) = self.terminal.take() {
            terminal.close();
        }

        self.state = SessionState::Stopped;
        tracing::info!(turns = self.turns, "Session stopped");
    }

    async fn terminate(&self, child: &mut WrappedChild) {
        let pid = child.id();
        if let Err(e) = child.signal(Signal::SIGTERM) {
            // The group is gone once the child has exited and been reaped
            if let Ok(Some(status)) = child.try_wait() {
                tracing::info!(pid, %status, "Assistant process already exited");
                return;
            }
            tracing::warn!(pid, error = %e, "Failed to send SIGTERM");
        }

        let grace = self.config.stop_grace;
        match tokio::time::timeout(grace, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(pid, %status, "Assistant process exited"),
            Ok(Err(e)) => tracing::warn!(pid, error = %e, "Failed to wait for assistant process"),
            Err(_) => {
                let grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
                BridgeError::GracefulStopTimeout(grace_ms).trace_error();
                if let Err(e) = child.kill().await {
                    tracing::warn!(pid, error = %e, "Failed to kill assistant process");
                }
            }
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if let Some(task) = self.active_stream.take() {
            task.cancel_token.cancel();
        }
        if let Some(terminal) = &self.terminal {
            terminal.close();
        }
    }
}

/// Turn a prompt into exactly one newline-terminated input line
///
/// Line breaks become spaces; other control characters except tab are
/// rejected, since the REPL would act on them (Ctrl-C, Ctrl-D, ...).
pub fn frame_prompt(prompt: &str) -> Result<String> {
    let flattened: String = prompt
        .chars()
        .map(|c| if matches!(c, '\r' | '\n') { ' ' } else { c })
        .collect();
    let line = flattened.trim();
    if line.is_empty() {
        return Err(BridgeError::EmptyPrompt);
    }
    if let Some(c) = line.chars().find(|c| c.is_control() && *c != '\t') {
        return Err(BridgeError::InvalidPrompt(format!(
            "control character U+{:04X} is not allowed",
            u32::from(c)
        )));
    }
    Ok(format!("{line}\n"))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use tokio::sync::mpsc;

    use super::*;
    use crate::terminal::simulated::SimulatedChannel;

    type Record = Arc<Mutex<Vec<(&'static str, String)>>>;

    /// Appends every chunk, tagged with its turn, to one shared record
    struct RecordingSink {
        label: &'static str,
        record: Record,
    }

    #[async_trait]
    impl ChunkSink for RecordingSink {
        async fn deliver(&mut self, chunk: String) -> Result<()> {
            self.record.lock().unwrap().push((self.label, chunk));
            Ok(())
        }
    }

    fn recording(label: &'static str, record: &Record) -> Box<dyn ChunkSink> {
        Box::new(RecordingSink {
            label,
            record: Arc::clone(record),
        })
    }

    #[test]
    fn test_frame_prompt() {
        assert_eq!(frame_prompt("list files").unwrap(), "list files\n");
        assert_eq!(frame_prompt("  line one\r\nline two\n").unwrap(), "line one  line two\n");
        assert_eq!(frame_prompt("tab\tkept").unwrap(), "tab\tkept\n");
        assert!(matches!(frame_prompt(" \n "), Err(BridgeError::EmptyPrompt)));
        assert!(matches!(
            frame_prompt("stop\x03"),
            Err(BridgeError::InvalidPrompt(_))
        ));
        assert!(matches!(
            frame_prompt("\x1b[A"),
            Err(BridgeError::InvalidPrompt(_))
        ));
    }

    #[tokio::test]
    async fn test_send_before_start_is_not_ready() {
        let mut session = ProcessSession::new(BridgeConfig::new("sh"));
        assert_eq!(session.state(), SessionState::Idle);

        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        let err = session.send("list files", Box::new(tx)).await.unwrap_err();
        assert!(matches!(err, BridgeError::SessionNotReady(ref s) if s == "idle"));
        assert_eq!(session.turns(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let mut session = ProcessSession::new(BridgeConfig::new("sh"));
        session.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);
        session.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);

        // A stopped session cannot be restarted
        assert!(matches!(
            session.start(),
            Err(BridgeError::SessionNotReady(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_send_supersedes_first() {
        let (channel, child) = SimulatedChannel::new();
        let channel = Arc::new(channel);
        let mut session = ProcessSession::with_channel(
            BridgeConfig::default(),
            Arc::clone(&channel) as Arc<dyn TerminalChannel>,
        );
        let record: Record = Arc::default();

        session.send("first", recording("first", &record)).await.unwrap();
        child.emit("answer one");
        tokio::time::sleep(Duration::from_millis(1500)).await;

        session.send("second", recording("second", &record)).await.unwrap();
        assert!(session.has_active_stream());
        child.emit("answer two");
        child.hang_up();

        let outcome = session.wait_for_stream(Duration::from_secs(5)).await;
        assert_eq!(outcome, Some(StreamOutcome::Completed { deliveries: 1 }));
        assert!(!session.has_active_stream());

        assert_eq!(
            *record.lock().unwrap(),
            vec![
                ("first", "answer one".to_string()),
                ("second", "answer two".to_string()),
            ]
        );
        assert_eq!(channel.written(), "first\nsecond\n");
        assert_eq!(session.turns(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_sends_leave_one_stream() {
        let (channel, child) = SimulatedChannel::new();
        let mut session =
            ProcessSession::with_channel(BridgeConfig::default(), Arc::new(channel));
        let record: Record = Arc::default();

        session.send("first", recording("first", &record)).await.unwrap();
        session.send("second", recording("second", &record)).await.unwrap();
        child.emit("only the second turn sees this");
        child.hang_up();

        session.wait_for_stream(Duration::from_secs(5)).await;
        let record = record.lock().unwrap();
        assert!(!record.is_empty());
        assert!(record.iter().all(|(label, _)| *label == "second"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_stream_and_closes_terminal() {
        let (channel, child) = SimulatedChannel::new();
        let channel = Arc::new(channel);
        let mut session = ProcessSession::with_channel(
            BridgeConfig::default(),
            Arc::clone(&channel) as Arc<dyn TerminalChannel>,
        );
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        session.send("explain", Box::new(tx)).await.unwrap();
        child.emit("never flushed");
        session.stop().await;

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(channel.is_closed());
        assert_eq!(rx.recv().await, None);

        let (tx, _rx) = mpsc::unbounded_channel::<String>();
        assert!(matches!(
            session.send("again", Box::new(tx)).await,
            Err(BridgeError::SessionNotReady(_))
        ));
    }

    #[tokio::test]
    #[serial]
    async fn test_start_missing_executable_fails_closed() {
        let mut session = ProcessSession::new(BridgeConfig::new(
            "/nonexistent/copilot-bridge-test-binary",
        ));
        let err = session.start().unwrap_err();
        assert!(matches!(err, BridgeError::ProcessStartError { .. }));
        assert!(err.is_lifecycle_error());
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.pid(), None);
    }

    #[tokio::test]
    #[serial]
    async fn test_echo_child_round_trip() {
        let config = BridgeConfig::new("sh").with_args([
            "-c",
            r#"while IFS= read -r line; do echo "> $line"; done"#,
        ]);
        let mut session = ProcessSession::new(config);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.pid().is_some());

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        session.send("list files", Box::new(tx)).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(10), async {
            let mut text = String::new();
            while let Some(chunk) = rx.recv().await {
                text.push_str(&chunk);
                if text.contains("list files") {
                    break;
                }
            }
            text
        })
        .await
        .unwrap();
        assert!(received.contains("> list files"));

        session.stop().await;
        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(session.pid(), None);
    }

    #[tokio::test]
    #[serial]
    async fn test_startup_banner_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-copilot.sh");
        std::fs::write(
            &script,
            "printf '\\033[1mWelcome to Copilot\\033[0m\\n'\n\
             while IFS= read -r line; do echo \"> $line\"; done\n",
        )
        .unwrap();

        let config = BridgeConfig::new("sh").with_args([script.to_string_lossy()]);
        let mut session = ProcessSession::new(config);
        session.start().unwrap();

        // Let the drain task swallow the banner
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        session.send("explain main.rs", Box::new(tx)).await.unwrap();
        let first = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first, "> explain main.rs\n");

        session.stop().await;
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_kills_child_ignoring_sigterm() {
        let mut config =
            BridgeConfig::new("sh").with_args(["-c", "trap '' TERM; while :; do sleep 1; done"]);
        config.stop_grace = Duration::from_millis(500);
        let mut session = ProcessSession::new(config);
        session.start().unwrap();
        let terminal = session.terminal.clone().unwrap();

        // Give the shell time to install its trap
        tokio::time::sleep(Duration::from_millis(300)).await;

        let started = std::time::Instant::now();
        tokio::time::timeout(Duration::from_secs(10), session.stop())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(terminal.is_closed());
        assert_eq!(session.pid(), None);
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_releases_terminal_when_sigterm_fails() {
        let mut session = ProcessSession::new(BridgeConfig::new("true"));
        session.start().unwrap();
        let terminal = session.terminal.clone().unwrap();

        // Once reaped, the child has no process group left to signal
        let child = session.child.as_mut().unwrap();
        child.wait().await.unwrap();
        assert!(child.signal(Signal::SIGTERM).is_err());

        let started = std::time::Instant::now();
        session.stop().await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(terminal.is_closed());
    }

    /// Whether `pid` exists and is not a zombie
    fn process_alive(pid: i32) -> bool {
        std::fs::read_to_string(format!("/proc/{pid}/stat")).is_ok_and(|stat| {
            stat.rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                != Some("Z")
        })
    }

    #[tokio::test]
    #[serial]
    async fn test_stop_terminates_grandchildren() {
        let mut config = BridgeConfig::new("sh").with_args([
            "-c",
            r#"read -r _; sleep 300 & echo "grandchild $!"; wait"#,
        ]);
        config.stop_grace = Duration::from_secs(2);
        let mut session = ProcessSession::new(config);
        session.start().unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        session.send("go", Box::new(tx)).await.unwrap();
        let announced = tokio::time::timeout(Duration::from_secs(10), async {
            let mut text = String::new();
            while let Some(chunk) = rx.recv().await {
                text.push_str(&chunk);
                if text.contains("grandchild") && text.ends_with('\n') {
                    break;
                }
            }
            text
        })
        .await
        .unwrap();
        let pid: i32 = announced
            .split_whitespace()
            .nth(1)
            .and_then(|pid| pid.parse().ok())
            .unwrap();
        assert!(process_alive(pid));

        session.stop().await;

        let gone = tokio::time::timeout(Duration::from_secs(5), async {
            while process_alive(pid) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(gone.is_ok(), "grandchild {pid} outlived stop()");
    }
}
