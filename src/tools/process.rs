use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::{LogStream, ToolStatus};
use super::command::Invocation;

/// One line of tool output, tagged with the launch it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEvent {
    pub invocation: usize,
    pub stream: LogStream,
    pub text: String,
}

impl ToolEvent {
    fn system(invocation: usize, text: impl Into<String>) -> Self {
        Self { invocation, stream: LogStream::System, text: text.into() }
    }
}

/// How a tool run ended. Ordered by precedence when a tool has several launches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExitKind {
    Success,
    NonZero,
    SpawnFailed,
    TimedOut,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitOutcome {
    pub code: Option<i32>,
    pub duration: Duration,
    pub kind: ExitKind,
}

impl ExitOutcome {
    pub fn verdict(&self) -> ToolStatus {
        match self.kind {
            ExitKind::Success => ToolStatus::Succeeded,
            ExitKind::Canceled => ToolStatus::Canceled,
            ExitKind::NonZero | ExitKind::SpawnFailed | ExitKind::TimedOut => ToolStatus::Failed,
        }
    }
}

/// Process-level knobs shared by every launch.
#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    /// Wall-clock budget for the whole tool, across all its launches.
    pub timeout: Duration,
    /// Time between SIGTERM and a forced kill.
    pub grace: Duration,
}

/// A running tool. Output is consumed once through [`ToolHandle::next_event`];
/// [`ToolHandle::wait`] resolves when every launch has ended.
pub struct ToolHandle {
    events: mpsc::UnboundedReceiver<ToolEvent>,
    driver: JoinHandle<ExitOutcome>,
    invocation_targets: Vec<Vec<String>>,
    started: Instant,
}

impl ToolHandle {
    pub(crate) fn spawn(
        invocations: Vec<Invocation>,
        limits: ProcessLimits,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let invocation_targets = invocations.iter().map(|i| i.targets.clone()).collect();
        let driver = tokio::spawn(drive(invocations, tx, cancel, limits));
        Self { events: rx, driver, invocation_targets, started: Instant::now() }
    }

    /// Next output line, or `None` once every launch has closed its streams.
    pub async fn next_event(&mut self) -> Option<ToolEvent> {
        self.events.recv().await
    }

    /// Targets covered by each launch, indexed like [`ToolEvent::invocation`].
    pub fn invocation_targets(&self) -> &[Vec<String>] {
        &self.invocation_targets
    }

    pub async fn wait(mut self) -> ExitOutcome {
        match (&mut self.driver).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Tool driver task ended abnormally");
                ExitOutcome {
                    code: None,
                    duration: self.started.elapsed(),
                    kind: if e.is_cancelled() { ExitKind::Canceled } else { ExitKind::SpawnFailed },
                }
            }
        }
    }
}

impl Drop for ToolHandle {
    // dropping the driver drops its child process, which is killed on drop
    fn drop(&mut self) {
        self.driver.abort();
    }
}

enum LaunchEnd {
    Exited(Option<i32>),
    SpawnFailed(std::io::Error),
    TimedOut,
    Canceled,
}

async fn drive(
    invocations: Vec<Invocation>,
    tx: mpsc::UnboundedSender<ToolEvent>,
    cancel: CancellationToken,
    limits: ProcessLimits,
) -> ExitOutcome {
    let started = Instant::now();
    let deadline = tokio::time::Instant::now() + limits.timeout;
    let mut kind = ExitKind::Success;
    let mut code = Some(0);

    for (index, invocation) in invocations.iter().enumerate() {
        if cancel.is_cancelled() {
            kind = kind.max(ExitKind::Canceled);
            break;
        }
        let _ = tx.send(ToolEvent::system(index, format!("$ {}", invocation.display())));

        match run_one(index, invocation, &tx, &cancel, deadline, limits.grace).await {
            LaunchEnd::Exited(Some(0)) => {}
            LaunchEnd::Exited(exit_code) => {
                code = exit_code;
                kind = kind.max(ExitKind::NonZero);
                let shown = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                let _ = tx.send(ToolEvent::system(index, format!("[!] exited with status {}", shown)));
            }
            LaunchEnd::SpawnFailed(e) => {
                code = None;
                kind = kind.max(ExitKind::SpawnFailed);
                let _ = tx.send(ToolEvent::system(index, format!("[!] failed to start: {}", e)));
            }
            LaunchEnd::TimedOut => {
                code = None;
                kind = kind.max(ExitKind::TimedOut);
                let _ = tx.send(ToolEvent::system(index, "[!] Timeout reached"));
                break;
            }
            LaunchEnd::Canceled => {
                code = None;
                kind = kind.max(ExitKind::Canceled);
                let _ = tx.send(ToolEvent::system(index, "[!] terminated (job canceled)"));
                break;
            }
        }
    }

    ExitOutcome { code, duration: started.elapsed(), kind }
}

async fn run_one(
    index: usize,
    invocation: &Invocation,
    tx: &mpsc::UnboundedSender<ToolEvent>,
    cancel: &CancellationToken,
    deadline: tokio::time::Instant,
    grace: Duration,
) -> LaunchEnd {
    let mut child = match Command::new(&invocation.program)
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => return LaunchEnd::SpawnFailed(e),
    };
    debug!(pid = ?child.id(), program = %invocation.program.display(), "Spawned tool process");

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        terminate(&mut child, grace).await;
        return LaunchEnd::SpawnFailed(std::io::Error::other("output pipes unavailable"));
    };
    // raw bytes, so a stray non-UTF-8 byte never stops the pipe from draining
    let mut out_reader = BufReader::new(stdout);
    let mut err_reader = BufReader::new(stderr);
    let mut out_buf = Vec::new();
    let mut err_buf = Vec::new();
    let mut out_open = true;
    let mut err_open = true;

    let timeout = tokio::time::sleep_until(deadline);
    tokio::pin!(timeout);

    loop {
        tokio::select! {
            read = out_reader.read_until(b'\n', &mut out_buf), if out_open => {
                out_open = forward_line(read, &mut out_buf, index, LogStream::Stdout, tx);
            }
            read = err_reader.read_until(b'\n', &mut err_buf), if err_open => {
                err_open = forward_line(read, &mut err_buf, index, LogStream::Stderr, tx);
            }
            status = child.wait(), if !out_open && !err_open => {
                return match status {
                    Ok(status) => LaunchEnd::Exited(status.code()),
                    Err(e) => LaunchEnd::SpawnFailed(e),
                };
            }
            _ = cancel.cancelled() => {
                terminate(&mut child, grace).await;
                return LaunchEnd::Canceled;
            }
            _ = &mut timeout => {
                terminate(&mut child, grace).await;
                return LaunchEnd::TimedOut;
            }
        }
    }
}

/// Emit one buffered line. Returns whether the stream is still open.
fn forward_line(
    read: std::io::Result<usize>,
    buf: &mut Vec<u8>,
    index: usize,
    stream: LogStream,
    tx: &mpsc::UnboundedSender<ToolEvent>,
) -> bool {
    match read {
        Ok(0) => false,
        Ok(_) => {
            let _ = tx.send(ToolEvent { invocation: index, stream, text: decode_line(buf) });
            buf.clear();
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::Interrupted => true,
        Err(e) => {
            warn!(?stream, error = %e, "Tool output read failed");
            if !buf.is_empty() {
                let _ = tx.send(ToolEvent { invocation: index, stream, text: decode_line(buf) });
                buf.clear();
            }
            let _ = tx.send(ToolEvent::system(index, format!("[!] {:?} read failed: {}", stream, e)));
            false
        }
    }
}

fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// SIGTERM, then a forced kill if the process outlives the grace period.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                debug!(pid, error = %e, "SIGTERM failed");
            }
        }
    }

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        warn!(pid = ?child.id(), "Tool ignored termination, killing");
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "Kill failed");
        }
        let _ = child.wait().await;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> Invocation {
        Invocation {
            targets: vec!["t".into()],
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".into(), script.into()],
        }
    }

    fn limits() -> ProcessLimits {
        ProcessLimits { timeout: Duration::from_secs(30), grace: Duration::from_millis(500) }
    }

    async fn collect(mut handle: ToolHandle) -> (Vec<ToolEvent>, ExitOutcome) {
        let mut events = Vec::new();
        while let Some(event) = handle.next_event().await {
            events.push(event);
        }
        (events, handle.wait().await)
    }

    #[tokio::test]
    async fn test_streams_tagged_lines() {
        let handle = ToolHandle::spawn(
            vec![sh("echo one; echo two 1>&2; echo three")],
            limits(),
            CancellationToken::new(),
        );
        let (events, outcome) = collect(handle).await;
        assert_eq!(outcome.kind, ExitKind::Success);
        assert_eq!(outcome.verdict(), ToolStatus::Succeeded);
        let stdout: Vec<_> = events
            .iter()
            .filter(|e| e.stream == LogStream::Stdout)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(stdout, vec!["one", "three"]);
        assert!(events.iter().any(|e| e.stream == LogStream::Stderr && e.text == "two"));
        assert!(events[0].text.starts_with("$ /bin/sh"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_keeps_output() {
        let handle = ToolHandle::spawn(vec![sh("echo partial; exit 3")], limits(), CancellationToken::new());
        let (events, outcome) = collect(handle).await;
        assert_eq!(outcome.kind, ExitKind::NonZero);
        assert_eq!(outcome.code, Some(3));
        assert_eq!(outcome.verdict(), ToolStatus::Failed);
        assert!(events.iter().any(|e| e.text == "partial"));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_failure() {
        let inv = Invocation {
            targets: vec![],
            program: PathBuf::from("/nonexistent/lantern-tool"),
            args: vec![],
        };
        let (_, outcome) = collect(ToolHandle::spawn(vec![inv], limits(), CancellationToken::new())).await;
        assert_eq!(outcome.kind, ExitKind::SpawnFailed);
    }

    #[tokio::test]
    async fn test_cancel_terminates() {
        let cancel = CancellationToken::new();
        let handle = ToolHandle::spawn(vec![sh("echo up; sleep 30"), sh("echo never")], limits(), cancel.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        });
        let started = Instant::now();
        let (events, outcome) = collect(handle).await;
        assert_eq!(outcome.kind, ExitKind::Canceled);
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(events.iter().any(|e| e.text == "up"));
        assert!(!events.iter().any(|e| e.text == "never"));
    }

    #[tokio::test]
    async fn test_timeout_reached() {
        let limits = ProcessLimits { timeout: Duration::from_millis(300), grace: Duration::from_millis(200) };
        let handle = ToolHandle::spawn(vec![sh("sleep 30")], limits, CancellationToken::new());
        let (events, outcome) = collect(handle).await;
        assert_eq!(outcome.kind, ExitKind::TimedOut);
        assert!(events.iter().any(|e| e.text == "[!] Timeout reached"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_output() {
        let handle = ToolHandle::spawn(
            vec![sh(r"printf 'first\n\377bad\nafter1\nafter2\n'")],
            limits(),
            CancellationToken::new(),
        );
        let (events, outcome) = collect(handle).await;
        assert_eq!(outcome.kind, ExitKind::Success);
        let stdout: Vec<_> = events
            .iter()
            .filter(|e| e.stream == LogStream::Stdout)
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(stdout, vec!["first", "\u{FFFD}bad", "after1", "after2"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_then_bulk_output_exits_cleanly() {
        let script = r"printf '\377\n'; i=0; while [ $i -lt 3000 ]; do printf '%0100d\n' $i; i=$((i+1)); done";
        let limits = ProcessLimits { timeout: Duration::from_secs(3), grace: Duration::from_millis(200) };
        let (events, outcome) = collect(ToolHandle::spawn(vec![sh(script)], limits, CancellationToken::new())).await;
        assert_eq!(outcome.kind, ExitKind::Success);
        assert_eq!(events.iter().filter(|e| e.stream == LogStream::Stdout).count(), 3001);
    }

    #[test]
    fn test_decode_line_strips_crlf() {
        assert_eq!(decode_line(b"ok\r\n"), "ok");
        assert_eq!(decode_line(b"no newline"), "no newline");
        assert_eq!(decode_line(b"\xffx\n"), "\u{FFFD}x");
    }
}
