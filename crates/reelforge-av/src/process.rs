//! Spawning external tools and tracking them for interrupt cleanup.
//!
//! Every process started by a [`ProcessRunner`] runs in its own process group
//! and is recorded in the runner's [`ProcessRegistry`] until it exits. When
//! the operator interrupts a run, [`ProcessRegistry::terminate_all`] signals
//! every registered group so no transcoder keeps running after reelforge
//! itself has exited. A process whose handle is dropped before it was
//! waited on has its whole group signalled as well.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use reelforge_common::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, ChildStderr, Command};
use tokio::task::JoinHandle;

use crate::command::{ToolCommand, ToolOutput};

/// Number of diagnostic lines kept for error reports.
const TAIL_LINES: usize = 8;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct LiveProcess {
    command: String,
    pid: u32,
}

#[derive(Debug, Default)]
struct RegistryInner {
    next_id: AtomicU64,
    live: Mutex<HashMap<u64, LiveProcess>>,
}

/// The set of external processes currently running.
///
/// Cloning is cheap and every clone shares the same set. Inserts happen on
/// spawn and removals when a [`RunningProcess`] is waited on or dropped; the
/// interrupt handler drains the set under the same lock, so a removal racing
/// with [`terminate_all`](Self::terminate_all) is a no-op.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<RegistryInner>,
}

impl ProcessRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, command: String, pid: u32) -> Registration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.live.lock().insert(id, LiveProcess { command, pid });
        Registration {
            registry: self.clone(),
            id,
            pid,
            armed: true,
        }
    }

    fn unregister(&self, id: u64) {
        self.inner.live.lock().remove(&id);
    }

    /// Number of live processes.
    pub fn len(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Whether no process is registered.
    pub fn is_empty(&self) -> bool {
        self.inner.live.lock().is_empty()
    }

    /// Process ids of all live processes.
    pub fn pids(&self) -> Vec<u32> {
        self.inner.live.lock().values().map(|p| p.pid).collect()
    }

    /// Empty the registry and send SIGTERM to every registered process group.
    ///
    /// Returns the number of groups signalled.
    pub fn terminate_all(&self) -> usize {
        let drained: Vec<LiveProcess> = self.inner.live.lock().drain().map(|(_, p)| p).collect();

        for process in &drained {
            tracing::info!("Terminating {} (pid {})", process.command, process.pid);
            if let Err(e) = signal_group(process.pid) {
                tracing::warn!(
                    "Failed to terminate {} (pid {}): {e}",
                    process.command,
                    process.pid
                );
            }
        }

        drained.len()
    }
}

/// Removes its entry from the registry when dropped.
///
/// While armed, dropping also signals the process group: the child itself is
/// killed on drop, but anything it forked would outlive it. Disarmed once the
/// child has been reaped, after which the pid may be reused.
#[derive(Debug)]
struct Registration {
    registry: ProcessRegistry,
    id: u64,
    pid: u32,
    armed: bool,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        if self.armed {
            let _ = signal_group(self.pid);
        }
    }
}

/// Drive `work` to completion unless `interrupt` resolves first.
///
/// On interrupt every registered process group is signalled while `work` is
/// still alive, so its processes are found in the registry, and
/// [`Error::Interrupted`] is returned.
pub async fn run_until_interrupted<T>(
    registry: &ProcessRegistry,
    work: impl Future<Output = T>,
    interrupt: impl Future<Output = ()>,
) -> Result<T> {
    tokio::pin!(work);
    tokio::select! {
        out = &mut work => Ok(out),
        () = interrupt => {
            let count = registry.terminate_all();
            tracing::warn!("Interrupted; terminated {count} external process group(s)");
            Err(Error::Interrupted)
        }
    }
}

#[cfg(unix)]
fn signal_group(pid: u32) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // Children are spawned with process_group(0), so pgid == pid.
    match killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from(e)),
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32) -> io::Result<()> {
    // Without process groups the child is killed on drop instead.
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "process group signalling requires unix",
    ))
}

// ---------------------------------------------------------------------------
// Line splitting
// ---------------------------------------------------------------------------

/// Splits a byte stream into lines on `\n` and `\r`.
///
/// ffmpeg rewrites its status line in place with carriage returns, so plain
/// newline splitting would deliver the whole encode as one line at exit.
/// Empty lines are skipped.
#[derive(Debug)]
pub struct LineReader<R> {
    reader: R,
    partial: Vec<u8>,
    ready: VecDeque<String>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Wrap a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            partial: Vec::new(),
            ready: VecDeque::new(),
            eof: false,
        }
    }

    /// Read the next line, or `None` at end of stream.
    pub async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut chunk).await?;
            if n == 0 {
                self.eof = true;
                self.flush_partial();
                continue;
            }

            for &b in &chunk[..n] {
                if b == b'\n' || b == b'\r' {
                    self.flush_partial();
                } else {
                    self.partial.push(b);
                }
            }
        }
    }

    fn flush_partial(&mut self) {
        if !self.partial.is_empty() {
            self.ready
                .push_back(String::from_utf8_lossy(&self.partial).into_owned());
            self.partial.clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Running process
// ---------------------------------------------------------------------------

/// Handle to a spawned external process.
///
/// Diagnostic output (stderr) is consumed line by line with
/// [`next_line`](Self::next_line); [`wait`](Self::wait) drains whatever is
/// left and resolves on exit. Dropping the handle kills the child and its
/// process group and removes it from the registry.
#[derive(Debug)]
pub struct RunningProcess {
    child: Child,
    name: String,
    pid: Option<u32>,
    stderr: Option<LineReader<ChildStderr>>,
    stdout: Option<JoinHandle<io::Result<String>>>,
    tail: VecDeque<String>,
    registration: Option<Registration>,
}

impl RunningProcess {
    /// Operating system process id, if the process is still known.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Short program name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Next diagnostic line, or `None` once the stream is closed.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let Some(reader) = self.stderr.as_mut() else {
            return Ok(None);
        };

        let line = reader.next_line().await?;
        if let Some(ref l) = line {
            if self.tail.len() == TAIL_LINES {
                self.tail.pop_front();
            }
            self.tail.push_back(l.clone());
        }
        Ok(line)
    }

    /// Send SIGTERM to this process's group.
    pub fn terminate(&self) -> Result<()> {
        match self.pid {
            Some(pid) => signal_group(pid).map_err(Error::from),
            None => Ok(()),
        }
    }

    /// Wait for the process to exit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalProcessFailed`] when the exit status is not
    /// success; the error detail carries the last diagnostic lines.
    pub async fn wait(mut self) -> Result<ToolOutput> {
        while self.next_line().await?.is_some() {}

        let status = self.child.wait().await?;
        if let Some(registration) = self.registration.as_mut() {
            registration.armed = false;
        }

        let stdout = match self.stdout.take() {
            Some(handle) => handle.await.map_err(io::Error::other)??,
            None => String::new(),
        };

        let stderr_tail = self.tail.iter().cloned().collect::<Vec<_>>().join("\n");

        if !status.success() {
            return Err(Error::process_failed(
                self.name.clone(),
                status.code(),
                stderr_tail,
            ));
        }

        Ok(ToolOutput {
            status,
            stdout,
            stderr_tail,
        })
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Spawns external tools and records them in a [`ProcessRegistry`].
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    registry: ProcessRegistry,
}

impl ProcessRunner {
    /// Create a runner that registers processes in `registry`.
    pub fn new(registry: ProcessRegistry) -> Self {
        Self { registry }
    }

    /// The registry this runner records processes in.
    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Spawn `cmd` in its own process group.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExternalToolUnavailable`] if the binary is missing or
    /// not executable.
    pub fn spawn(&self, cmd: &ToolCommand) -> Result<RunningProcess> {
        let name = cmd.name();
        tracing::debug!("spawn: {}", cmd.command_line());

        let mut command = Command::new(cmd.program());
        command
            .args(cmd.get_args())
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(if cmd.captures_stdout() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                Error::tool_unavailable(cmd.program().display().to_string())
            }
            _ => Error::Io(e),
        })?;

        let pid = child.id();
        let registration = pid.map(|pid| self.registry.register(name.clone(), pid));

        let stderr = child.stderr.take().map(LineReader::new);
        let stdout = child.stdout.take().map(|mut out| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                out.read_to_end(&mut buf).await?;
                Ok::<_, io::Error>(String::from_utf8_lossy(&buf).into_owned())
            })
        });

        Ok(RunningProcess {
            child,
            name,
            pid,
            stderr,
            stdout,
            tail: VecDeque::with_capacity(TAIL_LINES),
            registration,
        })
    }

    /// Run `cmd` to completion, handing every diagnostic line to `on_line`.
    pub async fn run_with_lines(
        &self,
        cmd: &ToolCommand,
        mut on_line: impl FnMut(&str),
    ) -> Result<ToolOutput> {
        let mut process = self.spawn(cmd)?;
        while let Some(line) = process.next_line().await? {
            on_line(&line);
        }
        process.wait().await
    }

    /// Run `cmd` to completion, ignoring diagnostic output.
    pub async fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput> {
        self.run_with_lines(cmd, |_| {}).await
    }

    /// Run `cmd` to completion with standard output captured.
    pub async fn output(&self, cmd: &ToolCommand) -> Result<ToolOutput> {
        let mut cmd = cmd.clone();
        cmd.capture_stdout();
        self.run(&cmd).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    fn sh(script: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    /// Shell script that forks a long sleep, records its pid, and waits.
    fn forking_script(pidfile: &Path) -> String {
        format!("sleep 60 & echo $! > '{}'; wait", pidfile.display())
    }

    async fn read_pid(pidfile: &Path) -> i32 {
        loop {
            if let Some(pid) = std::fs::read_to_string(pidfile)
                .ok()
                .and_then(|s| s.trim().parse().ok())
            {
                return pid;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    fn is_running(pid: i32) -> bool {
        if Path::new("/proc/self").exists() {
            // Zombies count as gone; the reaper may not have run yet.
            return std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .map(|stat| {
                    stat.rsplit(')').next().and_then(|s| s.split_whitespace().next()) != Some("Z")
                })
                .unwrap_or(false);
        }
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
    }

    async fn exits_within(pid: i32, limit: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if !is_running(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        !is_running(pid)
    }

    #[tokio::test]
    async fn line_reader_splits_on_cr_and_lf() {
        let data: &[u8] = b"Duration: 00:00:10.00\r\nframe=1 time=00:00:01.00\rframe=2 time=00:00:02.00\n\nlast";
        let mut reader = LineReader::new(data);
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        assert_eq!(
            lines,
            vec![
                "Duration: 00:00:10.00",
                "frame=1 time=00:00:01.00",
                "frame=2 time=00:00:02.00",
                "last",
            ]
        );
    }

    #[tokio::test]
    async fn captures_stdout_when_requested() {
        let runner = ProcessRunner::default();
        let mut cmd = sh("echo hello");
        cmd.capture_stdout();
        let output = runner.run(&cmd).await.unwrap();
        assert!(output.status.success());
        assert_eq!(output.stdout.trim(), "hello");
        assert!(runner.registry().is_empty());
    }

    #[tokio::test]
    async fn streams_stderr_lines() {
        let runner = ProcessRunner::default();
        let mut seen = Vec::new();
        runner
            .run_with_lines(&sh("printf 'a\\rb\\nc' >&2"), |l| seen.push(l.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let runner = ProcessRunner::default();
        let err = runner
            .run(&ToolCommand::new("nonexistent_tool_xyz_12345"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, Error::ExternalToolUnavailable { .. }),
            "got: {err}"
        );
    }

    #[tokio::test]
    async fn non_zero_exit_is_typed_failure() {
        let runner = ProcessRunner::default();
        let err = runner
            .run(&sh("echo 'bad input' >&2; exit 3"))
            .await
            .unwrap_err();
        match err {
            Error::ExternalProcessFailed {
                command,
                exit_code,
                detail,
            } => {
                assert_eq!(command, "sh");
                assert_eq!(exit_code, Some(3));
                assert!(detail.contains("bad input"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn registry_tracks_live_process_until_drop() {
        let runner = ProcessRunner::default();
        let process = runner.spawn(&sh("sleep 30")).unwrap();
        assert_eq!(runner.registry().len(), 1);
        assert_eq!(runner.registry().pids(), vec![process.pid().unwrap()]);
        drop(process);
        assert!(runner.registry().is_empty());
    }

    #[tokio::test]
    async fn terminate_all_kills_process_group() {
        let registry = ProcessRegistry::new();
        let runner = ProcessRunner::new(registry.clone());

        // The background sleep inherits stderr; wait() only sees EOF once the
        // whole group is gone.
        let process = runner.spawn(&sh("sleep 30 & wait")).unwrap();
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.terminate_all(), 1);
        assert!(registry.is_empty());

        let result = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("process group still running after terminate_all");
        match result {
            Err(Error::ExternalProcessFailed { exit_code, .. }) => assert_eq!(exit_code, None),
            other => panic!("expected signal termination, got {other:?}"),
        }
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn interrupt_terminates_forked_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("sleep.pid");
        let registry = ProcessRegistry::new();
        let runner = ProcessRunner::new(registry.clone());

        let cmd = sh(&forking_script(&pidfile));
        let result = run_until_interrupted(&registry, runner.run(&cmd), async {
            read_pid(&pidfile).await;
        })
        .await;

        assert!(matches!(result, Err(Error::Interrupted)), "got: {result:?}");
        assert!(registry.is_empty());
        let pid = read_pid(&pidfile).await;
        assert!(
            exits_within(pid, Duration::from_secs(5)).await,
            "forked sleep {pid} survived the interrupt"
        );
    }

    #[tokio::test]
    async fn finished_work_is_not_interrupted() {
        let registry = ProcessRegistry::new();
        let runner = ProcessRunner::new(registry.clone());
        let output = run_until_interrupted(
            &registry,
            runner.run(&sh("exit 0")),
            std::future::pending::<()>(),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(output.status.success());
    }

    #[tokio::test]
    async fn dropping_a_running_job_kills_its_group() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("sleep.pid");
        let runner = ProcessRunner::default();
        let cmd = sh(&forking_script(&pidfile));

        let pid = tokio::select! {
            res = runner.run(&cmd) => panic!("job finished early: {res:?}"),
            pid = read_pid(&pidfile) => pid,
        };

        assert!(runner.registry().is_empty());
        assert!(
            exits_within(pid, Duration::from_secs(5)).await,
            "forked sleep {pid} outlived its dropped parent"
        );
    }
}
