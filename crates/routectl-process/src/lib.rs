//! Cancellable, deadline-bound execution of the external system tools
//! appliers drive (spec §4.4, §5, §9: "a shell invocation that cannot be
//! cancelled is a conformance defect").
//!
//! Grounded on the teacher's `run_command_with_timeout`: spawn, poll
//! `try_wait` on a short interval, kill on deadline. Extended here with a
//! cooperative `CancellationToken` checked on the same poll so a
//! transaction's overall timeout and an applier's own command timeout
//! compose without either one needing to know about the other.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use routectl_types::RouterConfError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A cooperative cancellation flag shared between a transaction's overall
/// timeout and every command an applier runs during that transaction.
/// Appliers observe it between external-command invocations, not inside
/// one (spec §5: "cancellation is cooperative").
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Carries the cancellation signal and deadline an applier's `apply`,
/// `validate`, and `rollback` calls must honor (spec §4.4).
#[derive(Debug, Clone)]
pub struct ApplyContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl ApplyContext {
    pub fn new(cancel: CancellationToken, timeout: Option<Duration>) -> Self {
        Self { cancel, deadline: timeout.map(|d| Instant::now() + d) }
    }

    /// A context with no deadline and a fresh, unshared cancellation token —
    /// suitable for standalone applier calls outside a transaction.
    pub fn unbounded() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Run `program` with `args`, polling for completion, cancellation, and
/// deadline expiry every [`POLL_INTERVAL`]. Returns [`RouterConfError::Cancelled`]
/// or [`RouterConfError::Timeout`] if the context fires before the command
/// exits; the child is killed in either case.
pub fn run(ctx: &ApplyContext, program: &str, args: &[&str]) -> Result<CommandOutput, RouterConfError> {
    run_in(ctx, program, args, Path::new("/"))
}

pub fn run_in(ctx: &ApplyContext, program: &str, args: &[&str], working_dir: &Path) -> Result<CommandOutput, RouterConfError> {
    let mut child = Command::new(program)
        .args(args)
        .current_dir(working_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| RouterConfError::apply(program, format!("failed to spawn: {e}")))?;

    loop {
        match child.try_wait().map_err(|e| RouterConfError::apply(program, format!("failed to poll: {e}")))? {
            Some(status) => {
                let (stdout, stderr) = drain(&mut child);
                return Ok(CommandOutput { exit_code: status.code().unwrap_or(-1), stdout, stderr });
            }
            None if ctx.is_cancelled() => {
                kill(&mut child);
                return Err(RouterConfError::Cancelled);
            }
            None if ctx.is_expired() => {
                kill(&mut child);
                return Err(RouterConfError::Timeout);
            }
            None => std::thread::sleep(POLL_INTERVAL),
        }
    }
}

fn drain(child: &mut std::process::Child) -> (String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    if let Some(mut out) = child.stdout.take() {
        let _ = out.read_to_end(&mut stdout);
    }
    if let Some(mut err) = child.stderr.take() {
        let _ = err.read_to_end(&mut stderr);
    }
    (String::from_utf8_lossy(&stdout).to_string(), String::from_utf8_lossy(&stderr).to_string())
}

fn kill(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn successful_command_returns_exit_code_and_output() {
        let ctx = ApplyContext::unbounded();
        let out = run(&ctx, "echo", &["hello"]).expect("run");
        assert_eq!(out.exit_code, 0);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let ctx = ApplyContext::unbounded();
        let out = run(&ctx, "false", &[]).expect("run");
        assert_ne!(out.exit_code, 0);
    }

    #[test]
    fn pre_cancelled_token_aborts_a_slow_command() {
        let token = CancellationToken::new();
        token.cancel();
        let ctx = ApplyContext::new(token, None);
        let result = run(&ctx, "sleep", &["5"]);
        assert!(matches!(result, Err(RouterConfError::Cancelled)));
    }

    #[test]
    fn short_deadline_times_out_a_slow_command() {
        let ctx = ApplyContext::new(CancellationToken::new(), Some(Duration::from_millis(50)));
        let result = run(&ctx, "sleep", &["5"]);
        assert!(matches!(result, Err(RouterConfError::Timeout)));
    }

    #[test]
    fn spawn_failure_reports_apply_error() {
        let ctx = ApplyContext::unbounded();
        let result = run(&ctx, "routectl-definitely-not-a-real-binary", &[]);
        assert!(matches!(result, Err(RouterConfError::ApplyError { .. })));
    }
}
