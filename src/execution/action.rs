//! External Action Adapters
//!
//! Every step delegates to a pre-built, opaque external handler. The
//! [`ExternalAction`] trait is the single capability boundary: an adapter
//! receives a fully resolved step and returns an exit status plus the
//! combined (order-preserving) stdout/stderr stream.
//!
//! Two adapters ship with the engine:
//! - [`ShellAction`] executes a `run` command through a generated bash
//!   script
//! - [`ExternalRefAction`] resolves a `uses` reference against a registry
//!   of locally configured handler commands

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use once_cell::sync::Lazy;

use crate::error::StepError;
use crate::workflow::model::StepKind;

/// Directory for generated execution scripts.
static SCRIPT_DIR: Lazy<PathBuf> = Lazy::new(|| std::env::temp_dir().join("gridrunner_scripts"));

/// Monotonic counter so concurrent instances never collide on script paths.
static SCRIPT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Interval for polling a child process against its deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of one external action invocation.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// Process exit code (0 = success)
    pub exit_code: i32,

    /// Combined stdout/stderr stream, interleaved in emission order
    pub output: String,
}

impl ActionOutcome {
    /// Returns true if the action exited 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// A step after all interpolation tokens have been resolved against its
/// run instance. This is the only form an adapter ever sees.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    /// Display name, fully resolved
    pub name: String,

    /// Step kind with its resolved payload (command or action reference)
    pub kind: StepKind,

    /// Resolved parameter map
    pub with: HashMap<String, String>,

    /// Whether the output gate applies to this step
    pub gate_output: bool,
}

impl ResolvedStep {
    /// Returns the resolved command template or action reference.
    pub fn payload(&self) -> &str {
        match &self.kind {
            StepKind::Run(command) => command,
            StepKind::Uses(reference) => reference,
        }
    }
}

/// Capability interface for opaque external handlers.
///
/// `Send + Sync` so adapters can be shared across instance threads.
pub trait ExternalAction: Send + Sync {
    /// Runs the step and returns its exit status and combined output.
    fn run(&self, step: &ResolvedStep) -> Result<ActionOutcome, StepError>;
}

/// Adapter for `run` steps: executes the payload as a bash command.
///
/// The command is written to a temporary script whose first statement
/// merges stderr into stdout at the fd level, so the captured stream
/// preserves the original interleave.
#[derive(Debug, Clone, Default)]
pub struct ShellAction {
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ShellAction {
    /// Creates a shell adapter with no working directory and no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the working directory for executed commands.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Sets the per-invocation timeout. Default: unlimited.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executes a command string and captures its combined output.
    pub fn execute_command(&self, label: &str, command: &str) -> Result<ActionOutcome, StepError> {
        self.execute_command_with_env(label, command, &[])
    }

    /// Executes a command string with extra environment variables set for
    /// the spawned script.
    pub fn execute_command_with_env(
        &self,
        label: &str,
        command: &str,
        env: &[(String, String)],
    ) -> Result<ActionOutcome, StepError> {
        let script_path = create_execution_script(command)?;

        let mut cmd = Command::new("bash");
        cmd.arg(&script_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
            debug!("Executing '{}' in directory: {}", label, dir.display());
        }

        let result = self.wait_with_deadline(cmd);

        if let Err(e) = fs::remove_file(&script_path) {
            warn!("Failed to clean up script {}: {}", script_path.display(), e);
        }

        result
    }

    /// Spawns the command and waits for it, polling against the optional
    /// deadline. On timeout the script's process tree is killed and the
    /// step fails.
    fn wait_with_deadline(&self, mut cmd: Command) -> Result<ActionOutcome, StepError> {
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Lead a fresh process group so a timeout can take down the
            // whole script tree, not just the bash wrapper.
            cmd.process_group(0);
        }

        let mut child = cmd.spawn()?;

        // Drain stdout on a separate thread so a full pipe never blocks
        // the child while we poll its status.
        let reader = child.stdout.take().map(|mut stdout| {
            thread::spawn(move || {
                let mut buf = String::new();
                let _ = stdout.read_to_string(&mut buf);
                buf
            })
        });

        let deadline = self.timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(status) = child.try_wait()? {
                let output = reader
                    .and_then(|handle| handle.join().ok())
                    .unwrap_or_default();
                return Ok(ActionOutcome {
                    exit_code: status.code().unwrap_or(-1),
                    output,
                });
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    kill_process_tree(&mut child);
                    // A surviving grandchild could still hold the pipe's
                    // write end, so the reader thread is dropped rather
                    // than joined; it exits once the pipe closes.
                    drop(reader);
                    let limit_secs = self.timeout.map_or(0, |t| t.as_secs());
                    return Err(StepError::Timeout { limit_secs });
                }
            }

            thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ExternalAction for ShellAction {
    fn run(&self, step: &ResolvedStep) -> Result<ActionOutcome, StepError> {
        self.execute_command(&step.name, step.payload())
    }
}

/// Kills a timed-out script and, on unix, its whole process group.
///
/// The wrapper alone is not enough: a command it spawned would survive
/// `child.kill()` and keep running unbounded.
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        // The child leads its own group (see wait_with_deadline), so a
        // negative pid signals every process in the tree.
        let _ = Command::new("kill")
            .args(["-KILL", "--", &format!("-{}", child.id())])
            .status();
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Derives the environment variable name for a `with` parameter:
/// `use-cross` becomes `WITH_USE_CROSS`.
fn with_env_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 5);
    name.push_str("WITH_");
    for c in key.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}

/// Adapter for `uses` steps: resolves an action reference against a
/// registry of locally configured handler commands.
///
/// An unregistered reference is treated as provided by the hosting
/// environment: it is logged and reported as a clean no-op, since the
/// engine must not emulate any provider's action catalog.
#[derive(Debug, Clone, Default)]
pub struct ExternalRefAction {
    handlers: HashMap<String, String>,
    shell: ShellAction,
}

impl ExternalRefAction {
    /// Creates a registry-backed adapter delegating to the given shell.
    pub fn new(shell: ShellAction) -> Self {
        Self {
            handlers: HashMap::new(),
            shell,
        }
    }

    /// Registers a local handler command for an action reference.
    ///
    /// When the handler runs, the step's resolved `with` parameters are
    /// exported to it as `WITH_*` environment variables (`use-cross`
    /// becomes `WITH_USE_CROSS`).
    pub fn register(&mut self, reference: impl Into<String>, command: impl Into<String>) {
        self.handlers.insert(reference.into(), command.into());
    }
}

impl ExternalAction for ExternalRefAction {
    fn run(&self, step: &ResolvedStep) -> Result<ActionOutcome, StepError> {
        let reference = step.payload();

        match self.handlers.get(reference) {
            Some(command) => {
                debug!("Action '{}' handled by local command", reference);
                let env: Vec<(String, String)> = step
                    .with
                    .iter()
                    .map(|(key, value)| (with_env_name(key), value.clone()))
                    .collect();
                self.shell.execute_command_with_env(&step.name, command, &env)
            }
            None => {
                info!(
                    "No local handler for action '{}', assuming the environment provides it",
                    reference
                );
                Ok(ActionOutcome {
                    exit_code: 0,
                    output: String::new(),
                })
            }
        }
    }
}

/// Creates a temporary bash script for one command invocation.
fn create_execution_script(command: &str) -> Result<PathBuf, StepError> {
    fs::create_dir_all(&*SCRIPT_DIR)?;

    let serial = SCRIPT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let script_path = SCRIPT_DIR.join(format!("step_{}_{}.sh", std::process::id(), serial));

    let mut file = File::create(&script_path)?;
    writeln!(file, "#!/bin/bash")?;
    // Merge stderr into stdout first so the combined stream keeps the
    // original emission order.
    writeln!(file, "exec 2>&1")?;
    writeln!(file, "set -e")?;
    writeln!(file, "{}", command)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(script_path)
}
