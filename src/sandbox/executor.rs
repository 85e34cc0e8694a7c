//! Sandbox executor - runs generated code in a child interpreter
//!
//! The code runs in its own process with stdout and stderr piped back to
//! the host, so the host's streams are never redirected and are intact on
//! every exit path. Failures of the executed code are captured as a `Fault`
//! and never propagate to the caller.
//!
//! This is output and exception containment only: the child has the same
//! filesystem, network and resource access as the host process.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::metrics::{CODE_EXECUTIONS, CODE_EXECUTION_DURATION};

/// Named values made visible to the executed code
pub type Bindings = serde_json::Map<String, serde_json::Value>;

/// Marks the structured fault record the Python bootstrap appends to stderr
const FAULT_SENTINEL: &str = "\u{1e}YT_AGENT_FAULT ";

/// Python entry point: reads `{code, globals, locals}` from stdin and execs
/// the code against those scopes. Bootstrap frames are dropped from the
/// printed traceback, and an uncaught exception is reported as a final
/// `FAULT_SENTINEL` + JSON line on stderr.
const PYTHON_BOOTSTRAP: &str = r#"import json, sys, traceback
_payload = json.load(sys.stdin)
_globals = dict(_payload.get("globals") or {})
_globals.setdefault("__name__", "__main__")
_locals = _payload.get("locals")
try:
    _code = compile(_payload["code"], "<generated>", "exec")
    if _locals is None:
        exec(_code, _globals)
    else:
        exec(_code, _globals, dict(_locals))
except SystemExit:
    raise
except BaseException:
    _type, _value, _tb = sys.exc_info()
    sys.stdout.flush()
    traceback.print_exception(_type, _value, _tb.tb_next if _tb is not None else None)
    _kind = _type.__qualname__ if _type.__module__ == "builtins" else _type.__module__ + "." + _type.__qualname__
    sys.stderr.write("\x1eYT_AGENT_FAULT " + json.dumps({"kind": _kind, "message": str(_value)}) + "\n")
    sys.stderr.flush()
    sys.exit(1)
"#;

/// Language the generated code is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptLanguage {
    Python,
    Shell,
}

/// Sandbox configuration
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub language: ScriptLanguage,
    /// Interpreter program, e.g. `python3` or `/bin/sh`
    pub interpreter: String,
    /// Wall-clock limit for one execution; `None` waits indefinitely
    pub timeout: Option<Duration>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            language: ScriptLanguage::Python,
            interpreter: "python3".to_string(),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Why an execution did not succeed
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// The code raised an exception, e.g. `ZeroDivisionError: division by zero`
    Raised { kind: String, message: String },
    /// The process exited non-zero without a recognizable exception
    Exited { code: i32 },
    /// The execution exceeded the configured limit and was killed
    TimedOut { after: Duration },
    /// The interpreter could not be launched or awaited
    Io(String),
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::Raised { kind, message } if message.is_empty() => write!(f, "{}", kind),
            Fault::Raised { kind, message } => write!(f, "{}: {}", kind, message),
            Fault::Exited { code } => write!(f, "process exited with status {}", code),
            Fault::TimedOut { after } => write!(f, "execution timed out after {:.1}s", after.as_secs_f64()),
            Fault::Io(msg) => write!(f, "failed to run interpreter: {}", msg),
        }
    }
}

impl std::error::Error for Fault {}

/// Captured outcome of one execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Fault descriptor, `None` when the code ran to completion
    pub exception: Option<Fault>,
    pub duration_ms: f64,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exception.is_none()
    }

    /// The captured stdout on success, the fault otherwise
    pub fn outcome(&self) -> Result<&str, &Fault> {
        match &self.exception {
            None => Ok(&self.stdout),
            Some(fault) => Err(fault),
        }
    }

    /// Text form recorded in the interaction history
    pub fn output_log(&self) -> String {
        let mut log = format!("STDOUT:\n{}\nSTDERR:\n{}", self.stdout, self.stderr);
        if let Some(fault) = &self.exception {
            log.push_str(&format!("\nEXCEPTION:\n{}", fault));
        }
        log
    }
}

/// Runs code strings with output capture and fault containment
#[derive(Debug, Clone, Default)]
pub struct SandboxExecutor {
    config: SandboxConfig,
}

impl SandboxExecutor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    /// Python executor using the given interpreter
    pub fn python(interpreter: impl Into<String>) -> Self {
        Self::new(SandboxConfig {
            language: ScriptLanguage::Python,
            interpreter: interpreter.into(),
            ..SandboxConfig::default()
        })
    }

    /// POSIX shell executor (`/bin/sh -c`)
    pub fn shell() -> Self {
        Self::new(SandboxConfig {
            language: ScriptLanguage::Shell,
            interpreter: "/bin/sh".to_string(),
            ..SandboxConfig::default()
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Build the child command and the payload to write to its stdin
    fn command(
        &self,
        code: &str,
        globals: Option<&Bindings>,
        locals: Option<&Bindings>,
    ) -> (Command, Option<Vec<u8>>) {
        let mut cmd = Command::new(&self.config.interpreter);
        let payload = match self.config.language {
            ScriptLanguage::Python => {
                cmd.args(["-u", "-c", PYTHON_BOOTSTRAP]);
                let payload = serde_json::json!({
                    "code": code,
                    "globals": globals.cloned().unwrap_or_default(),
                    "locals": locals.cloned(),
                });
                Some(payload.to_string().into_bytes())
            }
            ScriptLanguage::Shell => {
                cmd.args(["-c", code]);
                for (name, value) in globals.into_iter().chain(locals).flat_map(|b| b.iter()) {
                    let value = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    cmd.env(name, value);
                }
                None
            }
        };
        (cmd, payload)
    }

    /// Execute `code` against the supplied (or fresh, empty) binding scopes.
    ///
    /// Never fails: every fault, including a missing interpreter or a
    /// timeout, is reported inside the returned `ExecutionResult` and its
    /// description is appended to the captured stderr.
    pub async fn execute(
        &self,
        code: &str,
        globals: Option<&Bindings>,
        locals: Option<&Bindings>,
    ) -> ExecutionResult {
        let start = Instant::now();
        info!(language = ?self.config.language, code_len = code.len(), "Executing code");

        let (mut cmd, payload) = self.command(code, globals, locals);
        cmd.stdin(if payload.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(interpreter = %self.config.interpreter, error = %e, "Failed to launch interpreter");
                return self.finish(String::new(), String::new(), Some(Fault::Io(e.to_string())), start);
            }
        };

        if let (Some(payload), Some(mut stdin)) = (payload, child.stdin.take()) {
            if let Err(e) = stdin.write_all(&payload).await {
                debug!(error = %e, "Interpreter closed stdin early");
            }
            // Dropping stdin closes the pipe so the bootstrap sees EOF
        }

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let waited = {
            let out_pipe = child.stdout.take();
            let err_pipe = child.stderr.take();
            let run = async {
                let (out, err, status) = tokio::join!(
                    drain(out_pipe, &mut stdout),
                    drain(err_pipe, &mut stderr),
                    child.wait()
                );
                if let Err(e) = out.and(err) {
                    debug!(error = %e, "Failed to read interpreter output");
                }
                status
            };
            match self.config.timeout {
                Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| limit),
                None => Ok(run.await),
            }
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&stderr).into_owned();

        match waited {
            Ok(Ok(status)) => {
                let fault = if status.success() {
                    None
                } else {
                    Some(classify_fault(self.config.language, &mut stderr, status.code().unwrap_or(-1)))
                };
                self.finish(stdout, stderr, fault, start)
            }
            Ok(Err(e)) => self.finish(stdout, stderr, Some(Fault::Io(e.to_string())), start),
            Err(after) => {
                warn!(timeout_secs = after.as_secs_f64(), "Execution timed out, killing child");
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Failed to kill timed out child");
                }
                self.finish(stdout, stderr, Some(Fault::TimedOut { after }), start)
            }
        }
    }

    /// Assemble the result, surfacing faults the interpreter did not print itself
    fn finish(
        &self,
        stdout: String,
        mut stderr: String,
        exception: Option<Fault>,
        start: Instant,
    ) -> ExecutionResult {
        let elapsed = start.elapsed();
        let status = match &exception {
            None => "success",
            Some(Fault::TimedOut { .. }) => "timeout",
            Some(_) => "fault",
        };
        CODE_EXECUTIONS.with_label_values(&[status]).inc();
        CODE_EXECUTION_DURATION.observe(elapsed.as_secs_f64());

        if let Some(fault @ (Fault::TimedOut { .. } | Fault::Io(_))) = &exception {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&format!("{}\n", fault));
        }

        let duration_ms = elapsed.as_secs_f64() * 1000.0;
        debug!(status, duration_ms, "Execution finished");
        ExecutionResult {
            stdout,
            stderr,
            exception,
            duration_ms,
        }
    }
}

/// Read a pipe to EOF, keeping everything read so far if cancelled
async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>, buf: &mut Vec<u8>) -> std::io::Result<()> {
    let Some(mut pipe) = pipe else {
        return Ok(());
    };
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

#[derive(Deserialize)]
struct FaultRecord {
    kind: String,
    message: String,
}

/// Remove the bootstrap's fault record from `stderr` and decode it
fn take_fault_record(stderr: &mut String) -> Option<Fault> {
    let start = stderr.rfind(FAULT_SENTINEL)?;
    let body_start = start + FAULT_SENTINEL.len();
    let body_end = stderr[body_start..]
        .find('\n')
        .map(|i| body_start + i)
        .unwrap_or(stderr.len());
    let record: FaultRecord = serde_json::from_str(&stderr[body_start..body_end]).ok()?;
    stderr.replace_range(start..(body_end + 1).min(stderr.len()), "");
    Some(Fault::Raised {
        kind: record.kind,
        message: record.message,
    })
}

/// Derive a fault from a failed process.
///
/// Python reports uncaught exceptions through the bootstrap's fault record;
/// anything else is a plain non-zero exit.
fn classify_fault(language: ScriptLanguage, stderr: &mut String, code: i32) -> Fault {
    match language {
        ScriptLanguage::Python => take_fault_record(stderr).unwrap_or(Fault::Exited { code }),
        ScriptLanguage::Shell => Fault::Exited { code },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_fault_record_is_decoded_and_removed() {
        let mut stderr = format!(
            "Traceback (most recent call last):\nValueError: bad value\nsee docs\n{}{}\n",
            FAULT_SENTINEL, r#"{"kind": "ValueError", "message": "bad value\nsee docs"}"#
        );
        assert_eq!(
            classify_fault(ScriptLanguage::Python, &mut stderr, 1),
            Fault::Raised {
                kind: "ValueError".to_string(),
                message: "bad value\nsee docs".to_string()
            }
        );
        assert_eq!(stderr, "Traceback (most recent call last):\nValueError: bad value\nsee docs\n");
    }

    #[test]
    fn test_output_without_record_is_plain_exit() {
        let mut stderr = "ZeroDivisionError: division by zero\n".to_string();
        assert_eq!(
            classify_fault(ScriptLanguage::Python, &mut stderr, 2),
            Fault::Exited { code: 2 }
        );
        let mut stderr = format!("{}{{not json\n", FAULT_SENTINEL);
        assert_eq!(
            classify_fault(ScriptLanguage::Python, &mut stderr, 1),
            Fault::Exited { code: 1 }
        );
        let mut stderr = format!("{}{}\n", FAULT_SENTINEL, r#"{"kind": "E", "message": ""}"#);
        assert_eq!(
            classify_fault(ScriptLanguage::Shell, &mut stderr, 3),
            Fault::Exited { code: 3 }
        );
    }

    #[test]
    fn test_output_log_format() {
        let result = ExecutionResult {
            stdout: "2\n".to_string(),
            stderr: String::new(),
            exception: Some(Fault::Exited { code: 1 }),
            duration_ms: 1.0,
        };
        assert_eq!(
            result.output_log(),
            "STDOUT:\n2\n\nSTDERR:\n\nEXCEPTION:\nprocess exited with status 1"
        );
        assert!(!result.success());
        assert!(result.outcome().is_err());
    }

    #[tokio::test]
    async fn test_shell_captures_streams() {
        let result = SandboxExecutor::shell()
            .execute("echo out; echo err 1>&2", None, None)
            .await;
        assert!(result.success());
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert_eq!(result.outcome(), Ok("out\n"));
    }

    #[tokio::test]
    async fn test_shell_nonzero_exit_is_contained() {
        let result = SandboxExecutor::shell().execute("echo partial; exit 3", None, None).await;
        assert_eq!(result.stdout, "partial\n");
        assert_eq!(result.exception, Some(Fault::Exited { code: 3 }));
    }

    #[tokio::test]
    async fn test_shell_bindings_become_environment() {
        let mut globals = Bindings::new();
        globals.insert("FIELD".to_string(), serde_json::json!("density"));
        globals.insert("LEVEL".to_string(), serde_json::json!(2));
        let mut locals = Bindings::new();
        locals.insert("LEVEL".to_string(), serde_json::json!(3));

        let result = SandboxExecutor::shell()
            .execute("echo \"$FIELD $LEVEL\"", Some(&globals), Some(&locals))
            .await;
        assert_eq!(result.stdout, "density 3\n");
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_contained() {
        let result = SandboxExecutor::python("/nonexistent/python-interpreter")
            .execute("print(1)", None, None)
            .await;
        assert!(matches!(result.exception, Some(Fault::Io(_))));
        assert!(result.stderr.contains("failed to run interpreter"));
    }

    #[tokio::test]
    async fn test_timeout_kills_runaway_code() {
        let result = SandboxExecutor::shell()
            .with_timeout(Some(Duration::from_millis(200)))
            .execute("sleep 5", None, None)
            .await;
        assert!(matches!(result.exception, Some(Fault::TimedOut { .. })));
        assert!(result.duration_ms < 5000.0);
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let result = SandboxExecutor::shell()
            .with_timeout(Some(Duration::from_millis(500)))
            .execute("echo before; echo err-before 1>&2; sleep 5", None, None)
            .await;
        assert!(matches!(result.exception, Some(Fault::TimedOut { .. })));
        assert_eq!(result.stdout, "before\n");
        assert!(result.stderr.starts_with("err-before\n"));
        assert!(result.stderr.contains("timed out"));
    }

    #[tokio::test]
    async fn test_python_print() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let result = SandboxExecutor::python("python3").execute("print(1+1)", None, None).await;
        assert_eq!(result.stdout, "2\n");
        assert_eq!(result.stderr, "");
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_python_exceptions_are_contained() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let executor = SandboxExecutor::python("python3");

        let result = executor.execute("print('before')\n1/0", None, None).await;
        assert_eq!(result.stdout, "before\n");
        assert!(result.stderr.contains("Traceback"));
        assert!(result.stderr.contains("<generated>"));
        assert!(matches!(
            result.exception,
            Some(Fault::Raised { ref kind, .. }) if kind == "ZeroDivisionError"
        ));

        let result = executor.execute("def broken(:\n  pass", None, None).await;
        assert!(matches!(
            result.exception,
            Some(Fault::Raised { ref kind, .. }) if kind == "SyntaxError"
        ));

        // The next execution is unaffected by the previous faults
        let result = executor.execute("print('after')", None, None).await;
        assert_eq!(result.stdout, "after\n");
        assert!(result.success());
    }

    #[tokio::test]
    async fn test_python_bindings() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let mut globals = Bindings::new();
        globals.insert("field".to_string(), serde_json::json!("density"));
        let mut locals = Bindings::new();
        locals.insert("level".to_string(), serde_json::json!(4));

        let result = SandboxExecutor::python("python3")
            .execute("print(field, level)", Some(&globals), Some(&locals))
            .await;
        assert_eq!(result.stdout, "density 4\n");
    }

    #[tokio::test]
    async fn test_python_sys_exit_code() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let result = SandboxExecutor::python("python3")
            .execute("import sys\nsys.exit(4)", None, None)
            .await;
        assert_eq!(result.exception, Some(Fault::Exited { code: 4 }));
    }

    #[tokio::test]
    async fn test_python_exception_type_survives_multiline_message() {
        if !python_available() {
            eprintln!("python3 not found, skipping");
            return;
        }
        let executor = SandboxExecutor::python("python3");

        let result = executor
            .execute("raise ValueError('bad value\\nsee docs')", None, None)
            .await;
        assert_eq!(
            result.exception,
            Some(Fault::Raised {
                kind: "ValueError".to_string(),
                message: "bad value\nsee docs".to_string()
            })
        );
        assert!(!result.stderr.contains(FAULT_SENTINEL));
        assert!(result.stderr.contains("Traceback"));

        let result = executor
            .execute("import sys\nprint('Warning: noisy', file=sys.stderr)\nraise KeyError('x\\nb')", None, None)
            .await;
        assert!(matches!(
            result.exception,
            Some(Fault::Raised { ref kind, .. }) if kind == "KeyError"
        ));

        let result = executor
            .execute("class Custom(Exception):\n    pass\nraise Custom('boom')", None, None)
            .await;
        assert!(matches!(
            result.exception,
            Some(Fault::Raised { ref kind, .. }) if kind == "__main__.Custom"
        ));
    }
}
