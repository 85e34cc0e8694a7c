//! Captured execution of generated code
//!
//! # Architecture
//!
//! ```text
//! code ──► SandboxExecutor::execute
//!              │
//!              ▼
//!     child interpreter (python3 -c <bootstrap>)
//!         stdin  ◄── {code, globals, locals}
//!         stdout ──► captured buffer
//!         stderr ──► captured buffer (tracebacks)
//!              │
//!              ▼
//!     ExecutionResult { stdout, stderr, exception }
//! ```

pub mod executor;

pub use executor::{Bindings, ExecutionResult, Fault, SandboxConfig, SandboxExecutor, ScriptLanguage};
