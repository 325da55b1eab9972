//! Devloop - persistent dev-loop controller for Claude Code stop hooks.
//!
//! Turns a single interactive session into a repeating agentic iteration
//! cycle: at the end of every work unit the host invokes the stop hook,
//! which inspects the latest agent output and either lets the session
//! stop or feeds the original task back as the next input. The controller
//! process is re-invoked fresh each cycle; all continuity lives in one
//! on-disk record under `.claude/`.
//!
//! # Architecture
//!
//! - [`state`] - Loop record persistence (load, atomic save, delete)
//! - [`frontmatter`] - Metadata block codec with byte-preserving rewrite
//! - [`transcript`] - Latest-assistant-output extraction from JSONL
//! - [`promise`] - `<promise>` completion marker extraction
//! - [`controller`] - The per-invocation decision state machine
//! - [`error`] - Custom error types and handling
//!
//! # Example
//!
//! ```rust,ignore
//! use devloop::{LoopController, Outcome, StateStore};
//!
//! let controller = LoopController::new(StateStore::new("."));
//! match controller.evaluate(&hook_stdin) {
//!     Outcome::Continue(decision) => println!("{}", serde_json::to_string(&decision)?),
//!     Outcome::PassThrough => {}
//!     other => eprintln!("loop ended: {other:?}"),
//! }
//! ```

pub mod controller;
pub mod error;
pub mod frontmatter;
pub mod promise;
pub mod state;
pub mod transcript;

// Re-export commonly used types
pub use controller::{BlockDecision, Corruption, HookInput, LoopController, Outcome};
pub use error::{DevLoopError, Result};
pub use frontmatter::Frontmatter;
pub use state::{LoopState, StateStore};
