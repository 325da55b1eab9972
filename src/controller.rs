//! The stop-hook decision state machine.
//!
//! Each invocation starts from nothing but the on-disk record and the hook
//! payload on stdin, and ends in exactly one terminal outcome. The checks
//! run in a fixed order — first match wins:
//!
//! 1. no record → pass through
//! 2. `iteration` unparseable → corrupted
//! 3. `max_iterations` unparseable → corrupted
//! 4. iteration ceiling reached → limit reached
//! 5. hook payload unparseable → corrupted
//! 6. transcript missing → corrupted
//! 7. no assistant output in transcript → corrupted
//! 8. completion promise matched → completed
//! 9. empty prompt body → corrupted
//! 10. otherwise → continue (bump iteration, block termination)
//!
//! Every outcome except `Continue` and `PassThrough` deletes the record:
//! a loop never lingers in a broken or finished state. Cleanup is
//! best-effort and never turns into a process failure — the host always
//! sees a successful exit, with diagnostics on stderr only.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::DevLoopError;
use crate::promise::{collapse_whitespace, extract_promise};
use crate::state::StateStore;
use crate::transcript;

/// Hook payload delivered on stdin by the host at the end of a work unit.
#[derive(Debug, Clone, Deserialize)]
pub struct HookInput {
    /// Path to the JSONL transcript of the completed unit.
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
}

/// Decision emitted on stdout when the loop continues.
///
/// Field names are the host's wire format; `reason` is the verbatim task
/// text the host re-injects as the next input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDecision {
    /// Always `"block"`: the session must not be allowed to stop.
    pub decision: &'static str,
    /// Verbatim task text to re-inject.
    pub reason: String,
    /// Human-readable status line shown on the console.
    #[serde(rename = "systemMessage")]
    pub system_message: String,
}

/// Why the record (or its inputs) was judged unusable.
///
/// Rendered verbatim into the stderr diagnostic, so the wording here is
/// user-facing.
#[derive(Debug, Error)]
pub enum Corruption {
    /// A numeric metadata field failed strict integer parsing
    #[error("'{field}' field is not a valid number (got: '{value}')")]
    InvalidNumber { field: &'static str, value: String },

    /// The record exists but could not be read
    #[error("cannot read state file: {message}")]
    UnreadableState { message: String },

    /// The stdin payload was not valid hook-input JSON
    #[error("failed to parse hook input from stdin")]
    InvalidHookInput,

    /// The transcript path was absent from the payload or missing on disk
    #[error("transcript file not found (expected: {path})")]
    MissingTranscript { path: String },

    /// The transcript exists but could not be read
    #[error("cannot read transcript {path}: {message}")]
    UnreadableTranscript { path: String, message: String },

    /// The transcript has no agent-authored output to inspect
    #[error("no assistant output found in transcript: {path}")]
    NoAgentOutput { path: String },

    /// The record has no task text after the metadata block
    #[error("no prompt text found in state file")]
    EmptyPrompt,

    /// The continuation rewrite of the record failed
    #[error("failed to rewrite state file: {message}")]
    RewriteFailed { message: String },
}

/// Terminal result of one stop-hook invocation.
#[derive(Debug)]
pub enum Outcome {
    /// No active loop; the host proceeds untouched.
    PassThrough,
    /// State or input was unusable; the record has been deleted.
    Corrupted(Corruption),
    /// Iteration ceiling hit; the record has been deleted.
    LimitReached { max_iterations: u32 },
    /// Completion promise detected; the record has been deleted.
    Completed { promise: String },
    /// Loop continues; the record now carries the bumped iteration.
    Continue(BlockDecision),
}

/// Per-invocation decision engine over one [`StateStore`].
pub struct LoopController {
    store: StateStore,
}

impl LoopController {
    /// Creates a controller over the given store.
    #[must_use]
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    /// Runs the state machine against the current record and hook payload.
    ///
    /// `hook_input` is the full stdin content, already read to completion.
    /// All store mutation happens in here; the caller only renders the
    /// returned outcome.
    pub fn evaluate(&self, hook_input: &str) -> Outcome {
        // 1. No record means no active loop.
        let state = match self.store.load() {
            Ok(Some(state)) => state,
            Ok(None) => return Outcome::PassThrough,
            Err(e) => {
                return self.corrupted(Corruption::UnreadableState {
                    message: e.to_string(),
                })
            }
        };

        // 2–3. Numeric fields must parse before anything else is trusted.
        let Some(iteration) = state.iteration() else {
            return self.corrupted(Corruption::InvalidNumber {
                field: "iteration",
                value: state.field("iteration").unwrap_or_default().to_string(),
            });
        };
        let Some(max_iterations) = state.max_iterations() else {
            return self.corrupted(Corruption::InvalidNumber {
                field: "max_iterations",
                value: state.field("max_iterations").unwrap_or_default().to_string(),
            });
        };

        // 4. Iteration ceiling (0 = unbounded).
        if max_iterations > 0 && iteration >= max_iterations {
            self.delete_record();
            return Outcome::LimitReached { max_iterations };
        }

        // 5. Hook payload from the host.
        let Ok(input) = serde_json::from_str::<HookInput>(hook_input) else {
            return self.corrupted(Corruption::InvalidHookInput);
        };

        // 6–7. Latest assistant output from the transcript.
        let Some(transcript_path) = input.transcript_path else {
            return self.corrupted(Corruption::MissingTranscript {
                path: "(no transcript_path in hook input)".to_string(),
            });
        };
        let output = match transcript::last_assistant_text(&transcript_path) {
            Ok(Some(text)) => text,
            Ok(None) => {
                return self.corrupted(Corruption::NoAgentOutput {
                    path: transcript_path.display().to_string(),
                })
            }
            Err(DevLoopError::TranscriptUnavailable { path }) => {
                return self.corrupted(Corruption::MissingTranscript {
                    path: path.display().to_string(),
                })
            }
            Err(e) => {
                return self.corrupted(Corruption::UnreadableTranscript {
                    path: transcript_path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };

        // 8. Completion promise: exact equality after collapsing both sides.
        if let Some(configured) = state.completion_promise() {
            let expected = collapse_whitespace(configured);
            if extract_promise(&output).is_some_and(|found| found == expected) {
                debug!("completion promise matched after {iteration} iteration(s)");
                self.delete_record();
                return Outcome::Completed { promise: expected };
            }
        }

        // 9. A loop with nothing to re-inject cannot continue.
        if state.prompt().is_empty() {
            return self.corrupted(Corruption::EmptyPrompt);
        }

        // 10. Continue: bump the iteration and block termination.
        let next_iteration = iteration.saturating_add(1);
        if let Err(e) = self.store.save(&state.bumped(next_iteration)) {
            return self.corrupted(Corruption::RewriteFailed {
                message: e.to_string(),
            });
        }
        Outcome::Continue(BlockDecision {
            decision: "block",
            reason: state.prompt().to_string(),
            system_message: system_message(next_iteration, state.completion_promise()),
        })
    }

    /// Terminal corruption: the record is deleted before reporting.
    fn corrupted(&self, reason: Corruption) -> Outcome {
        self.delete_record();
        Outcome::Corrupted(reason)
    }

    fn delete_record(&self) {
        if let Err(e) = self.store.delete() {
            warn!("failed to delete loop record during cleanup: {e}");
        }
    }
}

/// Status line attached to a continuation decision.
fn system_message(iteration: u32, promise: Option<&str>) -> String {
    match promise {
        Some(phrase) => format!(
            "Dev loop iteration {iteration} | To stop: output <promise>{phrase}</promise> \
             (ONLY when the statement is TRUE - do not lie to exit!)"
        ),
        None => format!(
            "Dev loop iteration {iteration} | No completion promise set - \
             loop runs until --max-iterations"
        ),
    }
}
