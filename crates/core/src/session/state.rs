use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::conversation::Conversation;

/// Where a running session is.
#[derive(Debug)]
pub(super) enum Stage {
    /// The first draft has not been requested yet.
    AwaitingInitialDraft,
    /// A candidate test is about to be staged and run.
    Testing { candidate: String },
    /// The last run failed, its diagnostics go back to the model.
    FeedbackInjected { diagnostics: String },
}

/// How a session ended without a fatal error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stopped {
    /// The last candidate passed.
    Passed,
    /// Every allowed attempt failed. Not an error: the last candidate and
    /// its diagnostics are still reported.
    BudgetExhausted,
}

/// The result of a finished session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOutcome {
    /// How the session ended.
    pub status: Stopped,
    /// Number of test executions.
    pub attempts: u32,
    /// The last candidate that was run.
    pub test_code: String,
    /// Cleaned diagnostics of the last run, empty when it passed.
    pub diagnostics: String,
    /// The full transcript.
    pub conversation: Conversation,
}

/// Progress notifications, delivered synchronously from the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// Test execution number `n` (1-based) is starting.
    AttemptStarted(u32),
    /// The candidate passed.
    TestPassed,
    /// The candidate failed.
    TestFailed {
        /// Cleaned diagnostics of the run.
        diagnostics: String,
    },
    /// The diagnostics were sent back and a new candidate is requested.
    Regenerating,
}

/// Stops a session at the next iteration boundary. Clones share the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. A running attempt is not interrupted.
    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
