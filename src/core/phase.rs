//! Lifecycle phases

use std::fmt;
use std::str::FromStr;

/// A fixed point in the operation lifecycle where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    PreTxBegin,
    PreHandler,
    PostHandler,
    PreCommit,
    PostCommit,
    PostResponse,
    /// Runs after the kernel rolled back a transaction it opened
    OnRollback,
    /// Terminal phase for any failure without a more specific error phase
    OnError,
    OnPreTxBeginError,
    OnPreHandlerError,
    /// The operation handler failed
    OnHandlerError,
    OnPostHandlerError,
    OnPreCommitError,
    OnPostCommitError,
    OnPostResponseError,
}

impl Phase {
    /// The success path, in execution order
    pub const MAIN_SEQUENCE: [Phase; 6] = [
        Phase::PreTxBegin,
        Phase::PreHandler,
        Phase::PostHandler,
        Phase::PreCommit,
        Phase::PostCommit,
        Phase::PostResponse,
    ];

    /// The success path plus the shared error phases
    pub const LIFECYCLE: [Phase; 8] = [
        Phase::PreTxBegin,
        Phase::PreHandler,
        Phase::PostHandler,
        Phase::PreCommit,
        Phase::PostCommit,
        Phase::PostResponse,
        Phase::OnRollback,
        Phase::OnError,
    ];

    pub const ALL: [Phase; 15] = [
        Phase::PreTxBegin,
        Phase::PreHandler,
        Phase::PostHandler,
        Phase::PreCommit,
        Phase::PostCommit,
        Phase::PostResponse,
        Phase::OnRollback,
        Phase::OnError,
        Phase::OnPreTxBeginError,
        Phase::OnPreHandlerError,
        Phase::OnHandlerError,
        Phase::OnPostHandlerError,
        Phase::OnPreCommitError,
        Phase::OnPostCommitError,
        Phase::OnPostResponseError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PreTxBegin => "PRE_TX_BEGIN",
            Phase::PreHandler => "PRE_HANDLER",
            Phase::PostHandler => "POST_HANDLER",
            Phase::PreCommit => "PRE_COMMIT",
            Phase::PostCommit => "POST_COMMIT",
            Phase::PostResponse => "POST_RESPONSE",
            Phase::OnRollback => "ON_ROLLBACK",
            Phase::OnError => "ON_ERROR",
            Phase::OnPreTxBeginError => "ON_PRE_TX_BEGIN_ERROR",
            Phase::OnPreHandlerError => "ON_PRE_HANDLER_ERROR",
            Phase::OnHandlerError => "ON_HANDLER_ERROR",
            Phase::OnPostHandlerError => "ON_POST_HANDLER_ERROR",
            Phase::OnPreCommitError => "ON_PRE_COMMIT_ERROR",
            Phase::OnPostCommitError => "ON_POST_COMMIT_ERROR",
            Phase::OnPostResponseError => "ON_POST_RESPONSE_ERROR",
        }
    }

    /// The error phase that handles a failure in this phase. When it has no
    /// hooks for the call, ON_ERROR runs instead.
    pub fn error_phase(&self) -> Phase {
        match self {
            Phase::PreTxBegin => Phase::OnPreTxBeginError,
            Phase::PreHandler => Phase::OnPreHandlerError,
            Phase::PostHandler => Phase::OnPostHandlerError,
            Phase::PreCommit => Phase::OnPreCommitError,
            Phase::PostCommit => Phase::OnPostCommitError,
            Phase::PostResponse => Phase::OnPostResponseError,
            _ => Phase::OnError,
        }
    }

    /// Whether a hook failure here is logged and swallowed
    pub fn is_best_effort(&self) -> bool {
        !Phase::MAIN_SEQUENCE.contains(self)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown phase: {s}"))
    }
}
