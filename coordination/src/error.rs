//! Errors surfaced by synchronous engine operations.
//!
//! Background turns never return these; they log and drop instead.

use crate::arena::judge::JudgeError;
use crate::state::{MatchStatus, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("tournament not found: {0}")]
    TournamentNotFound(String),

    #[error("match not found: {0}")]
    MatchNotFound(String),

    #[error("invalid roster: {0}")]
    InvalidRoster(String),

    #[error("match {id} cannot run from status {status}")]
    MatchNotRunnable { id: String, status: MatchStatus },

    #[error(transparent)]
    Judge(#[from] JudgeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type EngineResult<T> = Result<T, EngineError>;
