//! Error types for `kar-advisor`.

use std::time::Duration;

use thiserror::Error;

/// A single advisory-service call failed.
#[derive(Debug, Error)]
pub enum AdvisorError {
  #[error("advisory service unreachable: {0}")]
  Transport(#[from] reqwest::Error),

  #[error("advisory service returned HTTP {0}")]
  Status(u16),

  #[error("advisory service sent an unusable reply: {0}")]
  Malformed(String),

  #[error("advisory service did not answer within {0:?}")]
  Timeout(Duration),
}

/// Why a conversation step was refused or could not complete.
#[derive(Debug, Error)]
pub enum ConversationError {
  /// Every attempt at the advisory call failed. The conversation is now
  /// `Failed` and can be retried at `round`, re-asking `question` if one had
  /// been asked.
  #[error("advisory service unavailable in round {round}: {source}")]
  Upstream {
    round:    u32,
    question: Option<String>,
    #[source]
    source:   AdvisorError,
  },

  #[error("expected a response for round {expected}, got round {got}")]
  WrongRound { expected: u32, got: u32 },

  #[error("cannot {action} while the conversation is {state}")]
  WrongState {
    action: &'static str,
    state:  &'static str,
  },

  #[error("response must not be empty")]
  EmptyResponse,

  #[error("inconsistent conversation history: {0}")]
  InvalidTranscript(String),
}
