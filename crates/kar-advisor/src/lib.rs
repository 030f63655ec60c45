//! The bounded question-and-answer advisory flow.
//!
//! [`conversation::Conversation`] drives a fixed number of rounds against any
//! [`Advisor`]. Two advisors ship here: [`http::HttpAdvisor`] talks to an
//! external advisory service and [`rule_based::RuleBasedAdvisor`] derives
//! everything from the profile and comparison. [`backend::AdvisorBackend`]
//! picks one at startup.

#![allow(async_fn_in_trait)]

pub mod backend;
pub mod context;
pub mod conversation;
pub mod error;
pub mod http;
pub mod rule_based;

use std::future::Future;

use kar_core::{recommendation::Recommendation, session::Exchange};
use serde::{Deserialize, Serialize};

pub use backend::{AdvisorBackend, AdvisorConfig};
pub use context::AdvisoryContext;
pub use conversation::{CallPolicy, Conversation, ConversationState, MAX_ROUNDS, Turn};
pub use error::{AdvisorError, ConversationError};

/// What the advisor hands back once every round has been answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAdvice {
  pub recommendations: Vec<Recommendation>,
  pub summary:         String,
}

/// Source of questions and final recommendations for a conversation.
///
/// Implementations are called once per round; the conversation owns timeouts
/// and retries.
pub trait Advisor: Send + Sync {
  /// The first question, asked before any response exists.
  fn opening_question<'a>(
    &'a self,
    context: &'a AdvisoryContext,
  ) -> impl Future<Output = Result<String, AdvisorError>> + Send + 'a;

  /// The next question given every exchange so far.
  fn follow_up_question<'a>(
    &'a self,
    context: &'a AdvisoryContext,
    transcript: &'a [Exchange],
  ) -> impl Future<Output = Result<String, AdvisorError>> + Send + 'a;

  /// Recommendations once the transcript is complete.
  fn final_advice<'a>(
    &'a self,
    context: &'a AdvisoryContext,
    transcript: &'a [Exchange],
  ) -> impl Future<Output = Result<FinalAdvice, AdvisorError>> + Send + 'a;
}

/// `Q1: …\nA1: …` blocks for every exchange, separated by blank lines.
pub fn summarize_transcript(transcript: &[Exchange]) -> String {
  transcript
    .iter()
    .map(|e| format!("Q{n}: {}\nA{n}: {}", e.question, e.response, n = e.round))
    .collect::<Vec<_>>()
    .join("\n\n")
}
