//! The conversation controller: a bounded question-and-answer exchange with an
//! [`Advisor`].
//!
//! ```text
//! NotStarted ──start──▶ AwaitingResponse(1) ──respond──▶ … AwaitingResponse(MAX_ROUNDS)
//!                                                               │ respond
//!                                                               ▼
//!                                                   Finalizing ──▶ Complete
//! ```
//!
//! Any advisory call that fails on every attempt moves the conversation to
//! `Failed`, remembering where it was; [`Conversation::retry`] goes back there.
//! Rejected input (wrong round, empty response, wrong state) never changes
//! state.
//!
//! No conversation state is persisted between rounds. A client holds the
//! transcript and the pending question, and [`Conversation::resume`] rebuilds
//! the controller from them on every request.

use std::{future::Future, time::Duration};

use chrono::Utc;
use kar_core::session::{AdvisorOutcome, Exchange};
use uuid::Uuid;

use crate::{Advisor, AdvisorError, AdvisoryContext, ConversationError, FinalAdvice};

/// Questions asked before final advice is produced.
pub const MAX_ROUNDS: u32 = 4;

/// Deadline and attempt budget for each advisory call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallPolicy {
  pub timeout:  Duration,
  pub attempts: u32,
}

impl CallPolicy {
  /// `timeout` per attempt, one retry.
  pub fn new(timeout: Duration) -> Self { Self { timeout, attempts: 2 } }
}

impl Default for CallPolicy {
  fn default() -> Self { Self::new(Duration::from_secs(20)) }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConversationState {
  NotStarted,
  AwaitingResponse { round: u32, question: String },
  Finalizing,
  Complete(FinalAdvice),
  /// An advisory call failed. `previous` is the state to return to.
  Failed {
    round:    u32,
    question: Option<String>,
    previous: Box<ConversationState>,
  },
}

impl ConversationState {
  pub fn name(&self) -> &'static str {
    match self {
      Self::NotStarted => "not started",
      Self::AwaitingResponse { .. } => "awaiting a response",
      Self::Finalizing => "finalizing",
      Self::Complete(_) => "complete",
      Self::Failed { .. } => "failed",
    }
  }
}

/// What the client should show next.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
  Question { round: u32, question: String },
  Final(FinalAdvice),
}

pub struct Conversation<'a, A> {
  advisor:    &'a A,
  context:    AdvisoryContext,
  transcript: Vec<Exchange>,
  state:      ConversationState,
  policy:     CallPolicy,
}

impl<'a, A: Advisor> Conversation<'a, A> {
  pub fn new(advisor: &'a A, context: AdvisoryContext, policy: CallPolicy) -> Self {
    Self {
      advisor,
      context,
      transcript: Vec::new(),
      state: ConversationState::NotStarted,
      policy,
    }
  }

  /// Rebuild a conversation that is waiting for the answer to `question` in
  /// `round`, given the exchanges of every earlier round.
  pub fn resume(
    advisor: &'a A,
    context: AdvisoryContext,
    transcript: Vec<Exchange>,
    round: u32,
    question: String,
    policy: CallPolicy,
  ) -> Result<Self, ConversationError> {
    if !(1..=MAX_ROUNDS).contains(&round) {
      return Err(ConversationError::InvalidTranscript(format!(
        "round {round} is outside 1..={MAX_ROUNDS}"
      )));
    }
    if transcript.len() != (round - 1) as usize {
      return Err(ConversationError::InvalidTranscript(format!(
        "round {round} needs {} earlier exchanges, got {}",
        round - 1,
        transcript.len()
      )));
    }
    if let Some((i, e)) =
      transcript.iter().enumerate().find(|(i, e)| e.round != *i as u32 + 1)
    {
      return Err(ConversationError::InvalidTranscript(format!(
        "exchange {} is labelled round {}",
        i + 1,
        e.round
      )));
    }
    if question.trim().is_empty() {
      return Err(ConversationError::InvalidTranscript("missing question".to_owned()));
    }

    Ok(Self {
      advisor,
      context,
      transcript,
      state: ConversationState::AwaitingResponse { round, question },
      policy,
    })
  }

  pub fn state(&self) -> &ConversationState { &self.state }

  pub fn transcript(&self) -> &[Exchange] { &self.transcript }

  pub fn context(&self) -> &AdvisoryContext { &self.context }

  /// Ask the opening question.
  pub async fn start(&mut self) -> Result<Turn, ConversationError> {
    if self.state != ConversationState::NotStarted {
      return Err(self.wrong_state("start"));
    }

    let (advisor, context) = (self.advisor, &self.context);
    match with_retry(self.policy, "opening question", move || {
      advisor.opening_question(context)
    })
    .await
    {
      Ok(question) => {
        tracing::info!(round = 1, "conversation started");
        self.state =
          ConversationState::AwaitingResponse { round: 1, question: question.clone() };
        Ok(Turn::Question { round: 1, question })
      }
      Err(source) => Err(self.fail(1, None, source)),
    }
  }

  /// Record the answer for `round` and move on: another question, or final
  /// advice after round [`MAX_ROUNDS`].
  pub async fn submit_response(
    &mut self,
    round: u32,
    response: &str,
  ) -> Result<Turn, ConversationError> {
    let ConversationState::AwaitingResponse { round: expected, question } = &self.state
    else {
      return Err(self.wrong_state("respond"));
    };
    let (expected, question) = (*expected, question.clone());
    if round != expected {
      return Err(ConversationError::WrongRound { expected, got: round });
    }
    let response = response.trim();
    if response.is_empty() {
      return Err(ConversationError::EmptyResponse);
    }

    self.transcript.push(Exchange {
      round,
      question: question.clone(),
      response: response.to_owned(),
    });

    let (advisor, context, transcript) = (self.advisor, &self.context, &self.transcript);
    if round < MAX_ROUNDS {
      let next = with_retry(self.policy, "follow-up question", move || {
        advisor.follow_up_question(context, transcript)
      })
      .await;
      match next {
        Ok(next_question) => {
          let next_round = round + 1;
          tracing::info!(round = next_round, "conversation advanced");
          self.state = ConversationState::AwaitingResponse {
            round:    next_round,
            question: next_question.clone(),
          };
          Ok(Turn::Question { round: next_round, question: next_question })
        }
        Err(source) => {
          self.transcript.pop();
          Err(self.fail(round, Some(question), source))
        }
      }
    } else {
      self.state = ConversationState::Finalizing;
      let advice = with_retry(self.policy, "final advice", move || {
        advisor.final_advice(context, transcript)
      })
      .await;
      match advice {
        Ok(advice) => {
          tracing::info!(
            recommendations = advice.recommendations.len(),
            "conversation complete"
          );
          self.state = ConversationState::Complete(advice.clone());
          Ok(Turn::Final(advice))
        }
        Err(source) => {
          self.transcript.pop();
          self.state = ConversationState::AwaitingResponse { round, question: question.clone() };
          Err(self.fail(round, Some(question), source))
        }
      }
    }
  }

  /// Leave `Failed` and return to the state the failed call started from.
  pub fn retry(&mut self) -> Result<(), ConversationError> {
    match std::mem::replace(&mut self.state, ConversationState::NotStarted) {
      ConversationState::Failed { previous, .. } => {
        self.state = *previous;
        Ok(())
      }
      other => {
        self.state = other;
        Err(self.wrong_state("retry"))
      }
    }
  }

  /// The persisted record of a completed conversation.
  pub fn outcome(&self, session_id: Uuid) -> Option<AdvisorOutcome> {
    let ConversationState::Complete(advice) = &self.state else {
      return None;
    };
    Some(AdvisorOutcome {
      session_id,
      recommendations: advice.recommendations.clone(),
      conversation_summary: advice.summary.clone(),
      transcript: self.transcript.clone(),
      created_at: Utc::now(),
    })
  }

  fn wrong_state(&self, action: &'static str) -> ConversationError {
    tracing::warn!(action, state = self.state.name(), "conversation step rejected");
    ConversationError::WrongState { action, state: self.state.name() }
  }

  fn fail(
    &mut self,
    round: u32,
    question: Option<String>,
    source: AdvisorError,
  ) -> ConversationError {
    tracing::error!(round, error = %source, "advisory service failed");
    let previous = std::mem::replace(&mut self.state, ConversationState::NotStarted);
    self.state = ConversationState::Failed {
      round,
      question: question.clone(),
      previous: Box::new(previous),
    };
    ConversationError::Upstream { round, question, source }
  }
}

/// Run `call` under `policy`: each attempt gets the full timeout and the last
/// failure is returned.
async fn with_retry<T, F, Fut>(
  policy: CallPolicy,
  what: &'static str,
  mut call: F,
) -> Result<T, AdvisorError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, AdvisorError>>,
{
  let mut last = AdvisorError::Timeout(policy.timeout);
  for attempt in 1..=policy.attempts.max(1) {
    match tokio::time::timeout(policy.timeout, call()).await {
      Ok(Ok(value)) => return Ok(value),
      Ok(Err(e)) => last = e,
      Err(_) => last = AdvisorError::Timeout(policy.timeout),
    }
    if attempt < policy.attempts {
      tracing::warn!(what, attempt, error = %last, "advisory call failed; retrying");
    }
  }
  Err(last)
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use axum::{Router, extract::State, http::StatusCode, routing::post};
  use kar_core::rules::Regime;
  use rust_decimal_macros::dec;

  use super::*;
  use crate::{http::HttpAdvisor, rule_based::RuleBasedAdvisor};

  fn context() -> AdvisoryContext {
    AdvisoryContext {
      financial_year:           "2024-25".into(),
      gross_salary:             dec!(1200000),
      hra_received:             dec!(240000),
      rent_paid:                dec!(300000),
      deduction_80c:            dec!(50000),
      deduction_80d:            dec!(25000),
      old_regime_tax:           dec!(61880),
      new_regime_tax:           dec!(75400),
      best_regime:              Regime::Old,
      tax_savings:              dec!(13520),
      old_regime_marginal_rate: 20,
    }
  }

  fn fast() -> CallPolicy { CallPolicy::new(Duration::from_millis(20)) }

  /// Answers questions normally until `broken` is set, then stalls forever.
  #[derive(Default)]
  struct Flaky {
    calls:  AtomicUsize,
    broken: std::sync::atomic::AtomicBool,
  }

  impl Flaky {
    async fn answer<T>(&self, value: T) -> Result<T, AdvisorError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      if self.broken.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
      }
      Ok(value)
    }

    fn break_now(&self) { self.broken.store(true, Ordering::SeqCst); }

    fn heal(&self) { self.broken.store(false, Ordering::SeqCst); }
  }

  impl Advisor for Flaky {
    async fn opening_question(&self, _: &AdvisoryContext) -> Result<String, AdvisorError> {
      self.answer("first?".to_owned()).await
    }

    async fn follow_up_question(
      &self,
      _: &AdvisoryContext,
      transcript: &[Exchange],
    ) -> Result<String, AdvisorError> {
      self.answer(format!("question {}?", transcript.len() + 1)).await
    }

    async fn final_advice(
      &self,
      context: &AdvisoryContext,
      transcript: &[Exchange],
    ) -> Result<FinalAdvice, AdvisorError> {
      self.answer(RuleBasedAdvisor::advice(context, transcript)).await
    }
  }

  #[tokio::test]
  async fn four_rounds_then_final_advice() {
    let advisor = RuleBasedAdvisor;
    let mut convo = Conversation::new(&advisor, context(), CallPolicy::default());

    let Turn::Question { round, .. } = convo.start().await.unwrap() else {
      panic!("expected a question");
    };
    assert_eq!(round, 1);

    for round in 1..MAX_ROUNDS {
      let turn = convo.submit_response(round, "an answer").await.unwrap();
      let Turn::Question { round: next, question } = turn else {
        panic!("expected a question after round {round}");
      };
      assert_eq!(next, round + 1);
      assert_eq!(question, RuleBasedAdvisor::follow_up(next));
    }

    let Turn::Final(advice) = convo.submit_response(MAX_ROUNDS, "last").await.unwrap() else {
      panic!("expected final advice");
    };
    assert!(!advice.recommendations.is_empty());
    assert!(advice.summary.contains("Q4:"));
    assert!(advice.summary.contains("A4: last"));
    assert_eq!(convo.transcript().len(), MAX_ROUNDS as usize);
    assert!(matches!(convo.state(), ConversationState::Complete(_)));

    let id = Uuid::new_v4();
    let outcome = convo.outcome(id).unwrap();
    assert_eq!(outcome.session_id, id);
    assert_eq!(outcome.transcript.len(), 4);
    assert_eq!(outcome.recommendations, advice.recommendations);
  }

  #[tokio::test]
  async fn rejected_input_leaves_state_alone() {
    let advisor = RuleBasedAdvisor;
    let mut convo = Conversation::new(&advisor, context(), CallPolicy::default());

    let err = convo.submit_response(1, "too early").await.unwrap_err();
    assert!(matches!(err, ConversationError::WrongState { action: "respond", .. }));
    assert_eq!(convo.state(), &ConversationState::NotStarted);

    convo.start().await.unwrap();
    let before = convo.state().clone();

    let err = convo.submit_response(2, "skipping ahead").await.unwrap_err();
    assert!(matches!(err, ConversationError::WrongRound { expected: 1, got: 2 }));
    let err = convo.submit_response(1, "   ").await.unwrap_err();
    assert!(matches!(err, ConversationError::EmptyResponse));
    let err = convo.start().await.unwrap_err();
    assert!(matches!(err, ConversationError::WrongState { action: "start", .. }));
    let err = convo.retry().unwrap_err();
    assert!(matches!(err, ConversationError::WrongState { action: "retry", .. }));

    assert_eq!(convo.state(), &before);
    assert!(convo.transcript().is_empty());
    assert!(convo.outcome(Uuid::new_v4()).is_none());
  }

  #[tokio::test]
  async fn stalled_opening_fails_after_two_attempts() {
    let advisor = Flaky::default();
    advisor.break_now();
    let mut convo = Conversation::new(&advisor, context(), fast());

    let err = convo.start().await.unwrap_err();
    let ConversationError::Upstream { round, question, source } = err else {
      panic!("expected an upstream error");
    };
    assert_eq!(round, 1);
    assert_eq!(question, None);
    assert!(matches!(source, AdvisorError::Timeout(_)));
    assert_eq!(advisor.calls.load(Ordering::SeqCst), 2);
    assert!(matches!(
      convo.state(),
      ConversationState::Failed { round: 1, question: None, .. }
    ));

    convo.retry().unwrap();
    assert_eq!(convo.state(), &ConversationState::NotStarted);
    advisor.heal();
    assert_eq!(
      convo.start().await.unwrap(),
      Turn::Question { round: 1, question: "first?".into() }
    );
  }

  #[tokio::test]
  async fn failed_follow_up_keeps_round_retryable() {
    let advisor = Flaky::default();
    let mut convo = Conversation::new(&advisor, context(), fast());
    convo.start().await.unwrap();
    convo.submit_response(1, "retire early").await.unwrap();

    advisor.break_now();
    let err = convo.submit_response(2, "ELSS").await.unwrap_err();
    assert!(matches!(
      &err,
      ConversationError::Upstream { round: 2, question: Some(q), .. } if q == "question 2?"
    ));
    assert_eq!(convo.transcript().len(), 1);

    let err = convo.submit_response(2, "ELSS").await.unwrap_err();
    assert!(matches!(err, ConversationError::WrongState { state: "failed", .. }));

    convo.retry().unwrap();
    assert_eq!(
      convo.state(),
      &ConversationState::AwaitingResponse { round: 2, question: "question 2?".into() }
    );
    advisor.heal();
    let turn = convo.submit_response(2, "ELSS").await.unwrap();
    assert_eq!(turn, Turn::Question { round: 3, question: "question 3?".into() });
  }

  #[tokio::test]
  async fn failed_final_advice_returns_to_last_round() {
    let advisor = Flaky::default();
    let transcript = (1..MAX_ROUNDS)
      .map(|round| Exchange {
        round,
        question: format!("question {round}?"),
        response: "yes".into(),
      })
      .collect();
    let mut convo = Conversation::resume(
      &advisor,
      context(),
      transcript,
      MAX_ROUNDS,
      "question 4?".into(),
      fast(),
    )
    .unwrap();

    advisor.break_now();
    let err = convo.submit_response(MAX_ROUNDS, "done").await.unwrap_err();
    assert!(matches!(err, ConversationError::Upstream { round: 4, .. }));
    assert_eq!(convo.transcript().len(), 3);

    convo.retry().unwrap();
    advisor.heal();
    assert!(matches!(
      convo.submit_response(MAX_ROUNDS, "done").await.unwrap(),
      Turn::Final(_)
    ));
  }

  #[test]
  fn resume_checks_history() {
    let advisor = RuleBasedAdvisor;
    let exchange = |round| Exchange { round, question: "q".into(), response: "a".into() };
    let resume = |transcript, round| {
      Conversation::resume(&advisor, context(), transcript, round, "q?".into(), fast())
    };

    assert!(resume(vec![], 1).is_ok());
    assert!(resume(vec![exchange(1), exchange(2)], 3).is_ok());
    for (transcript, round) in [
      (vec![], 0),
      (vec![], 2),
      (vec![exchange(1)], 1),
      (vec![exchange(2)], 2),
      (vec![exchange(1), exchange(2), exchange(3), exchange(4)], 5),
    ] {
      assert!(matches!(
        resume(transcript, round),
        Err(ConversationError::InvalidTranscript(_))
      ));
    }
    assert!(matches!(
      Conversation::resume(&advisor, context(), vec![], 1, " ".into(), fast()),
      Err(ConversationError::InvalidTranscript(_))
    ));
  }

  #[tokio::test]
  async fn http_errors_are_retried_once() {
    let hits = Arc::new(AtomicUsize::new(0));
    async fn fail(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
      hits.fetch_add(1, Ordering::SeqCst);
      StatusCode::INTERNAL_SERVER_ERROR
    }
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = Router::new().route("/advise", post(fail)).with_state(hits.clone());
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });

    let advisor = HttpAdvisor::new(format!("http://{addr}"), None).unwrap();
    let mut convo = Conversation::new(&advisor, context(), CallPolicy::default());
    let err = convo.start().await.unwrap_err();
    assert!(matches!(
      err,
      ConversationError::Upstream { source: AdvisorError::Status(500), .. }
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
  }
}
