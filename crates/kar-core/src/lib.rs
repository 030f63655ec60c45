//! Core types and pure tax logic for the Kar regime-comparison service.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The rule tables, the regime calculator and the comparator are plain
//! functions over [`profile::FinancialProfile`]; persistence is expressed as
//! the [`store::SessionStore`] trait and implemented elsewhere.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod calculator;
pub mod comparator;
pub mod error;
pub mod money;
pub mod profile;
pub mod recommendation;
pub mod rules;
pub mod session;
pub mod store;

pub use error::{Classify, Error, ErrorClass, FieldError, Result, ValidationErrors};
