//! Reasoning stages
//!
//! Both stages turn backend trouble into values: a degraded stage yields an
//! empty outcome plus notes, and only non-transient backend errors escape.

pub mod detective;
pub mod judge;

pub use detective::{detect, parse_candidates, DetectiveOutcome};
pub use judge::{judge, validate_verdict, JudgeOutcome, Rejection, Verdict};
