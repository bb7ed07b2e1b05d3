//! agentic-eval library crate
//!
//! Hybrid static analysis plus a two-stage model review (Detective, then
//! Judge) reduced to a deterministic 0-100 score per file. The binary is a
//! thin CLI over [`pipeline::Orchestrator`].

pub mod agent;
pub mod config;
pub mod discovery;
pub mod error;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod reasoning;
pub mod report;
pub mod retrieval;
pub mod scoring;
pub mod tools;
pub mod util;

pub use config::Config;
pub use error::{FatalError, ReasoningError, ResolveError};
pub use model::{EvaluationResult, Severity, Stage, VerifiedViolation};
pub use pipeline::Orchestrator;
pub use profile::{LanguageProfile, ProfileRegistry};
