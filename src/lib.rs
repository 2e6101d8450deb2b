//! Repolens - repository health scoring
//!
//! Fetches a repository, selects its source files, extracts structure with
//! tree-sitter, and scores security, maintainability and architecture. The
//! scores fold into a tech-debt index and a refactor urgency; an optional
//! LLM narrative explains them.
//!
//! The entry point is [`pipeline::Orchestrator`].

pub mod ai;
pub mod architecture;
pub mod cli;
pub mod complexity;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod parsers;
pub mod pipeline;
pub mod reporters;
pub mod scoring;
pub mod security;
pub mod selector;
pub mod storage;

pub use error::{AcquisitionError, AnalysisError};
pub use models::AnalysisResult;
pub use pipeline::{Orchestrator, OrchestratorConfig};
