//! JSON reporter
//!
//! Outputs the full AnalysisResult as pretty-printed JSON, the same shape
//! the result store persists.

use crate::models::AnalysisResult;
use anyhow::Result;

pub fn render(result: &AnalysisResult) -> Result<String> {
    Ok(serde_json::to_string_pretty(result)?)
}
