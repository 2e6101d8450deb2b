//! `history`, `show` and `delete` over saved analyses

use crate::config::Config;
use crate::reporters::{self, OutputFormat};
use crate::storage::{JsonDirStore, ResultStore};
use anyhow::{Context, Result};
use console::style;

fn open_store(config: &Config) -> Result<JsonDirStore> {
    let dir = config.storage.data_dir();
    JsonDirStore::open(&dir).with_context(|| format!("Failed to open results directory {}", dir.display()))
}

pub(super) fn list(config: &Config, owner: Option<&str>, limit: usize, offset: usize) -> Result<()> {
    let store = open_store(config)?;
    let results = store.list(owner, limit, offset)?;
    print!("{}", reporters::render_history(&results));
    Ok(())
}

pub(super) fn show(config: &Config, id: &str, format: &str) -> Result<()> {
    let format: OutputFormat = format.parse()?;
    let result = open_store(config)?.get(id)?;
    println!("{}", reporters::report(&result, format)?);
    Ok(())
}

pub(super) fn delete(config: &Config, id: &str) -> Result<()> {
    open_store(config)?.delete(id)?;
    println!("{} Deleted {}", style("✓").green(), id);
    Ok(())
}
