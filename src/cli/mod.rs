//! CLI command definitions and handlers

mod analyze;
mod history;

use crate::config::{self, Config};
use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;

/// Repolens - repository health scoring
#[derive(Parser, Debug)]
#[command(name = "repolens")]
#[command(
    version,
    about = "Score a repository's security, maintainability and architecture, and estimate its tech debt",
    long_about = "Repolens fetches a hosted repository (or copies a local directory), \
extracts structure from Python, JavaScript, TypeScript, Java, Go and Rust sources, \
and scores security, maintainability and architecture. Results are saved so they \
can be listed and compared later.",
    after_help = "\
Examples:
  repolens analyze https://github.com/owner/repo           Analyze the main branch
  repolens analyze owner/repo --branch dev --format json   JSON output for scripting
  repolens local .                                          Analyze a directory on disk
  repolens history --owner owner                            Saved analyses for one owner
  repolens show <ID>                                        Re-render a saved analysis"
)]
pub struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch and analyze a hosted repository
    Analyze {
        /// Repository URL or owner/repo
        url: String,

        /// Branch to analyze
        #[arg(long, short = 'b', default_value = "main")]
        branch: String,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Analyze a directory on disk (it is copied, never modified)
    Local {
        #[arg(default_value = ".")]
        path: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// List saved analyses, newest first
    History {
        /// Only analyses of repositories owned by this owner
        #[arg(long)]
        owner: Option<String>,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show a saved analysis
    Show {
        id: String,

        /// Output format: text, json
        #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },

    /// Delete a saved analysis
    Delete { id: String },

    /// Show or initialize configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Output flags shared by `analyze` and `local`
#[derive(clap::Args, Debug, Clone)]
pub struct OutputArgs {
    /// Output format: text, json
    #[arg(long, short = 'f', default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Skip the LLM and use the built-in summary
    #[arg(long)]
    pub no_llm: bool,

    /// Do not save the result
    #[arg(long)]
    pub no_save: bool,

    /// No progress spinner
    #[arg(long, short = 'q')]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Create the user config file with commented defaults
    Init,
    /// Print the effective configuration
    Show,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    let config = Config::load();

    match cli.command {
        Commands::Analyze {
            url,
            branch,
            output,
        } => analyze::run(&config, analyze::Target::Remote { url, branch }, &output),

        Commands::Local { path, output } => analyze::run(&config, analyze::Target::Local(path), &output),

        Commands::History {
            owner,
            limit,
            offset,
        } => history::list(&config, owner.as_deref(), limit, offset),

        Commands::Show { id, format } => history::show(&config, &id, &format),

        Commands::Delete { id } => history::delete(&config, &id),

        Commands::Config { action } => run_config_action(&config, action),
    }
}

fn run_config_action(config: &Config, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init => {
            let path = config::init_user_config()?;
            println!("{} Config initialized at: {}", style("✓").green(), path.display());
            Ok(())
        }
        ConfigAction::Show => {
            if let Some(user_path) = config::user_config_path() {
                let status = if user_path.exists() { "" } else { " (not found)" };
                println!("# user:    {}{}", user_path.display(), status);
            }
            let project = PathBuf::from(config::PROJECT_CONFIG_FILE);
            let status = if project.exists() { "" } else { " (not found)" };
            println!("# project: ./{}{}", config::PROJECT_CONFIG_FILE, status);
            let key_status = if !config.llm.backend.requires_api_key() {
                "not needed"
            } else if config.llm.api_key.is_some() {
                "set"
            } else {
                "not set"
            };
            println!("# {}: {}", config.llm.backend.env_key(), key_status);
            println!();
            print!("{}", toml::to_string_pretty(config)?);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_analyze_defaults() {
        let cli = Cli::try_parse_from(["repolens", "analyze", "owner/repo"]).expect("should parse");
        match cli.command {
            Commands::Analyze { url, branch, output } => {
                assert_eq!(url, "owner/repo");
                assert_eq!(branch, "main");
                assert_eq!(output.format, "text");
                assert!(!output.no_llm);
                assert!(!output.no_save);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_rejects_unknown_format() {
        assert!(Cli::try_parse_from(["repolens", "analyze", "o/r", "--format", "sarif"]).is_err());
    }

    #[test]
    fn test_history_paging_flags() {
        let cli = Cli::try_parse_from([
            "repolens", "history", "--owner", "acme", "--limit", "5", "--offset", "10",
        ])
        .expect("should parse");
        match cli.command {
            Commands::History {
                owner,
                limit,
                offset,
            } => {
                assert_eq!(owner.as_deref(), Some("acme"));
                assert_eq!((limit, offset), (5, 10));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
