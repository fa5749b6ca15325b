mod commands;
mod config;
mod logging;
mod marketplace;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

use crate::commands::Context;
use crate::config::RelayConfig;
use crate::logging::LogFormat;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Durable outreach delivery for marketplace chats.
#[derive(Parser)]
#[command(
    name = "relaybot",
    version,
    about = "Durable outreach delivery for marketplace chats"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Path to relaybot.toml (defaults to $RELAYBOT_CONFIG)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log line format on stderr
    #[arg(long, global = true, default_value = "pretty", value_enum)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which storage root would be used and whether it is writable
    Doctor,

    /// Queue a message for delivery
    Enqueue {
        /// Chat id to deliver to
        #[arg(long)]
        recipient: String,
        /// Literal message text
        #[arg(long, conflicts_with = "template", required_unless_present = "template")]
        text: Option<String>,
        /// Name of a configured template
        #[arg(long)]
        template: Option<String>,
        /// Template parameter, repeatable
        #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param, requires = "template")]
        params: Vec<(String, String)>,
        /// Skip if the same message to the same recipient is pending or sent
        #[arg(long)]
        unique: bool,
    },

    /// Summarize the queue, or locate one item
    Status {
        /// Item id to locate
        #[arg(long)]
        id: Option<u64>,
    },

    /// List dead-lettered items
    DeadLetters,

    /// Attempt every due item once, then exit
    Drain,

    /// Run the delivery worker until interrupted
    ///
    /// The worker must be the only writer on its storage root: stop it
    /// before running `enqueue`, `drain` or `titles put` against the same
    /// root. `status`, `dead-letters` and `doctor` only read and are safe
    /// to run alongside it.
    Run,

    /// Inspect or seed the item title cache
    Titles {
        #[command(subcommand)]
        command: TitleCommands,
    },
}

#[derive(Subcommand)]
enum TitleCommands {
    /// Look up a cached title
    Get {
        item_id: String,
        /// Ask the marketplace catalog on a miss
        #[arg(long)]
        fetch: bool,
    },
    /// Store a title
    Put { item_id: String, title: String },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn main() {
    let Cli {
        output,
        quiet,
        config,
        log_format,
        command,
    } = Cli::parse();
    logging::init_logging(log_format, quiet);

    let config = match RelayConfig::load(config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let ctx = Context::new(config, output, quiet);

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("error: failed to start runtime: {}", e),
                output,
                quiet,
            );
            process::exit(1);
        }
    };

    let result = rt.block_on(async {
        match command {
            Commands::Doctor => commands::doctor::cmd_doctor(&ctx),
            Commands::Enqueue {
                recipient,
                text,
                template,
                params,
                unique,
            } => {
                commands::enqueue::cmd_enqueue(
                    &ctx,
                    commands::enqueue::EnqueueArgs {
                        recipient,
                        text,
                        template,
                        params: params.into_iter().collect(),
                        unique,
                    },
                )
                .await
            }
            Commands::Status { id } => commands::status::cmd_status(&ctx, id).await,
            Commands::DeadLetters => commands::status::cmd_dead_letters(&ctx).await,
            Commands::Drain => commands::deliver::cmd_drain(&ctx).await,
            Commands::Run => commands::deliver::cmd_run(&ctx).await,
            Commands::Titles { command } => match command {
                TitleCommands::Get { item_id, fetch } => {
                    commands::titles::cmd_titles_get(&ctx, &item_id, fetch).await
                }
                TitleCommands::Put { item_id, title } => {
                    commands::titles::cmd_titles_put(&ctx, &item_id, &title).await
                }
            },
        }
    });

    if let Err(e) = result {
        report_error(&format!("error: {}", e), output, quiet);
        process::exit(1);
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_splits_on_first_equals() {
        assert_eq!(
            parse_param("product=Kettle = 2L").unwrap(),
            ("product".to_string(), "Kettle = 2L".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
