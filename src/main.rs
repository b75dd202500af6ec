use clap::{ArgAction, Parser, Subcommand};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::process::ExitCode;

use linkjoin::config::AppConfig;
use linkjoin::error::ErrorClassifier;
use linkjoin::joinlog::{AttemptSummary, FileJoinLogStore, JoinState};
use linkjoin::link::{LinkParser, LinkReference};
use linkjoin::logging::{init_logging, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "linkjoin")]
#[command(version)]
#[command(about = "Join messaging groups from invite links and inspect the join log")]
struct Cli {
    /// Configuration file (TOML); LINKJOIN__SECTION__KEY variables override it
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable colors (also respects NO_COLOR environment variable)
    #[arg(long, global = true)]
    no_color: bool,

    /// Suppress all output except errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, global = true, conflicts_with = "quiet")]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show how a group link is interpreted
    Parse {
        /// Link such as https://t.me/name or https://t.me/+hash
        link: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show how a provider error message is classified
    Classify {
        /// Raw provider error text, e.g. "FLOOD_WAIT_30"
        message: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recorded join attempts, most recent first
    Status {
        /// Only attempts for this group reference
        #[arg(long, short = 'g', value_name = "REF")]
        group: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

/// Exit codes
mod exit_codes {
    use std::process::ExitCode;

    /// Invalid link, or failed attempts in the listing
    pub fn failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// Configuration or join log could not be loaded
    pub fn error() -> ExitCode {
        ExitCode::from(2)
    }
}

/// Terminal styling switch
#[derive(Debug, Clone, Copy)]
struct Style {
    color: bool,
}

impl Style {
    fn ok(&self, text: &str) -> String {
        if self.color {
            text.green().to_string()
        } else {
            text.to_string()
        }
    }

    fn bad(&self, text: &str) -> String {
        if self.color {
            text.red().to_string()
        } else {
            text.to_string()
        }
    }

    fn pending(&self, text: &str) -> String {
        if self.color {
            text.yellow().to_string()
        } else {
            text.to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.color {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn state(&self, state: JoinState) -> String {
        let label = state.to_string();
        match state {
            JoinState::MessageSent => self.ok(&label),
            JoinState::Failed => self.bad(&label),
            _ => self.pending(&label),
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    init_logging(LoggingConfig::from_flags(cli.verbose, cli.quiet).with_timestamps(false));

    let style = Style {
        color: !cli.no_color && std::env::var("NO_COLOR").is_err(),
    };

    match cli.command {
        Commands::Parse { ref link, json } => run_parse(link, json, cli.quiet, style),
        Commands::Classify { ref message, json } => run_classify(message, json, cli.quiet),
        Commands::Status { ref group, json } => {
            let Some(config) = load_config(&cli) else {
                return Ok(exit_codes::error());
            };
            run_status(&config, group.as_deref(), json, cli.quiet, style)
        }
        Commands::Config => {
            let Some(config) = load_config(&cli) else {
                return Ok(exit_codes::error());
            };
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> Option<AppConfig> {
    match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => Some(config),
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            None
        }
    }
}

fn run_parse(
    link: &str,
    json: bool,
    quiet: bool,
    style: Style,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let reference = LinkParser::new().parse(link);

    if json {
        println!("{}", serde_json::to_string_pretty(&reference)?);
    } else if !quiet {
        match &reference {
            LinkReference::Username(name) => {
                println!("{} public group @{}", style.ok("Username:"), name);
            }
            LinkReference::InviteHash(hash) => {
                println!("{} private invite {}", style.ok("Invite:"), hash);
            }
            LinkReference::Invalid => {
                println!(
                    "{} use t.me/username or t.me/+invitehash",
                    style.bad("Invalid link:")
                );
            }
        }
    }

    if reference.is_invalid() {
        Ok(exit_codes::failed())
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn run_classify(
    message: &str,
    json: bool,
    quiet: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let classified = ErrorClassifier::new().classify(message);

    if json {
        let value = serde_json::json!({
            "kind": classified.kind(),
            "message": classified.user_message(),
            "retry_after_secs": classified.retry_after_secs(),
            "recoverable": classified.is_recoverable(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if !quiet {
        println!("Kind: {}", classified.kind());
        println!("Message: {}", classified.user_message());
        if let Some(secs) = classified.retry_after_secs() {
            println!("Retry after: {} seconds", secs);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_status(
    config: &AppConfig,
    group: Option<&str>,
    json: bool,
    quiet: bool,
    style: Style,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let attempts = match FileJoinLogStore::read_existing(&config.storage.dir, group) {
        Ok(attempts) => attempts.unwrap_or_default(),
        Err(e) => {
            eprintln!("Failed to read join log: {}", e);
            return Ok(exit_codes::error());
        }
    };

    let summaries: Vec<AttemptSummary> = attempts.iter().map(|a| a.summary()).collect();
    let failed = summaries
        .iter()
        .filter(|s| s.state == JoinState::Failed)
        .count();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else if !quiet {
        print_status(&summaries, failed, style);
    }

    if failed > 0 {
        Ok(exit_codes::failed())
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn print_status(summaries: &[AttemptSummary], failed: usize, style: Style) {
    if summaries.is_empty() {
        println!("No join attempts recorded.");
        return;
    }

    let now = chrono::Utc::now();
    for summary in summaries {
        let age = format_age(now.signed_duration_since(summary.updated_at));
        println!(
            "{}  {}  {}  {}",
            style.dim(&summary.id),
            style.state(summary.state),
            summary.raw_link,
            style.dim(&age)
        );
        if let Some(group_ref) = &summary.group_ref {
            println!("    group: {}", group_ref);
        }
        if let Some(error) = &summary.error {
            println!("    error: {}", error);
        }
    }

    println!();
    println!(
        "{} attempt{}, {} failed",
        summaries.len(),
        if summaries.len() == 1 { "" } else { "s" },
        failed
    );
}

/// Compact age of a log entry, e.g. `45s ago` or `3h ago`
fn format_age(age: chrono::Duration) -> String {
    // Entries stamped ahead of the local clock read as fresh
    let secs = u64::try_from(age.num_seconds()).unwrap_or(0);
    match secs {
        0..=4 => "just now".to_string(),
        5..=59 => format!("{}s ago", secs),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}
