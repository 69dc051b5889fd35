//! Oportuna: personal AI agents with a public chat page.
//!
//! Usage:
//!   oportuna setup                    Run the setup wizard
//!   oportuna serve                    Start the HTTP API
//!   oportuna chat <slug>              Chat with an agent in the terminal
//!   oportuna agents --owner <id>      List an owner's agents
//!   oportuna stats --owner <id>       Show dashboard aggregates

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use oportuna::chat::{ChatContext, ChatPhase, ChatSession, Turn};
use oportuna::config::{self, OportunaConfig};
use oportuna::dashboard::{parse_interests, Dashboard};
use oportuna::server::{self, AppState};
use oportuna::state::{self, Store};
use oportuna::types::*;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "oportuna")]
#[command(version = "0.1.0")]
#[command(about = "Personal AI agents with a public chat page")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to oportuna home directory.
    #[arg(long, default_value = "~/.oportuna")]
    home: String,

    /// Log level (debug, info, warn, error). Defaults to the config file's.
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the first-time setup wizard.
    Setup,

    /// Start the HTTP API.
    Serve,

    /// Chat with an agent as a visitor (`/pay` to pay, `/quit` to exit).
    Chat { slug: String },

    /// Register an owner profile.
    Profile {
        user_id: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        admin: bool,
    },

    /// List an owner's agents.
    Agents {
        #[arg(long)]
        owner: String,
    },

    /// Create an agent.
    CreateAgent {
        #[arg(long)]
        owner: String,
        #[command(flatten)]
        fields: AgentFields,
    },

    /// Update an agent's settings; omitted flags keep their current value.
    UpdateAgent {
        agent_id: String,
        #[arg(long)]
        owner: String,
        #[command(flatten)]
        fields: AgentFields,
    },

    /// Show an agent's conversation history.
    History {
        agent_id: String,
        #[arg(long)]
        owner: String,
    },

    /// Show dashboard aggregates for an owner.
    Stats {
        #[arg(long)]
        owner: String,
    },
}

#[derive(Args, Debug, Default)]
struct AgentFields {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    slug: Option<String>,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    personality: Option<String>,
    /// Comma-separated interests.
    #[arg(long)]
    interests: Option<String>,
    /// A fact about the agent (repeatable).
    #[arg(long = "fact")]
    facts: Vec<String>,
    #[arg(long)]
    system_prompt: Option<String>,
    #[arg(long)]
    fee: Option<f64>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    active: Option<bool>,
}

impl AgentFields {
    /// Overlay the given flags onto a draft.
    fn apply(self, mut draft: AgentDraft) -> AgentDraft {
        if let Some(name) = self.name {
            draft.name = name;
        }
        if let Some(slug) = self.slug {
            draft.slug = slug;
        }
        if self.description.is_some() {
            draft.description = self.description;
        }
        if self.personality.is_some() {
            draft.personality = self.personality;
        }
        if let Some(interests) = self.interests {
            draft.interests = parse_interests(&interests);
        }
        if !self.facts.is_empty() {
            draft.facts = self.facts;
        }
        if self.system_prompt.is_some() {
            draft.system_prompt = self.system_prompt;
        }
        if self.fee.is_some() {
            draft.fee_amount = self.fee;
        }
        if self.token.is_some() {
            draft.fee_token = self.token;
        }
        if self.active.is_some() {
            draft.is_active = self.active;
        }
        draft
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Resolve home directory
    let home_dir = PathBuf::from(shellexpand::tilde(&cli.home).into_owned());

    // Initialize logging: RUST_LOG, then --log-level, then the config file
    let log_level =
        config::resolve_log_level(cli.log_level.as_deref(), &home_dir.join(config::CONFIG_FILE));
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Setup => cmd_setup(&home_dir),
        Commands::Serve => cmd_serve(&home_dir).await,
        Commands::Chat { slug } => cmd_chat(&home_dir, &slug).await,
        Commands::Profile {
            user_id,
            username,
            full_name,
            admin,
        } => cmd_profile(&home_dir, user_id, username, full_name, admin).await,
        Commands::Agents { owner } => cmd_agents(&home_dir, &owner).await,
        Commands::CreateAgent { owner, fields } => cmd_create_agent(&home_dir, &owner, fields).await,
        Commands::UpdateAgent {
            agent_id,
            owner,
            fields,
        } => cmd_update_agent(&home_dir, &agent_id, &owner, fields).await,
        Commands::History { agent_id, owner } => cmd_history(&home_dir, &agent_id, &owner).await,
        Commands::Stats { owner } => cmd_stats(&home_dir, &owner).await,
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

fn cmd_setup(home_dir: &Path) -> Result<()> {
    oportuna::setup::run_setup_wizard(home_dir)?;
    Ok(())
}

async fn cmd_serve(home_dir: &Path) -> Result<()> {
    let (config, store) = bootstrap(home_dir, true)?;
    let ctx = ChatContext::from_config(&config, store);

    println!(
        "{} Serving agents on {} (model: {}, payments: {})",
        ">>>".green().bold(),
        config.listen_addr,
        config.llm_model,
        if config.payments_enabled() { "enabled" } else { "disabled" },
    );

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        println!("\n{} Shutting down gracefully...", "<<<".red().bold());
        signal_cancel.cancel();
    });

    let state = AppState::with_session_limits(
        ctx,
        Duration::from_secs(config.session_idle_minutes.saturating_mul(60)),
        config.max_open_sessions,
    );
    server::serve(&config.listen_addr, Arc::new(state), cancel).await?;
    info!("Shutdown complete");
    Ok(())
}

async fn cmd_chat(home_dir: &Path, slug: &str) -> Result<()> {
    let (config, store) = bootstrap(home_dir, true)?;
    let ctx = ChatContext::from_config(&config, store);

    let mut session = match ChatSession::load(ctx, slug, None, VisitInfo::default()).await {
        Ok(session) => session,
        Err(e) => bail!("Cannot open chat with '{}': {}", slug, e),
    };
    let agent_name = session.agent().name.clone();
    let mut shown = print_new(&session, &agent_name, 0);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print_input_hint(&session);
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let line = line.trim();

        let result = match line {
            "/quit" => break,
            "/pay" => session.pay().await,
            text => session.submit(text).await,
        };

        match result {
            Ok(Turn::PaymentRequired(prompt)) => {
                shown = print_new(&session, &agent_name, shown);
                println!("{}", prompt.message.yellow());
            }
            Ok(_) => shown = print_new(&session, &agent_name, shown),
            Err(e) => println!("{} {}", "!".red().bold(), e),
        }
    }
    Ok(())
}

async fn cmd_profile(
    home_dir: &Path,
    user_id: String,
    username: Option<String>,
    full_name: Option<String>,
    admin: bool,
) -> Result<()> {
    let (_, store) = bootstrap(home_dir, false)?;
    let now = chrono::Utc::now();
    let profile = Profile {
        id: user_id,
        username,
        full_name,
        role: if admin { ProfileRole::Admin } else { ProfileRole::User },
        created_at: now,
        updated_at: now,
    };
    store.upsert_profile(&profile).await?;
    println!("Profile {} saved ({})", profile.id.bold(), profile.role);
    Ok(())
}

async fn cmd_agents(home_dir: &Path, owner: &str) -> Result<()> {
    let (_, store) = bootstrap(home_dir, false)?;
    let agents = Dashboard::new(store).list_agents(owner).await?;

    println!();
    println!("{}", "=== Agents ===".bold());
    if agents.is_empty() {
        println!("  (none)");
    }
    for agent in agents {
        let fee = if agent.charges_fee() {
            format!("{} {}", agent.fee(), agent.fee_token)
        } else {
            "free".to_string()
        };
        let status = if agent.is_active {
            "active".green()
        } else {
            "inactive".dimmed()
        };
        println!("  {}  /agent/{}  [{}]  {}", agent.name.bold(), agent.slug, fee, status);
        println!("    id: {}", agent.id.dimmed());
    }
    println!();
    Ok(())
}

async fn cmd_create_agent(home_dir: &Path, owner: &str, fields: AgentFields) -> Result<()> {
    let (_, store) = bootstrap(home_dir, false)?;
    let draft = fields.apply(AgentDraft::default());
    let agent = Dashboard::new(store).create_agent(owner, &draft).await?;
    println!(
        "{} Created {} at /agent/{} (id {})",
        ">>>".green().bold(),
        agent.name,
        agent.slug,
        agent.id
    );
    Ok(())
}

async fn cmd_update_agent(
    home_dir: &Path,
    agent_id: &str,
    owner: &str,
    fields: AgentFields,
) -> Result<()> {
    let (_, store) = bootstrap(home_dir, false)?;
    let dashboard = Dashboard::new(store);
    let current = dashboard.get_agent(owner, agent_id).await?;
    let draft = fields.apply(AgentDraft {
        name: current.name,
        slug: current.slug,
        description: current.description,
        personality: current.personality,
        interests: current.interests,
        facts: current.facts,
        system_prompt: current.system_prompt,
        fee_amount: current.fee_amount,
        fee_token: Some(current.fee_token),
        is_active: Some(current.is_active),
    });
    let agent = dashboard.update_agent(owner, agent_id, &draft).await?;
    println!("{} Updated {} (/agent/{})", ">>>".green().bold(), agent.name, agent.slug);
    Ok(())
}

async fn cmd_history(home_dir: &Path, agent_id: &str, owner: &str) -> Result<()> {
    let (_, store) = bootstrap(home_dir, false)?;
    let history = Dashboard::new(store).history(owner, agent_id).await?;

    println!();
    println!("{}", format!("=== Conversations with {} ===", history.agent_name).bold());
    if history.conversations.is_empty() {
        println!("  No conversations yet.");
    }
    for conversation in history.conversations {
        println!();
        println!(
            "  {} {}",
            conversation.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            conversation.id.dimmed()
        );
        for line in conversation.lines {
            let speaker = match line.role {
                ChatRole::Assistant => line.speaker.cyan().bold(),
                ChatRole::User => line.speaker.bold(),
            };
            println!("    {}: {}", speaker, line.content);
        }
    }
    println!();
    Ok(())
}

async fn cmd_stats(home_dir: &Path, owner: &str) -> Result<()> {
    let (_, store) = bootstrap(home_dir, false)?;
    let stats = Dashboard::new(store).stats(owner).await;

    println!();
    println!("{}", "=== Dashboard ===".bold());
    println!();
    println!("  {}:        {}", "Visits".bold(), stats.total_visits);
    println!("  {}: {}", "Conversations".bold(), stats.total_conversations);
    println!("  {}:      {} {}", "Earnings".bold(), stats.total_earnings, stats.earnings_token);
    println!("  {}:    {:.1}%", "Conversion".bold(), stats.conversion_rate);
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Bootstrap the runtime: load config and open the store.
///
/// Visitor-facing commands validate the full configuration first.
fn bootstrap(home_dir: &Path, visitor_facing: bool) -> Result<(OportunaConfig, Arc<dyn Store>)> {
    // Ensure home directory exists
    if !home_dir.exists() {
        std::fs::create_dir_all(home_dir).with_context(|| {
            format!("Failed to create home directory: {}", home_dir.display())
        })?;
    }

    let config_path = home_dir.join(config::CONFIG_FILE);
    if !config_path.exists() {
        warn!(
            "No config found at {}; using defaults and environment. Run `oportuna setup` to create one.",
            config_path.display()
        );
    }

    let mut cfg = config::load_config(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    if visitor_facing {
        cfg.validate().context("Invalid configuration")?;
    }

    let store = state::open_store(&cfg).context("Failed to open store")?;
    Ok((cfg, store))
}

/// Print messages from `from` onwards, skipping the visitor's own lines.
fn print_new(session: &ChatSession, agent_name: &str, from: usize) -> usize {
    for message in &session.messages()[from..] {
        if message.role == ChatRole::Assistant {
            println!("{} {}", format!("{agent_name}:").cyan().bold(), message.content);
        }
    }
    session.messages().len()
}

fn print_input_hint(session: &ChatSession) {
    if session.phase() == ChatPhase::PaymentRequired {
        println!("{}", "Type /pay to Pay to Continue, or /quit.".dimmed());
    }
}
