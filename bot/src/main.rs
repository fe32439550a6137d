//! Reelpot - a tip-funded slot machine bot.
//!
//! Tips sent to the bot's receive address buy slot-machine games against
//! a shared jackpot pool. This binary wires the settlement engine to a
//! JSONL transport: inbound tip events arrive one JSON object per line
//! on stdin, outbound chat messages and payment requests leave the same
//! way on stdout.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::rngs::StdRng;
use rand::SeedableRng;

mod config;
mod errors;
mod events;
mod ledger;
mod messages;
mod oracle;
mod retry;
mod settlement;
mod storage;

use config::{BotConfig, LedgerPolicyConfig};
use errors::BotError;
use events::{Messenger, PaymentExecutor, TipEvent, Transfer};
use ledger::JackpotLedger;
use settlement::SettlementEngine;
use storage::StateStore;

#[derive(Parser)]
#[command(name = "reelpot")]
#[command(about = "Tip-funded slot machine bot with a shared jackpot pool", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the TOML config file (defaults to built-in dev config)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// State file path (overrides the config)
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read tip events from stdin (JSONL) and settle them
    Run,

    /// Print the pool balance and pending payouts
    Status,

    /// Play a tip locally without real payments
    Simulate {
        /// Tip amount in smallest units
        #[arg(long)]
        amount: u64,

        /// Fixed RNG seed for reproducible reels
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Pay out a user's pending winnings
    Claim {
        /// Platform user id holding the pending balance
        #[arg(long)]
        user: String,

        /// Wallet address to pay
        #[arg(long)]
        recipient: String,
    },
}

/// Emits chat messages as JSON lines for the platform glue to deliver.
struct JsonlMessenger;

impl Messenger for JsonlMessenger {
    fn send(&self, channel: &str, body: &str, thread: Option<&str>) -> Result<()> {
        let line = serde_json::to_string(&serde_json::json!({
            "type": "message",
            "channel": channel,
            "thread": thread,
            "body": body,
        }))?;
        println!("{line}");
        Ok(())
    }
}

/// Emits payment requests as JSON lines for the wallet glue to execute.
/// The glue is trusted to apply them; a serialization failure is the
/// only error surface here.
struct JsonlPayments {
    seq: AtomicU64,
}

impl JsonlPayments {
    fn new() -> Self {
        JsonlPayments {
            seq: AtomicU64::new(1),
        }
    }
}

impl PaymentExecutor for JsonlPayments {
    fn transfer(&self, transfers: &[Transfer]) -> Result<String> {
        let tx_ref = format!("xfer-{}", self.seq.fetch_add(1, Ordering::Relaxed));
        let line = serde_json::to_string(&serde_json::json!({
            "type": "payment",
            "tx_ref": tx_ref,
            "transfers": transfers,
        }))?;
        println!("{line}");
        Ok(tx_ref)
    }
}

/// Prints to the terminal instead of the transport. Used by `simulate`.
struct TerminalMessenger;

impl Messenger for TerminalMessenger {
    fn send(&self, _channel: &str, body: &str, _thread: Option<&str>) -> Result<()> {
        println!("{} {body}", "bot>".bright_cyan());
        Ok(())
    }
}

/// Accepts every transfer without moving money. Used by `simulate`.
struct SimulatedPayments;

impl PaymentExecutor for SimulatedPayments {
    fn transfer(&self, transfers: &[Transfer]) -> Result<String> {
        for t in transfers {
            println!(
                "{} {} -> {}",
                "sim-pay>".bright_yellow(),
                t.amount,
                t.recipient
            );
        }
        Ok("sim-tx".to_string())
    }
}

fn build_ledger(cfg: &BotConfig) -> Result<JackpotLedger> {
    let store = StateStore::open(&cfg.state_path);
    match &cfg.ledger {
        LedgerPolicyConfig::Local => Ok(JackpotLedger::local(store)),
        LedgerPolicyConfig::ExternalMirror { .. } => {
            // The mirror policy needs a live balance endpoint wired in
            // by the deployment; this binary only ships the local one.
            anyhow::bail!(
                "the external_mirror ledger policy is not available in this build; \
                 use the local policy"
            )
        }
    }
}

fn build_engine(
    cfg: BotConfig,
    payments: Arc<dyn PaymentExecutor>,
    messenger: Arc<dyn Messenger>,
) -> Result<SettlementEngine> {
    let oracle = cfg.build_oracle();
    let ledger = build_ledger(&cfg)?;
    Ok(SettlementEngine::new(cfg, oracle, ledger, payments, messenger))
}

async fn run(cfg: BotConfig) -> Result<()> {
    let engine = build_engine(cfg, Arc::new(JsonlPayments::new()), Arc::new(JsonlMessenger))?;
    log::info!("reelpot running, reading tip events from stdin");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let event: TipEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(err) => {
                log::warn!("skipping malformed event: {err}");
                continue;
            }
        };
        match engine.handle_tip(&event).await {
            Ok(Some(report)) => {
                log::info!("batch finished in state {:?}", report.state);
            }
            Ok(None) => {}
            Err(err) if err.is_validation() => {
                // Already reported to the sender; the tip was not
                // consumed.
            }
            Err(err) => log::error!("failed to settle tip from {}: {err}", event.sender),
        }
    }
    Ok(())
}

fn status(cfg: BotConfig) -> Result<()> {
    let store = StateStore::open(&cfg.state_path);
    let doc = store.load()?;
    println!("{} {}", "Receive address:".bright_cyan(), cfg.receive_address);
    println!("{} {:?}", "Fee mode:".bright_cyan(), cfg.fee_mode);
    println!("{} {:?}", "Ledger policy:".bright_cyan(), cfg.ledger);
    println!("{} {:?}", "Delivery:".bright_cyan(), cfg.delivery);
    println!(
        "{} {}",
        "Pool balance:".bright_cyan(),
        messages::format_amount(doc.pool_balance, cfg.unit_scale, &cfg.ticker)
    );
    println!("{} {}", "Document version:".bright_cyan(), doc.version);
    println!("{} {}", "Updated:".bright_cyan(), doc.updated_at);
    if doc.pending_payouts.is_empty() {
        println!("{}", "No pending payouts.".bright_cyan());
    } else {
        println!("{}", "Pending payouts:".bright_cyan());
        for (user, amount) in &doc.pending_payouts {
            println!(
                "  {user}: {}",
                messages::format_amount(*amount, cfg.unit_scale, &cfg.ticker)
            );
        }
    }
    Ok(())
}

async fn simulate(cfg: BotConfig, amount: u64, seed: Option<u64>) -> Result<()> {
    let receive_address = cfg.receive_address.clone();
    let engine = build_engine(cfg, Arc::new(SimulatedPayments), Arc::new(TerminalMessenger))?;

    let event = TipEvent {
        sender: "sim-wallet".to_string(),
        receiver: receive_address,
        amount,
        channel_id: Some("sim-channel".to_string()),
        message_id: Some("sim-tip".to_string()),
        user_id: "sim-user".to_string(),
        space_id: None,
    };

    let report = match seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            engine.handle_tip_with_rng(&event, &mut rng).await
        }
        None => engine.handle_tip(&event).await,
    };
    match report {
        Ok(Some(report)) => {
            println!(
                "{} {} game(s), gross {}, net {}, {:?}",
                "result>".bright_green(),
                report.totals.games,
                report.totals.gross,
                report.totals.net,
                report.state
            );
            Ok(())
        }
        Ok(None) => anyhow::bail!("simulated tip was not addressed to the bot"),
        Err(BotError::InvalidTip(err)) => anyhow::bail!("tip rejected: {err}"),
        Err(err) => Err(err.into()),
    }
}

async fn claim(cfg: BotConfig, user: String, recipient: String) -> Result<()> {
    let engine = build_engine(cfg, Arc::new(JsonlPayments::new()), Arc::new(JsonlMessenger))?;
    let paid = engine.claim(&user, &recipient, None).await?;
    if paid == 0 {
        println!("{}", "Nothing to claim.".bright_yellow());
    } else {
        println!("{} paid {paid} to {recipient}", "claim>".bright_green());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let mut cfg = BotConfig::load(cli.config.as_deref())?;
    if let Some(state) = cli.state {
        cfg.state_path = state;
    }
    if cli.verbose {
        println!("{} {}", "Config:".bright_cyan(), match &cli.config {
            Some(path) => path.display().to_string(),
            None => "built-in dev defaults".to_string(),
        });
        println!("{} {}", "State file:".bright_cyan(), cfg.state_path.display());
    }

    match cli.command {
        Commands::Run => run(cfg).await?,
        Commands::Status => status(cfg)?,
        Commands::Simulate { amount, seed } => simulate(cfg, amount, seed).await?,
        Commands::Claim { user, recipient } => claim(cfg, user, recipient).await?,
    }
    Ok(())
}
