//! caseforge - conversational test case generation
//!
//! Describe a feature, answer a few questions, review the drafted cases and
//! watch a simulated run execute them.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Logs: $XDG_STATE_HOME/caseforge/caseforge.log (~/.local/state/caseforge/caseforge.log)
//! - Config: $XDG_CONFIG_HOME/caseforge/config.toml (~/.config/caseforge/config.toml)

mod chat;
mod demo;
mod player;
mod render;

use anyhow::{Context, Result};
use caseforge_core::{Config, Conversation};
use clap::{Parser, Subcommand};

use crate::player::Playback;
use crate::render::ReportFormat;

#[derive(Parser)]
#[command(name = "caseforge")]
#[command(about = "Turn a feature description into test cases and run them")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Interactive conversation on stdin
    Chat {
        /// Seed for question choice, durations and outcomes
        #[arg(long)]
        seed: Option<u64>,

        /// Playback speed (2 = twice as fast, 0 = no waiting)
        #[arg(long, default_value = "1.0")]
        speed: f64,
    },

    /// Scripted conversation from requirement to report
    Demo {
        /// Feature description to start from
        #[arg(short, long, default_value = demo::DEFAULT_REQUIREMENT)]
        requirement: String,

        /// Seed for question choice, durations and outcomes
        #[arg(long)]
        seed: Option<u64>,

        /// Playback speed (2 = twice as fast, 0 = no waiting)
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Report format; json and md print only the report
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// Show resolved paths and effective settings
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Ensure XDG environment variables are set before using core library
    Config::ensure_xdg_env();

    // Load configuration
    let config = Config::load().context("failed to load configuration")?;

    // Initialize logging (to file, stdout is for the conversation)
    let _log_guard =
        caseforge_core::logging::init(&config.logging).context("failed to initialize logging")?;

    tracing::info!("caseforge starting");

    match args.command {
        Command::Chat { seed, speed } => {
            let conv = build_conversation(config, seed)?;
            runtime()?.block_on(chat::run(conv, Playback { speed, live: true }))
        }
        Command::Demo {
            requirement,
            seed,
            speed,
            format,
        } => {
            let conv = build_conversation(config, seed)?;
            runtime()?.block_on(demo::run(
                conv,
                &requirement,
                format,
                Playback { speed, live: true },
            ))
        }
        Command::Config => {
            print_config(&config);
            Ok(())
        }
    }
}

fn build_conversation(config: Config, seed: Option<u64>) -> Result<Conversation> {
    let mut builder = Conversation::builder().config(config);
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    builder.build().context("invalid configuration")
}

/// Single-threaded runtime: the conversation and its log follower share one loop.
fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn print_config(config: &Config) {
    let config_path = Config::config_path();
    println!("Paths:");
    println!(
        "  Config file: {} ({})",
        config_path.display(),
        if config_path.exists() {
            "found"
        } else {
            "not found, using defaults"
        }
    );
    println!("  Log file:    {}", Config::log_path().display());
    println!();

    let d = &config.dialogue;
    println!("Dialogue:");
    println!("  Execute triggers:   {}", d.execute_triggers.join(", "));
    println!("  Sufficiency rounds: {}", d.sufficiency_rounds);
    println!("  Ack delay:          {}ms", d.ack_delay_ms);
    println!("  Resynthesis delay:  {}ms", d.resynthesis_delay_ms);
    println!();

    let e = &config.execution;
    println!("Execution:");
    println!("  Stagger:            {}ms", e.stagger_ms);
    println!(
        "  Duration:           {}ms - {}ms",
        e.min_duration_ms, e.max_duration_ms
    );
    println!("  Pass probability:   {:.2}", e.pass_probability);
    println!("  Slow threshold:     {}ms", e.slow_threshold_ms);
    println!(
        "  Seed:               {}",
        e.seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "random".to_string())
    );
    println!();

    println!("Synthesis:");
    println!("  Case prefix:        {}", config.synthesis.case_prefix);
    println!("  Max cases:          {}", config.synthesis.max_cases);
    println!();

    println!("Candidate pages:");
    for page in config.candidate_pages() {
        println!("  {:<10} {}", page.id, page.label);
    }
}
