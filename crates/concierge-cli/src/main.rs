//! Concierge - terminal front-end for the ordering assistant.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use concierge_core::{
    AssistantAction, CancellationToken, ChatError, ChatRole, ChatSession, Config,
};

#[derive(Parser)]
#[command(name = "concierge")]
#[command(about = "Chat with the restaurant ordering assistant")]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL, in priority order (repeatable)
    #[arg(short, long = "gateway", global = true)]
    gateways: Vec<String>,

    /// Model requested from the gateway
    #[arg(short, long, global = true)]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat (Ctrl-C stops the current reply)
    Chat,
    /// Ask a single question
    Ask {
        /// Your message
        message: String,
    },
    /// Find a live gateway and print it
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "concierge_cli=info,concierge_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(gateways = config.gateways.len(), model = %config.model, "configuration loaded");

    let mut session = ChatSession::from_config(&config);

    match cli.command {
        Commands::Chat => chat_loop(&mut session).await?,
        Commands::Ask { message } => ask(&mut session, &message).await?,
        Commands::Probe => match session.locator().resolve().await {
            Ok(endpoint) => println!("{}", endpoint.base_url()),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = Config::load_from(path)?;
            config.apply_env();
            config
        }
        None => Config::load()?,
    };

    if !cli.gateways.is_empty() {
        config.gateways = cli.gateways.clone();
    }
    if let Some(model) = &cli.model {
        config.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn chat_loop(session: &mut ChatSession) -> Result<()> {
    println!("Ask about the menu, plans or orders. /history, /clear, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/quit" | "/exit" => break,
            "/clear" => {
                session.clear();
                println!("(conversation cleared)");
            }
            "/history" => print_history(session),
            _ => ask(session, line).await?,
        }
    }

    Ok(())
}

/// Run one turn, rendering deltas as they arrive. Ctrl-C cancels the turn.
async fn ask(session: &mut ChatSession, message: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("interrupt received");
                cancel.cancel();
            }
        })
    };

    let mut stdout = std::io::stdout();
    let result = session
        .send(message, &cancel, |delta| {
            let _ = write!(stdout, "{}", delta);
            let _ = stdout.flush();
        })
        .await;
    watcher.abort();
    println!();

    match result {
        Ok(reply) => render_actions(&reply.actions),
        Err(ChatError::Cancelled) => println!("(stopped)"),
        Err(err) => {
            if let Some(fallback) = err.fallback_message() {
                println!("{}", fallback);
                render_actions(&[AssistantAction::ContactWhatsapp]);
            }
        }
    }
    Ok(())
}

fn render_actions(actions: &[AssistantAction]) {
    let buttons: Vec<String> = actions
        .iter()
        .filter(|a| **a != AssistantAction::None)
        .map(|a| format!("[ {} ]", a.label()))
        .collect();
    if !buttons.is_empty() {
        println!("{}", buttons.join("  "));
    }
}

fn print_history(session: &ChatSession) {
    for message in session.history() {
        let who = match message.role {
            ChatRole::User => "you",
            ChatRole::Assistant => "concierge",
            ChatRole::System => "system",
        };
        println!("{}: {}", who, message.content);
    }
}
