//! vedanta: command-line front end to the gateway client
//!
//! Sends one prompt (or one embedding request) to the configured backend
//! through the blocking adapter.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use vedanta::{BlockingGateway, ClientConfig, GenerationOptions, Message, Vedanta};

/// Vedanta CLI
#[derive(Parser)]
#[command(name = "vedanta")]
#[command(version = vedanta::PKG_VERSION)]
#[command(about = "Talk to a self-hosted LLM backend")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and LLAMA_API_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Model name
    #[arg(short, long)]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a prompt and print the reply
    Chat {
        /// Prompt text (or omit to read from stdin)
        prompt: Option<String>,
        /// JSON file with prior messages: [{"role": "user", "content": "..."}]
        #[arg(long)]
        history: Option<PathBuf>,
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,
        #[arg(long, default_value_t = 512)]
        max_tokens: u32,
        #[arg(long, default_value_t = 0.9)]
        top_p: f32,
    },

    /// Embed text and print a summary of the vector
    Embed {
        /// Text to embed (or omit to read from stdin)
        text: Option<String>,
    },

    /// Print version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    if let Command::Version = args.command {
        println!("vedanta {}", vedanta::version_string());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::from_env(),
    };
    let mut builder = Vedanta::builder().config(config);
    if let Some(url) = args.base_url {
        builder = builder.base_url(url);
    }
    if let Some(model) = args.model {
        builder = builder.model(model);
    }
    let gateway = BlockingGateway::new(builder)?;

    match args.command {
        Command::Chat {
            prompt,
            history,
            temperature,
            max_tokens,
            top_p,
        } => {
            let prompt = resolve_text(prompt, "chat")?;
            let history: Vec<Message> = match history {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => Vec::new(),
            };
            let options = GenerationOptions::new()
                .temperature(temperature)
                .max_tokens(max_tokens)
                .top_p(top_p);
            let reply = gateway.generate_sync(&prompt, &history, &options)?;
            println!("{reply}");
        }

        Command::Embed { text } => {
            let text = resolve_text(text, "embed")?;
            let values = gateway.embed_sync(&text)?;
            println!("model: {}", gateway.client().config().model);
            println!("dimensions: {}", values.len());
            println!(
                "values: [{:.4}, {:.4}, ... ({} total)]",
                values.first().unwrap_or(&0.0),
                values.get(1).unwrap_or(&0.0),
                values.len()
            );
        }

        Command::Version => unreachable!("handled above"),
    }

    gateway.close();
    Ok(())
}

/// Take input from the argument, stdin, or both (argument first).
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
