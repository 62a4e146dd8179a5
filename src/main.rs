use std::io::Write;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing::{info, warn};

use streamchat::app::{App, MISSING_INPUT_NOTICE};
use streamchat::config::{mask_key, Config, Overrides, Settings};
use streamchat::tui::{self, EventHandler, Tui};
use streamchat::{handler, logging, ui, ChatClient, ChatRequest};

#[derive(Parser)]
#[command(name = "streamchat", version)]
#[command(about = "Chat with a hosted language model, streaming replies into the terminal")]
struct Cli {
    /// Chat endpoint that accepts the JSON request and streams the reply
    #[arg(long, env = "STREAMCHAT_ENDPOINT")]
    endpoint: Option<String>,
    /// Model identifier sent with each request
    #[arg(short, long, env = "STREAMCHAT_MODEL")]
    model: Option<String>,
    /// API key forwarded to the endpoint
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// System/developer instruction for the conversation
    #[arg(short, long)]
    system: Option<String>,
    /// Store the API key in the config file
    #[arg(long)]
    save_key: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and stream the reply to stdout
    Ask {
        /// Your message
        message: String,
    },
    /// Show the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => logging::init_file_logging(&Config::config_dir()?.join("streamchat.log"))?,
        Some(_) => logging::init_stderr_logging()?,
    }

    let mut config = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "could not read config file, using defaults");
        Config::new()
    });

    if cli.save_key {
        match &cli.api_key {
            Some(key) if !key.trim().is_empty() => {
                config.api_key = Some(key.clone());
                config.save()?;
                info!("API key saved to config file");
            }
            _ => bail!("--save-key needs an API key (--api-key or OPENAI_API_KEY)"),
        }
    }

    let overrides = Overrides {
        endpoint: cli.endpoint,
        model: cli.model,
        developer_message: cli.system,
        api_key: cli.api_key,
    };
    let settings = config.resolve(&overrides);

    match cli.command {
        None => run_tui(settings).await?,
        Some(Commands::Ask { message }) => ask(&settings, &message).await?,
        Some(Commands::Config) => show_config(&settings)?,
    }

    Ok(())
}

async fn run_tui(settings: Settings) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(&settings, events.sender());

    info!(endpoint = %settings.endpoint, model = %settings.model, "starting chat session");
    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

async fn ask(settings: &Settings, message: &str) -> Result<()> {
    if settings.api_key.trim().is_empty() || message.trim().is_empty() {
        bail!(MISSING_INPUT_NOTICE);
    }

    let client = ChatClient::new(&settings.endpoint);
    let request = ChatRequest {
        developer_message: settings.developer_message.clone(),
        user_message: message.to_string(),
        api_key: settings.api_key.clone(),
        model: settings.model.clone(),
    };

    println!("{}", format!("🤖 {}:", settings.model).bold().yellow());

    let mut stdout = std::io::stdout();
    let result = client
        .stream_chat(&request, |chunk| {
            print!("{}", chunk);
            let _ = stdout.flush();
        })
        .await;

    match result {
        Ok(_) => {
            println!();
            Ok(())
        }
        Err(e) => {
            println!();
            eprintln!("{}: {}", "Error communicating with the API".red(), e);
            eprintln!(
                "Check your API key and that the endpoint is reachable: {}",
                settings.endpoint.bold()
            );
            Err(e.into())
        }
    }
}

fn show_config(settings: &Settings) -> Result<()> {
    println!("\n{}", "⚙️  streamchat configuration".bold().blue());
    println!("{}", "=".repeat(40).dimmed());
    println!("  config file: {}", Config::get_config_path()?.display().to_string().dimmed());
    println!("  endpoint:    {}", settings.endpoint.green());
    println!("  model:       {}", settings.model.green());
    println!("  system:      {}", settings.developer_message);
    let key = if settings.api_key.is_empty() {
        "(not set)".red().to_string()
    } else {
        mask_key(&settings.api_key)
    };
    println!("  api key:     {}", key);
    Ok(())
}
