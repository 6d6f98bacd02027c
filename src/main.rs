//! EstateWise - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde::Deserialize;
use std::path::Path;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use estatewise::cli::{print_help, print_reply, render_weights, Args, ChatCommand, Commands};
use estatewise::rag::MarketInsights;
use estatewise::types::{PropertyMetadata, RetrievalCandidate};
use estatewise::{ChatOrchestrator, Config, ConversationContext, RatingEvent, Turn, TurnRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config = Config::load(args.config.clone()).context("failed to load configuration")?;

    match &args.command {
        Commands::Chat { conversation } => run_chat(&args, config, conversation.clone()).await,
        Commands::Ask {
            query,
            conversation,
            json,
        } => run_ask(&args, config, query, conversation.clone(), *json).await,
        Commands::Insights { file } => show_insights(file),
        Commands::Config => show_config(&config),
    }
}

fn init_tracing(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.verbosity().log_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn conversation_id(requested: Option<String>) -> String {
    requested.unwrap_or_else(|| Uuid::new_v4().to_string())
}

async fn run_ask(
    args: &Args,
    config: Config,
    query: &str,
    conversation: Option<String>,
    json: bool,
) -> Result<()> {
    let chat = ChatOrchestrator::from_config(config).await?;
    let context = ConversationContext::new(conversation_id(conversation));
    let reply = chat.handle_turn(&TurnRequest::new(context, query)).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&reply)?);
    } else {
        print_reply(&reply, args.verbosity().show_details());
    }
    Ok(())
}

async fn run_chat(args: &Args, config: Config, conversation: Option<String>) -> Result<()> {
    let chat = ChatOrchestrator::from_config(config).await?;
    let mut context = ConversationContext::new(conversation_id(conversation));
    let mut editor = DefaultEditor::new()?;
    let mut last_reply = None;
    let details = args.verbosity().show_details();

    println!(
        "{} conversation {}",
        "EstateWise".bold().cyan(),
        context.conversation_id.dimmed()
    );
    println!("Ask about listings, or type {} for commands.\n", ":help".green());

    loop {
        let line = match editor.readline("estatewise> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match ChatCommand::parse(input) {
            Some(ChatCommand::Exit) => break,
            Some(ChatCommand::Help) => print_help(),
            Some(ChatCommand::Rate(value)) => {
                let Some((message_id, owner)) = last_reply else {
                    println!("{}", "Nothing to rate yet.".yellow());
                    continue;
                };
                let event = RatingEvent::new(message_id, context.conversation_id.clone(), value)
                    .with_owner(owner);
                match chat.handle_rating(&event).await {
                    Ok(weights) => println!("{}\n{}\n", "Thanks! Weights now:".green(), render_weights(&weights)),
                    Err(e) => println!("{} {}\n", "Rating not applied:".red(), e),
                }
            }
            Some(ChatCommand::Weights) => {
                let weights = chat.weights(&context.conversation_id).await?;
                println!("{}\n", render_weights(&weights));
            }
            Some(ChatCommand::Decay) => {
                let weights = chat.decay_weights(&context.conversation_id).await?;
                println!("{}\n", render_weights(&weights));
            }
            Some(ChatCommand::Reset) => {
                chat.reset_weights(&context.conversation_id).await?;
                println!("{}\n", "Weights reset to uniform.".yellow());
            }
            Some(ChatCommand::Stats) => println!("{}", chat.telemetry().summary()),
            Some(ChatCommand::Unknown(cmd)) => {
                println!("{} {} (try {})\n", "Unknown command:".red(), cmd, ":help".cyan());
            }
            None => {
                let request = TurnRequest::new(context.clone(), input);
                let reply = chat.handle_turn(&request).await;
                print_reply(&reply, details);

                context.push_turn(Turn::user(input));
                context.push_turn(Turn::assistant(reply.text.clone(), reply.retrieved));
                context.last_recommended = reply.similar_homes.clone();
                last_reply = reply.primary_role.map(|role| (reply.message_id, role));
            }
        }
    }

    println!("{}", "Goodbye!".green());
    Ok(())
}

/// Listing files come as a bare array or as a search response
#[derive(Deserialize)]
#[serde(untagged)]
enum ListingFile {
    Results { results: Vec<RetrievalCandidate> },
    Candidates(Vec<RetrievalCandidate>),
    Listings(Vec<PropertyMetadata>),
}

fn show_insights(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: ListingFile =
        serde_json::from_str(&raw).with_context(|| format!("{} is not a listing file", path.display()))?;

    let insights = match parsed {
        ListingFile::Results { results } | ListingFile::Candidates(results) => {
            MarketInsights::from_candidates(&results)
        }
        ListingFile::Listings(listings) => MarketInsights::from_listings(&listings),
    };

    println!("{}\n", "Market insights".bold().cyan());
    println!("{}", insights.render());
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}\n", "EstateWise configuration".bold().cyan());
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
