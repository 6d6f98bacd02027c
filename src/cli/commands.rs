//! Built-in commands for the interactive chat loop
//!
//! Lines starting with `:` are commands; everything else is a question.

use colored::*;

use crate::types::{MergedReply, RatingValue};
use crate::weights::ExpertWeightVector;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Help,
    Exit,
    /// Rate the last reply
    Rate(RatingValue),
    Weights,
    /// One explicit decay step
    Decay,
    /// Drop this conversation's weights
    Reset,
    Stats,
    Unknown(String),
}

impl ChatCommand {
    /// `None` for ordinary questions
    pub fn parse(input: &str) -> Option<ChatCommand> {
        let trimmed = input.trim();
        let name = trimmed.strip_prefix(':')?;

        let command = match name.trim().to_lowercase().as_str() {
            "help" | "h" => ChatCommand::Help,
            "exit" | "quit" | "q" => ChatCommand::Exit,
            "up" | "+1" | "+" => ChatCommand::Rate(RatingValue::Up),
            "down" | "-1" | "-" => ChatCommand::Rate(RatingValue::Down),
            "weights" | "w" => ChatCommand::Weights,
            "decay" => ChatCommand::Decay,
            "reset" => ChatCommand::Reset,
            "stats" => ChatCommand::Stats,
            _ => ChatCommand::Unknown(trimmed.to_string()),
        };
        Some(command)
    }
}

pub fn print_help() {
    println!("\n{}", "Commands:".bold().cyan());
    let commands = [
        (":up / :down", "Rate the last reply"),
        (":weights", "Show this conversation's expert weights"),
        (":decay", "Pull the weights one step toward uniform"),
        (":reset", "Forget this conversation's weights"),
        (":stats", "Pipeline counters"),
        (":help", "Show this help"),
        (":quit", "Leave the chat"),
    ];
    for (cmd, desc) in commands {
        println!("  {:<16} {}", cmd.green(), desc);
    }
    println!();
}

/// Bar chart of weights, highest first
pub fn render_weights(weights: &ExpertWeightVector) -> String {
    weights
        .ranked()
        .into_iter()
        .map(|(role, w)| {
            let bar = "█".repeat((w * 40.0).round() as usize);
            format!("  {:<13} {:>5.1}% {}", role.name(), w * 100.0, bar)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print a reply; `details` adds panes and expert status
pub fn print_reply(reply: &MergedReply, details: bool) {
    let header = match reply.primary_role {
        Some(role) => format!("[{}]", role).cyan().bold(),
        None => "[estatewise]".yellow().bold(),
    };
    println!("\n{} {}\n", header, reply.text);

    if !reply.similar_homes.is_empty() {
        println!("{} {}", "Similar homes:".dimmed(), reply.similar_homes.join(", "));
    }

    let mut flags = Vec::new();
    if reply.degraded {
        flags.push("degraded".red().to_string());
    }
    if reply.from_cache {
        flags.push("cached".blue().to_string());
    }
    if reply.truncated {
        flags.push("truncated".yellow().to_string());
    }
    if reply.redacted {
        flags.push("redacted".yellow().to_string());
    }
    if !flags.is_empty() {
        println!("{} {}", "Flags:".dimmed(), flags.join(" "));
    }

    if details {
        for pane in &reply.auxiliary {
            println!("\n{} {}", format!("[{}]", pane.role).dimmed(), pane.content);
        }
        if !reply.unavailable_experts.is_empty() {
            let names: Vec<&str> = reply.unavailable_experts.iter().map(|r| r.name()).collect();
            println!("{} {}", "Unavailable:".dimmed(), names.join(", "));
        }
    }
    println!();
}
