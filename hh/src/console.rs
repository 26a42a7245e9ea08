//! Operator-facing output: one timestamped line per event worth seeing

use colored::*;

use crate::git::{Branch, BranchError, GitRoot};
use crate::report::ReportOutcome;
use crate::watcher::WatcherFault;

fn timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

fn stamped(line: String) -> String {
    format!("{} {}", format!("[{}]", timestamp()).dimmed(), line)
}

/// Render the line for a report outcome
///
/// `host` names the endpoint in connectivity guidance.
pub fn render_outcome(branch: &Branch, outcome: &ReportOutcome, host: &str) -> String {
    match outcome {
        ReportOutcome::Delivered => format!("{} Reported branch {}", "✓".green(), branch.as_str().cyan()),
        ReportOutcome::Unauthorized => format!(
            "{} {}",
            "✗ Unauthorized:".red().bold(),
            "project token was rejected. Run `happyhour init` to set a fresh token."
                .red()
                .bold()
        ),
        ReportOutcome::Unreachable { detail } => format!(
            "{} Could not reach {} ({}). Check your connection to that host.",
            "!".yellow(),
            host,
            detail
        ),
        ReportOutcome::ServerError { status } => format!(
            "{} Server responded with status {} while reporting branch {}",
            "!".yellow(),
            status,
            branch.as_str().cyan()
        ),
    }
}

pub fn outcome(branch: &Branch, outcome: &ReportOutcome, host: &str) {
    let line = stamped(render_outcome(branch, outcome, host));
    match outcome {
        ReportOutcome::Delivered => println!("{}", line),
        _ => eprintln!("{}", line),
    }
}

pub fn branch_failure(root: &GitRoot, err: &BranchError) {
    eprintln!(
        "{}",
        stamped(format!("{} Could not read branch in {}: {}", "!".yellow(), root, err))
    );
}

pub fn watcher_fault(fault: &WatcherFault) {
    eprintln!("{}", stamped(format!("{} Watcher error: {}", "!".yellow(), fault)));
}

/// Informational line
pub fn note(message: &str) {
    println!("{}", stamped(message.dimmed().to_string()));
}

pub fn session_started(patterns: &[String], target: &str) {
    println!(
        "{}",
        stamped(format!(
            "{} Watching {} -> {}",
            "●".green(),
            patterns.join(" ").yellow(),
            target.cyan()
        ))
    );
}
