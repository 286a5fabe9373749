//! Interactive chat loop
//!
//! Plain lines go to the dialogue; lines starting with `/` are commands for
//! page selection, case editing and execution.

use anyhow::{Context, Result};
use caseforge_core::{Conversation, Message, Phase, RunId};
use std::io::{self, BufRead, Write};

use crate::player::{self, Playback};
use crate::render::{self, ReportFormat};

const HELP: &str = "\
Commands:
  /pages               show the open page prompt
  /select ID...        select candidate pages
  /primary ID          mark the primary page
  /confirm             confirm the page selection
  /cancel              skip page selection
  /cases               list test cases (or run status)
  /add                 add a blank test case
  /remove CASE         remove a case by id or number
  /run                 start execution
  /report              show the last run report
  /restart             start over
  /quit                exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Say(String),
    Pages,
    Select(Vec<String>),
    Primary(String),
    Confirm,
    Cancel,
    Cases,
    Add,
    Remove(String),
    Run,
    Report,
    Restart,
    Help,
    Quit,
}

impl ChatCommand {
    pub fn parse(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(ChatCommand::Say(line.to_string()));
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let args: Vec<String> = parts.map(str::to_string).collect();
        let single = |what: &str| -> std::result::Result<String, String> {
            match args.as_slice() {
                [one] => Ok(one.clone()),
                _ => Err(format!("/{} takes exactly one {}", name, what)),
            }
        };

        match name {
            "pages" => Ok(ChatCommand::Pages),
            "select" => Ok(ChatCommand::Select(args.clone())),
            "primary" => single("page id").map(ChatCommand::Primary),
            "confirm" => Ok(ChatCommand::Confirm),
            "cancel" => Ok(ChatCommand::Cancel),
            "cases" => Ok(ChatCommand::Cases),
            "add" => Ok(ChatCommand::Add),
            "remove" => single("case id or number").map(ChatCommand::Remove),
            "run" => Ok(ChatCommand::Run),
            "report" => Ok(ChatCommand::Report),
            "restart" => Ok(ChatCommand::Restart),
            "help" => Ok(ChatCommand::Help),
            "quit" | "exit" => Ok(ChatCommand::Quit),
            other => Err(format!("unknown command /{} (try /help)", other)),
        }
    }
}

/// Read commands from stdin until `/quit` or end of input.
pub async fn run(mut conv: Conversation, playback: Playback) -> Result<()> {
    println!("Describe the feature you want to test. Type /help for commands.");

    let stdin = io::stdin();
    let mut last_run: Option<RunId> = None;
    let mut printed = 0;

    loop {
        print!("> ");
        io::stdout().flush().context("failed to flush stdout")?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("failed to read input")? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }

        let command = match ChatCommand::parse(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        if command == ChatCommand::Quit {
            break;
        }

        if let Err(e) = apply(&mut conv, &command, last_run) {
            println!("! {}", e);
        }
        if command == ChatCommand::Restart {
            last_run = None;
            printed = 0;
        }

        printed = print_new_messages(conv.transcript(), printed);
        let started = player::drive(&mut conv, playback, last_run).await?;
        printed = print_new_messages(conv.transcript(), printed);

        if let Some(run_id) = started {
            last_run = Some(run_id);
            if conv.phase() == Phase::Completed {
                let report = conv.run_report(run_id)?;
                println!("{}", render::report(&report, ReportFormat::Text)?);
            }
        }
    }

    tracing::info!("Chat session ended");
    Ok(())
}

fn apply(conv: &mut Conversation, command: &ChatCommand, last_run: Option<RunId>) -> Result<()> {
    match command {
        ChatCommand::Say(text) => {
            conv.submit_user_message(text)?;
        }
        ChatCommand::Pages => match conv.candidate_pages() {
            Some(pending) => {
                for page in &pending.candidates {
                    let mark = if pending.selected.contains(&page.id) { "x" } else { " " };
                    let primary = if page.is_primary { " (primary)" } else { "" };
                    println!("  [{}] {:<10} {}{}", mark, page.id, page.label, primary);
                }
            }
            None => println!("No page selection is open."),
        },
        ChatCommand::Select(ids) => {
            let pending = conv.select_candidate_pages(ids)?;
            println!("Selected: {}", pending.selected.join(", "));
        }
        ChatCommand::Primary(id) => {
            conv.set_primary_page(id)?;
            println!("Primary page: {}", id);
        }
        ChatCommand::Confirm => {
            conv.confirm_page_selection()?;
        }
        ChatCommand::Cancel => {
            conv.cancel_page_selection()?;
        }
        ChatCommand::Cases => match conv.current_run_id() {
            Some(run_id) if conv.phase() == Phase::Executing => {
                println!("{}", player::status_line(conv, run_id)?)
            }
            _ => println!("{}", render::cases(conv.cases())),
        },
        ChatCommand::Add => {
            let case = conv.add_case()?;
            println!("Added {}", case.case_number);
        }
        ChatCommand::Remove(key) => {
            let id = conv
                .find_case(key)
                .map(|c| c.id.clone())
                .unwrap_or_else(|| key.clone());
            let case = conv.remove_case(&id)?;
            println!("Removed {}", case.case_number);
        }
        ChatCommand::Run => {
            let run_id = conv.begin_execution()?;
            println!("Run {} started with {} cases", run_id, conv.cases().len());
        }
        ChatCommand::Report => match last_run {
            Some(run_id) => {
                let report = conv.run_report(run_id)?;
                println!("{}", render::report(&report, ReportFormat::Text)?);
            }
            None => println!("No run yet."),
        },
        ChatCommand::Restart => {
            conv.restart();
            println!("Started over.");
        }
        ChatCommand::Help => println!("{}", HELP),
        ChatCommand::Quit => {}
    }
    Ok(())
}

/// Print transcript messages after index `from`; returns the new count.
fn print_new_messages(transcript: &[Message], from: usize) -> usize {
    for msg in transcript.iter().skip(from) {
        // User lines were just typed; only echo the agent side.
        if msg.role == caseforge_core::Role::Agent {
            println!("{}", render::message(msg));
        }
    }
    transcript.len()
}
