//! Incremental terminal printing of a run transcript.
//!
//! Messages update in place in the session (frames merge into the latest
//! bot message), but a terminal only appends. The printer remembers what it
//! already wrote per message and prints only what changed: the header and
//! body once, each call when its status changes, and the error once.

use std::collections::HashMap;
use std::io;

use acorn_relay::render::{render_message, Block, BotBlock, CallNode, CallStatus};
use acorn_relay::{Message, Phase};
use console::{style, Term};

const OUTPUT_PREVIEW_CHARS: usize = 80;

#[derive(Debug, Default)]
struct Printed {
    header: bool,
    body: Option<String>,
    error: Option<String>,
    calls: HashMap<String, CallStatus>,
}

pub struct TranscriptPrinter {
    term: Term,
    printed: HashMap<usize, Printed>,
}

impl Default for TranscriptPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptPrinter {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
            printed: HashMap::new(),
        }
    }

    /// Forget everything printed (transcript was cleared).
    pub fn reset(&mut self) {
        self.printed.clear();
    }

    pub fn message(&mut self, index: usize, message: &Message) -> io::Result<()> {
        let printed = self.printed.entry(index).or_default();
        for line in pending_lines(printed, &render_message(message)) {
            self.term.write_line(&line)?;
        }
        Ok(())
    }

    pub fn status(&self, text: &str) -> io::Result<()> {
        self.term.write_line(&format!("{}", style(text).dim()))
    }

    pub fn phase(&self, phase: &Phase) -> io::Result<()> {
        match phase {
            Phase::Queued => self.status("Waiting for the run server..."),
            Phase::Restarting => self.status("Restarting script..."),
            Phase::Running { generating: false } => {
                self.status("(ready: type a message, /restart, /back, or /quit)")
            }
            _ => Ok(()),
        }
    }
}

/// Lines for whatever in `block` has not been printed yet.
fn pending_lines(printed: &mut Printed, block: &Block) -> Vec<String> {
    let mut lines = Vec::new();
    match block {
        Block::User { text } => {
            if !printed.header {
                printed.header = true;
                lines.push(format!("{} {}", style("›").cyan().bold(), text));
            }
        }
        Block::Alert { text, extra } => {
            if !printed.header {
                printed.header = true;
                lines.push(format!("{} {}", style("!").yellow().bold(), text));
                if let Some(extra) = extra {
                    lines.push(format!("  {}", style(extra).dim()));
                }
            }
        }
        Block::Bot(bot) => bot_lines(printed, bot, &mut lines),
    }
    lines
}

fn bot_lines(printed: &mut Printed, bot: &BotBlock, lines: &mut Vec<String>) {
    if !printed.header {
        printed.header = true;
        lines.push(format!(
            "{} {}",
            style(format!("[{}]", bot.initials)).green().bold(),
            style(&bot.sender).bold()
        ));
    }

    if let Some(body) = &bot.body {
        if printed.body.as_ref() != Some(body) {
            printed.body = Some(body.clone());
            lines.extend(body.lines().map(|l| format!("  {l}")));
            if let Some(extra) = &bot.extra {
                lines.push(format!("  {}", style(extra).dim()));
            }
        }
    }

    let mut calls = Vec::new();
    flatten_calls(&bot.calls, 0, &mut calls);
    for (depth, node) in calls {
        if printed.calls.get(&node.id) == Some(&node.status) {
            continue;
        }
        printed.calls.insert(node.id.clone(), node.status);
        lines.push(call_line(depth, node));
    }

    if let Some(error) = &bot.error {
        if printed.error.as_ref() != Some(&error.message) {
            printed.error = Some(error.message.clone());
            lines.push(format!(
                "  {} {}  {}",
                style("✗").red().bold(),
                style(&error.message).red(),
                style(format!("[{}: /restart]", error.action)).dim()
            ));
        }
    }
}

fn flatten_calls<'a>(nodes: &'a [CallNode], depth: usize, out: &mut Vec<(usize, &'a CallNode)>) {
    for node in nodes {
        out.push((depth, node));
        flatten_calls(&node.children, depth + 1, out);
    }
}

fn call_line(depth: usize, node: &CallNode) -> String {
    let indent = "  ".repeat(depth + 1);
    let icon = match node.status {
        CallStatus::Running => style("…").yellow(),
        CallStatus::Finished => style("✓").green(),
        CallStatus::Failed => style("✗").red(),
    };
    let detail = match node.status {
        CallStatus::Failed => node.error.as_deref(),
        _ => node.output.as_deref(),
    }
    .map(preview)
    .map(|text| format!(" {}", style(text).dim()))
    .unwrap_or_default();

    format!("{indent}{icon} {}{detail}", node.label)
}

/// First line of `text`, cut to a preview length.
fn preview(text: &str) -> String {
    let first = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if first.chars().count() <= OUTPUT_PREVIEW_CHARS {
        return first.to_string();
    }
    let cut: String = first.chars().take(OUTPUT_PREVIEW_CHARS).collect();
    format!("{cut}…")
}
