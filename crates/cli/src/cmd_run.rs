//! `acorn run <script>`: run a script and chat with it.
//!
//! Stdin lines are chat messages; `/restart`, `/interrupt`, `/back`, and
//! `/quit` control the session. Tool arguments come from `--arg name=value`
//! or are prompted for when the form opens.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use acorn_connectors::ApiClient;
use acorn_relay::{Phase, RelayConfig, RunSession, SessionState, SessionUpdate};
use anyhow::{bail, Context};
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use crate::display::TranscriptPrinter;

pub struct RunOptions {
    pub file: String,
    pub args: Vec<(String, String)>,
    /// Chat messages sent one per turn after the run goes idle
    pub messages: Vec<String>,
    /// Exit once the run is idle with nothing left to send
    pub once: bool,
}

/// Parse a `name=value` argument.
pub fn parse_arg(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected name=value, got {raw:?}")),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Restart,
    Interrupt,
    Back,
    Quit,
    Chat(String),
    Empty,
}

fn parse_line(line: &str) -> Line {
    match line.trim() {
        "" => Line::Empty,
        "/restart" => Line::Restart,
        "/interrupt" => Line::Interrupt,
        "/back" => Line::Back,
        "/quit" | "/exit" => Line::Quit,
        _ => Line::Chat(line.to_string()),
    }
}

/// Argument names still needing a value, in form order.
fn missing_fields(state: &SessionState, given: &BTreeMap<String, String>) -> VecDeque<String> {
    state
        .form
        .names()
        .iter()
        .filter(|name| !given.contains_key(*name))
        .cloned()
        .collect()
}

pub async fn run(config: &RelayConfig, api: ApiClient, opts: RunOptions) -> anyhow::Result<()> {
    let session = RunSession::open(config, &opts.file, Arc::new(api));
    let result = drive(&session, &opts).await;
    session.close().await;
    result
}

async fn drive(session: &RunSession, opts: &RunOptions) -> anyhow::Result<()> {
    let handle = session.handle();
    let (state, mut updates) = handle.subscribe().await?;
    let mut printer = TranscriptPrinter::new();
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let given: BTreeMap<String, String> = opts.args.iter().cloned().collect();
    let mut scripted: VecDeque<String> = opts.messages.iter().cloned().collect();
    let mut prompting: VecDeque<String> = VecDeque::new();

    printer.status(&format!("Loading {}...", state.target.path))?;
    if state.phase == Phase::Form {
        prompting = open_form(session, &given).await?;
    }

    loop {
        tokio::select! {
            update = updates.recv() => {
                let update = match update {
                    Ok(update) => update,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(
                            component = "cli",
                            event = "run.updates_lagged",
                            skipped,
                            "Dropped transcript updates"
                        );
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                match update {
                    SessionUpdate::MessageAppended { index, message }
                    | SessionUpdate::MessageUpdated { index, message } => {
                        printer.message(index, &message)?;
                    }
                    SessionUpdate::TranscriptCleared => printer.reset(),
                    SessionUpdate::ConnectionChanged { connected } => {
                        printer.status(if connected { "Connected." } else { "Disconnected, reconnecting..." })?;
                    }
                    SessionUpdate::PhaseChanged { phase } => {
                        printer.phase(&phase)?;
                        match phase {
                            Phase::Form => prompting = open_form(session, &given).await?,
                            Phase::Running { generating: false } => {
                                if let Some(text) = scripted.pop_front() {
                                    handle.send_user_message(text).await;
                                } else if opts.once {
                                    break;
                                }
                            }
                            Phase::Failed { .. } if opts.once => {
                                bail!("run failed: {}", handle.snapshot().error().unwrap_or("unknown error"));
                            }
                            _ => {}
                        }
                    }
                }
            }

            line = stdin.next_line(), if stdin_open => {
                let Some(line) = line.context("reading stdin")? else {
                    if let Some(name) = prompting.front() {
                        bail!("stdin closed before a value for {name:?} was given (use --arg {name}=...)");
                    }
                    stdin_open = false;
                    if !opts.once {
                        break;
                    }
                    continue;
                };

                if let Some(name) = prompting.pop_front() {
                    handle.set_form_value(name, line.trim_end()).await?;
                    match prompting.front() {
                        Some(next) => prompt_field(session, next),
                        None => handle.submit_form().await,
                    }
                    continue;
                }

                match parse_line(&line) {
                    Line::Restart => handle.restart().await,
                    Line::Interrupt => handle.interrupt().await,
                    Line::Back => handle.back().await,
                    Line::Quit => break,
                    Line::Chat(text) => {
                        let snapshot = handle.snapshot();
                        if snapshot.connected && snapshot.running() {
                            handle.send_user_message(text).await;
                        } else {
                            printer.status("Not running yet; message not sent.")?;
                        }
                    }
                    Line::Empty => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                if handle.snapshot().generating() {
                    handle.interrupt().await;
                    printer.status("Interrupted. Press Ctrl-C again to quit.")?;
                } else {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Fill the form from `--arg` values. Returns the fields still to prompt
/// for; submits right away when there are none.
async fn open_form(
    session: &RunSession,
    given: &BTreeMap<String, String>,
) -> anyhow::Result<VecDeque<String>> {
    let handle = session.handle();
    for (name, value) in given {
        handle
            .set_form_value(name.clone(), value.clone())
            .await
            .with_context(|| format!("--arg {name}"))?;
    }

    let state = handle.state().await?;
    let missing = missing_fields(&state, given);
    match missing.front() {
        Some(first) => prompt_field(session, first),
        None => handle.submit_form().await,
    }
    Ok(missing)
}

fn prompt_field(session: &RunSession, name: &str) {
    let snapshot = session.handle().snapshot();
    let description = snapshot
        .tool
        .as_ref()
        .and_then(|tool| tool.property(name))
        .and_then(|p| p.description.clone());
    match description {
        Some(description) => println!(
            "{} {}",
            style(format!("{name}:")).bold(),
            style(description).dim()
        ),
        None => println!("{}", style(format!("{name}:")).bold()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acorn_relay::transition::RunTarget;
    use acorn_relay::FormCollector;

    #[test]
    fn parses_name_value_args() {
        assert_eq!(
            parse_arg("url=https://a.example/?q=1"),
            Ok(("url".to_string(), "https://a.example/?q=1".to_string()))
        );
        assert_eq!(parse_arg("empty="), Ok(("empty".to_string(), String::new())));
        assert!(parse_arg("novalue").is_err());
        assert!(parse_arg("=x").is_err());
    }

    #[test]
    fn parses_control_lines() {
        assert_eq!(parse_line("/restart"), Line::Restart);
        assert_eq!(parse_line("  /quit "), Line::Quit);
        assert_eq!(parse_line(""), Line::Empty);
        assert_eq!(
            parse_line("what about /restart?"),
            Line::Chat("what about /restart?".to_string())
        );
    }

    #[test]
    fn prompts_only_for_missing_fields() {
        let mut state = SessionState::new("s", RunTarget::default());
        state.form = FormCollector::new(["depth".to_string(), "url".to_string()]);
        let mut given = BTreeMap::new();
        given.insert("url".to_string(), "https://a.example".to_string());

        assert_eq!(missing_fields(&state, &given), VecDeque::from(vec!["depth".to_string()]));
    }
}
