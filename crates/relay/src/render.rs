//! Transcript → display blocks.
//!
//! Pure mapping; front ends decide how blocks look.

use std::collections::{HashMap, HashSet};

use acorn_protocol::{CallFrame, FrameKind};

use crate::transcript::{CallFrames, Message, MessageKind};

pub const DEFAULT_SENDER: &str = "System";
pub const RESTART_ACTION: &str = "Restart Script";

#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    User { text: String },
    Bot(BotBlock),
    Alert { text: String, extra: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotBlock {
    pub sender: String,
    pub initials: String,
    /// Markdown body
    pub body: Option<String>,
    pub extra: Option<String>,
    pub error: Option<ErrorNotice>,
    pub calls: Vec<CallNode>,
}

/// Inline run error with the action that recovers from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub message: String,
    pub action: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Running,
    Finished,
    Failed,
}

impl CallStatus {
    pub fn of(frame: &CallFrame) -> Self {
        if frame.error.is_some() {
            return CallStatus::Failed;
        }
        match frame.kind {
            FrameKind::CallFinish | FrameKind::RunFinish => CallStatus::Finished,
            _ => CallStatus::Running,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    pub id: String,
    /// Tool name, or the call id when the frame names no tool
    pub label: String,
    pub status: CallStatus,
    pub output: Option<String>,
    pub error: Option<String>,
    pub children: Vec<CallNode>,
}

pub fn render(messages: &[Message]) -> Vec<Block> {
    messages.iter().map(render_message).collect()
}

pub fn render_message(message: &Message) -> Block {
    match message.kind {
        MessageKind::User => Block::User {
            text: message.text.clone().unwrap_or_default(),
        },
        MessageKind::Alert => Block::Alert {
            text: message.text.clone().unwrap_or_default(),
            extra: message.extra.clone(),
        },
        MessageKind::Bot => {
            let sender = message
                .sender_name
                .clone()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_SENDER.to_string());
            Block::Bot(BotBlock {
                initials: abbreviate(&sender),
                sender,
                body: message.text.clone(),
                extra: message.extra.clone(),
                error: message.error.clone().map(|message| ErrorNotice {
                    message,
                    action: RESTART_ACTION,
                }),
                calls: message.tool_calls.as_ref().map(call_tree).unwrap_or_default(),
            })
        }
    }
}

/// Nest frames under their parent. Frames with an unknown parent become
/// roots; order follows first arrival.
pub fn call_tree(calls: &CallFrames) -> Vec<CallNode> {
    let ids: HashSet<&str> = calls.iter().map(|f| f.id.as_str()).collect();
    let mut children: HashMap<&str, Vec<&CallFrame>> = HashMap::new();
    let mut roots: Vec<&CallFrame> = Vec::new();

    for frame in calls.iter() {
        match frame.parent_id.as_deref() {
            Some(parent) if parent != frame.id && ids.contains(parent) => {
                children.entry(parent).or_default().push(frame);
            }
            _ => roots.push(frame),
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut tree: Vec<CallNode> = roots
        .into_iter()
        .filter_map(|frame| build_node(frame, &children, &mut visited))
        .collect();

    // Parent cycles leave frames unreachable from any root.
    for frame in calls.iter() {
        if let Some(node) = build_node(frame, &children, &mut visited) {
            tree.push(node);
        }
    }
    tree
}

fn build_node<'a>(
    frame: &'a CallFrame,
    children: &HashMap<&str, Vec<&'a CallFrame>>,
    visited: &mut HashSet<&'a str>,
) -> Option<CallNode> {
    if !visited.insert(frame.id.as_str()) {
        return None;
    }
    let kids = children
        .get(frame.id.as_str())
        .map(|kids| {
            kids.iter()
                .filter_map(|kid| build_node(*kid, children, visited))
                .collect()
        })
        .unwrap_or_default();

    Some(CallNode {
        id: frame.id.clone(),
        label: frame.tool_name().unwrap_or(frame.id.as_str()).to_string(),
        status: CallStatus::of(frame),
        output: frame.latest_output().map(str::to_string),
        error: frame.error.clone(),
        children: kids,
    })
}

/// Two-letter avatar initials: first letters of the first two words, where
/// words split on whitespace, `_`, `-`, and before capitals.
pub fn abbreviate(name: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for ch in name.chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            words.push(std::mem::take(&mut current));
            continue;
        }
        if ch.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(ch);
    }
    words.push(current);

    words
        .iter()
        .filter_map(|w| w.chars().next())
        .take(2)
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use acorn_protocol::{FrameOutput, FrameTool};

    fn frame(id: &str, parent: Option<&str>, kind: FrameKind) -> CallFrame {
        let mut frame = CallFrame::new(id, kind);
        frame.parent_id = parent.map(str::to_string);
        frame
    }

    #[test]
    fn abbreviates_names() {
        assert_eq!(abbreviate("System"), "S");
        assert_eq!(abbreviate("GPTScript"), "GP");
        assert_eq!(abbreviate("web search"), "WS");
        assert_eq!(abbreviate("my-tool_name"), "MT");
        assert_eq!(abbreviate("fetchPage"), "FP");
        assert_eq!(abbreviate(""), "");
    }

    #[test]
    fn bot_block_defaults_sender_and_offers_restart() {
        let mut message = Message::bot("**hello**", None);
        message.error = Some("boom".to_string());

        let Block::Bot(block) = render_message(&message) else {
            panic!("expected bot block");
        };
        assert_eq!(block.sender, "System");
        assert_eq!(block.initials, "S");
        assert_eq!(block.body.as_deref(), Some("**hello**"));
        assert_eq!(
            block.error,
            Some(ErrorNotice {
                message: "boom".to_string(),
                action: "Restart Script",
            })
        );
    }

    #[test]
    fn frames_nest_under_parents_and_orphans_become_roots() {
        let calls: CallFrames = [
            frame("root", None, FrameKind::CallStart),
            frame("child", Some("root"), FrameKind::CallFinish),
            frame("orphan", Some("missing"), FrameKind::CallProgress),
            frame("grandchild", Some("child"), FrameKind::CallStart),
        ]
        .into_iter()
        .collect();

        let tree = call_tree(&calls);
        let roots: Vec<&str> = tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, vec!["root", "orphan"]);

        let child = &tree[0].children[0];
        assert_eq!(child.id, "child");
        assert_eq!(child.status, CallStatus::Finished);
        assert_eq!(child.children[0].id, "grandchild");
        assert_eq!(tree[0].status, CallStatus::Running);
    }

    #[test]
    fn parent_cycles_still_render_every_frame() {
        let calls: CallFrames = [
            frame("a", Some("b"), FrameKind::CallStart),
            frame("b", Some("a"), FrameKind::CallStart),
        ]
        .into_iter()
        .collect();

        let tree = call_tree(&calls);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, "a");
        assert_eq!(tree[0].children[0].id, "b");
    }

    #[test]
    fn call_node_shows_tool_name_and_latest_output() {
        let mut f = frame("1", None, FrameKind::CallProgress);
        f.tool = Some(FrameTool {
            name: "browser".to_string(),
            ..Default::default()
        });
        f.output = vec![FrameOutput {
            content: "fetched 3 pages".to_string(),
            ..Default::default()
        }];
        let mut failed = frame("2", None, FrameKind::CallFinish);
        failed.error = Some("timeout".to_string());

        let tree = call_tree(&[f, failed].into_iter().collect());
        assert_eq!(tree[0].label, "browser");
        assert_eq!(tree[0].output.as_deref(), Some("fetched 3 pages"));
        assert_eq!(tree[1].label, "2");
        assert_eq!(tree[1].status, CallStatus::Failed);
    }

    #[test]
    fn render_keeps_message_order() {
        let messages = vec![
            Message::alert("Connected"),
            Message::user("hi"),
            Message::bot("hello", Some("Greeter Bot".to_string())),
        ];
        let blocks = render(&messages);
        assert!(matches!(blocks[0], Block::Alert { .. }));
        assert!(matches!(blocks[1], Block::User { .. }));
        match &blocks[2] {
            Block::Bot(block) => assert_eq!(block.initials, "GB"),
            other => panic!("unexpected block {other:?}"),
        }
    }
}
