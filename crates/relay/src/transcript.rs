//! Append-only transcript of a run session.

use acorn_protocol::CallFrame;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Bot,
    Alert,
}

/// Call frames of one bot message, in first-seen order.
///
/// Updating an id replaces the stored frame in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CallFrames {
    frames: Vec<CallFrame>,
}

impl CallFrames {
    /// Insert or overwrite by id. Returns true when the id was new.
    pub fn upsert(&mut self, frame: CallFrame) -> bool {
        match self.frames.iter_mut().find(|f| f.id == frame.id) {
            Some(existing) => {
                *existing = frame;
                false
            }
            None => {
                self.frames.push(frame);
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&CallFrame> {
        self.frames.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CallFrame> {
        self.frames.iter()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FromIterator<CallFrame> for CallFrames {
    fn from_iter<I: IntoIterator<Item = CallFrame>>(iter: I) -> Self {
        let mut calls = CallFrames::default();
        for frame in iter {
            calls.upsert(frame);
        }
        calls
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<CallFrames>,
    /// Pre-rendered detail shown under the message body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl Message {
    fn empty(kind: MessageKind) -> Self {
        Self {
            kind,
            text: None,
            error: None,
            sender_name: None,
            tool_calls: None,
            extra: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::empty(MessageKind::User)
        }
    }

    pub fn bot(text: impl Into<String>, sender_name: Option<String>) -> Self {
        Self {
            text: Some(text.into()),
            sender_name,
            ..Self::empty(MessageKind::Bot)
        }
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::empty(MessageKind::Alert)
        }
    }

    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra = Some(extra.into());
        self
    }
}

/// Which message a transcript operation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptChange {
    Appended(usize),
    Updated(usize),
}

impl TranscriptChange {
    pub fn index(&self) -> usize {
        match *self {
            TranscriptChange::Appended(i) | TranscriptChange::Updated(i) => i,
        }
    }
}

/// Messages in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.messages.get(index)
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn push(&mut self, message: Message) -> TranscriptChange {
        self.messages.push(message);
        TranscriptChange::Appended(self.messages.len() - 1)
    }

    pub fn push_user(&mut self, text: impl Into<String>) -> TranscriptChange {
        self.push(Message::user(text))
    }

    pub fn push_bot_text(
        &mut self,
        text: impl Into<String>,
        sender_name: Option<String>,
    ) -> TranscriptChange {
        self.push(Message::bot(text, sender_name))
    }

    /// Record a call frame. A known call id is overwritten on the message
    /// that already holds it; a new id goes on the latest bot message, or
    /// starts one when the tail is not a bot message.
    pub fn merge_frame(&mut self, frame: CallFrame) -> TranscriptChange {
        let target = self
            .message_with_call(&frame.id)
            .or_else(|| self.tail_bot_index());
        if let Some(index) = target {
            self.messages[index]
                .tool_calls
                .get_or_insert_with(CallFrames::default)
                .upsert(frame);
            return TranscriptChange::Updated(index);
        }

        let mut message = Message::empty(MessageKind::Bot);
        message.tool_calls = Some(std::iter::once(frame).collect());
        self.push(message)
    }

    /// Attach an error string to the latest bot message, replacing any
    /// earlier one there.
    pub fn attach_error(&mut self, error: impl Into<String>) -> TranscriptChange {
        let error = error.into();
        if let Some(index) = self.tail_bot_index() {
            self.messages[index].error = Some(error);
            return TranscriptChange::Updated(index);
        }

        let mut message = Message::empty(MessageKind::Bot);
        message.error = Some(error);
        self.push(message)
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Newest message holding a frame with this call id
    fn message_with_call(&self, id: &str) -> Option<usize> {
        self.messages.iter().rposition(|m| {
            m.tool_calls
                .as_ref()
                .is_some_and(|calls| calls.get(id).is_some())
        })
    }

    fn tail_bot_index(&self) -> Option<usize> {
        match self.messages.last() {
            Some(m) if m.kind == MessageKind::Bot => Some(self.messages.len() - 1),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acorn_protocol::FrameKind;

    fn frame(id: &str, kind: FrameKind) -> CallFrame {
        CallFrame::new(id, kind)
    }

    #[test]
    fn messages_keep_arrival_order() {
        let mut transcript = Transcript::default();
        transcript.push_bot_text("one", None);
        transcript.push_user("two");
        transcript.push_bot_text("three", Some("Helper".to_string()));

        let texts: Vec<&str> = transcript
            .messages()
            .iter()
            .filter_map(|m| m.text.as_deref())
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
    }

    #[test]
    fn frames_merge_by_id_last_write_wins() {
        let mut transcript = Transcript::default();
        transcript.push_bot_text("thinking", None);

        assert_eq!(
            transcript.merge_frame(frame("1", FrameKind::CallStart)),
            TranscriptChange::Updated(0)
        );
        transcript.merge_frame(frame("2", FrameKind::CallStart));
        transcript.merge_frame(frame("1", FrameKind::CallFinish));

        let calls = transcript.messages()[0]
            .tool_calls
            .as_ref()
            .expect("calls recorded");
        let ids: Vec<&str> = calls.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(calls.get("1").map(|f| f.kind), Some(FrameKind::CallFinish));
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn later_frame_updates_call_on_earlier_message() {
        let mut transcript = Transcript::default();
        transcript.push_bot_text("a", None);
        transcript.merge_frame(frame("1", FrameKind::CallStart));
        transcript.push_bot_text("b", None);

        assert_eq!(
            transcript.merge_frame(frame("1", FrameKind::CallFinish)),
            TranscriptChange::Updated(0)
        );

        let kinds: Vec<Option<FrameKind>> = transcript
            .messages()
            .iter()
            .map(|m| m.tool_calls.as_ref().and_then(|c| c.get("1")).map(|f| f.kind))
            .collect();
        assert_eq!(kinds, vec![Some(FrameKind::CallFinish), None]);

        // New ids still go on the tail message.
        assert_eq!(
            transcript.merge_frame(frame("2", FrameKind::CallStart)),
            TranscriptChange::Updated(1)
        );
    }

    #[test]
    fn frame_after_user_message_starts_bot_message() {
        let mut transcript = Transcript::default();
        transcript.push_user("go");

        let change = transcript.merge_frame(frame("7", FrameKind::CallStart));
        assert_eq!(change, TranscriptChange::Appended(1));

        let message = transcript.last().expect("bot message");
        assert_eq!(message.kind, MessageKind::Bot);
        assert!(message.text.is_none());
        assert_eq!(message.tool_calls.as_ref().map(CallFrames::len), Some(1));
    }

    #[test]
    fn error_attaches_to_tail_bot_message() {
        let mut transcript = Transcript::default();
        transcript.push_bot_text("partial answer", None);

        assert_eq!(
            transcript.attach_error("boom"),
            TranscriptChange::Updated(0)
        );
        assert_eq!(transcript.messages()[0].error.as_deref(), Some("boom"));

        transcript.push_user("again?");
        assert_eq!(
            transcript.attach_error("still broken"),
            TranscriptChange::Appended(2)
        );
        assert_eq!(transcript.last().and_then(|m| m.error.as_deref()), Some("still broken"));
    }

    #[test]
    fn alerts_are_not_merge_targets() {
        let mut transcript = Transcript::default();
        transcript.push(Message::alert("Connected").with_extra("ws://localhost"));

        let change = transcript.merge_frame(frame("1", FrameKind::CallStart));
        assert_eq!(change, TranscriptChange::Appended(1));
        assert_eq!(transcript.messages()[0].extra.as_deref(), Some("ws://localhost"));
    }
}
