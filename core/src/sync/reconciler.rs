/// Event reconciliation: merges optimistic local inserts, paginated history
/// and streamed live updates into one ordered log.
///
/// The log is newest-first. Every update builds a fresh sequence and swaps
/// it in behind an Arc, so snapshots handed to consumers are never mutated
/// underneath them.
use crate::types::{AuthorType, ChatEvent, EventKind};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Log lifecycle. `Populated` re-enters `Loading` only while an older page
/// is being appended, never for live updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogPhase {
    Empty,
    Loading,
    Populated,
}

/// Typed tag for client-synthesized placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    /// Optimistic echo of a user message awaiting server confirmation
    UserEcho,
    /// Transient "agent is working" indicator, removed on the first
    /// agent-authored event; never a persisted event
    ThinkingIndicator,
}

/// One entry in the ordered log
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub event: ChatEvent,
    pub pending: Option<PendingKind>,
}

impl EventRecord {
    fn confirmed(event: ChatEvent) -> Self {
        Self {
            event,
            pending: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

pub struct Reconciler {
    chat_id: String,
    phase: LogPhase,
    entries: Arc<Vec<EventRecord>>,
}

impl Reconciler {
    pub fn new(chat_id: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            phase: LogPhase::Empty,
            entries: Arc::new(Vec::new()),
        }
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn phase(&self) -> LogPhase {
        self.phase
    }

    /// Current log snapshot, newest-first. Cheap to clone and stable: later
    /// updates swap in a new sequence instead of mutating this one.
    pub fn snapshot(&self) -> Arc<Vec<EventRecord>> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self, kind: PendingKind) -> usize {
        self.entries
            .iter()
            .filter(|r| r.pending == Some(kind))
            .count()
    }

    pub fn begin_initial_load(&mut self) {
        if self.phase == LogPhase::Empty {
            self.phase = LogPhase::Loading;
        }
    }

    pub fn begin_older_load(&mut self) {
        if self.phase == LogPhase::Populated {
            self.phase = LogPhase::Loading;
        }
    }

    /// Replace the log from a freshly fetched first page (newest-first)
    pub fn install_history(&mut self, events: Vec<ChatEvent>) {
        self.entries = Arc::new(events.into_iter().map(EventRecord::confirmed).collect());
        self.phase = LogPhase::Populated;
    }

    /// Append an older page at the tail. Any event id already present in
    /// the log is dropped from the incoming batch first, guarding against
    /// overlap at page boundaries.
    pub fn append_older(&mut self, older: Vec<ChatEvent>) {
        let seen: HashSet<&str> = self.entries.iter().map(|r| r.event.id.as_str()).collect();
        let fresh: Vec<EventRecord> = older
            .into_iter()
            .filter(|e| !seen.contains(e.id.as_str()))
            .map(EventRecord::confirmed)
            .collect();

        let mut next = (*self.entries).clone();
        next.extend(fresh);
        self.entries = Arc::new(next);
        self.phase = LogPhase::Populated;
    }

    /// Insert the optimistic pair for a just-sent user message: the echo,
    /// plus the thinking indicator as the newest entry.
    pub fn push_optimistic_user(&mut self, content: &str) {
        let now = Utc::now();
        let echo = ChatEvent {
            id: Uuid::new_v4().to_string(),
            chat_id: self.chat_id.clone(),
            author: AuthorType::User,
            kind: EventKind::Message,
            content: content.to_string(),
            payload: None,
            created_at: now,
            updated_at: now,
        };
        let thinking = ChatEvent {
            id: Uuid::new_v4().to_string(),
            chat_id: self.chat_id.clone(),
            author: AuthorType::Agent,
            kind: EventKind::Thinking,
            content: String::new(),
            payload: None,
            created_at: now,
            updated_at: now,
        };

        let mut next = Vec::with_capacity(self.entries.len() + 2);
        next.push(EventRecord {
            event: thinking,
            pending: Some(PendingKind::ThinkingIndicator),
        });
        next.push(EventRecord {
            event: echo,
            pending: Some(PendingKind::UserEcho),
        });
        next.extend(self.entries.iter().cloned());
        self.entries = Arc::new(next);
    }

    /// Merge one live event into the log.
    ///
    /// The backend streams the same tool/reasoning event id repeatedly as
    /// it progresses, so id-based replace (payload supersedes entirely) is
    /// mandatory for those kinds; message events only ever transition from
    /// an optimistic placeholder to the confirmed record.
    pub fn apply_live(&mut self, event: ChatEvent) {
        let mut next = (*self.entries).clone();

        if event.author == AuthorType::Agent {
            if let Some(pos) = next
                .iter()
                .position(|r| r.pending == Some(PendingKind::ThinkingIndicator))
            {
                next.remove(pos);
            }
        }

        match (event.author, event.kind) {
            (AuthorType::User, EventKind::Message) => {
                // Oldest pending echo is the one being confirmed; replace
                // it at its position so the visible order never jumps.
                if let Some(pos) = next
                    .iter()
                    .rposition(|r| r.pending == Some(PendingKind::UserEcho))
                {
                    next[pos] = EventRecord::confirmed(event);
                } else if let Some(pos) = position_of_id(&next, &event.id) {
                    // Duplicate delivery; idempotent
                    next[pos] = EventRecord::confirmed(event);
                } else {
                    next.insert(0, EventRecord::confirmed(event));
                }
            }
            (_, EventKind::Tool) | (_, EventKind::Reasoning) => {
                if let Some(pos) = position_of_id(&next, &event.id) {
                    next[pos] = EventRecord::confirmed(event);
                } else {
                    next.insert(0, EventRecord::confirmed(event));
                }
            }
            _ => {
                if let Some(pos) = position_of_id(&next, &event.id) {
                    next[pos] = EventRecord::confirmed(event);
                } else {
                    next.insert(0, EventRecord::confirmed(event));
                }
            }
        }

        self.entries = Arc::new(next);
    }
}

fn position_of_id(entries: &[EventRecord], id: &str) -> Option<usize> {
    entries
        .iter()
        .position(|r| r.pending.is_none() && r.event.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventPayload, ReasoningPayload, ReasoningStatus, ToolPayload, ToolStatus};
    use chrono::{TimeZone, Utc};

    fn event(id: &str, author: AuthorType, kind: EventKind, content: &str) -> ChatEvent {
        let at = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        ChatEvent {
            id: id.to_string(),
            chat_id: "chat1".to_string(),
            author,
            kind,
            content: content.to_string(),
            payload: None,
            created_at: at,
            updated_at: at,
        }
    }

    fn reasoning(id: &str, status: ReasoningStatus, steps: &[&str]) -> ChatEvent {
        let mut e = event(id, AuthorType::Agent, EventKind::Reasoning, "");
        e.payload = Some(EventPayload::Reasoning(ReasoningPayload {
            trajectory: steps.iter().map(|s| s.to_string()).collect(),
            status,
        }));
        e
    }

    fn tool(id: &str, status: ToolStatus, calls: usize) -> ChatEvent {
        let mut e = event(id, AuthorType::Agent, EventKind::Tool, "");
        e.payload = Some(EventPayload::Tool(ToolPayload {
            status,
            tool_calls: (0..calls)
                .map(|i| crate::types::ToolExecution {
                    tool_name: format!("tool-{}", i),
                    input_payload: Default::default(),
                    output_payload: None,
                    error: None,
                    status,
                    started_at: None,
                    completed_at: None,
                })
                .collect(),
        }));
        e
    }

    #[test]
    fn test_tool_event_series_keeps_single_entry_with_latest_payload() {
        let mut rec = Reconciler::new("chat1");
        rec.install_history(Vec::new());

        rec.apply_live(tool("t1", ToolStatus::Started, 1));
        rec.apply_live(tool("t1", ToolStatus::InProgress, 2));
        rec.apply_live(tool("t1", ToolStatus::Completed, 3));

        let log = rec.snapshot();
        assert_eq!(log.len(), 1);
        match &log[0].event.payload {
            Some(EventPayload::Tool(p)) => {
                assert_eq!(p.status, ToolStatus::Completed);
                assert_eq!(p.tool_calls.len(), 3);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
    }

    #[test]
    fn test_user_echo_replaced_in_place() {
        let mut rec = Reconciler::new("chat1");
        rec.install_history(vec![event("old", AuthorType::Agent, EventKind::Message, "hi")]);

        rec.push_optimistic_user("hello");
        assert_eq!(rec.pending_count(PendingKind::UserEcho), 1);
        assert_eq!(rec.len(), 3);

        rec.apply_live(event("real-1", AuthorType::User, EventKind::Message, "hello"));

        let log = rec.snapshot();
        assert_eq!(log.len(), 3);
        assert_eq!(rec.pending_count(PendingKind::UserEcho), 0);
        // same position: thinking indicator, confirmed echo, old message
        assert_eq!(log[1].event.id, "real-1");
        assert!(log[1].pending.is_none());
        assert_eq!(log[2].event.id, "old");
    }

    #[test]
    fn test_confirmation_never_duplicates() {
        let mut rec = Reconciler::new("chat1");
        rec.install_history(Vec::new());
        rec.push_optimistic_user("hello");

        let confirm = event("real-1", AuthorType::User, EventKind::Message, "hello");
        rec.apply_live(confirm.clone());
        rec.apply_live(confirm);

        let log = rec.snapshot();
        assert_eq!(log.iter().filter(|r| r.event.id == "real-1").count(), 1);
    }

    #[test]
    fn test_agent_event_removes_thinking_indicator() {
        let mut rec = Reconciler::new("chat1");
        rec.install_history(Vec::new());
        rec.push_optimistic_user("hello");
        assert_eq!(rec.pending_count(PendingKind::ThinkingIndicator), 1);

        rec.apply_live(event("a1", AuthorType::Agent, EventKind::Message, "working on it"));

        assert_eq!(rec.pending_count(PendingKind::ThinkingIndicator), 0);
        let log = rec.snapshot();
        assert_eq!(log[0].event.id, "a1");
    }

    #[test]
    fn test_append_older_dedups_page_overlap() {
        let mut rec = Reconciler::new("chat1");
        rec.install_history(vec![
            event("e5", AuthorType::Agent, EventKind::Message, "5"),
            event("e4", AuthorType::Agent, EventKind::Message, "4"),
            event("e3", AuthorType::Agent, EventKind::Message, "3"),
        ]);

        // K = 3 incoming, M = 1 duplicate -> N + (K - M) = 5
        rec.begin_older_load();
        assert_eq!(rec.phase(), LogPhase::Loading);
        rec.append_older(vec![
            event("e3", AuthorType::Agent, EventKind::Message, "3"),
            event("e2", AuthorType::Agent, EventKind::Message, "2"),
            event("e1", AuthorType::Agent, EventKind::Message, "1"),
        ]);

        assert_eq!(rec.len(), 5);
        assert_eq!(rec.phase(), LogPhase::Populated);
        let log = rec.snapshot();
        assert_eq!(log[3].event.id, "e2");
        assert_eq!(log[4].event.id, "e1");
    }

    #[test]
    fn test_unknown_message_event_prepends() {
        let mut rec = Reconciler::new("chat1");
        rec.install_history(vec![event("old", AuthorType::Agent, EventKind::Message, "hi")]);

        rec.apply_live(event("new", AuthorType::Agent, EventKind::Error, "boom"));

        let log = rec.snapshot();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].event.id, "new");
    }

    #[test]
    fn test_snapshots_are_stable_across_updates() {
        let mut rec = Reconciler::new("chat1");
        rec.install_history(vec![event("e1", AuthorType::Agent, EventKind::Message, "1")]);

        let before = rec.snapshot();
        rec.apply_live(event("e2", AuthorType::Agent, EventKind::Message, "2"));

        assert_eq!(before.len(), 1);
        assert_eq!(rec.snapshot().len(), 2);
    }

    #[test]
    fn test_full_send_and_stream_scenario() {
        // Empty conversation; user sends "hello"
        let mut rec = Reconciler::new("chat1");
        rec.begin_initial_load();
        rec.install_history(Vec::new());

        rec.push_optimistic_user("hello");
        {
            let log = rec.snapshot();
            assert_eq!(log[0].pending, Some(PendingKind::ThinkingIndicator));
            assert_eq!(log[1].pending, Some(PendingKind::UserEcho));
            assert_eq!(log[1].event.content, "hello");
        }

        // Server confirms the user message: replaced in place
        rec.apply_live(event("u1", AuthorType::User, EventKind::Message, "hello"));
        {
            let log = rec.snapshot();
            assert_eq!(log.len(), 2);
            assert_eq!(log[0].pending, Some(PendingKind::ThinkingIndicator));
            assert_eq!(log[1].event.id, "u1");
        }

        // Reasoning streams twice under one id; thinking indicator drops
        rec.apply_live(reasoning("r1", ReasoningStatus::Thinking, &[]));
        rec.apply_live(reasoning("r1", ReasoningStatus::Complete, &["a", "b", "c"]));

        let log = rec.snapshot();
        assert_eq!(log.len(), 2);
        assert_eq!(rec.pending_count(PendingKind::ThinkingIndicator), 0);
        match &log[0].event.payload {
            Some(EventPayload::Reasoning(r)) => {
                assert_eq!(r.status, ReasoningStatus::Complete);
                assert_eq!(r.trajectory.len(), 3);
            }
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(log[1].event.id, "u1");
    }
}
