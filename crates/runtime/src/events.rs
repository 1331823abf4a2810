//! Per-kind handler registry fed by the script's `addEventListener`.

use boa_engine::JsObject;

/// The event kinds a script can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// Inbound HTTP requests.
    Fetch,
    /// Cron triggers.
    Scheduled,
    /// Queue consumer batches.
    Queue,
    /// Inbound email.
    Email,
    /// Trace delivery.
    Tail,
}

impl EventKind {
    /// Parse the script-facing kind string.
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "fetch" => Some(Self::Fetch),
            "scheduled" => Some(Self::Scheduled),
            "queue" => Some(Self::Queue),
            "email" => Some(Self::Email),
            "tail" => Some(Self::Tail),
            _ => None,
        }
    }

    /// The script-facing kind string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Scheduled => "scheduled",
            Self::Queue => "queue",
            Self::Email => "email",
            Self::Tail => "tail",
        }
    }
}

/// Ordered handler lists, one per event kind.
///
/// Registration is additive; dispatch walks a kind's list in registration
/// order. Handler objects are GC handles and stay rooted while held here.
#[derive(Default)]
pub struct HandlerRegistry {
    fetch: Vec<JsObject>,
    scheduled: Vec<JsObject>,
    queue: Vec<JsObject>,
    email: Vec<JsObject>,
    tail: Vec<JsObject>,
}

impl HandlerRegistry {
    /// Append a handler for a kind.
    pub fn register(&mut self, kind: EventKind, handler: JsObject) {
        self.list_mut(kind).push(handler);
    }

    /// Snapshot the handlers for a kind, in registration order.
    pub fn handlers(&self, kind: EventKind) -> Vec<JsObject> {
        self.list(kind).to_vec()
    }

    /// Whether any handler is registered for a kind.
    pub fn has_handlers(&self, kind: EventKind) -> bool {
        !self.list(kind).is_empty()
    }

    fn list(&self, kind: EventKind) -> &[JsObject] {
        match kind {
            EventKind::Fetch => &self.fetch,
            EventKind::Scheduled => &self.scheduled,
            EventKind::Queue => &self.queue,
            EventKind::Email => &self.email,
            EventKind::Tail => &self.tail,
        }
    }

    fn list_mut(&mut self, kind: EventKind) -> &mut Vec<JsObject> {
        match kind {
            EventKind::Fetch => &mut self.fetch,
            EventKind::Scheduled => &mut self.scheduled,
            EventKind::Queue => &mut self.queue,
            EventKind::Email => &mut self.email,
            EventKind::Tail => &mut self.tail,
        }
    }
}
