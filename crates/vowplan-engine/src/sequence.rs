use std::sync::atomic::{AtomicU64, Ordering};

/// Kinds of generation request whose results feed the planning state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Tasks,
    Venues,
    Palette,
}

impl RequestKind {
    fn index(self) -> usize {
        match self {
            RequestKind::Tasks => 0,
            RequestKind::Venues => 1,
            RequestKind::Palette => 2,
        }
    }
}

/// Issued when a request starts; only the newest ticket of each kind may
/// apply its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub kind: RequestKind,
    pub seq: u64,
}

/// Monotonic per-kind request counters.
#[derive(Debug, Default)]
pub struct RequestSequence {
    latest: [AtomicU64; 3],
}

impl RequestSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, kind: RequestKind) -> RequestTicket {
        let seq = self.latest[kind.index()].fetch_add(1, Ordering::SeqCst) + 1;
        RequestTicket { kind, seq }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.latest[ticket.kind.index()].load(Ordering::SeqCst) == ticket.seq
    }
}
