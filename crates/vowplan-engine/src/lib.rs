mod events;
mod file_store;
mod memory;
mod outbox;
mod sequence;
mod session;
mod store;


pub use events::{Notice, NoticeLevel, SessionEvent};
pub use file_store::{FileStore, sanitize_key};
pub use memory::MemoryStore;
pub use outbox::{DeadLetter, FlushReport, Outbox, OutboxConfig, PendingWrite};
pub use sequence::{RequestKind, RequestSequence, RequestTicket};
pub use session::{
    DreamAction, GenerationOutcome, PlanningAction, PlanningSession, ProposalAction, SessionError,
};
pub use store::{Collection, DocKey, DocumentStore, StoreError, Subscription};
