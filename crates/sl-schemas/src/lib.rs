//! Shared domain and wire types for the secondlayer pipeline.
//!
//! Everything here is transport-free: plain serde structs and enums consumed
//! by the store (`sl-db`), the matcher (`sl-matcher`), the dispatcher
//! (`sl-dispatch`) and the HTTP surface (`sl-daemon`).

pub mod chain;
pub mod error;
pub mod filter;
pub mod job;
pub mod payload;
pub mod stream;

pub use chain::{Block, Event, EventPayload, EventType, Transaction, TxType};
pub use error::{ApiError, ErrorCode};
pub use filter::{Filter, StreamOptions};
pub use job::JobStatus;
pub use payload::{BlockSummary, EventMatch, MatchPayload, TransactionMatch, WebhookPayload};
pub use stream::{apply_action, DeliveryOutcome, StreamAction, StreamStatus};
