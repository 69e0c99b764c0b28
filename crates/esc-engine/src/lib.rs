//! Commission lifecycle engine.
//!
//! Every operation takes the caller's identity explicitly, validates its
//! payload before touching the database, then runs as one Postgres
//! transaction: status transition, escrow movement, wallet log and history
//! diff commit together or not at all. File writes happen after commit.

pub mod caller;
pub mod clock;
pub mod collaborators;
pub mod engine;
pub mod error;
mod ops;
pub mod payloads;
pub mod state_machine;

pub use caller::Caller;
pub use clock::{Clock, SystemClock};
pub use collaborators::{
    new_file_ref, FileKind, FileStore, LocalFileStore, NoPlaceLookup, PlaceDetails, PlaceResolver,
};
pub use engine::CommissionEngine;
pub use error::EngineError;
pub use payloads::{
    ClaimOutcome, CommissionDraft, DeletionOutcome, ImageUpload, ReceiptUpload, ReviewDecision,
    ReviewOutcome, SettlementOutcome, ShipmentInfo,
};
pub use state_machine::{next_status, CommissionEvent, TransitionError};
