//! Donation pipeline services
//!
//! Each service holds only `Arc` handles to the store, media directories,
//! wordlist and random source it needs, so the HTTP layer can share them
//! across requests without extra locking.

pub mod consensus;
pub mod export;
pub mod intake;
pub mod labels;
pub mod reports;

pub use consensus::{ConsensusEngine, ConsensusPolicy, DecisionMode, VoteDedupe};
pub use export::ExportService;
pub use intake::{IntakeGate, IntakeSettings};
pub use labels::LabelService;
pub use reports::{ReportChannel, DEFAULT_ABUSE_THRESHOLD};
