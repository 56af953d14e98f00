//! Chat Ledger
//!
//! Turns short chat messages into spreadsheet rows:
//! - Multi-turn form filling driven by templates (`V`, `G`, `C`, `CO`)
//! - Free-text expenses with amount, currency and category extraction
//! - Pluggable routing: suffix codes, prefixes, mode toggle, fan-out
//! - Per-sender conversation state, serialized per sender
//! - Attachment re-hosting with the link stored in the row
//!
//! FLOW:
//! AUTHORIZE → PARSE → ROUTE → UPLOAD → APPEND → REPLY

pub mod api;
pub mod classifier;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod money;
pub mod routing;
pub mod sinks;
pub mod state;
pub mod templates;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use classifier::CategoryClassifier;
pub use config::Config;
pub use engine::{EngineSettings, LedgerEngine};
pub use error::LedgerError;
