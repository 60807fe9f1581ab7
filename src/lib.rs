//! Laundry order ledger.
//!
//! Photos of delivery notes and ledger pages go to a multimodal model, which
//! answers with loosely typed order rows. Those rows are normalized into
//! complete [`record::OrderRecord`]s, kept newest-first in an in-memory
//! [`store::OrderStore`], summarised by [`aggregate::aggregate`] and exported
//! as CSV by [`export::serialize`].

pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod llm_extract;
pub mod numeric;
pub mod record;
pub mod session;
pub mod store;

pub use aggregate::AggregateStats;
pub use error::{ConfigError, GatewayError, ScanError};
pub use llm_extract::{ImagePayload, LlmExtractor, OrderExtractor};
pub use record::{OrderField, OrderRecord, RawOrder, normalize};
pub use session::Session;
pub use store::OrderStore;
