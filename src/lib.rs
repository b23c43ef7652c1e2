pub mod codec;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod persist;
pub mod position;
pub mod store;
pub mod zobrist;

pub use config::{DedupConfig, StoreConfig};
pub use driver::{DepthSummary, ExpansionDriver, StopCondition, run_dedup_expansion};
pub use engine::{Board, START_FEN, perft};
pub use error::{DedupError, DedupResult};
pub use store::{InsertOutcome, RecordStore};
pub use zobrist::{Hash128, HashKey};
