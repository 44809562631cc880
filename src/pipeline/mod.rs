//! Pipeline stages for watcher operations.
//!
//! - `extract`: page through the listing and build records
//! - `diff` / `compile`: turn two snapshots into per-subscriber messages
//! - `broadcast`: deliver them under the send rate limit
//! - `cycle` / `listen`: the watcher and inbound loops

pub mod broadcast;
pub mod compile;
pub mod cycle;
pub mod diff;
pub mod extract;
pub mod listen;
pub mod normalize;
pub mod validate;

pub use broadcast::{BroadcastReport, Broadcaster, split_message};
pub use compile::{Compiled, DEFAULT_ENTRY_WIDTH, compile, truncate};
pub use cycle::{CycleOutcome, run_cycle, watch};
pub use diff::{DiffOp, DiffResult, diff, diff_lines};
pub use extract::Extractor;
pub use listen::Listener;
pub use normalize::{extract_path, is_active_bounty, normalize};
pub use validate::validate_page;
