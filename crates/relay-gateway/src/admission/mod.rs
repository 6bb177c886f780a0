//! Network-level admission control.

mod blocklist;
mod refresher;

pub use blocklist::{BlocklistCache, BlocklistSnapshot, normalize_host};
pub use refresher::BlocklistRefresher;
