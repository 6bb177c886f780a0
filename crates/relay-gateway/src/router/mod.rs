//! Route template registry.

mod registry;
mod table;

pub use registry::RouteRegistry;
pub use table::{RouteMatch, RouteTable};
