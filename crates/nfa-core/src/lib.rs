pub mod config;
pub mod error;
pub mod hierarchy;
pub mod matcher;
pub mod query;
pub mod result;
pub mod rule;
pub mod ruleset;

pub use config::*;
pub use error::{Error, Result};
pub use hierarchy::*;
pub use query::*;
pub use result::*;
pub use rule::*;
pub use ruleset::*;

// nftables data model, query validation and match predicates
