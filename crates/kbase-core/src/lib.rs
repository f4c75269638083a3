//! # kbase-core
//!
//! Core types, traits, and domain rules for the kbase knowledge base.
//!
//! This crate holds everything that does not touch the database or the
//! network: models, the error type, repository traits, tag parsing,
//! identity validation, engagement merging and upload naming rules.

pub mod defaults;
pub mod engagement;
pub mod error;
pub mod file_safety;
pub mod identity;
pub mod models;
pub mod tags;
pub mod traits;

// Re-export commonly used types at crate root
pub use engagement::{EngagementMap, EngagementStats, Metric};
pub use error::{Error, Result};
pub use file_safety::{FileRules, Rejection};
pub use identity::{IdentityConfig, ResolvedIdentity, UserId};
pub use models::*;
pub use tags::{parse_tag_list, ParsedTags};
pub use traits::*;
