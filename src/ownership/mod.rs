//! Bounded-depth ownership trees
//!
//! Starting from a resolved entity, discover subsidiaries and related
//! charities through the register (downward) and known owners through stored
//! links (upward). Discovered organisations become entities of the same batch
//! with `parent_entity_id` and `ownership_level` set.

pub mod builder;
pub mod tree;

pub use builder::OwnershipBuilder;
pub use tree::{BatchTreeSummary, Direction, EntityNode, OwnershipTree, TreeNode};

pub const DEFAULT_MAX_DEPTH: u32 = 3;
