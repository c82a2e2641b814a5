//! Filesystem primitives shared by staging and diagnostics.

pub mod copy;
pub mod tree_hash;

pub use copy::{list_dir, merge_copy};
pub use tree_hash::hash_tree;
