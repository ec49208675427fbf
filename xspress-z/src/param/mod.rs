//! Hierarchical, path-addressed view of the detector state.

pub mod layout;
pub mod tree;
pub mod value;

pub use layout::{CONFIG_PATHS, detector_tree};
pub use tree::{Leaf, ParameterNode, ParameterTree, SetOutcome, Setter};
