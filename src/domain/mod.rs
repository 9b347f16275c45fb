//! Domain layer: trees, calibrations and estimation entities
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod arena;
pub mod calibration;
pub mod display;
pub mod entities;
pub mod error;
pub mod newick;
pub mod nexus;
mod rooting;

pub use arena::{NodeData, NodeId, NodeNumbering, PhyloTree, TreeNode};
pub use calibration::{Anchor, CalibrationRecord, CalibrationSpec, CalibrationTable};
pub use display::TreeDisplay;
pub use entities::*;
pub use error::{DomainError, ErrorKind, ValidationError};
pub use newick::{parse_newick, write_newick};
pub use nexus::{is_nexus, parse_nexus, write_nexus};
