#![forbid(unsafe_code)]

//! Live layout engine for editable knowledge trees.
//!
//! The crate keeps the hierarchical part of a node/edge graph acyclic, derives
//! visibility and removal sets from it, and advances node positions either with
//! a force simulation or with an animated layered layout. Everything is driven
//! by an external per-frame clock through [`LayoutController::frame`].

pub mod config;
pub mod controller;
pub mod error;
pub mod graph;
pub mod layout;
pub mod physics;
pub mod positions;

pub use config::TreeforceConfig;
pub use controller::{
    CommandOutcome, DragRelease, LayoutController, LayoutMode, Notification, ValidationNotice,
};
pub use error::{GraphError, Result};
pub use graph::{Edge, EdgeKind, Graph, Node, NodeKind, NodePatch, NodeShape};
pub use layout::Orientation;
pub use physics::{Frame, Simulation, simulate};
pub use positions::{Position, PositionMap};
