//! Node-graph diagram: state store, subscriptions, culling, markers, keys and the canvas view.

mod component;
pub mod config;
pub mod culling;
pub mod error;
pub mod keys;
pub mod markers;
pub mod registry;
mod render;
pub mod selector;
pub mod state;
pub mod types;

pub use component::{FlowCanvas, use_flow_selector};
pub use config::FlowConfig;
pub use error::FlowError;
pub use keys::{KeyCode, SelectionKeyEngine};
pub use markers::{MarkerResolver, MarkerSymbol};
pub use selector::Subscription;
pub use state::{BeforeDelete, DeleteOutcome, DeleteRequest, FlowState, FlowStatePatch, FlowStore, PendingDeletion};
pub use types::{Edge, EdgeMarker, EdgeMarkerType, MarkerType, Node, Transform, XYPosition};
