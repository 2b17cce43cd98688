//! Error type of the flow core.

/// Problems the flow core can classify. None of these are fatal; the store
/// funnels them to its error channel and keeps going.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
	/// An edge names a marker type outside the known set (`009`).
	#[error("Marker type \"{0}\" doesn't exist.")]
	MarkerTypeMissing(String),
	/// An update targeted a node id that is not in the store (`010`).
	#[error("Couldn't find node with id \"{0}\".")]
	NodeMissing(String),
	/// A key binding could not be parsed (`013`).
	#[error("Invalid key code \"{0}\".")]
	InvalidKeyCode(String),
}

impl FlowError {
	/// Stable code handed to `on_error` handlers.
	pub fn code(&self) -> &'static str {
		match self {
			FlowError::MarkerTypeMissing(_) => "009",
			FlowError::NodeMissing(_) => "010",
			FlowError::InvalidKeyCode(_) => "013",
		}
	}
}

/// Result alias for fallible flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;
