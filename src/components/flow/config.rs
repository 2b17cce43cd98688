//! Configuration of the interactive view.

use serde::Deserialize;

use super::keys::KeyCode;

/// Color of markers that do not set one.
pub const DEFAULT_MARKER_COLOR: &str = "#b1b1b7";

/// Behaviour knobs of a [`FlowCanvas`](super::FlowCanvas).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FlowConfig {
	/// Deletes the selection. Default `Backspace`.
	pub delete_key_code: KeyCode,
	/// Held to add to the selection. Default `Meta`.
	pub multi_selection_key_code: KeyCode,
	/// Skip nodes outside the viewport.
	pub only_render_visible_elements: bool,
	/// Fallback marker color.
	pub default_marker_color: String,
}

impl Default for FlowConfig {
	fn default() -> Self {
		Self {
			delete_key_code: KeyCode::Combos(vec![vec!["Backspace".to_string()]]),
			multi_selection_key_code: KeyCode::Combos(vec![vec!["Meta".to_string()]]),
			only_render_visible_elements: false,
			default_marker_color: DEFAULT_MARKER_COLOR.to_string(),
		}
	}
}

impl FlowConfig {
	/// Parses a camelCase JSON object; missing fields keep their defaults.
	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}
}
