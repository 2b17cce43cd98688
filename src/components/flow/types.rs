//! Diagram data model: geometry, nodes, edges and edge markers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::FlowError;

/// A point in flow (model) coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct XYPosition {
	/// Horizontal coordinate.
	pub x: f64,
	/// Vertical coordinate.
	pub y: f64,
}

impl XYPosition {
	/// Point at `(x, y)`.
	pub fn new(x: f64, y: f64) -> Self {
		Self { x, y }
	}
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
	/// Left edge.
	pub x: f64,
	/// Top edge.
	pub y: f64,
	/// Horizontal extent.
	pub width: f64,
	/// Vertical extent.
	pub height: f64,
}

impl Rect {
	/// Rectangle with its top-left corner at `(x, y)`.
	pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
		Self {
			x,
			y,
			width,
			height,
		}
	}

	/// Area shared with `other`, zero when they do not overlap.
	pub fn overlapping_area(&self, other: &Rect) -> f64 {
		let x_overlap =
			((self.x + self.width).min(other.x + other.width) - self.x.max(other.x)).max(0.0);
		let y_overlap =
			((self.y + self.height).min(other.y + other.height) - self.y.max(other.y)).max(0.0);
		x_overlap * y_overlap
	}

	/// Inclusive point containment.
	pub fn contains(&self, p: XYPosition) -> bool {
		p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
	}
}

/// Pan/zoom of the viewport: screen = flow * zoom + (x, y).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
	/// Horizontal translation in screen pixels.
	pub x: f64,
	/// Vertical translation in screen pixels.
	pub y: f64,
	/// Scale factor.
	pub zoom: f64,
}

impl Default for Transform {
	fn default() -> Self {
		Self {
			x: 0.0,
			y: 0.0,
			zoom: 1.0,
		}
	}
}

impl Transform {
	/// Translation `(x, y)` at `zoom`.
	pub fn new(x: f64, y: f64, zoom: f64) -> Self {
		Self { x, y, zoom }
	}

	/// Maps a screen point into flow coordinates.
	pub fn screen_to_flow(&self, sx: f64, sy: f64) -> XYPosition {
		XYPosition::new((sx - self.x) / self.zoom, (sy - self.y) / self.zoom)
	}

	/// Zoom by `factor` keeping the screen point `(sx, sy)` fixed.
	pub fn zoom_at(&self, sx: f64, sy: f64, factor: f64, min: f64, max: f64) -> Self {
		let zoom = (self.zoom * factor).clamp(min, max);
		let ratio = zoom / self.zoom;
		Self {
			x: sx - (sx - self.x) * ratio,
			y: sy - (sy - self.y) * ratio,
			zoom,
		}
	}
}

/// A graph node. Owned by the store; replaced, never mutated in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
	/// Unique identifier.
	pub id: String,
	/// Top-left corner in flow coordinates.
	pub position: XYPosition,
	/// Measured width, if known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub width: Option<f64>,
	/// Measured height, if known.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub height: Option<f64>,
	/// Part of the current selection.
	#[serde(default)]
	pub selected: bool,
	/// Excluded from rendering and hit testing.
	#[serde(default)]
	pub hidden: bool,
	/// `Some(false)` protects the node from deletion.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deletable: Option<bool>,
	/// Enclosing node; deleting the parent deletes this node too.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<String>,
	/// Explicit stacking order, default 0.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub z_index: Option<i32>,
	/// Node type discriminator for custom renderers.
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
	/// User payload.
	#[serde(default)]
	pub data: Value,
}

impl Node {
	/// Unsized node at `(x, y)`.
	pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
		Self {
			id: id.into(),
			position: XYPosition::new(x, y),
			..Default::default()
		}
	}

	/// Sets both dimensions.
	pub fn with_size(mut self, width: f64, height: f64) -> Self {
		self.width = Some(width);
		self.height = Some(height);
		self
	}

	/// Sets the selection flag.
	pub fn selected(mut self, selected: bool) -> Self {
		self.selected = selected;
		self
	}

	/// Bounding box, or `None` while dimensions are unknown.
	pub fn rect(&self) -> Option<Rect> {
		match (self.width, self.height) {
			(Some(w), Some(h)) => Some(Rect::new(self.position.x, self.position.y, w, h)),
			_ => None,
		}
	}

	/// Deletable unless explicitly marked otherwise.
	pub fn is_deletable(&self) -> bool {
		self.deletable.unwrap_or(true)
	}
}

/// A graph edge. Source/target may dangle; the store does not repair them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
	/// Unique identifier.
	pub id: String,
	/// Source node id.
	pub source: String,
	/// Target node id.
	pub target: String,
	/// Handle on the source node.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source_handle: Option<String>,
	/// Handle on the target node.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub target_handle: Option<String>,
	/// Path shape discriminator (`bezier`, `step`, ...).
	#[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
	pub kind: Option<String>,
	/// Decoration at the source end.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub marker_start: Option<EdgeMarkerType>,
	/// Decoration at the target end.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub marker_end: Option<EdgeMarkerType>,
	/// Part of the current selection.
	#[serde(default)]
	pub selected: bool,
	/// Excluded from rendering.
	#[serde(default)]
	pub hidden: bool,
	/// Drawn dashed.
	#[serde(default)]
	pub animated: bool,
	/// `Some(false)` protects the edge from explicit deletion.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub deletable: Option<bool>,
	/// Text drawn at the midpoint.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub label: Option<String>,
	/// Explicit stacking order.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub z_index: Option<i32>,
	/// User payload.
	#[serde(default)]
	pub data: Value,
}

impl Edge {
	/// Undecorated edge from `source` to `target`.
	pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			source: source.into(),
			target: target.into(),
			..Default::default()
		}
	}

	/// Sets the target-end decoration.
	pub fn with_marker_end(mut self, marker: impl Into<EdgeMarkerType>) -> Self {
		self.marker_end = Some(marker.into());
		self
	}

	/// Sets the source-end decoration.
	pub fn with_marker_start(mut self, marker: impl Into<EdgeMarkerType>) -> Self {
		self.marker_start = Some(marker.into());
		self
	}

	/// Sets the selection flag.
	pub fn selected(mut self, selected: bool) -> Self {
		self.selected = selected;
		self
	}

	/// Deletable unless explicitly marked otherwise.
	pub fn is_deletable(&self) -> bool {
		self.deletable.unwrap_or(true)
	}
}

/// The closed set of edge decorations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerType {
	/// Open line arrow.
	#[serde(rename = "arrow")]
	Arrow,
	/// Closed arrow filled with the stroke color.
	#[serde(rename = "arrowclosed")]
	ArrowClosed,
	/// One-sided arrow.
	#[serde(rename = "arrow-single")]
	ArrowSingle,
	/// Closed arrow with a white interior.
	#[serde(rename = "arrow-empty")]
	ArrowEmpty,
	/// Open diamond.
	#[serde(rename = "diagonal")]
	Diagonal,
	/// Filled diamond.
	#[serde(rename = "diagonal-filled")]
	DiagonalFilled,
	/// Open circle.
	#[serde(rename = "circle")]
	Circle,
	/// Filled circle.
	#[serde(rename = "circle-filled")]
	CircleFilled,
}

impl MarkerType {
	/// Every kind, in wire order.
	pub const ALL: [MarkerType; 8] = [
		MarkerType::Arrow,
		MarkerType::ArrowClosed,
		MarkerType::ArrowSingle,
		MarkerType::ArrowEmpty,
		MarkerType::Diagonal,
		MarkerType::DiagonalFilled,
		MarkerType::Circle,
		MarkerType::CircleFilled,
	];

	/// Wire identifier.
	pub fn as_str(self) -> &'static str {
		match self {
			MarkerType::Arrow => "arrow",
			MarkerType::ArrowClosed => "arrowclosed",
			MarkerType::ArrowSingle => "arrow-single",
			MarkerType::ArrowEmpty => "arrow-empty",
			MarkerType::Diagonal => "diagonal",
			MarkerType::DiagonalFilled => "diagonal-filled",
			MarkerType::Circle => "circle",
			MarkerType::CircleFilled => "circle-filled",
		}
	}
}

impl fmt::Display for MarkerType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for MarkerType {
	type Err = FlowError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		MarkerType::ALL
			.into_iter()
			.find(|kind| kind.as_str() == s)
			.ok_or_else(|| FlowError::MarkerTypeMissing(s.to_string()))
	}
}

/// Full marker descriptor. `kind` stays a string so that unknown identifiers
/// survive deserialization and reach the resolver's error path.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeMarker {
	/// Marker type identifier.
	#[serde(rename = "type")]
	pub kind: String,
	/// Stroke color.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub color: Option<String>,
	/// Rendered width.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub width: Option<f64>,
	/// Rendered height.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub height: Option<f64>,
	/// SVG `markerUnits`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub marker_units: Option<String>,
	/// SVG `orient`.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub orient: Option<String>,
	/// Outline width.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stroke_width: Option<f64>,
}

impl EdgeMarker {
	/// Descriptor with default paint.
	pub fn new(kind: MarkerType) -> Self {
		Self {
			kind: kind.as_str().to_string(),
			..Default::default()
		}
	}

	/// Sets the color.
	pub fn color(mut self, color: impl Into<String>) -> Self {
		self.color = Some(color.into());
		self
	}

	/// Sets the outline width.
	pub fn stroke_width(mut self, width: f64) -> Self {
		self.stroke_width = Some(width);
		self
	}
}

/// Either a bare identifier or a full descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EdgeMarkerType {
	/// A bare marker type identifier.
	Name(String),
	/// A descriptor with paint.
	Marker(EdgeMarker),
}

impl EdgeMarkerType {
	/// The marker type identifier, known or not.
	pub fn kind(&self) -> &str {
		match self {
			EdgeMarkerType::Name(name) => name,
			EdgeMarkerType::Marker(marker) => &marker.kind,
		}
	}

	/// Normalizes to a descriptor.
	pub fn to_marker(&self) -> EdgeMarker {
		match self {
			EdgeMarkerType::Name(name) => EdgeMarker {
				kind: name.clone(),
				..Default::default()
			},
			EdgeMarkerType::Marker(marker) => marker.clone(),
		}
	}
}

impl From<MarkerType> for EdgeMarkerType {
	fn from(kind: MarkerType) -> Self {
		EdgeMarkerType::Name(kind.as_str().to_string())
	}
}

impl From<EdgeMarker> for EdgeMarkerType {
	fn from(marker: EdgeMarker) -> Self {
		EdgeMarkerType::Marker(marker)
	}
}

impl From<&str> for EdgeMarkerType {
	fn from(name: &str) -> Self {
		EdgeMarkerType::Name(name.to_string())
	}
}
