//! Edge marker symbols and their resolution.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::rc::Rc;

use log::debug;

use super::state::FlowStore;
use super::types::{Edge, EdgeMarker, EdgeMarkerType, MarkerType};

/// Side length of a marker in screen pixels at stroke width 1.
pub const DEFAULT_MARKER_SIZE: f64 = 12.5;
const BACKGROUND: &str = "#fff";

/// How a symbol's interior is painted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkerFill {
	/// Outline only.
	None,
	/// Same as the stroke color.
	Stroke,
	/// Opaque background, for hollow shapes drawn over the edge line.
	Background,
}

/// Outline of a symbol.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarkerShape {
	/// Connected line segments.
	Polyline(&'static [(f64, f64)]),
	/// Circle around `(cx, cy)`.
	Circle { cx: f64, cy: f64, r: f64 },
}

/// Drawable template for one [`MarkerType`]. Geometry is fixed; only color
/// and stroke width vary per edge. Coordinates live in a `-10 -10 20 20`
/// box with the tip at the origin pointing along +x.
#[derive(Debug, PartialEq)]
pub struct MarkerSymbol {
	/// Marker this symbol draws.
	pub kind: MarkerType,
	/// Outline geometry.
	pub shape: MarkerShape,
	/// Interior paint.
	pub fill: MarkerFill,
}

/// Per-edge paint parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerStyle {
	/// Stroke color; `none` when unset.
	pub color: String,
	/// Stroke width in symbol units.
	pub stroke_width: f64,
}

impl Default for MarkerStyle {
	fn default() -> Self {
		Self {
			color: "none".to_string(),
			stroke_width: 1.0,
		}
	}
}

impl MarkerStyle {
	/// Style of `marker`, with defaults for unset fields.
	pub fn from_marker(marker: &EdgeMarker) -> Self {
		let defaults = Self::default();
		Self {
			color: marker.color.clone().unwrap_or(defaults.color),
			stroke_width: marker.stroke_width.unwrap_or(defaults.stroke_width),
		}
	}
}

const OPEN_ARROW: &[(f64, f64)] = &[(-5.0, -4.0), (0.0, 0.0), (-5.0, 4.0)];
const CLOSED_ARROW: &[(f64, f64)] = &[(-5.0, -4.0), (0.0, 0.0), (-5.0, 4.0), (-5.0, -4.0)];
const HALF_ARROW: &[(f64, f64)] = &[(-5.0, -4.0), (0.0, 0.0)];
const DIAMOND: &[(f64, f64)] = &[(-5.0, -4.0), (0.0, 0.0), (-5.0, 4.0), (-10.0, 0.0)];
const DOT: MarkerShape = MarkerShape::Circle {
	cx: 5.0,
	cy: 5.0,
	r: 5.0,
};

static ARROW: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::Arrow,
	shape: MarkerShape::Polyline(OPEN_ARROW),
	fill: MarkerFill::None,
};
static ARROW_CLOSED: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::ArrowClosed,
	shape: MarkerShape::Polyline(CLOSED_ARROW),
	fill: MarkerFill::Stroke,
};
static ARROW_SINGLE: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::ArrowSingle,
	shape: MarkerShape::Polyline(HALF_ARROW),
	fill: MarkerFill::None,
};
static ARROW_EMPTY: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::ArrowEmpty,
	shape: MarkerShape::Polyline(CLOSED_ARROW),
	fill: MarkerFill::Background,
};
static DIAGONAL: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::Diagonal,
	shape: MarkerShape::Polyline(DIAMOND),
	fill: MarkerFill::Background,
};
static DIAGONAL_FILLED: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::DiagonalFilled,
	shape: MarkerShape::Polyline(DIAMOND),
	fill: MarkerFill::Stroke,
};
static CIRCLE: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::Circle,
	shape: DOT,
	fill: MarkerFill::Background,
};
static CIRCLE_FILLED: MarkerSymbol = MarkerSymbol {
	kind: MarkerType::CircleFilled,
	shape: DOT,
	fill: MarkerFill::Stroke,
};

impl MarkerType {
	/// The symbol drawing this decoration. Always the same instance.
	pub fn symbol(self) -> &'static MarkerSymbol {
		match self {
			MarkerType::Arrow => &ARROW,
			MarkerType::ArrowClosed => &ARROW_CLOSED,
			MarkerType::ArrowSingle => &ARROW_SINGLE,
			MarkerType::ArrowEmpty => &ARROW_EMPTY,
			MarkerType::Diagonal => &DIAGONAL,
			MarkerType::DiagonalFilled => &DIAGONAL_FILLED,
			MarkerType::Circle => &CIRCLE,
			MarkerType::CircleFilled => &CIRCLE_FILLED,
		}
	}
}

impl MarkerSymbol {
	/// Interior color under `style`.
	pub fn fill_color<'a>(&self, style: &'a MarkerStyle) -> &'a str {
		match self.fill {
			MarkerFill::None => "none",
			MarkerFill::Stroke => &style.color,
			MarkerFill::Background => BACKGROUND,
		}
	}

	/// `points` attribute for polyline symbols.
	pub fn points(&self) -> Option<String> {
		let MarkerShape::Polyline(points) = self.shape else {
			return None;
		};
		let mut out = String::new();
		for (i, (x, y)) in points.iter().enumerate() {
			if i > 0 {
				out.push(' ');
			}
			let _ = write!(out, "{x},{y}");
		}
		Some(out)
	}

	/// SVG element for this symbol.
	pub fn to_svg(&self, style: &MarkerStyle) -> String {
		let (stroke, fill, width) = (&style.color, self.fill_color(style), style.stroke_width);
		match self.shape {
			MarkerShape::Polyline(_) => format!(
				r#"<polyline style="stroke: {stroke}; fill: {fill}; stroke-width: {width};" stroke-linecap="round" stroke-linejoin="round" points="{}"/>"#,
				self.points().unwrap_or_default()
			),
			MarkerShape::Circle { cx, cy, r } => format!(
				r#"<circle cx="{cx}" cy="{cy}" r="{r}" style="stroke: {stroke}; fill: {fill}; stroke-width: {width};"/>"#
			),
		}
	}
}

/// Maps marker identifiers to their symbols, reporting unknown identifiers
/// through the store's error channel.
///
/// Each identifier is resolved once; later lookups hit the cache, so an
/// unknown identifier is reported once until [`MarkerResolver::forget`].
#[derive(Clone, Debug)]
pub struct MarkerResolver {
	store: FlowStore,
	resolved: RefCell<HashMap<String, Option<&'static MarkerSymbol>>>,
}

impl MarkerResolver {
	/// Resolver reporting through `store`.
	pub fn new(store: FlowStore) -> Self {
		Self {
			store,
			resolved: RefCell::new(HashMap::new()),
		}
	}

	/// Symbol for `kind`, or `None` after reporting error `009`.
	pub fn resolve(&self, kind: &str) -> Option<&'static MarkerSymbol> {
		if let Some(cached) = self.resolved.borrow().get(kind) {
			return *cached;
		}
		let symbol = match kind.parse::<MarkerType>() {
			Ok(kind) => Some(kind.symbol()),
			Err(err) => {
				self.store.report_error(&err);
				None
			}
		};
		self.resolved.borrow_mut().insert(kind.to_string(), symbol);
		symbol
	}

	/// Drops cached resolutions, e.g. after the edge set changed.
	pub fn forget(&self) {
		self.resolved.borrow_mut().clear();
	}

	/// Resolves a string or descriptor marker together with its paint.
	pub fn resolve_marker(
		&self,
		marker: &EdgeMarkerType,
	) -> Option<(&'static MarkerSymbol, MarkerStyle)> {
		let symbol = self.resolve(marker.kind())?;
		Some((symbol, MarkerStyle::from_marker(&marker.to_marker())))
	}
}

/// Stable id for a marker definition, unique per flow instance and paint.
pub fn marker_id(marker: &EdgeMarkerType, instance_id: Option<&str>) -> String {
	let marker = marker.to_marker();
	let mut fields = vec![format!("type={}", marker.kind)];
	if let Some(color) = &marker.color {
		fields.push(format!("color={color}"));
	}
	if let Some(width) = marker.width {
		fields.push(format!("width={width}"));
	}
	if let Some(height) = marker.height {
		fields.push(format!("height={height}"));
	}
	if let Some(units) = &marker.marker_units {
		fields.push(format!("markerUnits={units}"));
	}
	if let Some(orient) = &marker.orient {
		fields.push(format!("orient={orient}"));
	}
	if let Some(stroke_width) = marker.stroke_width {
		fields.push(format!("strokeWidth={stroke_width}"));
	}
	let body = fields.join("&");
	match instance_id {
		Some(prefix) => format!("{prefix}__{body}"),
		None => body,
	}
}

/// A marker definition shared by one or more edges.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDefinition {
	/// Id edges reference the definition by.
	pub id: String,
	/// Marker with its color resolved.
	pub marker: EdgeMarker,
}

/// Unique markers used by `edges`, in first-use order. Markers without a
/// color get `default_color`.
pub fn collect_markers(
	edges: &[Rc<Edge>],
	instance_id: Option<&str>,
	default_color: Option<&str>,
) -> Vec<MarkerDefinition> {
	let mut definitions: Vec<MarkerDefinition> = Vec::new();
	let markers = edges
		.iter()
		.flat_map(|edge| [edge.marker_start.as_ref(), edge.marker_end.as_ref()])
		.flatten();
	for marker in markers {
		let id = marker_id(marker, instance_id);
		if definitions.iter().any(|d| d.id == id) {
			continue;
		}
		let mut resolved = marker.to_marker();
		if resolved.color.is_none() {
			resolved.color = default_color.map(str::to_string);
		}
		definitions.push(MarkerDefinition {
			id,
			marker: resolved,
		});
	}
	debug!("collected {} marker definition(s)", definitions.len());
	definitions
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::flow::state::FlowStatePatch;
	use crate::components::flow::types::Transform;

	fn recording_store() -> (FlowStore, Rc<RefCell<Vec<(String, String)>>>) {
		let store = FlowStore::create();
		let errors = Rc::new(RefCell::new(Vec::new()));
		let log = Rc::clone(&errors);
		store.set_on_error(move |code, message| {
			log.borrow_mut().push((code.to_string(), message.to_string()))
		});
		(store, errors)
	}

	#[test]
	fn resolution_is_referentially_stable() {
		let (store, errors) = recording_store();
		let resolver = MarkerResolver::new(store);
		let a = resolver.resolve("arrowclosed").unwrap();
		let b = resolver.resolve("arrowclosed").unwrap();
		assert!(std::ptr::eq(a, b));
		assert_eq!(a.kind, MarkerType::ArrowClosed);
		assert!(errors.borrow().is_empty());
	}

	#[test]
	fn every_marker_type_resolves_to_its_own_symbol() {
		let resolver = MarkerResolver::new(FlowStore::create());
		for kind in MarkerType::ALL {
			let symbol = resolver.resolve(kind.as_str()).unwrap();
			assert_eq!(symbol.kind, kind);
		}
	}

	#[test]
	fn unknown_type_reports_009_once_and_yields_none() {
		let (store, errors) = recording_store();
		let resolver = MarkerResolver::new(store);
		assert!(resolver.resolve("not-a-type").is_none());

		let errors = errors.borrow();
		assert_eq!(errors.len(), 1);
		assert_eq!(errors[0].0, "009");
		assert!(errors[0].1.contains("not-a-type"));
	}

	#[test]
	fn unknown_type_is_reported_once_across_repaints() {
		let (store, errors) = recording_store();
		store.set_state(
			FlowStatePatch::new()
				.edges(vec![Edge::new("e", "a", "b").with_marker_end("zigzag")]),
		);
		let resolver = Rc::new(MarkerResolver::new(store.clone()));
		let pans = store.subscribe(|s| s.transform);
		let (painter, reader) = (Rc::clone(&resolver), store.clone());
		pans.listen(move |_| {
			for edge in reader.get_state().edges.iter() {
				if let Some(marker) = &edge.marker_end {
					assert!(painter.resolve_marker(marker).is_none());
				}
			}
		});

		for step in 1..=10 {
			store.set_state(FlowStatePatch::new().transform(Transform::new(step as f64, 0.0, 1.0)));
		}
		assert_eq!(pans.deliveries(), 10);
		assert_eq!(errors.borrow().len(), 1);

		resolver.forget();
		assert!(resolver.resolve("zigzag").is_none());
		assert_eq!(errors.borrow().len(), 2);
	}

	#[test]
	fn unknown_type_without_error_handler_degrades_silently() {
		let resolver = MarkerResolver::new(FlowStore::create());
		assert!(resolver.resolve("zigzag").is_none());
	}

	#[test]
	fn descriptor_markers_carry_their_paint() {
		let resolver = MarkerResolver::new(FlowStore::create());
		let marker = EdgeMarkerType::from(EdgeMarker::new(MarkerType::Circle).color("red"));
		let (symbol, style) = resolver.resolve_marker(&marker).unwrap();
		assert_eq!(symbol.kind, MarkerType::Circle);
		assert_eq!(style.color, "red");
		assert_eq!(style.stroke_width, 1.0);
	}

	#[test]
	fn svg_templates_match_their_kind() {
		let style = MarkerStyle {
			color: "#f00".into(),
			stroke_width: 2.0,
		};
		assert_eq!(MarkerType::Arrow.symbol().points().as_deref(), Some("-5,-4 0,0 -5,4"));
		assert_eq!(MarkerType::ArrowSingle.symbol().points().as_deref(), Some("-5,-4 0,0"));
		assert!(
			MarkerType::DiagonalFilled
				.symbol()
				.to_svg(&style)
				.contains("fill: #f00;")
		);
		assert!(MarkerType::Diagonal.symbol().to_svg(&style).contains("fill: #fff;"));
		let circle = MarkerType::CircleFilled.symbol().to_svg(&style);
		assert!(circle.starts_with("<circle cx=\"5\" cy=\"5\" r=\"5\""));
		assert!(circle.contains("stroke-width: 2;"));
	}

	#[test]
	fn marker_ids_distinguish_paint() {
		let plain = EdgeMarkerType::from(MarkerType::Arrow);
		let red = EdgeMarkerType::from(EdgeMarker::new(MarkerType::Arrow).color("red"));
		assert_eq!(marker_id(&plain, None), "type=arrow");
		assert_eq!(marker_id(&red, Some("1")), "1__type=arrow&color=red");
	}

	#[test]
	fn collect_markers_deduplicates_in_first_use_order() {
		let edges: Vec<Rc<Edge>> = vec![
			Rc::new(
				Edge::new("e1", "a", "b")
					.with_marker_start(MarkerType::Circle)
					.with_marker_end(MarkerType::ArrowClosed),
			),
			Rc::new(Edge::new("e2", "b", "c").with_marker_end(MarkerType::ArrowClosed)),
			Rc::new(Edge::new("e3", "c", "a")),
		];
		let defs = collect_markers(&edges, None, Some("#b1b1b7"));
		let ids: Vec<&str> = defs.iter().map(|d| d.id.as_str()).collect();
		assert_eq!(ids, ["type=circle", "type=arrowclosed"]);
		assert_eq!(defs[0].marker.color.as_deref(), Some("#b1b1b7"));
	}
}
