//! Canvas 2D painting of a flow snapshot.

use std::collections::HashSet;
use std::f64::consts::PI;

use wasm_bindgen::JsValue;
use web_sys::CanvasRenderingContext2d;

use super::config::FlowConfig;
use super::markers::{DEFAULT_MARKER_SIZE, MarkerResolver, MarkerShape, MarkerStyle, MarkerSymbol};
use super::state::FlowState;
use super::types::{Edge, EdgeMarkerType, Node, XYPosition};

const BACKGROUND: &str = "#fafafa";
const NODE_FILL: &str = "#fff";
const NODE_STROKE: &str = "#1a192b";
const SELECTED_STROKE: &str = "#ff0072";
const EDGE_STROKE: &str = "#b1b1b7";
const SELECTED_EDGE_STROKE: &str = "#555";
const POINT_RADIUS: f64 = 4.0;

/// Paints the nodes in `visible` and the edges between rendered nodes.
pub fn render(
	state: &FlowState,
	ctx: &CanvasRenderingContext2d,
	visible: &[String],
	resolver: &MarkerResolver,
	config: &FlowConfig,
) {
	ctx.set_fill_style_str(BACKGROUND);
	ctx.fill_rect(0.0, 0.0, state.width, state.height);
	ctx.save();
	let _ = ctx.translate(state.transform.x, state.transform.y);
	let _ = ctx.scale(state.transform.zoom, state.transform.zoom);

	let visible: HashSet<&str> = visible.iter().map(String::as_str).collect();
	draw_edges(state, ctx, &visible, resolver, config);
	draw_nodes(state, ctx, &visible);
	ctx.restore();
}

fn center(node: &Node) -> XYPosition {
	match node.rect() {
		Some(rect) => XYPosition::new(rect.x + rect.width / 2.0, rect.y + rect.height / 2.0),
		None => node.position,
	}
}

/// Where the segment from the node's center along `(ux, uy)` leaves its box.
fn border_point(node: &Node, ux: f64, uy: f64) -> XYPosition {
	let c = center(node);
	let (hw, hh) = match (node.width, node.height) {
		(Some(w), Some(h)) => (w / 2.0, h / 2.0),
		_ => (POINT_RADIUS, POINT_RADIUS),
	};
	let tx = if ux.abs() > f64::EPSILON { hw / ux.abs() } else { f64::INFINITY };
	let ty = if uy.abs() > f64::EPSILON { hh / uy.abs() } else { f64::INFINITY };
	let t = tx.min(ty);
	XYPosition::new(c.x + ux * t, c.y + uy * t)
}

fn draw_edges(
	state: &FlowState,
	ctx: &CanvasRenderingContext2d,
	visible: &HashSet<&str>,
	resolver: &MarkerResolver,
	config: &FlowConfig,
) {
	let k = state.transform.zoom;
	for edge in state.edges.iter().filter(|e| !e.hidden) {
		let (Some(source), Some(target)) = (state.node(&edge.source), state.node(&edge.target)) else {
			continue;
		};
		if source.hidden || target.hidden {
			continue;
		}
		if !visible.contains(source.id.as_str()) && !visible.contains(target.id.as_str()) {
			continue;
		}

		let (a, b) = (center(source), center(target));
		let (dx, dy) = (b.x - a.x, b.y - a.y);
		let dist = (dx * dx + dy * dy).sqrt();
		if dist < 0.001 {
			continue;
		}
		let (ux, uy) = (dx / dist, dy / dist);
		let start = border_point(source, ux, uy);
		let end = border_point(target, -ux, -uy);

		let stroke = if edge.selected { SELECTED_EDGE_STROKE } else { EDGE_STROKE };
		ctx.set_stroke_style_str(stroke);
		ctx.set_line_width(1.0);
		if edge.animated {
			let _ = ctx.set_line_dash(&js_sys::Array::of2(
				&JsValue::from_f64(5.0),
				&JsValue::from_f64(5.0),
			));
		}
		ctx.begin_path();
		ctx.move_to(start.x, start.y);
		ctx.line_to(end.x, end.y);
		ctx.stroke();
		let _ = ctx.set_line_dash(&js_sys::Array::new());

		let angle = uy.atan2(ux);
		if let Some(marker) = &edge.marker_end {
			draw_edge_marker(ctx, resolver, config, marker, end, angle);
		}
		if let Some(marker) = &edge.marker_start {
			draw_edge_marker(ctx, resolver, config, marker, start, angle + PI);
		}
		draw_edge_label(ctx, edge, &a, &b, k);
	}
}

fn draw_edge_marker(
	ctx: &CanvasRenderingContext2d,
	resolver: &MarkerResolver,
	config: &FlowConfig,
	marker: &EdgeMarkerType,
	tip: XYPosition,
	angle: f64,
) {
	let Some((symbol, mut style)) = resolver.resolve_marker(marker) else {
		return;
	};
	if style.color == "none" {
		style.color = config.default_marker_color.clone();
	}
	let descriptor = marker.to_marker();
	let size = descriptor.width.unwrap_or(DEFAULT_MARKER_SIZE);
	draw_marker(ctx, symbol, &style, tip, angle, size);
}

/// Paints `symbol` with its tip at `tip`, pointing along `angle`.
pub fn draw_marker(
	ctx: &CanvasRenderingContext2d,
	symbol: &MarkerSymbol,
	style: &MarkerStyle,
	tip: XYPosition,
	angle: f64,
	size: f64,
) {
	let scale = size / 10.0;
	ctx.save();
	let _ = ctx.translate(tip.x, tip.y);
	let _ = ctx.rotate(angle);
	let _ = ctx.scale(scale, scale);
	ctx.set_line_width(style.stroke_width / scale);
	ctx.set_stroke_style_str(&style.color);
	ctx.set_line_cap("round");
	ctx.set_line_join("round");

	ctx.begin_path();
	match symbol.shape {
		MarkerShape::Polyline(points) => {
			for (i, &(x, y)) in points.iter().enumerate() {
				if i == 0 {
					ctx.move_to(x, y);
				} else {
					ctx.line_to(x, y);
				}
			}
		}
		MarkerShape::Circle { cx, cy, r } => {
			let _ = ctx.arc(cx, cy, r, 0.0, 2.0 * PI);
		}
	}
	let fill = symbol.fill_color(style);
	if fill != "none" {
		ctx.set_fill_style_str(fill);
		ctx.fill();
	}
	if style.color != "none" {
		ctx.stroke();
	}
	ctx.restore();
}

fn draw_edge_label(ctx: &CanvasRenderingContext2d, edge: &Edge, a: &XYPosition, b: &XYPosition, k: f64) {
	let Some(label) = &edge.label else {
		return;
	};
	ctx.set_fill_style_str(NODE_STROKE);
	ctx.set_font(&format!("{}px sans-serif", 10.0 / k.max(0.5)));
	ctx.set_text_align("center");
	let _ = ctx.fill_text(label, (a.x + b.x) / 2.0, (a.y + b.y) / 2.0 - 4.0);
}

fn node_label(node: &Node) -> &str {
	node.data
		.get("label")
		.and_then(|label| label.as_str())
		.unwrap_or(&node.id)
}

fn draw_nodes(state: &FlowState, ctx: &CanvasRenderingContext2d, visible: &HashSet<&str>) {
	let k = state.transform.zoom;
	for node in state.nodes_in_render_order() {
		if node.hidden || !visible.contains(node.id.as_str()) {
			continue;
		}
		let stroke = if node.selected { SELECTED_STROKE } else { NODE_STROKE };

		let Some(rect) = node.rect() else {
			ctx.begin_path();
			let _ = ctx.arc(node.position.x, node.position.y, POINT_RADIUS, 0.0, 2.0 * PI);
			ctx.set_fill_style_str(stroke);
			ctx.fill();
			continue;
		};

		ctx.set_fill_style_str(NODE_FILL);
		ctx.fill_rect(rect.x, rect.y, rect.width, rect.height);
		ctx.set_stroke_style_str(stroke);
		ctx.set_line_width(if node.selected { 2.0 } else { 1.0 });
		ctx.stroke_rect(rect.x, rect.y, rect.width, rect.height);

		ctx.set_fill_style_str(NODE_STROKE);
		ctx.set_font(&format!("{}px sans-serif", 12.0 / k.max(0.5)));
		ctx.set_text_align("center");
		ctx.set_text_baseline("middle");
		let _ = ctx.fill_text(
			node_label(&node),
			rect.x + rect.width / 2.0,
			rect.y + rect.height / 2.0,
		);
	}
}
