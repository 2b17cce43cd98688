//! Viewport culling: which nodes the current view can show.

use std::rc::Rc;

use super::state::FlowState;
use super::types::{Node, Rect, Transform, XYPosition};

/// The part of flow space the viewport shows, or `None` when nothing can be
/// visible (empty viewport, non-positive or non-finite zoom).
pub fn visible_rect(transform: &Transform, width: f64, height: f64) -> Option<Rect> {
	let Transform { x, y, zoom } = *transform;
	let positive = |v: f64| v.is_finite() && v > 0.0;
	if !positive(zoom) || !positive(width) || !positive(height) {
		return None;
	}
	Some(Rect::new(-x / zoom, -y / zoom, width / zoom, height / zoom))
}

/// Whether `node` intersects `viewport`. Nodes with unknown dimensions are
/// treated as a point at their position.
pub fn is_node_visible(node: &Node, viewport: &Rect) -> bool {
	if node.hidden {
		return false;
	}
	match node.rect() {
		Some(rect) => rect.overlapping_area(viewport) > 0.0 || point_box_inside(&rect, viewport),
		None => viewport.contains(node.position),
	}
}

// Zero-area boxes have no overlap area; fall back to containment.
fn point_box_inside(rect: &Rect, viewport: &Rect) -> bool {
	(rect.width <= 0.0 || rect.height <= 0.0)
		&& viewport.contains(XYPosition::new(rect.x, rect.y))
}

/// Nodes intersecting the screen-space viewport `(0, 0, width, height)`
/// under `transform`, in store order.
pub fn nodes_inside<'a>(
	nodes: &'a [Rc<Node>],
	transform: &Transform,
	width: f64,
	height: f64,
) -> impl Iterator<Item = &'a Rc<Node>> + use<'a> {
	let viewport = visible_rect(transform, width, height);
	nodes.iter().filter(move |node| {
		viewport
			.as_ref()
			.is_some_and(|viewport| is_node_visible(node, viewport))
	})
}

/// Identifiers of the nodes to render. With culling disabled every node id
/// is returned in store order.
pub fn visible_node_ids(state: &FlowState, only_render_visible: bool) -> Vec<String> {
	if !only_render_visible {
		return state.nodes.iter().map(|node| node.id.clone()).collect();
	}
	nodes_inside(&state.nodes, &state.transform, state.width, state.height)
		.map(|node| node.id.clone())
		.collect()
}

/// Selector form of [`visible_node_ids`], for use with
/// [`FlowStore::subscribe_with`](super::state::FlowStore::subscribe_with)
/// and [`shallow`](super::selector::shallow) equality.
pub fn visible_node_ids_selector(only_render_visible: bool) -> impl Fn(&FlowState) -> Vec<String> {
	move |state| visible_node_ids(state, only_render_visible)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::flow::selector::shallow;
	use crate::components::flow::state::{FlowStatePatch, FlowStore};

	fn state(nodes: Vec<Node>, transform: Transform, width: f64, height: f64) -> FlowState {
		FlowState::default().apply(
			FlowStatePatch::new()
				.nodes(nodes)
				.transform(transform)
				.size(width, height),
		)
	}

	fn sample() -> Vec<Node> {
		vec![
			Node::new("near", 50.0, 50.0).with_size(10.0, 10.0),
			Node::new("far", 200.0, 200.0).with_size(10.0, 10.0),
		]
	}

	#[test]
	fn only_nodes_inside_the_viewport_are_visible() {
		let s = state(sample(), Transform::new(0.0, 0.0, 1.0), 100.0, 100.0);
		assert_eq!(visible_node_ids(&s, true), ["near"]);
	}

	#[test]
	fn disabled_culling_returns_every_node_in_store_order() {
		let s = state(sample(), Transform::new(0.0, 0.0, 1.0), 100.0, 100.0);
		assert_eq!(visible_node_ids(&s, false), ["near", "far"]);
	}

	#[test]
	fn panning_and_zooming_move_the_visible_region() {
		// Shows flow rect (150, 150)..(250, 250).
		let s = state(sample(), Transform::new(-300.0, -300.0, 2.0), 200.0, 200.0);
		assert_eq!(visible_node_ids(&s, true), ["far"]);
	}

	#[test]
	fn partially_visible_nodes_count() {
		let nodes = vec![Node::new("edge", 95.0, 95.0).with_size(10.0, 10.0)];
		let s = state(nodes, Transform::default(), 100.0, 100.0);
		assert_eq!(visible_node_ids(&s, true), ["edge"]);
	}

	#[test]
	fn unsized_nodes_are_points() {
		let nodes = vec![Node::new("inside", 10.0, 10.0), Node::new("outside", 150.0, 10.0)];
		let s = state(nodes, Transform::default(), 100.0, 100.0);
		assert_eq!(visible_node_ids(&s, true), ["inside"]);
	}

	#[test]
	fn hidden_nodes_are_never_visible() {
		let mut hidden = Node::new("hidden", 10.0, 10.0).with_size(5.0, 5.0);
		hidden.hidden = true;
		let s = state(vec![hidden], Transform::default(), 100.0, 100.0);
		assert!(visible_node_ids(&s, true).is_empty());
	}

	#[test]
	fn degenerate_viewports_show_nothing() {
		let nodes = sample();
		for (transform, w, h) in [
			(Transform::default(), 0.0, 100.0),
			(Transform::default(), 100.0, 0.0),
			(Transform::new(0.0, 0.0, 0.0), 100.0, 100.0),
			(Transform::new(0.0, 0.0, -1.0), 100.0, 100.0),
			(Transform::new(0.0, 0.0, f64::NAN), 100.0, 100.0),
		] {
			let s = state(nodes.clone(), transform, w, h);
			assert!(visible_node_ids(&s, true).is_empty(), "{transform:?} {w}x{h}");
			assert_eq!(visible_node_ids(&s, false).len(), 2);
		}
	}

	#[test]
	fn empty_graph_yields_nothing() {
		let s = state(vec![], Transform::default(), 100.0, 100.0);
		assert!(visible_node_ids(&s, true).is_empty());
		assert!(visible_node_ids(&s, false).is_empty());
	}

	#[test]
	fn visible_ids_subscription_ignores_pans_that_keep_the_same_nodes() {
		let store = FlowStore::create();
		store.set_state(FlowStatePatch::new().nodes(sample()).size(100.0, 100.0));
		let visible = store.subscribe_with(visible_node_ids_selector(true), shallow);

		store.set_state(FlowStatePatch::new().transform(Transform::new(5.0, 5.0, 1.0)));
		assert_eq!(visible.deliveries(), 0);

		store.set_state(FlowStatePatch::new().transform(Transform::new(-150.0, -150.0, 1.0)));
		assert_eq!(visible.deliveries(), 1);
		assert_eq!(visible.get(), ["far"]);
	}
}
