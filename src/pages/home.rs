use leptos::prelude::*;
use log::{info, warn};
use serde_json::json;

use crate::components::flow::selector::{edges, nodes, selected_elements, same_selection, shallow};
use crate::components::flow::{
	BeforeDelete, Edge, EdgeMarker, FlowCanvas, FlowConfig, FlowStatePatch, FlowStore, MarkerType, Node,
	use_flow_selector,
};

const COLUMNS: usize = 5;

/// Sample diagram: a grid of nodes, each linked to a pseudo-random earlier one.
fn sample_store(n: usize) -> FlowStore {
	let nodes: Vec<Node> = (0..n)
		.map(|i| {
			let (col, row) = ((i % COLUMNS) as f64, (i / COLUMNS) as f64);
			let mut node = Node::new(i.to_string(), 60.0 + col * 200.0, 60.0 + row * 120.0).with_size(150.0, 40.0);
			node.data = json!({ "label": format!("Node {i}") });
			node
		})
		.collect();

	let markers = [
		MarkerType::ArrowClosed,
		MarkerType::Arrow,
		MarkerType::DiagonalFilled,
		MarkerType::CircleFilled,
	];
	let edges: Vec<Edge> = (1..n)
		.map(|i| {
			let target = (rand_simple(i) * (i as f64)) as usize;
			let mut edge = Edge::new(format!("e{target}-{i}"), target.to_string(), i.to_string())
				.with_marker_end(markers[i % markers.len()]);
			if i % 4 == 0 {
				edge = edge.with_marker_start(EdgeMarker::new(MarkerType::Circle).color("#ff0072"));
			}
			edge.animated = i % 3 == 0;
			edge
		})
		.collect();

	let store = FlowStore::create();
	store.set_state(FlowStatePatch::new().nodes(nodes).edges(edges));
	store.set_on_error(|code, message| warn!("flow error {code}: {message}"));
	// The first node is pinned.
	store.set_on_before_delete(|pending| {
		if pending.nodes.iter().any(|node| node.id == "0") {
			BeforeDelete::Veto
		} else {
			BeforeDelete::Proceed
		}
	});
	store.on_selection_change(|nodes, edges| {
		info!("selection: {} node(s), {} edge(s)", nodes.len(), edges.len());
	});
	store
}

/// Simple pseudo-random number generator (deterministic for consistency).
fn rand_simple(seed: usize) -> f64 {
	let x = ((seed + 1) * 9301 + 49297) % 233280;
	(x as f64) / 233280.0
}

/// Default Home Page
#[component]
pub fn Home() -> impl IntoView {
	let store = sample_store(20);
	let config = FlowConfig {
		only_render_visible_elements: true,
		..FlowConfig::default()
	};
	let node_list = use_flow_selector(&store, nodes, shallow);
	let edge_list = use_flow_selector(&store, edges, shallow);
	let selection = use_flow_selector(&store, selected_elements, same_selection);

	view! {
		<div class="fullscreen-graph">
			<FlowCanvas store=store config=config fullscreen=true />
			<div class="graph-overlay">
				<h1>"Flow Canvas"</h1>
				<p class="subtitle">
					"Click to select, hold Meta to add to the selection, Backspace to delete. Drag nodes to move them. Scroll to zoom. Drag background to pan."
				</p>
				<p class="stats">
					{move || {
						let (selected_nodes, selected_edges) = selection.get();
						format!(
							"{} nodes, {} edges, {} selected",
							node_list.with(Vec::len),
							edge_list.with(Vec::len),
							selected_nodes.len() + selected_edges.len(),
						)
					}}
				</p>
			</div>
		</div>
	}
}
