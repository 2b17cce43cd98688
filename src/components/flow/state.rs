//! Diagram state, its store, and the mutations the store offers.

use std::cell::{Cell, RefCell};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use super::error::FlowError;
use super::registry::{HandlerId, HandlerRegistry};
use super::selector::{Subscription, identity, value_eq};
use super::types::{Edge, Node, Transform, XYPosition};

/// Smallest zoom the view allows.
pub const MIN_ZOOM: f64 = 0.1;
/// Largest zoom the view allows.
pub const MAX_ZOOM: f64 = 10.0;

/// `(code, message)` side channel for recoverable problems.
pub type OnError = Rc<dyn Fn(&str, &str)>;
/// Inspects a pending deletion before it is applied.
pub type OnBeforeDelete = Rc<dyn Fn(&PendingDeletion) -> BeforeDelete>;
/// Receives the selected nodes and edges after the selection changed.
pub type OnSelectionChange = dyn Fn(&[Rc<Node>], &[Rc<Edge>]);

pub(crate) type Listener = dyn Fn(&FlowState);
type Update = Box<dyn FnOnce(&FlowState) -> Option<FlowStatePatch>>;

/// Immutable snapshot of the diagram. Nodes and edges are shared, so a
/// snapshot clone is cheap and unchanged elements keep their identity.
#[derive(Clone)]
pub struct FlowState {
	/// Nodes in insertion order.
	pub nodes: Vec<Rc<Node>>,
	/// Edges in insertion order.
	pub edges: Vec<Rc<Edge>>,
	/// Viewport pan and zoom.
	pub transform: Transform,
	/// Viewport width in screen pixels.
	pub width: f64,
	/// Viewport height in screen pixels.
	pub height: f64,
	/// The multi-selection binding is held.
	pub multi_selection_active: bool,
	/// A box selection of nodes is shown.
	pub nodes_selection_active: bool,
	/// Cull nodes outside the viewport.
	pub only_render_visible_elements: bool,
	/// Receives recoverable errors.
	pub on_error: Option<OnError>,
	/// Default pre-delete hook.
	pub on_before_delete: Option<OnBeforeDelete>,
	/// Selection-change handlers in registration order.
	pub on_selection_change: HandlerRegistry<OnSelectionChange>,
}

impl Default for FlowState {
	fn default() -> Self {
		Self {
			nodes: Vec::new(),
			edges: Vec::new(),
			transform: Transform::default(),
			width: 0.0,
			height: 0.0,
			multi_selection_active: false,
			nodes_selection_active: false,
			only_render_visible_elements: false,
			on_error: None,
			on_before_delete: None,
			on_selection_change: HandlerRegistry::new(),
		}
	}
}

impl fmt::Debug for FlowState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FlowState")
			.field("nodes", &self.nodes.len())
			.field("edges", &self.edges.len())
			.field("transform", &self.transform)
			.field("width", &self.width)
			.field("height", &self.height)
			.field("multi_selection_active", &self.multi_selection_active)
			.field("nodes_selection_active", &self.nodes_selection_active)
			.field("on_error", &self.on_error.is_some())
			.field("on_before_delete", &self.on_before_delete.is_some())
			.field("on_selection_change", &self.on_selection_change)
			.finish()
	}
}

impl FlowState {
	/// Node with this id.
	pub fn node(&self, id: &str) -> Option<&Rc<Node>> {
		self.nodes.iter().find(|node| node.id == id)
	}

	/// Edge with this id.
	pub fn edge(&self, id: &str) -> Option<&Rc<Edge>> {
		self.edges.iter().find(|edge| edge.id == id)
	}

	/// Selected nodes in store order.
	pub fn selected_nodes(&self) -> Vec<Rc<Node>> {
		self.nodes.iter().filter(|n| n.selected).cloned().collect()
	}

	/// Selected edges in store order.
	pub fn selected_edges(&self) -> Vec<Rc<Edge>> {
		self.edges.iter().filter(|e| e.selected).cloned().collect()
	}

	/// Insertion order, stably re-sorted by explicit `z_index`.
	pub fn nodes_in_render_order(&self) -> Vec<Rc<Node>> {
		let mut nodes = self.nodes.clone();
		nodes.sort_by_key(|node| node.z_index.unwrap_or(0));
		nodes
	}

	/// Topmost visible node whose box contains the flow-space point.
	pub fn node_at(&self, point: XYPosition) -> Option<Rc<Node>> {
		self.nodes_in_render_order()
			.into_iter()
			.rev()
			.filter(|node| !node.hidden)
			.find(|node| node.rect().is_some_and(|rect| rect.contains(point)))
	}

	/// Last-write-wins merge of `patch` into a new snapshot.
	pub fn apply(&self, patch: FlowStatePatch) -> FlowState {
		let mut next = self.clone();
		if let Some(nodes) = patch.nodes {
			next.nodes = nodes;
		}
		if let Some(edges) = patch.edges {
			next.edges = edges;
		}
		if let Some(transform) = patch.transform {
			next.transform = transform;
		}
		if let Some(width) = patch.width {
			next.width = width;
		}
		if let Some(height) = patch.height {
			next.height = height;
		}
		if let Some(active) = patch.multi_selection_active {
			next.multi_selection_active = active;
		}
		if let Some(active) = patch.nodes_selection_active {
			next.nodes_selection_active = active;
		}
		if let Some(only_visible) = patch.only_render_visible_elements {
			next.only_render_visible_elements = only_visible;
		}
		if let Some(on_error) = patch.on_error {
			next.on_error = on_error;
		}
		if let Some(on_before_delete) = patch.on_before_delete {
			next.on_before_delete = on_before_delete;
		}
		if let Some(handlers) = patch.on_selection_change {
			next.on_selection_change = handlers;
		}
		next
	}
}

/// Partial update; `None` fields keep their current value.
#[derive(Clone, Default)]
pub struct FlowStatePatch {
	/// Replacement node list.
	pub nodes: Option<Vec<Rc<Node>>>,
	/// Replacement edge list.
	pub edges: Option<Vec<Rc<Edge>>>,
	/// New viewport transform.
	pub transform: Option<Transform>,
	/// New viewport width.
	pub width: Option<f64>,
	/// New viewport height.
	pub height: Option<f64>,
	/// New multi-selection flag.
	pub multi_selection_active: Option<bool>,
	/// New box-selection flag.
	pub nodes_selection_active: Option<bool>,
	/// New culling flag.
	pub only_render_visible_elements: Option<bool>,
	/// `Some(None)` removes the error handler.
	pub on_error: Option<Option<OnError>>,
	/// `Some(None)` removes the pre-delete hook.
	pub on_before_delete: Option<Option<OnBeforeDelete>>,
	/// Replacement handler registry.
	pub on_selection_change: Option<HandlerRegistry<OnSelectionChange>>,
}

impl FlowStatePatch {
	/// Patch that changes nothing.
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the nodes.
	pub fn nodes(mut self, nodes: impl IntoIterator<Item = Node>) -> Self {
		self.nodes = Some(nodes.into_iter().map(Rc::new).collect());
		self
	}

	/// Replaces the nodes, keeping the identity of shared ones.
	pub fn shared_nodes(mut self, nodes: Vec<Rc<Node>>) -> Self {
		self.nodes = Some(nodes);
		self
	}

	/// Replaces the edges.
	pub fn edges(mut self, edges: impl IntoIterator<Item = Edge>) -> Self {
		self.edges = Some(edges.into_iter().map(Rc::new).collect());
		self
	}

	/// Replaces the edges, keeping the identity of shared ones.
	pub fn shared_edges(mut self, edges: Vec<Rc<Edge>>) -> Self {
		self.edges = Some(edges);
		self
	}

	/// Sets the transform.
	pub fn transform(mut self, transform: Transform) -> Self {
		self.transform = Some(transform);
		self
	}

	/// Sets the viewport size.
	pub fn size(mut self, width: f64, height: f64) -> Self {
		self.width = Some(width);
		self.height = Some(height);
		self
	}

	/// Sets the multi-selection flag.
	pub fn multi_selection_active(mut self, active: bool) -> Self {
		self.multi_selection_active = Some(active);
		self
	}

	/// Sets the box-selection flag.
	pub fn nodes_selection_active(mut self, active: bool) -> Self {
		self.nodes_selection_active = Some(active);
		self
	}

	/// Sets the culling flag.
	pub fn only_render_visible_elements(mut self, only_visible: bool) -> Self {
		self.only_render_visible_elements = Some(only_visible);
		self
	}
}

/// Elements proposed for removal, in canonical store order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PendingDeletion {
	/// Nodes to remove.
	pub nodes: Vec<Rc<Node>>,
	/// Edges to remove.
	pub edges: Vec<Rc<Edge>>,
}

impl PendingDeletion {
	/// Whether nothing would be removed.
	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty() && self.edges.is_empty()
	}
}

/// Verdict of a pre-delete hook.
#[derive(Clone, Debug, PartialEq)]
pub enum BeforeDelete {
	/// Remove the pending elements.
	Proceed,
	/// Remove nothing.
	Veto,
	/// Remove exactly these elements instead.
	Replace(PendingDeletion),
}

/// Arguments of [`FlowStore::delete_elements`]. Without an explicit hook the
/// one registered on the store state is used.
#[derive(Clone, Default)]
pub struct DeleteRequest {
	/// Ids of nodes to remove, with their descendants.
	pub nodes: Vec<String>,
	/// Ids of edges to remove.
	pub edges: Vec<String>,
	/// Hook for this request only.
	pub on_before_delete: Option<OnBeforeDelete>,
}

impl DeleteRequest {
	/// Request for these node and edge ids.
	pub fn new<N, E>(nodes: N, edges: E) -> Self
	where
		N: IntoIterator,
		N::Item: Into<String>,
		E: IntoIterator,
		E::Item: Into<String>,
	{
		Self {
			nodes: nodes.into_iter().map(Into::into).collect(),
			edges: edges.into_iter().map(Into::into).collect(),
			on_before_delete: None,
		}
	}

	/// Sets the hook for this request.
	pub fn on_before_delete(
		mut self,
		hook: impl Fn(&PendingDeletion) -> BeforeDelete + 'static,
	) -> Self {
		self.on_before_delete = Some(Rc::new(hook));
		self
	}
}

/// Result of [`FlowStore::delete_elements`].
#[derive(Clone, Debug, PartialEq)]
pub enum DeleteOutcome {
	/// These elements were removed.
	Deleted(PendingDeletion),
	/// The hook refused the deletion.
	Vetoed,
	/// Nothing matched; state untouched.
	Empty,
	/// Requested during a notification pass; applied once the pass ends.
	Deferred,
}

pub(crate) struct StoreInner {
	state: RefCell<Rc<FlowState>>,
	listeners: RefCell<HandlerRegistry<Listener>>,
	pending: RefCell<VecDeque<Update>>,
	notifying: Cell<bool>,
	torn_down: Cell<bool>,
}

impl StoreInner {
	pub(crate) fn remove_listener(&self, id: HandlerId) {
		self.listeners.borrow_mut().remove(id);
	}
}

struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

/// Handle to one diagram's state. Clones share the same store.
///
/// All mutation goes through [`FlowStore::set_state`] or
/// [`FlowStore::update`]. A mutation issued while subscribers are being
/// notified is queued and applied after the current pass.
#[derive(Clone)]
pub struct FlowStore {
	inner: Rc<StoreInner>,
}

impl Default for FlowStore {
	fn default() -> Self {
		Self::create()
	}
}

impl fmt::Debug for FlowStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("FlowStore")
			.field("state", &self.inner.state.borrow())
			.field("listeners", &self.inner.listeners.borrow().len())
			.field("torn_down", &self.inner.torn_down.get())
			.finish()
	}
}

impl FlowStore {
	/// Empty store.
	pub fn create() -> Self {
		Self::with_state(FlowState::default())
	}

	/// Store seeded with `state`.
	pub fn with_state(state: FlowState) -> Self {
		Self {
			inner: Rc::new(StoreInner {
				state: RefCell::new(Rc::new(state)),
				listeners: RefCell::new(HandlerRegistry::new()),
				pending: RefCell::new(VecDeque::new()),
				notifying: Cell::new(false),
				torn_down: Cell::new(false),
			}),
		}
	}

	/// Drops every subscription and ignores further mutations.
	pub fn teardown(&self) {
		debug!("tearing down flow store");
		self.inner.torn_down.set(true);
		self.inner.pending.borrow_mut().clear();
		*self.inner.listeners.borrow_mut() = HandlerRegistry::new();
	}

	/// Whether [`FlowStore::teardown`] ran.
	pub fn is_torn_down(&self) -> bool {
		self.inner.torn_down.get()
	}

	/// Current snapshot.
	pub fn get_state(&self) -> Rc<FlowState> {
		Rc::clone(&self.inner.state.borrow())
	}

	/// Applies `patch` and notifies subscribers.
	pub fn set_state(&self, patch: FlowStatePatch) {
		self.update(move |_| Some(patch));
	}

	/// Queues a mutation computed from the state current at the time it is
	/// applied; `None` leaves the state and subscribers untouched.
	pub fn update(&self, f: impl FnOnce(&FlowState) -> Option<FlowStatePatch> + 'static) {
		if self.is_torn_down() {
			return;
		}
		self.inner.pending.borrow_mut().push_back(Box::new(f));
		self.flush();
	}

	fn flush(&self) {
		if self.inner.notifying.replace(true) {
			return;
		}
		let _pass = PassGuard(&self.inner.notifying);

		loop {
			let update = self.inner.pending.borrow_mut().pop_front();
			let Some(update) = update else {
				break;
			};
			if self.is_torn_down() {
				self.inner.pending.borrow_mut().clear();
				break;
			}

			let current = self.get_state();
			let Some(patch) = update(&current) else {
				continue;
			};
			let next = Rc::new(current.apply(patch));
			*self.inner.state.borrow_mut() = Rc::clone(&next);

			let listeners = self.inner.listeners.borrow().snapshot();
			for (_, listener) in listeners.iter() {
				if self.is_torn_down() {
					break;
				}
				listener(&next);
			}
			notify_selection_change(&current, &next);
		}
	}

	/// Subscribes with structural equality, the natural identity of plain
	/// values. Shared projections should use [`FlowStore::subscribe_shared`]
	/// or [`shallow`](super::selector::shallow) instead. A value unequal to
	/// itself (`f64::NAN`) is redelivered on every update.
	pub fn subscribe<T, S>(&self, selector: S) -> Subscription<T>
	where
		T: PartialEq + 'static,
		S: Fn(&FlowState) -> T + 'static,
	{
		self.subscribe_with(selector, value_eq)
	}

	/// Subscribes to a shared value by reference identity: a new allocation
	/// is a change even when its contents are equal.
	pub fn subscribe_shared<T, S>(&self, selector: S) -> Subscription<Rc<T>>
	where
		T: ?Sized + 'static,
		S: Fn(&FlowState) -> Rc<T> + 'static,
	{
		self.subscribe_with(selector, identity)
	}

	/// Subscribes with an explicit comparator. The subscription's value is
	/// replaced, and its listener called, only when `equality` reports a
	/// difference. Notifications follow registration order.
	pub fn subscribe_with<T, S, E>(&self, selector: S, equality: E) -> Subscription<T>
	where
		T: 'static,
		S: Fn(&FlowState) -> T + 'static,
		E: Fn(&T, &T) -> bool + 'static,
	{
		let initial = selector(&self.get_state());
		if self.is_torn_down() {
			return Subscription::detached(initial);
		}
		let mut subscription = Subscription::new(initial);
		let listener = subscription.listener(selector, equality);
		let id = self.inner.listeners.borrow_mut().add(listener);
		subscription.attach(Rc::downgrade(&self.inner), id);
		subscription
	}

	/// Logs `error` and forwards it to the registered `on_error` handler.
	pub fn report_error(&self, error: &FlowError) {
		let message = error.to_string();
		warn!("[{}] {}", error.code(), message);
		let on_error = self.get_state().on_error.clone();
		if let Some(on_error) = on_error {
			on_error(error.code(), &message);
		}
	}

	/// Installs the error handler.
	pub fn set_on_error(&self, on_error: impl Fn(&str, &str) + 'static) {
		let on_error: OnError = Rc::new(on_error);
		self.set_state(FlowStatePatch {
			on_error: Some(Some(on_error)),
			..Default::default()
		});
	}

	/// Installs the default pre-delete hook.
	pub fn set_on_before_delete(
		&self,
		hook: impl Fn(&PendingDeletion) -> BeforeDelete + 'static,
	) {
		let hook: OnBeforeDelete = Rc::new(hook);
		self.set_state(FlowStatePatch {
			on_before_delete: Some(Some(hook)),
			..Default::default()
		});
	}

	/// Registers a selection-change handler; see [`FlowStore::remove_selection_change_handler`].
	pub fn on_selection_change(
		&self,
		handler: impl Fn(&[Rc<Node>], &[Rc<Edge>]) + 'static,
	) -> HandlerId {
		let handler: Rc<OnSelectionChange> = Rc::new(handler);
		let id = HandlerId::next();
		self.update(move |state| {
			let mut handlers = state.on_selection_change.clone();
			handlers.insert(id, handler);
			Some(FlowStatePatch {
				on_selection_change: Some(handlers),
				..Default::default()
			})
		});
		id
	}

	/// Removes a handler. Unknown ids are ignored.
	pub fn remove_selection_change_handler(&self, id: HandlerId) {
		self.update(move |state| {
			let mut handlers = state.on_selection_change.clone();
			if !handlers.remove(id) {
				return None;
			}
			Some(FlowStatePatch {
				on_selection_change: Some(handlers),
				..Default::default()
			})
		});
	}

	/// Replaces one node with the result of `f`. Reports
	/// [`FlowError::NodeMissing`] when no node has that id.
	pub fn update_node(&self, id: &str, f: impl FnOnce(&mut Node) + 'static) {
		let store = self.clone();
		let id = id.to_string();
		self.update(move |state| {
			let Some(index) = state.nodes.iter().position(|node| node.id == id) else {
				store.report_error(&FlowError::NodeMissing(id));
				return None;
			};
			let mut node = Node::clone(&state.nodes[index]);
			f(&mut node);
			let mut nodes = state.nodes.clone();
			nodes[index] = Rc::new(node);
			Some(FlowStatePatch::new().shared_nodes(nodes))
		});
	}

	/// Selects the given node. Without `additive` every other element is
	/// unselected; with it, the node's selection is toggled.
	pub fn select_node(&self, id: &str, additive: bool) {
		let id = id.to_string();
		self.update(move |state| {
			state.node(&id)?;
			let nodes = state
				.nodes
				.iter()
				.map(|node| {
					let selected = if node.id == id {
						!additive || !node.selected
					} else {
						additive && node.selected
					};
					with_node_selected(node, selected)
				})
				.collect();
			let edges = state
				.edges
				.iter()
				.map(|edge| with_edge_selected(edge, additive && edge.selected))
				.collect();
			Some(
				FlowStatePatch::new()
					.shared_nodes(nodes)
					.shared_edges(edges),
			)
		});
	}

	/// Clears the selection; a no-op when nothing is selected.
	pub fn unselect_all(&self) {
		self.update(|state| {
			if !state.nodes.iter().any(|n| n.selected) && !state.edges.iter().any(|e| e.selected) {
				return None;
			}
			let nodes = state
				.nodes
				.iter()
				.map(|node| with_node_selected(node, false))
				.collect();
			let edges = state
				.edges
				.iter()
				.map(|edge| with_edge_selected(edge, false))
				.collect();
			Some(
				FlowStatePatch::new()
					.shared_nodes(nodes)
					.shared_edges(edges)
					.nodes_selection_active(false),
			)
		});
	}

	/// Removes the requested nodes, their descendants, every edge touching a
	/// removed node, and the requested edges, as one atomic state change.
	/// Elements marked non-deletable are kept, except edges whose endpoint
	/// goes away.
	pub fn delete_elements(&self, request: DeleteRequest) -> DeleteOutcome {
		let outcome = Rc::new(RefCell::new(None));
		let result = Rc::clone(&outcome);

		self.update(move |state| {
			let proposed = elements_to_remove(state, &request.nodes, &request.edges);
			if proposed.is_empty() {
				*result.borrow_mut() = Some(DeleteOutcome::Empty);
				return None;
			}

			let hook = request
				.on_before_delete
				.clone()
				.or_else(|| state.on_before_delete.clone());
			let removal = match hook.map(|hook| hook(&proposed)) {
				None | Some(BeforeDelete::Proceed) => proposed,
				Some(BeforeDelete::Veto) => {
					debug!("deletion vetoed by before-delete hook");
					*result.borrow_mut() = Some(DeleteOutcome::Vetoed);
					return None;
				}
				Some(BeforeDelete::Replace(replacement)) => replacement,
			};

			let node_ids: HashSet<&str> = removal.nodes.iter().map(|n| n.id.as_str()).collect();
			let edge_ids: HashSet<&str> = removal.edges.iter().map(|e| e.id.as_str()).collect();
			let nodes: Vec<Rc<Node>> = state
				.nodes
				.iter()
				.filter(|node| !node_ids.contains(node.id.as_str()))
				.cloned()
				.collect();
			let edges: Vec<Rc<Edge>> = state
				.edges
				.iter()
				.filter(|edge| !edge_ids.contains(edge.id.as_str()))
				.cloned()
				.collect();

			if nodes.len() == state.nodes.len() && edges.len() == state.edges.len() {
				*result.borrow_mut() = Some(DeleteOutcome::Empty);
				return None;
			}

			debug!(
				"deleting {} node(s) and {} edge(s)",
				state.nodes.len() - nodes.len(),
				state.edges.len() - edges.len()
			);
			let deleted = PendingDeletion {
				nodes: state
					.nodes
					.iter()
					.filter(|node| node_ids.contains(node.id.as_str()))
					.cloned()
					.collect(),
				edges: state
					.edges
					.iter()
					.filter(|edge| edge_ids.contains(edge.id.as_str()))
					.cloned()
					.collect(),
			};
			*result.borrow_mut() = Some(DeleteOutcome::Deleted(deleted));
			Some(
				FlowStatePatch::new()
					.shared_nodes(nodes)
					.shared_edges(edges),
			)
		});

		outcome.take().unwrap_or(DeleteOutcome::Deferred)
	}
}

fn with_node_selected(node: &Rc<Node>, selected: bool) -> Rc<Node> {
	if node.selected == selected {
		return Rc::clone(node);
	}
	Rc::new(Node {
		selected,
		..Node::clone(node)
	})
}

fn with_edge_selected(edge: &Rc<Edge>, selected: bool) -> Rc<Edge> {
	if edge.selected == selected {
		return Rc::clone(edge);
	}
	Rc::new(Edge {
		selected,
		..Edge::clone(edge)
	})
}

fn elements_to_remove(state: &FlowState, node_ids: &[String], edge_ids: &[String]) -> PendingDeletion {
	let requested: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
	let mut removed: HashSet<&str> = state
		.nodes
		.iter()
		.filter(|node| requested.contains(node.id.as_str()) && node.is_deletable())
		.map(|node| node.id.as_str())
		.collect();

	// Children follow their parents.
	loop {
		let children: Vec<&str> = state
			.nodes
			.iter()
			.filter(|node| !removed.contains(node.id.as_str()) && node.is_deletable())
			.filter(|node| {
				node.parent_id
					.as_deref()
					.is_some_and(|parent| removed.contains(parent))
			})
			.map(|node| node.id.as_str())
			.collect();
		if children.is_empty() {
			break;
		}
		removed.extend(children);
	}

	let requested_edges: HashSet<&str> = edge_ids.iter().map(String::as_str).collect();
	PendingDeletion {
		nodes: state
			.nodes
			.iter()
			.filter(|node| removed.contains(node.id.as_str()))
			.cloned()
			.collect(),
		edges: state
			.edges
			.iter()
			.filter(|edge| {
				removed.contains(edge.source.as_str())
					|| removed.contains(edge.target.as_str())
					|| (requested_edges.contains(edge.id.as_str()) && edge.is_deletable())
			})
			.cloned()
			.collect(),
	}
}

fn selected_ids<'a>(nodes: &'a [Rc<Node>], edges: &'a [Rc<Edge>]) -> (Vec<&'a str>, Vec<&'a str>) {
	(
		nodes.iter().filter(|n| n.selected).map(|n| n.id.as_str()).collect(),
		edges.iter().filter(|e| e.selected).map(|e| e.id.as_str()).collect(),
	)
}

// Moving or restyling a selected element is not a selection change.
fn notify_selection_change(previous: &FlowState, next: &FlowState) {
	if next.on_selection_change.is_empty() {
		return;
	}
	if selected_ids(&previous.nodes, &previous.edges) == selected_ids(&next.nodes, &next.edges) {
		return;
	}
	let (nodes, edges) = (next.selected_nodes(), next.selected_edges());
	for (_, handler) in next.on_selection_change.snapshot().iter() {
		handler(&nodes, &edges);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::components::flow::selector::shallow;

	fn same_elements<T>(a: &[Rc<T>], b: &[Rc<T>]) -> bool {
		a.len() == b.len() && a.iter().zip(b).all(|(x, y)| Rc::ptr_eq(x, y))
	}

	fn store_with(nodes: Vec<Node>, edges: Vec<Edge>) -> FlowStore {
		let store = FlowStore::create();
		store.set_state(FlowStatePatch::new().nodes(nodes).edges(edges));
		store
	}

	fn ids<T>(items: &[Rc<T>], id: impl Fn(&T) -> &str) -> Vec<String> {
		items.iter().map(|item| id(item).to_string()).collect()
	}

	#[test]
	fn set_state_is_last_write_wins_per_field() {
		let store = FlowStore::create();
		store.set_state(FlowStatePatch::new().size(100.0, 50.0));
		store.set_state(FlowStatePatch::new().transform(Transform::new(1.0, 2.0, 3.0)));
		store.set_state(FlowStatePatch::new().size(200.0, 50.0).multi_selection_active(true));

		let state = store.get_state();
		assert_eq!(state.width, 200.0);
		assert_eq!(state.height, 50.0);
		assert_eq!(state.transform, Transform::new(1.0, 2.0, 3.0));
		assert!(state.multi_selection_active);
	}

	#[test]
	fn get_state_returns_the_same_snapshot_until_a_mutation() {
		let store = FlowStore::create();
		let a = store.get_state();
		assert!(Rc::ptr_eq(&a, &store.get_state()));
		store.set_state(FlowStatePatch::new().size(1.0, 1.0));
		assert!(!Rc::ptr_eq(&a, &store.get_state()));
	}

	#[test]
	fn subscription_only_fires_when_projection_changes() {
		let store = FlowStore::create();
		let width = store.subscribe(|s| s.width);

		store.set_state(FlowStatePatch::new().multi_selection_active(true));
		assert_eq!(width.deliveries(), 0, "unrelated field must not notify");

		store.set_state(FlowStatePatch::new().size(10.0, 0.0));
		assert_eq!(width.deliveries(), 1);
		assert_eq!(width.get(), 10.0);
	}

	#[test]
	fn shared_subscription_fires_on_new_allocations_only() {
		let store = store_with(vec![Node::new("a", 0.0, 0.0), Node::new("b", 0.0, 0.0)], vec![]);
		let first = store.subscribe_shared(|s| Rc::clone(&s.nodes[0]));
		let by_value = store.subscribe(|s| Node::clone(&s.nodes[0]));

		store.update_node("b", |node| node.position = XYPosition::new(1.0, 1.0));
		assert_eq!(first.deliveries(), 0, "node a kept its allocation");

		store.update_node("a", |_| {});
		assert_eq!(first.deliveries(), 1, "a rebuilt node is a new value");
		assert_eq!(by_value.deliveries(), 0, "its contents did not change");
	}

	#[test]
	fn shallow_subscription_ignores_rebuilt_edge_list() {
		let store = store_with(
			vec![Node::new("a", 0.0, 0.0), Node::new("b", 0.0, 0.0)],
			vec![Edge::new("e1", "a", "b")],
		);
		let edges = store.subscribe_with(|s| s.edges.clone(), shallow);

		let same = store.get_state().edges.clone();
		store.set_state(FlowStatePatch::new().shared_edges(same));
		assert_eq!(edges.deliveries(), 0);

		store.set_state(FlowStatePatch::new().edges(vec![Edge::new("e1", "a", "b")]));
		assert_eq!(edges.deliveries(), 1, "fresh edge allocations are a change");
	}

	#[test]
	fn subscribers_are_notified_in_registration_order() {
		let store = FlowStore::create();
		let log = Rc::new(RefCell::new(Vec::new()));
		let first = store.subscribe(|s| s.width);
		let second = store.subscribe(|s| s.width);
		let l = Rc::clone(&log);
		first.listen(move |_| l.borrow_mut().push("first"));
		let l = Rc::clone(&log);
		second.listen(move |_| l.borrow_mut().push("second"));

		store.set_state(FlowStatePatch::new().size(5.0, 5.0));
		assert_eq!(*log.borrow(), ["first", "second"]);
	}

	#[test]
	fn identical_selectors_are_independent() {
		let store = FlowStore::create();
		let a = store.subscribe(|s| s.width);
		let b = store.subscribe(|s| s.width);
		a.unsubscribe();
		store.set_state(FlowStatePatch::new().size(3.0, 3.0));
		assert_eq!(a.deliveries(), 0);
		assert_eq!(b.deliveries(), 1);
	}

	#[test]
	fn mutation_from_a_listener_is_deferred_until_the_pass_ends() {
		let store = FlowStore::create();
		let seen_by_second = Rc::new(RefCell::new(Vec::new()));

		let first = store.subscribe(|s| s.width);
		let writer = store.clone();
		first.listen(move |width| {
			if *width == 1.0 {
				writer.set_state(FlowStatePatch::new().size(2.0, 0.0));
				assert_eq!(writer.get_state().width, 1.0, "write must not apply mid-pass");
			}
		});
		let second = store.subscribe(|s| s.width);
		let seen = Rc::clone(&seen_by_second);
		second.listen(move |width| seen.borrow_mut().push(*width));

		store.set_state(FlowStatePatch::new().size(1.0, 0.0));
		assert_eq!(*seen_by_second.borrow(), [1.0, 2.0]);
		assert_eq!(store.get_state().width, 2.0);
	}

	#[test]
	fn unsubscribe_is_idempotent_and_survives_teardown() {
		let store = FlowStore::create();
		let sub = store.subscribe(|s| s.width);
		sub.unsubscribe();
		sub.unsubscribe();

		let other = store.subscribe(|s| s.height);
		store.teardown();
		other.unsubscribe();
		drop(store);
		other.unsubscribe();
		assert!(!other.is_active());
	}

	#[test]
	fn teardown_ignores_later_mutations() {
		let store = FlowStore::create();
		let width = store.subscribe(|s| s.width);
		store.teardown();
		store.set_state(FlowStatePatch::new().size(9.0, 9.0));
		assert_eq!(store.get_state().width, 0.0);
		assert_eq!(width.deliveries(), 0);
	}

	#[test]
	fn delete_elements_removes_edges_touching_removed_nodes() {
		let store = store_with(
			vec![
				Node::new("A", 0.0, 0.0).selected(true),
				Node::new("B", 0.0, 0.0).selected(true),
				Node::new("C", 0.0, 0.0),
			],
			vec![Edge::new("e1", "A", "C"), Edge::new("e2", "C", "C")],
		);

		let outcome = store.delete_elements(DeleteRequest::new(["A", "B"], Vec::<String>::new()));
		let state = store.get_state();
		assert_eq!(ids(&state.nodes, |n| n.id.as_str()), ["C"]);
		assert_eq!(ids(&state.edges, |e| e.id.as_str()), ["e2"]);
		match outcome {
			DeleteOutcome::Deleted(deleted) => {
				assert_eq!(ids(&deleted.nodes, |n| n.id.as_str()), ["A", "B"]);
				assert_eq!(ids(&deleted.edges, |e| e.id.as_str()), ["e1"]);
			}
			other => panic!("expected deletion, got {other:?}"),
		}
	}

	#[test]
	fn delete_elements_follows_parent_links() {
		let mut child = Node::new("child", 0.0, 0.0);
		child.parent_id = Some("group".into());
		let mut grandchild = Node::new("grandchild", 0.0, 0.0);
		grandchild.parent_id = Some("child".into());
		let store = store_with(
			vec![Node::new("group", 0.0, 0.0), child, grandchild, Node::new("other", 0.0, 0.0)],
			vec![],
		);

		store.delete_elements(DeleteRequest::new(["group"], Vec::<String>::new()));
		assert_eq!(ids(&store.get_state().nodes, |n| n.id.as_str()), ["other"]);
	}

	#[test]
	fn non_deletable_elements_survive() {
		let mut pinned = Node::new("pinned", 0.0, 0.0);
		pinned.deletable = Some(false);
		let mut kept = Edge::new("kept", "x", "y");
		kept.deletable = Some(false);
		let store = store_with(vec![pinned], vec![kept]);

		let outcome = store.delete_elements(DeleteRequest::new(["pinned"], ["kept"]));
		assert_eq!(outcome, DeleteOutcome::Empty);
		assert_eq!(store.get_state().nodes.len(), 1);
		assert_eq!(store.get_state().edges.len(), 1);
	}

	#[test]
	fn empty_deletion_does_not_notify() {
		let store = store_with(vec![Node::new("a", 0.0, 0.0)], vec![]);
		let nodes = store.subscribe_with(|s| s.nodes.clone(), shallow);
		let before = store.get_state();

		let outcome = store.delete_elements(DeleteRequest::default());
		assert_eq!(outcome, DeleteOutcome::Empty);
		assert!(Rc::ptr_eq(&before, &store.get_state()));
		assert_eq!(nodes.deliveries(), 0);
	}

	#[test]
	fn vetoed_deletion_leaves_collections_identical() {
		let store = store_with(
			vec![Node::new("a", 0.0, 0.0), Node::new("b", 0.0, 0.0)],
			vec![Edge::new("e", "a", "b")],
		);
		let before = store.get_state();
		let asked = Rc::new(Cell::new(0));
		let counter = Rc::clone(&asked);

		let outcome = store.delete_elements(DeleteRequest::new(["a"], ["e"]).on_before_delete(
			move |pending| {
				counter.set(counter.get() + 1);
				assert_eq!(pending.nodes.len(), 1);
				BeforeDelete::Veto
			},
		));

		assert_eq!(outcome, DeleteOutcome::Vetoed);
		assert_eq!(asked.get(), 1);
		let after = store.get_state();
		assert!(Rc::ptr_eq(&before, &after));
		assert!(same_elements(&before.nodes, &after.nodes));
		assert!(same_elements(&before.edges, &after.edges));
	}

	#[test]
	fn before_delete_hook_can_narrow_the_removal() {
		let store = store_with(
			vec![Node::new("a", 0.0, 0.0), Node::new("b", 0.0, 0.0)],
			vec![Edge::new("e", "a", "b")],
		);
		store.set_on_before_delete(|pending| {
			BeforeDelete::Replace(PendingDeletion {
				nodes: Vec::new(),
				edges: pending.edges.clone(),
			})
		});

		store.delete_elements(DeleteRequest::new(["a"], Vec::<String>::new()));
		let state = store.get_state();
		assert_eq!(ids(&state.nodes, |n| n.id.as_str()), ["a", "b"]);
		assert!(state.edges.is_empty());
	}

	#[test]
	fn deletion_inside_a_listener_is_deferred() {
		let store = store_with(vec![Node::new("a", 0.0, 0.0)], vec![]);
		let outcome = Rc::new(RefCell::new(None));
		let width = store.subscribe(|s| s.width);
		let (writer, result) = (store.clone(), Rc::clone(&outcome));
		width.listen(move |_| {
			*result.borrow_mut() =
				Some(writer.delete_elements(DeleteRequest::new(["a"], Vec::<String>::new())));
		});

		store.set_state(FlowStatePatch::new().size(1.0, 1.0));
		assert_eq!(*outcome.borrow(), Some(DeleteOutcome::Deferred));
		assert!(store.get_state().nodes.is_empty());
	}

	#[test]
	fn selection_change_handlers_see_the_new_selection() {
		let store = store_with(vec![Node::new("a", 0.0, 0.0), Node::new("b", 0.0, 0.0)], vec![]);
		let calls = Rc::new(RefCell::new(Vec::new()));
		let log = Rc::clone(&calls);
		let id = store.on_selection_change(move |nodes, edges| {
			log.borrow_mut().push((ids(nodes, |n| n.id.as_str()), edges.len()));
		});

		store.select_node("b", false);
		store.set_state(FlowStatePatch::new().size(4.0, 4.0));
		store.remove_selection_change_handler(id);
		store.select_node("a", false);

		assert_eq!(*calls.borrow(), [(vec!["b".to_string()], 0)]);
	}

	#[test]
	fn moving_a_selected_node_is_not_a_selection_change() {
		let store = store_with(vec![Node::new("a", 0.0, 0.0), Node::new("b", 0.0, 0.0)], vec![]);
		store.select_node("a", false);
		let calls = Rc::new(Cell::new(0));
		let counter = Rc::clone(&calls);
		store.on_selection_change(move |_, _| counter.set(counter.get() + 1));

		for step in 1..=5 {
			let x = step as f64 * 10.0;
			store.update_node("a", move |node| node.position = XYPosition::new(x, 0.0));
		}
		assert_eq!(store.get_state().nodes[0].position, XYPosition::new(50.0, 0.0));
		assert_eq!(calls.get(), 0, "selection stayed [a] throughout the drag");

		store.select_node("b", true);
		assert_eq!(calls.get(), 1);
	}

	#[test]
	fn additive_selection_toggles() {
		let store = store_with(vec![Node::new("a", 0.0, 0.0), Node::new("b", 0.0, 0.0)], vec![]);
		store.select_node("a", false);
		store.select_node("b", true);
		assert_eq!(ids(&store.get_state().selected_nodes(), |n| n.id.as_str()), ["a", "b"]);
		store.select_node("a", true);
		assert_eq!(ids(&store.get_state().selected_nodes(), |n| n.id.as_str()), ["b"]);
		store.unselect_all();
		assert!(store.get_state().selected_nodes().is_empty());
	}

	#[test]
	fn update_node_reports_missing_ids() {
		let store = store_with(vec![Node::new("a", 0.0, 0.0)], vec![]);
		let errors = Rc::new(RefCell::new(Vec::new()));
		let log = Rc::clone(&errors);
		store.set_on_error(move |code, message| {
			log.borrow_mut().push((code.to_string(), message.to_string()))
		});

		store.update_node("a", |node| node.position = XYPosition::new(5.0, 6.0));
		store.update_node("missing", |_| {});

		assert_eq!(store.get_state().nodes[0].position, XYPosition::new(5.0, 6.0));
		assert_eq!(errors.borrow().len(), 1);
		assert_eq!(errors.borrow()[0].0, "010");
	}

	#[test]
	fn z_index_overrides_insertion_order() {
		let mut top = Node::new("top", 0.0, 0.0).with_size(10.0, 10.0);
		top.z_index = Some(1);
		let bottom = Node::new("bottom", 0.0, 0.0).with_size(10.0, 10.0);
		let store = store_with(vec![top, bottom], vec![]);
		let state = store.get_state();

		assert_eq!(ids(&state.nodes_in_render_order(), |n| n.id.as_str()), ["bottom", "top"]);
		assert_eq!(
			state.node_at(XYPosition::new(5.0, 5.0)).map(|n| n.id.clone()),
			Some("top".to_string())
		);
	}
}
