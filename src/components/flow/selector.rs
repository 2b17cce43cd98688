//! Store subscriptions and the comparators that decide when they fire.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::registry::HandlerId;
use super::state::{FlowState, Listener, StoreInner};
use super::types::{Edge, Node};

/// Default comparator: structural equality.
pub fn value_eq<T: PartialEq>(a: &T, b: &T) -> bool {
	a == b
}

/// Reference identity for shared values.
pub fn identity<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
	Rc::ptr_eq(a, b)
}

/// Element-wise [`ShallowEq`] over two lists. A fresh list holding the same
/// elements in the same order compares equal.
#[allow(clippy::ptr_arg)]
pub fn shallow<T: ShallowEq>(a: &Vec<T>, b: &Vec<T>) -> bool {
	a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.shallow_eq(y))
}

/// One level of comparison: identity for shared values, equality for plain
/// values.
pub trait ShallowEq {
	/// Whether `self` and `other` are the same at the first level.
	fn shallow_eq(&self, other: &Self) -> bool;
}

impl<T: ?Sized> ShallowEq for Rc<T> {
	fn shallow_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(self, other)
	}
}

impl ShallowEq for String {
	fn shallow_eq(&self, other: &Self) -> bool {
		self == other
	}
}

impl ShallowEq for &str {
	fn shallow_eq(&self, other: &Self) -> bool {
		self == other
	}
}

/// Selector for the node list; pair with [`shallow`].
pub fn nodes(state: &FlowState) -> Vec<Rc<Node>> {
	state.nodes.clone()
}

/// Selector for the edge list; pair with [`shallow`].
pub fn edges(state: &FlowState) -> Vec<Rc<Edge>> {
	state.edges.clone()
}

/// Selected nodes and edges, in store order.
pub type SelectedElements = (Vec<Rc<Node>>, Vec<Rc<Edge>>);

/// Selector for the current selection; pair with [`same_selection`].
pub fn selected_elements(state: &FlowState) -> SelectedElements {
	(state.selected_nodes(), state.selected_edges())
}

/// [`shallow`] over both halves of a [`SelectedElements`].
pub fn same_selection(a: &SelectedElements, b: &SelectedElements) -> bool {
	shallow(&a.0, &b.0) && shallow(&a.1, &b.1)
}

struct Selected<T> {
	value: RefCell<T>,
	active: Cell<bool>,
	deliveries: Cell<u64>,
	on_change: RefCell<Option<Rc<dyn Fn(&T)>>>,
}

/// Live projection of store state.
///
/// Holds the last delivered value of its selector. Dropping the handle
/// unsubscribes; [`Subscription::unsubscribe`] does the same explicitly and
/// may be called any number of times, including after the store is gone.
pub struct Subscription<T> {
	selected: Rc<Selected<T>>,
	store: Weak<StoreInner>,
	id: Cell<Option<HandlerId>>,
}

impl<T: 'static> Subscription<T> {
	pub(crate) fn new(initial: T) -> Self {
		Self {
			selected: Rc::new(Selected {
				value: RefCell::new(initial),
				active: Cell::new(true),
				deliveries: Cell::new(0),
				on_change: RefCell::new(None),
			}),
			store: Weak::new(),
			id: Cell::new(None),
		}
	}

	pub(crate) fn attach(&mut self, store: Weak<StoreInner>, id: HandlerId) {
		self.store = store;
		self.id.set(Some(id));
	}

	pub(crate) fn detached(initial: T) -> Self {
		let subscription = Self::new(initial);
		subscription.selected.active.set(false);
		subscription
	}

	/// Builds the store-side listener that diffs the projection.
	pub(crate) fn listener<S, E>(&self, selector: S, equality: E) -> Rc<Listener>
	where
		S: Fn(&FlowState) -> T + 'static,
		E: Fn(&T, &T) -> bool + 'static,
	{
		let selected = Rc::clone(&self.selected);
		Rc::new(move |state: &FlowState| {
			if !selected.active.get() {
				return;
			}
			let next = selector(state);
			if equality(&selected.value.borrow(), &next) {
				return;
			}
			*selected.value.borrow_mut() = next;
			selected.deliveries.set(selected.deliveries.get() + 1);
			let on_change = selected.on_change.borrow().clone();
			if let Some(on_change) = on_change {
				on_change(&selected.value.borrow());
			}
		})
	}

	/// Current projected value.
	pub fn get(&self) -> T
	where
		T: Clone,
	{
		self.selected.value.borrow().clone()
	}

	/// Borrows the current value without cloning it.
	pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
		f(&self.selected.value.borrow())
	}

	/// Number of times a changed value was delivered.
	pub fn deliveries(&self) -> u64 {
		self.selected.deliveries.get()
	}

	/// Called with the new value after each delivery. Replaces any earlier
	/// callback.
	pub fn listen(&self, on_change: impl Fn(&T) + 'static) {
		*self.selected.on_change.borrow_mut() = Some(Rc::new(on_change));
	}

	/// Whether the subscription still receives updates.
	pub fn is_active(&self) -> bool {
		self.selected.active.get()
	}

	/// Stops delivery. Idempotent.
	pub fn unsubscribe(&self) {
		self.selected.active.set(false);
		let Some(id) = self.id.take() else {
			return;
		};
		if let Some(store) = self.store.upgrade() {
			store.remove_listener(id);
		}
	}
}

impl<T> Drop for Subscription<T> {
	fn drop(&mut self) {
		self.selected.active.set(false);
		if let (Some(id), Some(store)) = (self.id.take(), self.store.upgrade()) {
			store.remove_listener(id);
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for Subscription<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Subscription")
			.field("value", &self.selected.value.borrow())
			.field("active", &self.selected.active.get())
			.finish()
	}
}
