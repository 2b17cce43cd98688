//! Ordered callback registry.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable handle returned by [`HandlerRegistry::add`]. Unique per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
	/// Fresh id, never handed out before.
	pub fn next() -> Self {
		HandlerId(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
	}
}

/// Ordered, copy-on-write list of callbacks.
///
/// Every mutation builds a new list, so a caller iterating a previously
/// obtained [`HandlerRegistry::snapshot`] never observes a registration or
/// removal made during that iteration. Cloning is O(1).
pub struct HandlerRegistry<F: ?Sized> {
	entries: Rc<Vec<(HandlerId, Rc<F>)>>,
}

impl<F: ?Sized> Clone for HandlerRegistry<F> {
	fn clone(&self) -> Self {
		Self {
			entries: Rc::clone(&self.entries),
		}
	}
}

impl<F: ?Sized> Default for HandlerRegistry<F> {
	fn default() -> Self {
		Self {
			entries: Rc::new(Vec::new()),
		}
	}
}

impl<F: ?Sized> fmt::Debug for HandlerRegistry<F> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("HandlerRegistry")
			.field("len", &self.entries.len())
			.finish()
	}
}

impl<F: ?Sized> HandlerRegistry<F> {
	/// Empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends `handler`; invocation order is insertion order.
	pub fn add(&mut self, handler: Rc<F>) -> HandlerId {
		let id = HandlerId::next();
		self.insert(id, handler);
		id
	}

	/// Appends `handler` under an id obtained from [`HandlerId::next`].
	/// An id already present is left alone.
	pub fn insert(&mut self, id: HandlerId, handler: Rc<F>) {
		if self.contains(id) {
			return;
		}
		let mut next = Vec::with_capacity(self.entries.len() + 1);
		next.extend(self.entries.iter().cloned());
		next.push((id, handler));
		self.entries = Rc::new(next);
	}

	/// Removes the handler registered under `id`. Returns whether it was
	/// present; removing twice is a no-op.
	pub fn remove(&mut self, id: HandlerId) -> bool {
		if !self.entries.iter().any(|(entry, _)| *entry == id) {
			return false;
		}
		let next = self
			.entries
			.iter()
			.filter(|(entry, _)| *entry != id)
			.cloned()
			.collect();
		self.entries = Rc::new(next);
		true
	}

	/// Removes every registration of exactly this handler allocation.
	pub fn remove_handler(&mut self, handler: &Rc<F>) -> bool {
		if !self.entries.iter().any(|(_, h)| Rc::ptr_eq(h, handler)) {
			return false;
		}
		let next = self
			.entries
			.iter()
			.filter(|(_, h)| !Rc::ptr_eq(h, handler))
			.cloned()
			.collect();
		self.entries = Rc::new(next);
		true
	}

	/// Whether `id` is registered.
	pub fn contains(&self, id: HandlerId) -> bool {
		self.entries.iter().any(|(entry, _)| *entry == id)
	}

	/// Number of registered handlers.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Whether nothing is registered.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// The current list. Later mutations of `self` do not affect it.
	pub fn snapshot(&self) -> Rc<Vec<(HandlerId, Rc<F>)>> {
		Rc::clone(&self.entries)
	}

	/// Handlers in invocation order.
	pub fn iter(&self) -> impl Iterator<Item = &Rc<F>> {
		self.entries.iter().map(|(_, handler)| handler)
	}
}

#[cfg(test)]
mod tests {
	use std::cell::RefCell;

	use super::*;

	type Handler = dyn Fn(&mut Vec<&'static str>);

	#[test]
	fn handlers_run_in_registration_order() {
		let mut registry: HandlerRegistry<Handler> = HandlerRegistry::new();
		registry.add(Rc::new(|log: &mut Vec<&'static str>| log.push("first")));
		registry.add(Rc::new(|log: &mut Vec<&'static str>| log.push("second")));

		let mut log = Vec::new();
		for handler in registry.iter() {
			handler(&mut log);
		}
		assert_eq!(log, ["first", "second"]);
	}

	#[test]
	fn remove_is_idempotent() {
		let mut registry: HandlerRegistry<Handler> = HandlerRegistry::new();
		let id = registry.add(Rc::new(|_: &mut Vec<&'static str>| {}));
		assert!(registry.remove(id));
		assert!(!registry.remove(id));
		assert!(registry.is_empty());
	}

	#[test]
	fn remove_handler_matches_by_identity() {
		let mut registry: HandlerRegistry<Handler> = HandlerRegistry::new();
		let a: Rc<Handler> = Rc::new(|_: &mut Vec<&'static str>| {});
		let b: Rc<Handler> = Rc::new(|_: &mut Vec<&'static str>| {});
		registry.add(Rc::clone(&a));
		registry.add(Rc::clone(&b));

		assert!(registry.remove_handler(&a));
		assert_eq!(registry.len(), 1);
		assert!(Rc::ptr_eq(registry.iter().next().unwrap(), &b));
	}

	#[test]
	fn snapshot_is_unaffected_by_later_registration() {
		let registry = RefCell::new(HandlerRegistry::<Handler>::new());
		registry
			.borrow_mut()
			.add(Rc::new(|log: &mut Vec<&'static str>| log.push("only")));

		let snapshot = registry.borrow().snapshot();
		registry
			.borrow_mut()
			.add(Rc::new(|log: &mut Vec<&'static str>| log.push("late")));

		let mut log = Vec::new();
		for (_, handler) in snapshot.iter() {
			handler(&mut log);
		}
		assert_eq!(log, ["only"]);
		assert_eq!(registry.borrow().len(), 2);
	}
}
