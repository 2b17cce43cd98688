//! Key bindings and the keyboard side of selection.

use std::collections::HashSet;
use std::str::FromStr;

use log::debug;
use serde::Deserialize;

use super::error::{FlowError, Result};
use super::state::{DeleteRequest, FlowStatePatch, FlowStore};

/// A key binding: alternatives of `+`-joined key combinations, or disabled.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "Option<KeyCodeRepr>")]
pub enum KeyCode {
	/// Never pressed.
	#[default]
	Disabled,
	/// Pressed when all keys of any one combination are held.
	Combos(Vec<Vec<String>>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyCodeRepr {
	One(String),
	Many(Vec<String>),
}

impl TryFrom<Option<KeyCodeRepr>> for KeyCode {
	type Error = FlowError;

	fn try_from(repr: Option<KeyCodeRepr>) -> Result<Self> {
		match repr {
			None => Ok(KeyCode::Disabled),
			Some(KeyCodeRepr::One(code)) => code.parse(),
			Some(KeyCodeRepr::Many(codes)) => KeyCode::any(codes.iter().map(String::as_str)),
		}
	}
}

impl FromStr for KeyCode {
	type Err = FlowError;

	fn from_str(code: &str) -> Result<Self> {
		Ok(KeyCode::Combos(vec![parse_combo(code)?]))
	}
}

fn parse_combo(code: &str) -> Result<Vec<String>> {
	let keys: Vec<String> = code.split('+').map(|key| key.trim().to_string()).collect();
	if keys.iter().any(String::is_empty) {
		return Err(FlowError::InvalidKeyCode(code.to_string()));
	}
	Ok(keys)
}

impl KeyCode {
	/// Pressed when any of `codes` is.
	pub fn any<'a>(codes: impl IntoIterator<Item = &'a str>) -> Result<Self> {
		let combos = codes.into_iter().map(parse_combo).collect::<Result<Vec<_>>>()?;
		if combos.is_empty() {
			return Ok(KeyCode::Disabled);
		}
		Ok(KeyCode::Combos(combos))
	}

	/// Whether the binding is off.
	pub fn is_disabled(&self) -> bool {
		matches!(self, KeyCode::Disabled)
	}
}

/// Whether an element with this tag name takes typed text, so key presses
/// on it must not drive diagram shortcuts.
pub fn is_text_entry(tag_name: &str, content_editable: bool) -> bool {
	content_editable
		|| ["INPUT", "TEXTAREA", "SELECT"]
			.iter()
			.any(|tag| tag_name.eq_ignore_ascii_case(tag))
}

fn key_matches(held: &str, wanted: &str) -> bool {
	held == wanted || (held.chars().count() == 1 && held.eq_ignore_ascii_case(wanted))
}

/// Keys currently held down.
#[derive(Clone, Debug, Default)]
pub struct KeyTracker {
	held: HashSet<String>,
}

impl KeyTracker {
	/// Records a press.
	pub fn key_down(&mut self, key: &str) {
		self.held.insert(key.to_string());
	}

	/// Records a release.
	pub fn key_up(&mut self, key: &str) {
		// While Meta is held browsers swallow other key-up events.
		if key == "Meta" {
			self.held.clear();
			return;
		}
		self.held.retain(|held| !key_matches(held, key));
	}

	/// Forgets every held key.
	pub fn clear(&mut self) {
		self.held.clear();
	}

	/// Whether every key of some combination in `code` is held.
	pub fn is_pressed(&self, code: &KeyCode) -> bool {
		match code {
			KeyCode::Disabled => false,
			KeyCode::Combos(combos) => combos.iter().any(|combo| {
				combo
					.iter()
					.all(|wanted| self.held.iter().any(|held| key_matches(held, wanted)))
			}),
		}
	}
}

/// Turns the delete and multi-selection bindings into store mutations.
///
/// Deletion fires on the press edge of the delete binding; the
/// multi-selection flag follows the level of its binding.
#[derive(Debug)]
pub struct SelectionKeyEngine {
	store: FlowStore,
	delete_key_code: KeyCode,
	multi_selection_key_code: KeyCode,
	keys: KeyTracker,
	delete_pressed: bool,
	multi_selection_pressed: bool,
}

impl SelectionKeyEngine {
	/// Binds to `store` and resets its multi-selection flag.
	pub fn new(store: FlowStore, delete_key_code: KeyCode, multi_selection_key_code: KeyCode) -> Self {
		store.set_state(FlowStatePatch::new().multi_selection_active(false));
		Self {
			store,
			delete_key_code,
			multi_selection_key_code,
			keys: KeyTracker::default(),
			delete_pressed: false,
			multi_selection_pressed: false,
		}
	}

	/// Feeds a key press.
	pub fn key_down(&mut self, key: &str) {
		self.keys.key_down(key);
		self.sync();
	}

	/// Feeds a key release.
	pub fn key_up(&mut self, key: &str) {
		self.keys.key_up(key);
		self.sync();
	}

	/// Window lost focus; nothing is held any more.
	pub fn blur(&mut self) {
		self.keys.clear();
		self.sync();
	}

	fn sync(&mut self) {
		let delete = self.keys.is_pressed(&self.delete_key_code);
		let multi_selection = self.keys.is_pressed(&self.multi_selection_key_code);
		self.set_pressed(delete, multi_selection);
	}

	/// Feeds the two binding levels directly.
	pub fn set_pressed(&mut self, delete: bool, multi_selection: bool) {
		let delete = delete && !self.delete_key_code.is_disabled();
		let multi_selection = multi_selection && !self.multi_selection_key_code.is_disabled();

		if delete && !self.delete_pressed {
			self.delete_selection();
		}
		self.delete_pressed = delete;

		if multi_selection != self.multi_selection_pressed {
			self.multi_selection_pressed = multi_selection;
			self.store
				.set_state(FlowStatePatch::new().multi_selection_active(multi_selection));
		}
	}

	fn delete_selection(&self) {
		let state = self.store.get_state();
		let request = DeleteRequest {
			nodes: state.nodes.iter().filter(|n| n.selected).map(|n| n.id.clone()).collect(),
			edges: state.edges.iter().filter(|e| e.selected).map(|e| e.id.clone()).collect(),
			on_before_delete: state.on_before_delete.clone(),
		};
		debug!(
			"delete key: {} node(s), {} edge(s) selected",
			request.nodes.len(),
			request.edges.len()
		);
		self.store.delete_elements(request);
		self.store
			.set_state(FlowStatePatch::new().nodes_selection_active(false));
	}
}
