//! Interactive canvas view over a [`FlowStore`](super::FlowStore).

use std::cell::RefCell;
use std::rc::Rc;

use leptos::prelude::*;
use log::{debug, warn};
use wasm_bindgen::prelude::*;
use web_sys::{
	CanvasRenderingContext2d, Event, HtmlCanvasElement, HtmlElement, KeyboardEvent, MouseEvent, WheelEvent, Window,
};

use super::config::FlowConfig;
use super::culling::visible_node_ids_selector;
use super::keys::{SelectionKeyEngine, is_text_entry};
use super::markers::MarkerResolver;
use super::render;
use super::selector::{Subscription, shallow};
use super::state::{FlowState, FlowStatePatch, FlowStore, MAX_ZOOM, MIN_ZOOM};
use super::types::{Edge, Node, Transform, XYPosition};

/// Everything a repaint depends on.
type Scene = (Vec<Rc<Node>>, Vec<Rc<Edge>>, Transform, f64, f64);

fn scene(state: &FlowState) -> Scene {
	(
		state.nodes.clone(),
		state.edges.clone(),
		state.transform,
		state.width,
		state.height,
	)
}

fn same_scene(a: &Scene, b: &Scene) -> bool {
	shallow(&a.0, &b.0) && shallow(&a.1, &b.1) && a.2 == b.2 && a.3 == b.3 && a.4 == b.4
}

/// Bridges a store subscription into a leptos signal. The subscription lives
/// as long as the reactive owner calling this.
pub fn use_flow_selector<T, S, E>(store: &FlowStore, selector: S, equality: E) -> ReadSignal<T, LocalStorage>
where
	T: Clone + 'static,
	S: Fn(&FlowState) -> T + 'static,
	E: Fn(&T, &T) -> bool + 'static,
{
	let subscription = store.subscribe_with(selector, equality);
	let signal = RwSignal::new_local(subscription.get());
	subscription.listen(move |value| {
		let _ = signal.try_set(value.clone());
	});
	StoredValue::new_local(subscription);
	signal.read_only()
}

struct Renderer {
	store: FlowStore,
	ctx: CanvasRenderingContext2d,
	resolver: MarkerResolver,
	config: FlowConfig,
	visible: Subscription<Vec<String>>,
	edges: RefCell<Vec<Rc<Edge>>>,
}

impl Renderer {
	fn draw(&self) {
		let state = self.store.get_state();
		let edges_changed = !shallow(&self.edges.borrow(), &state.edges);
		if edges_changed {
			self.resolver.forget();
			*self.edges.borrow_mut() = state.edges.clone();
		}
		self.visible
			.with(|ids| render::render(&state, &self.ctx, ids, &self.resolver, &self.config));
	}
}

#[derive(Clone, Debug, Default)]
enum Gesture {
	#[default]
	Idle,
	Pan {
		start: (f64, f64),
		origin: Transform,
	},
	Drag {
		id: String,
		start: (f64, f64),
		origin: XYPosition,
	},
}

struct WindowListener {
	window: Window,
	event: &'static str,
	callback: Closure<dyn FnMut(Event)>,
}

impl WindowListener {
	fn add(window: &Window, event: &'static str, callback: impl FnMut(Event) + 'static) -> Self {
		let callback = Closure::<dyn FnMut(Event)>::new(callback);
		let _ = window.add_event_listener_with_callback(event, callback.as_ref().unchecked_ref());
		Self {
			window: window.clone(),
			event,
			callback,
		}
	}
}

impl Drop for WindowListener {
	fn drop(&mut self) {
		let _ = self
			.window
			.remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
	}
}

struct Mounted {
	_renderer: Rc<Renderer>,
	_repaint: Subscription<Scene>,
	_listeners: Vec<WindowListener>,
}

/// Key presses aimed at a text field belong to the field.
fn typing_target(ev: &Event) -> bool {
	let Some(element) = ev.target().and_then(|target| target.dyn_into::<HtmlElement>().ok()) else {
		return false;
	};
	is_text_entry(&element.tag_name(), element.is_content_editable())
}

fn window_size(window: &Window) -> (f64, f64) {
	(
		window.inner_width().ok().and_then(|w| w.as_f64()).unwrap_or(800.0),
		window.inner_height().ok().and_then(|h| h.as_f64()).unwrap_or(600.0),
	)
}

fn local_point(canvas_ref: NodeRef<leptos::html::Canvas>, ev: &MouseEvent) -> Option<(f64, f64)> {
	let canvas: HtmlCanvasElement = canvas_ref.get()?.into();
	let rect = canvas.get_bounding_client_rect();
	Some((
		ev.client_x() as f64 - rect.left(),
		ev.client_y() as f64 - rect.top(),
	))
}

/// Interactive canvas view of a [`FlowStore`].
///
/// Drag the background to pan, scroll to zoom, click a node to select it and
/// drag to move it. Key bindings come from `config`.
#[component]
pub fn FlowCanvas(
	/// Store to render and drive.
	store: FlowStore,
	/// Key bindings, culling and marker defaults.
	#[prop(optional)]
	config: FlowConfig,
	/// Fill the window and follow its size.
	#[prop(default = false)]
	fullscreen: bool,
	/// Fixed width; the container width when unset.
	#[prop(default = None)]
	width: Option<f64>,
	/// Fixed height; the container height when unset.
	#[prop(default = None)]
	height: Option<f64>,
) -> impl IntoView {
	let canvas_ref = NodeRef::<leptos::html::Canvas>::new();
	let mounted: Rc<RefCell<Option<Mounted>>> = Rc::new(RefCell::new(None));
	let gesture: Rc<RefCell<Gesture>> = Rc::new(RefCell::new(Gesture::Idle));
	let store_init = store.clone();

	Effect::new(move |_| {
		let Some(canvas) = canvas_ref.get() else {
			return;
		};
		let canvas: HtmlCanvasElement = canvas.into();
		let Some(window) = web_sys::window() else {
			return;
		};
		let store = store_init.clone();

		let (w, h) = if fullscreen {
			window_size(&window)
		} else {
			(
				width.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_width() as f64)
						.unwrap_or(800.0)
				}),
				height.unwrap_or_else(|| {
					canvas
						.parent_element()
						.map(|p| p.client_height() as f64)
						.unwrap_or(600.0)
				}),
			)
		};
		canvas.set_width(w as u32);
		canvas.set_height(h as u32);

		let ctx = canvas
			.get_context("2d")
			.ok()
			.flatten()
			.and_then(|ctx| ctx.dyn_into::<CanvasRenderingContext2d>().ok());
		let Some(ctx) = ctx else {
			warn!("canvas 2d context unavailable");
			return;
		};

		store.set_state(
			FlowStatePatch::new()
				.size(w, h)
				.only_render_visible_elements(config.only_render_visible_elements),
		);

		// Registered first so the scene listener sees fresh ids.
		let visible = store.subscribe_with(
			visible_node_ids_selector(config.only_render_visible_elements),
			shallow,
		);
		let renderer = Rc::new(Renderer {
			store: store.clone(),
			ctx,
			resolver: MarkerResolver::new(store.clone()),
			config: config.clone(),
			visible,
			edges: RefCell::new(Vec::new()),
		});
		let repaint = store.subscribe_with(scene, same_scene);
		let redraw = Rc::clone(&renderer);
		repaint.listen(move |_| redraw.draw());

		let keys = Rc::new(RefCell::new(SelectionKeyEngine::new(
			store.clone(),
			config.delete_key_code.clone(),
			config.multi_selection_key_code.clone(),
		)));
		let (keys_down, keys_up, keys_blur) = (keys.clone(), keys.clone(), keys);
		let mut listeners = vec![
			WindowListener::add(&window, "keydown", move |ev: Event| {
				if typing_target(&ev) {
					return;
				}
				if let Some(ev) = ev.dyn_ref::<KeyboardEvent>() {
					keys_down.borrow_mut().key_down(&ev.key());
				}
			}),
			WindowListener::add(&window, "keyup", move |ev: Event| {
				if let Some(ev) = ev.dyn_ref::<KeyboardEvent>() {
					keys_up.borrow_mut().key_up(&ev.key());
				}
			}),
			WindowListener::add(&window, "blur", move |_: Event| {
				keys_blur.borrow_mut().blur();
			}),
		];

		if fullscreen {
			let (store_resize, canvas_resize) = (store.clone(), canvas.clone());
			listeners.push(WindowListener::add(&window, "resize", move |_: Event| {
				let Some(win) = web_sys::window() else {
					return;
				};
				let (nw, nh) = window_size(&win);
				canvas_resize.set_width(nw as u32);
				canvas_resize.set_height(nh as u32);
				store_resize.set_state(FlowStatePatch::new().size(nw, nh));
			}));
		}

		debug!("flow canvas mounted at {w}x{h}");
		renderer.draw();
		*mounted.borrow_mut() = Some(Mounted {
			_renderer: renderer,
			_repaint: repaint,
			_listeners: listeners,
		});
	});

	let (store_md, gesture_md) = (store.clone(), gesture.clone());
	let on_mousedown = move |ev: MouseEvent| {
		let Some((x, y)) = local_point(canvas_ref, &ev) else {
			return;
		};
		let state = store_md.get_state();
		let additive = state.multi_selection_active;
		let next = match state.node_at(state.transform.screen_to_flow(x, y)) {
			Some(node) => {
				if additive || !node.selected {
					store_md.select_node(&node.id, additive);
				}
				Gesture::Drag {
					id: node.id.clone(),
					start: (x, y),
					origin: node.position,
				}
			}
			None => {
				if !additive {
					store_md.unselect_all();
				}
				Gesture::Pan {
					start: (x, y),
					origin: state.transform,
				}
			}
		};
		*gesture_md.borrow_mut() = next;
	};

	let (store_mm, gesture_mm) = (store.clone(), gesture.clone());
	let on_mousemove = move |ev: MouseEvent| {
		let Some((x, y)) = local_point(canvas_ref, &ev) else {
			return;
		};
		let current = gesture_mm.borrow().clone();
		match current {
			Gesture::Idle => {}
			Gesture::Drag { id, start, origin } => {
				let zoom = store_mm.get_state().transform.zoom;
				let position = XYPosition::new(
					origin.x + (x - start.0) / zoom,
					origin.y + (y - start.1) / zoom,
				);
				store_mm.update_node(&id, move |node| node.position = position);
			}
			Gesture::Pan { start, origin } => {
				let transform = Transform::new(origin.x + (x - start.0), origin.y + (y - start.1), origin.zoom);
				store_mm.set_state(FlowStatePatch::new().transform(transform));
			}
		}
	};

	let gesture_mu = gesture.clone();
	let on_mouseup = move |_: MouseEvent| {
		*gesture_mu.borrow_mut() = Gesture::Idle;
	};

	let gesture_ml = gesture;
	let on_mouseleave = move |_: MouseEvent| {
		*gesture_ml.borrow_mut() = Gesture::Idle;
	};

	let store_wh = store;
	let on_wheel = move |ev: WheelEvent| {
		ev.prevent_default();
		let Some((x, y)) = local_point(canvas_ref, &ev) else {
			return;
		};
		let factor = if ev.delta_y() > 0.0 { 0.9 } else { 1.1 };
		let transform = store_wh
			.get_state()
			.transform
			.zoom_at(x, y, factor, MIN_ZOOM, MAX_ZOOM);
		store_wh.set_state(FlowStatePatch::new().transform(transform));
	};

	view! {
		<canvas
			node_ref=canvas_ref
			class="flow-canvas"
			on:mousedown=on_mousedown
			on:mousemove=on_mousemove
			on:mouseup=on_mouseup
			on:mouseleave=on_mouseleave
			on:wheel=on_wheel
			tabindex="0"
			style="display: block; cursor: grab;"
		/>
	}
}
