//! Framework-agnostic adapters from plugin state to reactive host primitives.
//!
//! [`use_plugin`] and [`use_capability`] are the entry points. Stateful
//! capabilities can then be observed through a plain callback
//! (`ObservableState::on_state_change`), a [`StateBinding`], a `watch` signal
//! or a stream.

mod binding;
mod hooks;
mod plugins;
mod signal;

pub use binding::{StateBinding, StateOf};
pub use hooks::{use_capability, use_plugin};
pub use plugins::{
    use_annotation, use_annotation_capability, use_annotation_plugin, use_selection,
    use_selection_capability, use_selection_plugin, use_zoom, use_zoom_capability,
    use_zoom_plugin,
};
pub use signal::{StateStream, state_stream, watch_state};
