//! WASM bindings for `hyplot_core`.
//!
//! The page owns the render loop: it calls `WasmPlotter::run_frame` from
//! `requestAnimationFrame`, replays the recorded scene commands into its
//! three.js scene and shows the buffered notifications.

mod host;
mod logger;
mod plotter;

pub use host::{Notification, SceneCommand};
pub use plotter::WasmPlotter;
