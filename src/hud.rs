//! Terminal front end: the notch pill and its expanded panel.

mod display;
mod handler;
mod tui_backend;

pub use handler::HudHandler;
pub use tui_backend::TerminalUiBackend;
