//! TUI module for terminal user interfaces

mod proxy_checker;
mod source_picker;

pub use proxy_checker::ProxyCheckerApp;
pub use source_picker::SourcePicker;
