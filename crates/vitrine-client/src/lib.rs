#[cfg(feature = "browser")]
pub mod chromium;
pub mod http;

#[cfg(feature = "browser")]
pub use chromium::{ChromiumLauncher, ChromiumSession};
pub use http::{HttpProvider, HttpSession};
