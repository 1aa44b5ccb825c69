// Library root: re-exports all modules so integration tests and the binary
// can reach the crate's public API.

pub mod app;
pub mod background;
pub mod clipboard;
pub mod config;
pub mod console;
pub mod content;
pub mod interceptor;
pub mod page;
pub mod ws_server;
