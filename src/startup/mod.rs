//! Process startup: wiring and the startup summary

pub mod bootstrap;
pub mod logger;

pub use bootstrap::{bootstrap, bootstrap_with_factory, stdio_caller, Runtime};
pub use logger::StartupLogger;
