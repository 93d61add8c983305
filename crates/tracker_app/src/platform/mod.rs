mod app;
mod config;
mod logging;
mod presenter;

pub use app::run_app;
