pub mod api;
pub mod config;
pub mod error;
pub mod report;
pub mod sensor;
pub mod session;
pub mod state;
pub mod trigger;
