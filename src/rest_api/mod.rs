//! HTTP endpoints of the controller
//!
//! Serves `/health` and the prometheus `/metrics` exposition.

mod handlers;
mod server;

pub use server::{router, run_server};
