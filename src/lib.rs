//! Library crate for netmon-view exposing reusable modules.
pub mod backend;
pub mod chart;
pub mod config;
pub mod control;
pub mod debounce;
pub mod feed;
pub mod poller;
pub mod render;
pub mod runtime;
pub mod server;
pub mod table;
pub mod types;
pub mod view;
