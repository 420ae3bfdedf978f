pub mod config;
pub mod logging;

pub mod checkpoint;
pub mod collab;
pub mod control;
pub mod date;
pub mod error;
pub mod locator;
pub mod naming;
pub mod pipeline;
pub mod placement;
pub mod retry;
pub mod status;
pub mod traversal;
