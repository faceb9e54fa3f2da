pub mod adapters;
pub mod cancel;
pub mod config;
pub mod driver;
pub mod edge;
pub mod monitor;
pub(crate) mod node;
pub mod outcome;
pub mod stage;
pub(crate) mod tee;
