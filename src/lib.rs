pub mod config;
pub mod error;
pub mod fleet;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod trigger;
