pub mod config;
pub mod spec;

pub use config::ManagerConfig;
