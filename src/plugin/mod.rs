pub mod discover;
pub mod entity;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod source;

pub use entity::Plugin;
