pub mod directory;
pub mod engine;
pub mod import;
pub mod progress;
pub mod resolver;
