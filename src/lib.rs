pub mod error;
pub mod events;
pub mod execution;
pub mod instruction;
pub mod logging;
pub mod paths;
pub mod pipeline;
pub mod project;
pub mod protocol;
pub mod registry;
pub mod resolution;
pub mod settings;
pub mod state;
pub mod translation;
pub mod transport;
pub mod util;

#[cfg(test)]
mod testing;
