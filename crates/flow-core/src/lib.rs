pub mod config;
pub mod graph;
pub mod state;
pub mod types;
pub mod validation;

pub use config::*;
pub use graph::*;
pub use state::*;
pub use types::*;
pub use validation::*;
