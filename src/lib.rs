pub mod application;
pub mod domain;
pub mod infrastructure;

#[cfg(test)]
mod testing;

pub use application::commands::AppState;
pub use infrastructure::error::InfraError;
