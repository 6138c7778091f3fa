pub mod config;
pub mod documents;
pub mod events;
pub mod quotes;
pub mod state;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use config::*;
pub use documents::*;
pub use events::*;
pub use quotes::*;
pub use state::*;
pub use types::*;
pub use validation::*;
