pub mod event_log;
pub mod launcher;
pub mod rates;
pub mod scoring;
pub mod store;
pub mod worker;

pub use event_log::*;
pub use launcher::*;
pub use rates::*;
pub use scoring::*;
pub use store::*;
pub use worker::*;
