pub mod driver;
pub mod http;
pub mod machine;

pub use driver::*;
pub use http::*;
pub use machine::*;
