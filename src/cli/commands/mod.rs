//! CLI command implementations

pub mod config;
pub mod fetch;
pub mod platforms;
pub mod resolve;

pub use config::execute as config;
pub use fetch::execute as fetch;
pub use platforms::execute as platforms;
pub use resolve::execute as resolve;
