pub mod activity;
pub mod core;
pub mod export;
pub mod import;
pub mod plans;
pub mod session;
pub mod setup;
pub mod templates;
