//! Interactive first-run configuration.

pub mod wizard;

pub use wizard::run_setup_wizard;
