//! Default data seeding.
//!
//! Installs the default bandit experiment with its four ranking arms and the
//! ranking A/B experiment when they are missing. Useful for bootstrapping
//! local and test environments; running twice is a no-op.

pub mod defaults;

pub use defaults::seed_defaults;
