pub mod registrants;
pub mod run;
pub mod site;

// Re-export command functions for convenience
pub use run::{run, RunParams};
pub use site::{constraints, probe};
