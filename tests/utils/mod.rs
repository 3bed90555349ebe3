pub mod builders;
pub mod mocks;
pub mod setup;

// Re-export main utilities for use by test files
#[allow(unused_imports)]
pub use builders::{badge, challenge, check_in_at, ProgressBuilder};
#[allow(unused_imports)]
pub use mocks::FaultyRecordStore;
#[allow(unused_imports)]
pub use setup::{TestSetup, TestSetupBuilder};
