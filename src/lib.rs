// Library crate for the gymrank progression engine
// This file exposes the public API for the binary and integration tests

pub mod event;
pub mod progression;
pub mod shared;

// Re-export commonly used types for easier access in tests
pub use event::{EventBus, ProgressionEvent};
pub use progression::{
    CheckInOutcome, CheckInRequest, CheckInService, InMemoryRecordStore, PostgresRecordStore,
    ProgressionError, RecordStore, StoreError,
};
pub use shared::EngineConfig;
