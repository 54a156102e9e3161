// Split Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod balance;
pub mod calculator;
pub mod error;
pub mod model;
pub mod service;
pub mod settings;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use balance::{
    to_csv, BalanceAggregator, BalanceEntry, BalanceRow, ParticipantBalance, CSV_HEADER,
};
pub use calculator::{RemainderPolicy, SplitCalculator};
pub use error::{SplitError, SplitResult};
pub use model::{
    Allocation, ExactShare, ExpenseRecord, Participant, PercentageShare, RequestParticipant,
    Shares, SplitInput, SplitMethod, SplitRequest, StoredId,
};
pub use service::ExpenseService;
pub use settings::Settings;
pub use store::{setup_database, ExpenseStore, MemoryStore, ParticipantDirectory, SqliteStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
