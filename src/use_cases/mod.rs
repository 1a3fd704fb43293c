// Use cases layer: check-in workflows built on the domain ports.

pub mod badge;
pub mod commit;
pub mod lookup;
pub mod machine;
pub mod retry;
pub mod scanner;

#[cfg(test)]
pub(crate) mod test_support;

pub use badge::{BadgeDocument, BadgeError, BadgeImage, BadgeRenderer};
pub use commit::{BulkCommitReport, CheckInCommitService, CommitOutcome};
pub use lookup::{LookupOutcome, LookupService, MIN_SEARCH_LEN};
pub use machine::{CheckInMachine, Completion, KioskCommand, KioskEvent};
pub use retry::RetryPolicy;
pub use scanner::Scanner;
