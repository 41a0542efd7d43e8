pub mod controller;
/// Notices and snapshots handed to the presentation layer.
pub mod events;
/// Reconciliation of history, optimistic submissions and live pushes.
pub mod timeline;
pub mod transcript;

pub use controller::ChatController;
pub use events::{ChatUpdate, Notice};
pub use timeline::{SeedTicket, SubmitRejected, Submission, Timeline};
