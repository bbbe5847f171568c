pub mod db;
pub mod ledger;
pub mod mailboxes;
pub mod messages;
pub mod models;
pub mod outbox;
pub mod schema;
pub mod suggestions;
pub mod sync_state;

mod error;

pub use error::{Error, Result};
