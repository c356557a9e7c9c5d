//! Read-side checks against the provisioned SQLite runtime artifact.

mod ident;
mod maintenance;
mod models;
mod open;
mod query;

pub use ident::quote_ident;
pub use models::*;
pub use open::Db;
