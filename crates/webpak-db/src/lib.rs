//! Database adapters for webpak
//!
//! Each supported engine implements [`DatabaseAdapter`]; [`adapter_for`] picks
//! the implementation from the project's configured engine identifier.

pub mod adapter;
pub mod mysql;

pub use adapter::{adapter_for, DatabaseAdapter, Engine};
pub use mysql::{quote_identifier, MySqlAdapter};
