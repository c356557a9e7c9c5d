//! Core types shared by the seedboot crates: the startup error taxonomy and
//! the backing-store URL selected through `DATABASE_URL`.

mod error;
mod store;

pub use error::BootError;
pub use store::{StoreUrl, UrlError};

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Parse an operator-supplied boolean flag (`FORCE_SEED=1`, `yes`, `off`, ...).
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
