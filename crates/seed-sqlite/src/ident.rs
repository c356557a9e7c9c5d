use anyhow::{bail, Result};
use regex::Regex;
use std::sync::OnceLock;

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"))
}

/// Validate a table or column name and return it double-quoted for SQL.
pub fn quote_ident(name: &str) -> Result<String> {
    if !ident_re().is_match(name) {
        bail!("not a plain SQL identifier: {name:?}");
    }
    Ok(format!("\"{name}\""))
}
