use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

const SQLITE_PREFIX: &str = "sqlite:///";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UrlError {
    #[error("in-memory sqlite databases cannot be seeded")]
    InMemory,
    #[error("sqlite url must look like sqlite:///<path>, got {0}")]
    MalformedSqlite(String),
    #[error("invalid database url: {0}")]
    Invalid(String),
    #[error("unsupported database scheme `{0}`")]
    UnsupportedScheme(String),
}

/// Backing store selected by `DATABASE_URL`.
///
/// SQLite urls follow the SQLAlchemy convention: `sqlite:///rel/path.db` is
/// relative, `sqlite:////abs/path.db` is absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreUrl {
    Sqlite(PathBuf),
    Network(Url),
}

impl StoreUrl {
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        StoreUrl::Sqlite(path.into())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, StoreUrl::Sqlite(_))
    }

    pub fn sqlite_path(&self) -> Option<&Path> {
        match self {
            StoreUrl::Sqlite(p) => Some(p),
            StoreUrl::Network(_) => None,
        }
    }

    /// Full url including credentials, for handing to the server process.
    pub fn to_url_string(&self) -> String {
        match self {
            StoreUrl::Sqlite(p) => format!("{SQLITE_PREFIX}{}", p.display()),
            StoreUrl::Network(u) => u.to_string(),
        }
    }
}

impl FromStr for StoreUrl {
    type Err = UrlError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let s = raw.trim();
        if let Some(rest) = s.strip_prefix("sqlite:") {
            let Some(path) = s.strip_prefix(SQLITE_PREFIX) else {
                if rest.is_empty() || rest == "//" {
                    return Err(UrlError::InMemory);
                }
                return Err(UrlError::MalformedSqlite(s.to_string()));
            };
            if path.is_empty() || path == ":memory:" {
                return Err(UrlError::InMemory);
            }
            return Ok(StoreUrl::Sqlite(PathBuf::from(path)));
        }
        let url = Url::parse(s).map_err(|e| UrlError::Invalid(e.to_string()))?;
        let base = url.scheme().split('+').next().unwrap_or_default();
        match base {
            "postgres" | "postgresql" | "mysql" | "mariadb" => Ok(StoreUrl::Network(url)),
            other => Err(UrlError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Renders with any password replaced, safe for logs.
impl fmt::Display for StoreUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreUrl::Sqlite(_) => f.write_str(&self.to_url_string()),
            StoreUrl::Network(u) => {
                let mut shown = u.clone();
                if shown.password().is_some() {
                    let _ = shown.set_password(Some("***"));
                }
                write!(f, "{shown}")
            }
        }
    }
}
