//! Streaming content digests for seed and runtime artifacts.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Rendered in logs in place of a digest when the file does not exist.
pub const MISSING: &str = "(missing)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    #[default]
    Sha256,
    Blake3,
}

impl Algorithm {
    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Blake3 => "blake3",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub path: String,
    pub size: u64,
    pub sha256: String,
    pub blake3: String,
}

/// Digest a file with `algo`. A missing file yields `Ok(None)`; any other
/// read failure is an error.
pub fn digest_file(path: &Path, algo: Algorithm) -> io::Result<Option<String>> {
    let f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(f);
    let mut buf = [0u8; 8192];
    let hex = match algo {
        Algorithm::Sha256 => {
            let mut sha = Sha256::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 { break; }
                sha.update(&buf[..n]);
            }
            hex::encode(sha.finalize())
        }
        Algorithm::Blake3 => {
            let mut bl = blake3::Hasher::new();
            loop {
                let n = reader.read(&mut buf)?;
                if n == 0 { break; }
                bl.update(&buf[..n]);
            }
            bl.finalize().to_hex().to_string()
        }
    };
    Ok(Some(hex))
}

/// Digest for log output: the hex string or [`MISSING`].
pub fn display_digest(digest: Option<&str>) -> &str {
    digest.unwrap_or(MISSING)
}

pub fn digest_bytes(bytes: &[u8], algo: Algorithm) -> String {
    match algo {
        Algorithm::Sha256 => hex::encode(Sha256::digest(bytes)),
        Algorithm::Blake3 => blake3::hash(bytes).to_hex().to_string(),
    }
}

/// Both digests in one pass, for the `hash` command.
pub fn hash_file(path: &Path) -> Result<FileInfo> {
    let f = File::open(path)?;
    let metadata = f.metadata()?;
    let mut reader = BufReader::new(f);
    let mut sha = Sha256::new();
    let mut bl = blake3::Hasher::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 { break; }
        sha.update(&buf[..n]);
        bl.update(&buf[..n]);
    }
    Ok(FileInfo {
        path: path.to_string_lossy().into_owned(),
        size: metadata.len(),
        sha256: hex::encode(sha.finalize()),
        blake3: bl.finalize().to_hex().to_string(),
    })
}
