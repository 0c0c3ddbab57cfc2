//! Snapshot files: the directory state, exported secrets and the audit log.
//!
//! With `--write-back` the secrets and the audit log live next to the state
//! file: `directory.json` gets `directory.secrets.json` and
//! `directory.audit.jsonl`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use keyward_lifecycle::RotationRecord;
use keyward_lifecycle::memory::{DirectorySnapshot, InMemoryDirectory, InMemorySecretStore};
use serde_json::{Map, Value};
use tempfile::NamedTempFile;

const SECRETS_EXTENSION: &str = "secrets.json";
const AUDIT_EXTENSION: &str = "audit.jsonl";

/// Secrets file kept next to `state`.
pub fn secrets_path(state: &Path) -> PathBuf {
    state.with_extension(SECRETS_EXTENSION)
}

/// Audit log kept next to `state`.
pub fn audit_path(state: &Path) -> PathBuf {
    state.with_extension(AUDIT_EXTENSION)
}

/// Read a directory snapshot into an in-memory directory.
pub fn load(path: &Path) -> Result<InMemoryDirectory> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read state file {}", path.display()))?;
    let snapshot: DirectorySnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("malformed state file {}", path.display()))?;
    Ok(InMemoryDirectory::from_snapshot(snapshot))
}

/// Replace the snapshot at `path`.
pub fn save(path: &Path, snapshot: &DirectorySnapshot) -> Result<()> {
    replace(path, serde_json::to_string_pretty(snapshot)?.as_bytes())
}

/// Merge every stored secret document into the JSON object at `path`.
///
/// Entries for identities not rotated in this pass are kept. The file is
/// staged in a temporary file only the owner can read, then renamed over
/// the target, so plaintext secrets are never exposed with a wider mode.
pub async fn export_secrets(store: &InMemorySecretStore, path: &Path) -> Result<usize> {
    let mut documents = match fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<Value>(&raw)
            .with_context(|| format!("malformed secrets file {}", path.display()))?
        {
            Value::Object(existing) => existing,
            _ => bail!("secrets file {} is not a JSON object", path.display()),
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Map::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()));
        }
    };

    let mut written = 0;
    for name in store.names().await {
        if let Some(document) = store.get(&name).await {
            documents.insert(name, document);
            written += 1;
        }
    }

    replace(
        path,
        serde_json::to_string_pretty(&Value::Object(documents))?.as_bytes(),
    )?;
    Ok(written)
}

/// Append one JSON line per record to the audit log at `path`.
pub fn append_audit(records: &[RotationRecord], path: &Path) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    let mut lines = String::new();
    for record in records {
        lines.push_str(&serde_json::to_string(record)?);
        lines.push('\n');
    }
    let mut log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open audit log {}", path.display()))?;
    log.write_all(lines.as_bytes())
        .with_context(|| format!("failed to append to audit log {}", path.display()))?;
    log.sync_all()?;
    Ok(())
}

/// Write `contents` to a private temporary file beside `path`, then rename.
fn replace(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to stage a file in {}", dir.display()))?;
    staged
        .write_all(contents)
        .with_context(|| format!("failed to write staged copy of {}", path.display()))?;
    staged.as_file().sync_all()?;
    staged
        .persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}
