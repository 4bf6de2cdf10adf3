//! JSONL file ledger.
//!
//! Each [`LedgerEntry`] is serialized as a single JSON line and appended to
//! the file. An append returns only after the line has been synced to disk.
//! A crash mid-append can leave a torn final line; it is dropped with a
//! warning when the ledger is opened or read. A failed append truncates its
//! own partial line, and every append starts from a newline-terminated file,
//! so a torn line can never end up in the middle of the ledger.

use async_trait::async_trait;
use cohort_application::{LedgerError, LedgerStore};
use cohort_domain::LedgerEntry;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Append-only JSONL ledger.
///
/// Appends are serialized through one file handle, so lines never interleave.
pub struct JsonlLedger {
    file: Arc<Mutex<File>>,
    path: PathBuf,
}

impl JsonlLedger {
    /// Open the ledger at `path`, creating it (and parent directories) if needed.
    ///
    /// A torn final line left by a crash is truncated away so new appends
    /// start on a clean line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                LedgerError::Io(format!(
                    "could not create ledger directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                LedgerError::Io(format!("could not open ledger {}: {}", path.display(), e))
            })?;

        repair_torn_tail(&file, path)?;
        debug!(path = %path.display(), "Ledger opened");

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
            path: path.to_path_buf(),
        })
    }

    /// Get the path to the ledger file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonlLedger {
    async fn append(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        let mut line =
            serde_json::to_string(entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;
        line.push('\n');

        let file = Arc::clone(&self.file);
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = file.lock().unwrap_or_else(PoisonError::into_inner);
            let len = repair_torn_tail(&file, &path)?;
            if let Err(e) = file
                .write_all(line.as_bytes())
                .and_then(|_| file.sync_data())
            {
                if let Err(rollback) = file.set_len(len) {
                    warn!(
                        path = %path.display(),
                        error = %rollback,
                        "Could not truncate partial ledger line"
                    );
                }
                return Err(LedgerError::Io(e.to_string()));
            }
            Ok(())
        })
        .await
        .map_err(|e| LedgerError::Io(format!("append task failed: {}", e)))?
    }

    async fn load_all(&self) -> Result<Vec<LedgerEntry>, LedgerError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut content = String::new();
            File::open(&path)
                .and_then(|mut f| f.read_to_string(&mut content))
                .map_err(|e| LedgerError::Io(e.to_string()))?;
            parse_lines(&content)
        })
        .await
        .map_err(|e| LedgerError::Io(format!("load task failed: {}", e)))?
    }
}

/// Parse ledger content. Only an unterminated final line may be malformed.
fn parse_lines(content: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
    let terminated = content.is_empty() || content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();
    let mut entries = Vec::with_capacity(lines.len());

    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LedgerEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) if !terminated && index + 1 == lines.len() => {
                warn!(line = index + 1, error = %e, "Skipping torn final ledger line");
            }
            Err(e) => {
                return Err(LedgerError::Corrupt {
                    line: index + 1,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(entries)
}

/// Truncate an unterminated final line. Returns the resulting file length.
fn repair_torn_tail(file: &File, path: &Path) -> Result<u64, LedgerError> {
    let io = |e: std::io::Error| LedgerError::Io(e.to_string());

    let len = file.metadata().map_err(io)?.len();
    if len == 0 {
        return Ok(0);
    }
    let mut reader = file;
    let mut last = [0u8; 1];
    reader.seek(SeekFrom::Start(len - 1)).map_err(io)?;
    reader.read_exact(&mut last).map_err(io)?;
    if last[0] == b'\n' {
        return Ok(len);
    }

    let mut content = Vec::new();
    reader.seek(SeekFrom::Start(0)).map_err(io)?;
    reader.read_to_end(&mut content).map_err(io)?;
    let keep = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    warn!(
        path = %path.display(),
        dropped_bytes = content.len() - keep,
        "Ledger ends with a torn line, truncating"
    );
    file.set_len(keep as u64).map_err(io)?;
    file.sync_data().map_err(io)?;
    Ok(keep as u64)
}
