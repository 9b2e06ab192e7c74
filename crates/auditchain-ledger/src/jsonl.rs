//! JSON-lines file implementation of `ChainStore`.
//!
//! Each block is one JSON object on its own line.  Several handles, in one
//! process or many, may share a file:
//!
//! - every call takes an `fs2` lock on the file (shared for reads, exclusive
//!   for appends) and first reads any lines other writers added since this
//!   handle last looked, so the conditional insert always checks the real tail;
//! - an append writes and syncs the line, then commits it to the index, all
//!   inside one blocking task under the exclusive lock.  A failed write, or a
//!   caller that stopped waiting, truncates the file back to its last good
//!   length, so an unrecorded block never stays on disk.
//!
//! Lines are parsed when read but stored fields are not checked here;
//! spotting tampered lines is the verifier's job.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use fs2::FileExt;
use tracing::{debug, info, warn};

use auditchain_contracts::{
    block::AuditBlock,
    error::{ChainError, ChainResult},
};
use auditchain_core::traits::ChainStore;

use crate::memory::{check_append, entity_blocks};

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

struct JsonlIndex {
    path: PathBuf,
    file: File,
    /// Every block read so far, ascending by `block_number`.
    blocks: Vec<AuditBlock>,
    /// Bytes of the file covered by `blocks`; always at a line boundary.
    offset: u64,
    /// Lines covered by `offset`, for error messages.
    lines_read: usize,
}

impl JsonlIndex {
    fn io_err(&self, what: &str, e: std::io::Error) -> ChainError {
        ChainError::storage(format!(
            "failed to {} chain file '{}': {}",
            what,
            self.path.display(),
            e
        ))
    }

    fn lock(&self, mode: LockMode) -> ChainResult<()> {
        let result = match mode {
            LockMode::Shared => FileExt::lock_shared(&self.file),
            LockMode::Exclusive => FileExt::lock_exclusive(&self.file),
        };
        result.map_err(|e| self.io_err("lock", e))
    }

    fn unlock(&self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to unlock chain file");
        }
    }

    fn file_len(&self) -> ChainResult<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| self.io_err("stat", e))
    }

    /// Read complete lines appended past `offset`.  A trailing line without
    /// its newline is left for the next call.
    fn refresh(&mut self) -> ChainResult<()> {
        let len = self.file_len()?;
        if len < self.offset {
            return Err(ChainError::storage(format!(
                "chain file '{}' shrank from {} to {} bytes",
                self.path.display(),
                self.offset,
                len
            )));
        }
        if len == self.offset {
            return Ok(());
        }

        let mut buf = Vec::new();
        (&self.file)
            .seek(SeekFrom::Start(self.offset))
            .and_then(|_| (&self.file).take(len - self.offset).read_to_end(&mut buf))
            .map_err(|e| self.io_err("read", e))?;

        let consumed = buf.iter().rposition(|b| *b == b'\n').map_or(0, |p| p + 1);
        let text = std::str::from_utf8(&buf[..consumed]).map_err(|e| ChainError::Serialization {
            reason: format!("'{}' is not UTF-8: {}", self.path.display(), e),
        })?;

        let mut added = Vec::new();
        let mut line_no = self.lines_read;
        for line in text.lines() {
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }
            let block: AuditBlock =
                serde_json::from_str(line).map_err(|e| ChainError::Serialization {
                    reason: format!("line {} of '{}': {}", line_no, self.path.display(), e),
                })?;
            added.push(block);
        }

        if !added.is_empty() {
            debug!(path = %self.path.display(), new_blocks = added.len(), "chain file refreshed");
            self.blocks.extend(added);
            // Stable sort: duplicate numbers keep file order for the verifier.
            self.blocks.sort_by_key(|b| b.block_number);
        }
        self.offset += consumed as u64;
        self.lines_read = line_no;
        Ok(())
    }

    /// Cut the file back to `len` bytes, discarding anything written after it.
    fn truncate_to(&self, len: u64) {
        let result = self.file.set_len(len).and_then(|()| self.file.sync_data());
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "failed to roll back chain file");
        }
    }

    /// Conditional insert.  Caller holds the exclusive lock and has refreshed.
    fn append(&mut self, block: &AuditBlock, abandoned: &AtomicBool) -> ChainResult<()> {
        check_append(&self.blocks, block)?;

        let mut line = serde_json::to_string(block).map_err(|e| ChainError::Serialization {
            reason: format!("failed to encode block {}: {}", block.block_number, e),
        })?;
        line.push('\n');

        let good_len = self.offset;
        if self.file_len()? > good_len {
            warn!(
                path = %self.path.display(),
                good_len,
                "discarding incomplete trailing line in chain file"
            );
            self.truncate_to(good_len);
        }
        if abandoned.load(Ordering::SeqCst) {
            return Err(ChainError::storage("append abandoned by caller"));
        }

        let written = (&self.file)
            .write_all(line.as_bytes())
            .and_then(|()| self.file.sync_data());
        if let Err(e) = written {
            self.truncate_to(good_len);
            return Err(self.io_err("append to", e));
        }
        if abandoned.load(Ordering::SeqCst) {
            self.truncate_to(good_len);
            return Err(ChainError::storage("append abandoned by caller"));
        }

        self.blocks.push(block.clone());
        self.offset = good_len + line.len() as u64;
        self.lines_read += 1;
        Ok(())
    }
}

/// Marks an append as abandoned when the caller's future is dropped.
struct AbandonOnDrop(Arc<AtomicBool>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// An append-only audit chain persisted as a JSON-lines file.
pub struct JsonlChainStore {
    path: PathBuf,
    index: Arc<Mutex<JsonlIndex>>,
}

impl JsonlChainStore {
    /// Open (or create) the chain file at `path` and load its blocks.
    ///
    /// Returns `ChainError::Storage` if the file cannot be opened or read,
    /// and `ChainError::Serialization` if a line is not a block.
    pub async fn open(path: impl AsRef<Path>) -> ChainResult<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ChainError::storage(format!(
                    "failed to open chain file '{}': {}",
                    path.display(),
                    e
                ))
            })?;

        let store = Self {
            path: path.clone(),
            index: Arc::new(Mutex::new(JsonlIndex {
                path,
                file,
                blocks: Vec::new(),
                offset: 0,
                lines_read: 0,
            })),
        };

        let block_count = store.run(LockMode::Shared, |index| Ok(index.blocks.len())).await?;
        info!(path = %store.path.display(), block_count, "chain file opened");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `op` on a blocking thread with the file locked and the index
    /// refreshed.  The task runs to completion even if the caller goes away.
    async fn run<T, F>(&self, mode: LockMode, op: F) -> ChainResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut JsonlIndex) -> ChainResult<T> + Send + 'static,
    {
        let index = Arc::clone(&self.index);
        tokio::task::spawn_blocking(move || {
            let mut index = index
                .lock()
                .map_err(|_| ChainError::storage("chain file index lock poisoned"))?;
            index.lock(mode)?;
            let result = index.refresh().and_then(|()| op(&mut index));
            index.unlock();
            result
        })
        .await
        .map_err(|e| ChainError::storage(format!("chain file task failed: {}", e)))?
    }
}

#[async_trait]
impl ChainStore for JsonlChainStore {
    async fn tail_hash(&self) -> ChainResult<String> {
        self.run(LockMode::Shared, |index| {
            Ok(index
                .blocks
                .last()
                .map(|b| b.hash.clone())
                .unwrap_or_else(|| AuditBlock::GENESIS_HASH.to_string()))
        })
        .await
    }

    async fn block_count(&self) -> ChainResult<u64> {
        self.run(LockMode::Shared, |index| Ok(index.blocks.len() as u64))
            .await
    }

    async fn append_block(&self, block: &AuditBlock) -> ChainResult<()> {
        let abandoned = Arc::new(AtomicBool::new(false));
        let _guard = AbandonOnDrop(Arc::clone(&abandoned));

        let owned = block.clone();
        self.run(LockMode::Exclusive, move |index| {
            index.append(&owned, &abandoned)
        })
        .await?;

        debug!(
            block_number = block.block_number,
            path = %self.path.display(),
            "block appended to chain file"
        );
        Ok(())
    }

    async fn list_blocks(&self) -> ChainResult<Vec<AuditBlock>> {
        self.run(LockMode::Shared, |index| Ok(index.blocks.clone()))
            .await
    }

    async fn blocks_by_entity(&self, entity_id: &str) -> ChainResult<Vec<AuditBlock>> {
        let entity_id = entity_id.to_string();
        self.run(LockMode::Shared, move |index| {
            Ok(entity_blocks(&index.blocks, &entity_id))
        })
        .await
    }

    async fn block_by_hash(&self, hash: &str) -> ChainResult<Option<AuditBlock>> {
        let hash = hash.to_string();
        self.run(LockMode::Shared, move |index| {
            Ok(index.blocks.iter().find(|b| b.hash == hash).cloned())
        })
        .await
    }
}
