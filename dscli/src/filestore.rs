use async_trait::async_trait;
use libdomain_storm::{
    store::{BatchSource, ResultSink, StoreError},
    Checkpoint, QueryResult,
};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    sync::Mutex,
};

struct Cursor {
    lines: Lines<BufReader<File>>,
    position: u64,
}

/// Domain list on disk, one name per line. Blank lines and `#` comments do
/// not count towards offsets.
pub struct FileSource {
    path: PathBuf,
    cursor: Mutex<Option<Cursor>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: Mutex::new(None),
        }
    }

    async fn open_at(&self, offset: u64) -> Result<Cursor, StoreError> {
        let file = File::open(&self.path).await?;
        let mut cursor = Cursor {
            lines: BufReader::new(file).lines(),
            position: 0,
        };
        while cursor.position < offset {
            if next_domain(&mut cursor.lines).await?.is_none() {
                break;
            }
            cursor.position += 1;
        }
        Ok(cursor)
    }
}

async fn next_domain(lines: &mut Lines<BufReader<File>>) -> std::io::Result<Option<String>> {
    while let Some(line) = lines.next_line().await? {
        let domain = line.trim();
        if domain.is_empty() || domain.starts_with('#') {
            continue;
        }
        return Ok(Some(domain.to_ascii_lowercase()));
    }
    Ok(None)
}

#[async_trait]
impl BatchSource for FileSource {
    async fn get_batch(&self, size: usize, offset: u64) -> Result<Vec<String>, StoreError> {
        let mut guard = self.cursor.lock().await;
        let cursor = match guard.take() {
            Some(cursor) if cursor.position == offset => cursor,
            _ => self.open_at(offset).await?,
        };
        let cursor = guard.insert(cursor);

        let mut batch = Vec::with_capacity(size.min(16_384));
        while batch.len() < size {
            match next_domain(&mut cursor.lines).await? {
                Some(domain) => batch.push(domain),
                None => break,
            }
        }
        cursor.position += batch.len() as u64;
        Ok(batch)
    }
}

/// Appends results as JSON lines and keeps the checkpoint beside them.
///
/// Nothing per domain is held in memory. A re-checked domain is appended
/// again and readers take the last line per domain.
pub struct JsonlSink {
    checkpoint_path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    pub async fn open(
        results: impl AsRef<Path>,
        checkpoint: impl Into<PathBuf>,
    ) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(results.as_ref())
            .await?;
        Ok(Self {
            checkpoint_path: checkpoint.into(),
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn save_results(&self, results: &[QueryResult]) -> Result<(), StoreError> {
        if results.is_empty() {
            return Ok(());
        }
        let mut buf = Vec::with_capacity(results.len() * 64);
        for result in results {
            serde_json::to_writer(&mut buf, result)?;
            buf.push(b'\n');
        }
        let mut file = self.file.lock().await;
        file.write_all(&buf).await?;
        file.flush().await?;
        Ok(())
    }

    async fn save_checkpoint(&self, checkpoint: Checkpoint) -> Result<(), StoreError> {
        let tmp = self.checkpoint_path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(&checkpoint)?).await?;
        fs::rename(&tmp, &self.checkpoint_path).await?;
        Ok(())
    }

    async fn get_checkpoint(&self) -> Result<Option<Checkpoint>, StoreError> {
        match fs::read(&self.checkpoint_path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
