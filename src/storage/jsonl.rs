//! Append-only JSONL storage.
//!
//! Layout under the base path:
//! - `prices/<SYMBOL>/<YYYY>.jsonl` partitioned by the year of `observed_at`
//! - `ledger/<user_id>.jsonl`

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Datelike;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, SeekFrom};
use tokio::sync::Mutex;
use tracing::warn;

use crate::market_data::PriceRecord;
use crate::models::{Id, LedgerTransaction, Symbol};

use super::{LedgerStore, PriceStore};

pub struct JsonlStorage {
    base_path: PathBuf,
    // Serializes appends within this process so lines never interleave.
    write_lock: Mutex<()>,
}

impl JsonlStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn prices_root(&self) -> PathBuf {
        self.base_path.join("prices")
    }

    fn prices_dir(&self, symbol: &Symbol) -> PathBuf {
        self.prices_root().join(symbol.as_str())
    }

    fn price_file(&self, record: &PriceRecord) -> PathBuf {
        self.prices_dir(&record.symbol)
            .join(format!("{:04}.jsonl", record.observed_at.year()))
    }

    fn ledger_file(&self, user_id: &Id) -> Result<PathBuf> {
        if !Id::is_path_safe(user_id.as_str()) {
            anyhow::bail!("Refusing ledger path for unsafe user id {user_id:?}");
        }
        Ok(self
            .base_path
            .join("ledger")
            .join(format!("{}.jsonl", user_id.as_str())))
    }

    async fn append_line<T: Serialize>(&self, path: &Path, item: &T) -> Result<()> {
        let mut line = serde_json::to_vec(item).context("Failed to serialize item")?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("Failed to open {} for append", path.display()))?;
        if !ends_with_newline(&mut file).await? {
            warn!(path = %path.display(), "terminating torn trailing line before append");
            line.insert(0, b'\n');
        }
        // One write per record: a reader sees the whole line or none of it.
        file.write_all(&line)
            .await
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        file.flush().await.context("Failed to flush append")?;
        Ok(())
    }

    /// Read every parseable line. A torn or corrupt line is skipped with a warning.
    async fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
        let file = match fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to open {}", path.display()))
            }
        };

        let mut lines = BufReader::new(file).lines();
        let mut items = Vec::new();
        while let Some(line) = lines.next_line().await.context("Failed to read line")? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(item) => items.push(item),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unparseable JSONL line"),
            }
        }
        Ok(items)
    }

    /// `.jsonl` files directly inside `dir`, sorted by name.
    async fn jsonl_files(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read directory {}", dir.display()))
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn count_lines(path: &Path) -> Result<u64> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(content.lines().filter(|l| !l.trim().is_empty()).count() as u64)
    }
}

/// Whether `file` is empty or its last byte is a newline. An interrupted
/// append leaves a fragment without one.
pub(crate) async fn ends_with_newline(file: &mut fs::File) -> Result<bool> {
    let len = file.metadata().await.context("Failed to stat JSONL file")?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::Start(len - 1))
        .await
        .context("Failed to seek JSONL file")?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)
        .await
        .context("Failed to read JSONL tail")?;
    Ok(last[0] == b'\n')
}

#[async_trait::async_trait]
impl PriceStore for JsonlStorage {
    async fn append_price(&self, record: &PriceRecord) -> Result<()> {
        let path = self.price_file(record);
        self.append_line(&path, record).await
    }

    async fn latest_price(&self, symbol: &Symbol) -> Result<Option<PriceRecord>> {
        // Year files sort chronologically, so the newest non-empty one holds the max.
        let files = Self::jsonl_files(&self.prices_dir(symbol)).await?;
        for path in files.iter().rev() {
            let records: Vec<PriceRecord> = Self::read_jsonl(path).await?;
            if let Some(latest) = records.into_iter().max_by_key(|r| r.observed_at) {
                return Ok(Some(latest));
            }
        }
        Ok(None)
    }

    async fn count_prices(&self) -> Result<u64> {
        let root = self.prices_root();
        let mut symbols = match fs::read_dir(&root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e).context("Failed to read prices directory"),
        };

        let mut total = 0;
        while let Some(entry) = symbols.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            for path in Self::jsonl_files(&entry.path()).await? {
                total += Self::count_lines(&path).await?;
            }
        }
        Ok(total)
    }
}

#[async_trait::async_trait]
impl LedgerStore for JsonlStorage {
    async fn append_transaction(&self, tx: &LedgerTransaction) -> Result<()> {
        let path = self.ledger_file(&tx.user_id)?;
        self.append_line(&path, tx).await
    }

    async fn transactions_for_user(&self, user_id: &Id) -> Result<Vec<LedgerTransaction>> {
        let path = self.ledger_file(user_id)?;
        Self::read_jsonl(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn record(id: &str, observed_at: DateTime<Utc>, price: i64) -> PriceRecord {
        PriceRecord {
            id: Id::from(id),
            symbol: Symbol::parse("BTC").unwrap(),
            price: Decimal::from(price),
            observed_at,
            recorded_at: observed_at,
        }
    }

    #[tokio::test]
    async fn prices_are_partitioned_by_observed_year() -> Result<()> {
        let dir = TempDir::new()?;
        let storage = JsonlStorage::new(dir.path());

        let old = record("old", Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap(), 42_000);
        let new = record("new", Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(), 43_000);
        storage.append_price(&new).await?;
        storage.append_price(&old).await?;

        assert!(dir.path().join("prices/BTC/2023.jsonl").exists());
        assert!(dir.path().join("prices/BTC/2024.jsonl").exists());

        let latest = storage.latest_price(&new.symbol).await?.expect("latest");
        assert_eq!(latest, new);
        assert_eq!(storage.count_prices().await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn torn_trailing_line_is_skipped() -> Result<()> {
        let dir = TempDir::new()?;
        let storage = JsonlStorage::new(dir.path());
        let first = record("a", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(), 1);
        storage.append_price(&first).await?;

        let path = dir.path().join("prices/BTC/2024.jsonl");
        let mut content = std::fs::read_to_string(&path)?;
        content.push_str("{\"id\":\"b\",\"sym");
        std::fs::write(&path, content)?;

        assert_eq!(storage.latest_price(&first.symbol).await?, Some(first));
        Ok(())
    }

    #[tokio::test]
    async fn append_after_torn_line_is_kept() -> Result<()> {
        let dir = TempDir::new()?;
        let storage = JsonlStorage::new(dir.path());
        let first = record("a", Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(), 1);
        storage.append_price(&first).await?;

        let path = dir.path().join("prices/BTC/2024.jsonl");
        let mut content = std::fs::read_to_string(&path)?;
        content.push_str("{\"id\":\"b\",\"sym");
        std::fs::write(&path, content)?;

        let newer = record("c", Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(), 3);
        storage.append_price(&newer).await?;

        assert_eq!(storage.latest_price(&first.symbol).await?, Some(newer.clone()));
        assert_eq!(std::fs::read_to_string(&path)?.lines().count(), 3);

        // The file is whole again: later appends need no repair.
        storage
            .append_price(&record("d", Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(), 4))
            .await?;
        assert_eq!(std::fs::read_to_string(&path)?.lines().count(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_appends_never_interleave() -> Result<()> {
        let dir = TempDir::new()?;
        let storage = std::sync::Arc::new(JsonlStorage::new(dir.path()));
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();

        let mut tasks = Vec::new();
        for i in 0..50 {
            let storage = storage.clone();
            tasks.push(tokio::spawn(async move {
                let r = record(&format!("r{i}"), base + chrono::Duration::seconds(i), i);
                storage.append_price(&r).await
            }));
        }
        for task in tasks {
            task.await??;
        }

        let content = std::fs::read_to_string(dir.path().join("prices/BTC/2024.jsonl"))?;
        let parsed = content
            .lines()
            .map(|line| serde_json::from_str::<PriceRecord>(line))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        assert_eq!(parsed.len(), 50);
        Ok(())
    }

    #[tokio::test]
    async fn ledger_round_trips_per_user() -> Result<()> {
        let dir = TempDir::new()?;
        let storage = JsonlStorage::new(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let tx = LedgerTransaction {
            id: Id::from("tx-1"),
            user_id: Id::from("alice"),
            symbol: Symbol::parse("ETH")?,
            amount: Decimal::new(15, 1),
            buy_price: Decimal::from(3000),
            transaction_date: now,
            created_at: now,
        };
        storage.append_transaction(&tx).await?;

        assert_eq!(storage.transactions_for_user(&Id::from("alice")).await?, vec![tx]);
        assert!(storage.transactions_for_user(&Id::from("bob")).await?.is_empty());
        assert!(storage
            .transactions_for_user(&Id::from("../etc"))
            .await
            .is_err());
        Ok(())
    }
}
