//! Write-ahead journal that makes the in-process channel survive restarts.
//!
//! `events.jsonl` receives every published envelope before it is enqueued;
//! `acks.jsonl` receives the id of every envelope that was handled or
//! dead-lettered. Anything published but never acked is pending.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::models::Id;
use crate::storage::ends_with_newline;

use super::Envelope;

#[derive(Debug, Serialize, Deserialize)]
struct Ack {
    id: Id,
}

/// Acks journaled between two automatic compactions.
pub const DEFAULT_COMPACT_EVERY: u64 = 1000;

pub struct EventJournal {
    events_path: PathBuf,
    acks_path: PathBuf,
    compact_every: u64,
    /// Acks appended since the last compaction.
    lock: Mutex<u64>,
}

impl EventJournal {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            events_path: dir.join("events.jsonl"),
            acks_path: dir.join("acks.jsonl"),
            compact_every: DEFAULT_COMPACT_EVERY,
            lock: Mutex::new(0),
        }
    }

    pub fn with_compact_every(mut self, acks: u64) -> Self {
        self.compact_every = acks.max(1);
        self
    }

    pub async fn record_published(&self, envelope: &Envelope) -> Result<()> {
        let _guard = self.lock.lock().await;
        append_line(&self.events_path, envelope).await
    }

    /// Journal an ack, compacting once enough acks have accumulated.
    pub async fn record_ack(&self, id: &Id) -> Result<()> {
        let mut acks = self.lock.lock().await;
        append_line(&self.acks_path, &Ack { id: id.clone() }).await?;
        *acks += 1;
        if *acks >= self.compact_every {
            self.compact_locked().await?;
            *acks = 0;
        }
        Ok(())
    }

    /// Envelopes published but not acked, in publish order.
    pub async fn pending(&self) -> Result<Vec<Envelope>> {
        let _guard = self.lock.lock().await;
        self.pending_locked().await
    }

    async fn pending_locked(&self) -> Result<Vec<Envelope>> {
        let acked: HashSet<Id> = read_lines::<Ack>(&self.acks_path)
            .await?
            .into_iter()
            .map(|ack| ack.id)
            .collect();
        Ok(read_lines::<Envelope>(&self.events_path)
            .await?
            .into_iter()
            .filter(|env| !acked.contains(&env.id))
            .collect())
    }

    /// Rewrite the journal so it holds only pending envelopes, and return them.
    pub async fn compact(&self) -> Result<Vec<Envelope>> {
        let mut acks = self.lock.lock().await;
        let pending = self.compact_locked().await?;
        *acks = 0;
        Ok(pending)
    }

    async fn compact_locked(&self) -> Result<Vec<Envelope>> {
        let pending = self.pending_locked().await?;

        let mut content = Vec::new();
        for env in &pending {
            serde_json::to_writer(&mut content, env).context("Failed to serialize envelope")?;
            content.push(b'\n');
        }
        if let Some(parent) = self.events_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create journal directory")?;
        }
        let tmp = self.events_path.with_extension("jsonl.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.events_path)
            .await
            .context("Failed to replace event journal")?;
        match fs::remove_file(&self.acks_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).context("Failed to clear ack journal"),
        }

        debug!(pending = pending.len(), "compacted event journal");
        Ok(pending)
    }
}

async fn append_line<T: Serialize>(path: &Path, item: &T) -> Result<()> {
    let mut line = serde_json::to_vec(item).context("Failed to serialize journal entry")?;
    line.push(b'\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create journal directory")?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    if !ends_with_newline(&mut file).await? {
        line.insert(0, b'\n');
    }
    file.write_all(&line)
        .await
        .with_context(|| format!("Failed to append to {}", path.display()))?;
    file.sync_data().await.context("Failed to sync journal")?;
    Ok(())
}

async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let mut items = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str(line) {
            Ok(item) => items.push(item),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping corrupt journal line"),
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::PriceEvent;
    use crate::models::Symbol;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn envelope(id: &str) -> Envelope {
        let event = PriceEvent::new(Symbol::parse("BTC").unwrap(), Decimal::ONE, Utc::now()).unwrap();
        Envelope::new(Id::from(id), event)
    }

    #[tokio::test]
    async fn acked_envelopes_are_not_pending() -> Result<()> {
        let dir = TempDir::new()?;
        let journal = EventJournal::new(dir.path());
        journal.record_published(&envelope("a")).await?;
        journal.record_published(&envelope("b")).await?;
        journal.record_ack(&Id::from("a")).await?;

        let pending = journal.pending().await?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id.as_str(), "b");
        Ok(())
    }

    #[tokio::test]
    async fn compact_keeps_only_pending() -> Result<()> {
        let dir = TempDir::new()?;
        let journal = EventJournal::new(dir.path());
        for id in ["a", "b", "c"] {
            journal.record_published(&envelope(id)).await?;
        }
        journal.record_ack(&Id::from("b")).await?;

        let pending = journal.compact().await?;
        assert_eq!(pending.len(), 2);
        assert!(!dir.path().join("acks.jsonl").exists());

        let reopened = EventJournal::new(dir.path());
        let ids: Vec<_> = reopened
            .pending()
            .await?
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, ["a", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn acks_trigger_compaction_while_running() -> Result<()> {
        let dir = TempDir::new()?;
        let journal = EventJournal::new(dir.path()).with_compact_every(3);
        for id in ["a", "b", "c", "d"] {
            journal.record_published(&envelope(id)).await?;
        }
        journal.record_ack(&Id::from("a")).await?;
        journal.record_ack(&Id::from("b")).await?;
        assert!(dir.path().join("acks.jsonl").exists());

        journal.record_ack(&Id::from("c")).await?;
        assert!(!dir.path().join("acks.jsonl").exists());
        let events = std::fs::read_to_string(dir.path().join("events.jsonl"))?;
        assert_eq!(events.lines().count(), 1);

        // Publishing keeps working against the rewritten file.
        journal.record_published(&envelope("e")).await?;
        let ids: Vec<_> = journal
            .pending()
            .await?
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, ["d", "e"]);
        Ok(())
    }

    #[tokio::test]
    async fn non_positive_price_lines_are_not_replayed() -> Result<()> {
        let dir = TempDir::new()?;
        let journal = EventJournal::new(dir.path());
        journal.record_published(&envelope("good")).await?;

        let path = dir.path().join("events.jsonl");
        let mut content = std::fs::read_to_string(&path)?;
        content.push_str(
            r#"{"id":"bad","event":{"symbol":"BTC","price":"-5","timestamp":"2024-05-01T00:00:00Z"},"attempt":1}"#,
        );
        content.push('\n');
        std::fs::write(&path, content)?;

        let ids: Vec<_> = journal
            .pending()
            .await?
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, ["good"]);
        Ok(())
    }

    #[tokio::test]
    async fn append_after_torn_entry_starts_a_new_line() -> Result<()> {
        let dir = TempDir::new()?;
        let journal = EventJournal::new(dir.path());
        journal.record_published(&envelope("a")).await?;

        let path = dir.path().join("events.jsonl");
        let mut content = std::fs::read_to_string(&path)?;
        content.push_str(r#"{"id":"torn","eve"#);
        std::fs::write(&path, content)?;

        journal.record_published(&envelope("b")).await?;
        let ids: Vec<_> = journal
            .pending()
            .await?
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, ["a", "b"]);
        Ok(())
    }
}
