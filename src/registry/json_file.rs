use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::info;

use crate::models::Symbol;

use super::SymbolRegistry;

/// Registry persisted as a JSON array in `<data_dir>/symbols.json`.
///
/// Every process pointed at the same data dir sees the same set; `list` always
/// rereads the file. Writes land in a temp file that is renamed over the
/// original, so readers never observe a partial file.
pub struct JsonFileSymbolRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileSymbolRegistry {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("symbols.json"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<BTreeSet<Symbol>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeSet::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse symbol registry {}", self.path.display()))
    }

    async fn write(&self, symbols: &BTreeSet<Symbol>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create registry directory")?;
        }
        let content =
            serde_json::to_string_pretty(symbols).context("Failed to serialize symbol registry")?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SymbolRegistry for JsonFileSymbolRegistry {
    async fn add(&self, symbol: &Symbol) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut symbols = self.read().await?;
        if !symbols.insert(symbol.clone()) {
            return Ok(false);
        }
        self.write(&symbols).await?;
        info!(symbol = %symbol, "now tracking symbol");
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<Symbol>> {
        Ok(self.read().await?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn symbols_persist_across_instances() -> Result<()> {
        let dir = TempDir::new()?;
        let first = JsonFileSymbolRegistry::new(dir.path());
        assert!(first.add(&Symbol::parse("sol")?).await?);
        assert!(!first.add(&Symbol::parse("SOL")?).await?);
        assert!(first.add(&Symbol::parse("BTC")?).await?);

        let second = JsonFileSymbolRegistry::new(dir.path());
        let listed: Vec<String> = second.list().await?.into_iter().map(String::from).collect();
        assert_eq!(listed, ["BTC", "SOL"]);
        assert!(!dir.path().join("symbols.json.tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("symbols.json"), "[\"BTC\", \"bad symbol\"]")?;
        let registry = JsonFileSymbolRegistry::new(dir.path());
        assert!(registry.list().await.is_err());
        Ok(())
    }
}
