//! The set of symbols the poller tracks.

mod json_file;
mod memory;

pub use json_file::JsonFileSymbolRegistry;
pub use memory::MemorySymbolRegistry;

use anyhow::Result;
use tracing::info;

use crate::models::Symbol;

#[async_trait::async_trait]
pub trait SymbolRegistry: Send + Sync {
    /// Idempotent insert. Returns `true` when the symbol was not tracked yet.
    async fn add(&self, symbol: &Symbol) -> Result<bool>;

    /// Currently tracked symbols, sorted.
    async fn list(&self) -> Result<Vec<Symbol>>;
}

/// Seed `defaults` into the registry. Safe to call on every start.
pub async fn initialize_defaults(registry: &dyn SymbolRegistry, defaults: &[Symbol]) -> Result<usize> {
    let mut added = 0;
    for symbol in defaults {
        if registry.add(symbol).await? {
            added += 1;
        }
    }
    if added > 0 {
        info!(added, "seeded default symbols");
    }
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_is_idempotent() -> Result<()> {
        let registry = MemorySymbolRegistry::new();
        let defaults = vec![Symbol::parse("BTC")?, Symbol::parse("ETH")?];

        assert_eq!(initialize_defaults(&registry, &defaults).await?, 2);
        assert_eq!(initialize_defaults(&registry, &defaults).await?, 0);
        assert_eq!(registry.list().await?, defaults);
        Ok(())
    }
}
