use std::collections::BTreeSet;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::models::Symbol;

use super::SymbolRegistry;

#[derive(Default)]
pub struct MemorySymbolRegistry {
    symbols: RwLock<BTreeSet<Symbol>>,
}

impl MemorySymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbols(symbols: impl IntoIterator<Item = Symbol>) -> Self {
        Self {
            symbols: RwLock::new(symbols.into_iter().collect()),
        }
    }
}

#[async_trait::async_trait]
impl SymbolRegistry for MemorySymbolRegistry {
    async fn add(&self, symbol: &Symbol) -> Result<bool> {
        Ok(self.symbols.write().await.insert(symbol.clone()))
    }

    async fn list(&self) -> Result<Vec<Symbol>> {
        Ok(self.symbols.read().await.iter().cloned().collect())
    }
}
