mod id;
mod id_generator;
mod ledger;
mod symbol;

pub use id::{Id, IdError};
pub use id_generator::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};
pub use ledger::{BuyOrder, LedgerTransaction};
pub use symbol::{Symbol, SymbolError};
