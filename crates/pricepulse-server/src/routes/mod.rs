pub mod market;
pub mod portfolio;
pub mod prices;
pub mod symbols;
pub mod ws;
