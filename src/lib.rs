//! SpreadBot Backend Library
//!
//! Cross-exchange spot arbitrage monitor: polls public ticker endpoints on
//! several centralized exchanges, keeps the freshest best bid/ask per
//! (exchange, symbol) in memory, and ranks buy-low/sell-high opportunities
//! net of taker fees on a fixed evaluation tick.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod exchanges;
pub mod models;
pub mod notify;
pub mod store;
pub mod symbols;

pub use config::Settings;
pub use error::VenueError;
pub use models::{
    ExchangeStatus, FeeSchedule, Opportunity, OpportunityGroup, OpportunitySnapshot, Quote,
    WsServerEvent,
};
