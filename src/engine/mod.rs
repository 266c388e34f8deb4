//! Opportunity evaluation: the periodic arbitrage engine, the identity
//! filter that splits same-ticker-different-asset groups, and the stability
//! tracker that labels persistently positive directions.

pub mod engine;
pub mod identity;
pub mod stability;

pub use engine::{ArbitrageEngine, OpportunityCache};
pub use stability::StabilityTracker;
