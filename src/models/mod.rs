//! Domain models shared across the engine, the stores and the read API.

pub mod candle;
pub mod position;

pub use candle::{Candle, Interval};
pub use position::{
    ExitReason, Position, PositionDraft, PositionStatus, PositionType, TradeStats,
};
