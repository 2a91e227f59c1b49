//! # events
//!
//! [`WsEvent`] — everything the engine broadcasts to `/ws/monitor` clients.
//!
//! Sent through `tokio::sync::broadcast::Sender<String>` as pre-serialized
//! JSON so subscribers never need to clone domain structs.

use serde::Serialize;

use crate::cache::{StopLossStatus, StrategySnapshot};
use crate::models::Position;

/// Which scheduler closed a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClosedBy {
    Strategy,
    StopLoss,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WsEvent {
    /// Strategy tick opened a position on a clustered crossover
    PositionOpened {
        position: Box<Position>,
    },

    /// A close won the conditional update
    PositionClosed {
        position:  Box<Position>,
        closed_by: ClosedBy,
    },

    /// Fresh strategy snapshot
    StrategyTick {
        snapshot: Box<StrategySnapshot>,
    },

    /// Stop-loss watchdog checked the open position
    StopLossTick {
        status: StopLossStatus,
    },
}

impl WsEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}
