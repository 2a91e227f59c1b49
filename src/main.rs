//! # Confluence — Moving-Average Cluster / Crossover Signal Engine
//!
//! ```text
//!  ┌──────────────┐  klines   ┌──────────────────────────────────────────┐
//!  │ Candle feed  │ ────────▶ │ AppState                                 │
//!  │ (REST)       │           │ ├─ strategy tick  ⏱ 60s  (guard A)       │
//!  └──────────────┘           │ ├─ stop-loss tick ⏱ 30s  (guard B)       │
//!                             │ ├─ open_position                         │
//!  ┌──────────────┐  CAS      │ ├─ StateCache                            │
//!  │ PositionStore│ ◀──────── │ └─ broadcast_tx ───────────────┐         │
//!  │ memory | pg  │           └────────────────────────────────┼─────────┘
//!  └──────────────┘                                            │
//!  ┌──────────────┐  GET /api/market (lazy tick)               │
//!  │  Clients     │  GET /api/position · /api/trades · /api/pnl│
//!  │              │ ◀──────────── ws://host/ws/monitor ◀───────┘
//!  └──────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! | Variable             | Default                   | Description                      |
//! |----------------------|---------------------------|----------------------------------|
//! | `SYMBOL`             | `BTCUSDT`                 | Traded symbol                    |
//! | `STRATEGY_INTERVAL`  | `15m`                     | Interval for SMA / cluster / cross |
//! | `REFERENCE_INTERVAL` | `1h`                      | Reference SMA interval (empty = strategy interval) |
//! | `STOP_LOSS_INTERVAL` | `1m`                      | Fast interval for the watchdog   |
//! | `MA_PERIODS`         | `20,50,100,200`           | Cluster periods                  |
//! | `DRY_RUN`            | `true`                    | Memory store, nothing persisted  |
//! | `DATABASE_URL`       | —                         | PostgreSQL (`--features postgres`) |
//! | `BIND_ADDR`          | `0.0.0.0:3000`            | Address Axum listens on          |
//! | `RUST_LOG`           | `confluence=debug`        | Tracing filter                   |
//!
//! The full list lives in [`config::Config`].

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cache;
mod config;
mod engine;
mod error;
mod events;
mod feed;
mod models;
mod routes;
mod state;
mod store;

use config::Config;
use engine::timer::{spawn_stop_loss_timer, spawn_strategy_timer};
use feed::RestCandleSource;
use state::AppState;
use store::{MemoryStore, PositionStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("confluence=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║        CONFLUENCE — MA Cluster / Crossover Engine     ║
  ║   Strategy · Stop-Loss · Position Store · Read API    ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = Config::from_env().context("invalid configuration")?;
    info!(
        symbol   = %config.symbol,
        interval = %config.strategy_interval,
        periods  = ?config.ma_periods,
        dry_run  = config.dry_run,
        "⚙️  Config loaded"
    );

    // ── 4. Collaborators ──────────────────────────────────────────────────────
    let store = build_store(&config).await?;
    let candles = Arc::new(RestCandleSource::new(
        reqwest::Client::new(),
        config.feed_base_url.clone(),
        config.fetch_timeout,
    ));
    let bind_addr = config.bind_addr;

    // ── 5. Shared state + restore ─────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, candles, store));
    match state.restore().await.context("restoring open position")? {
        Some(p) => info!(
            id = %p.id,
            side = p.position_type.as_str(),
            entry = p.entry_price,
            "♻️  Restored open position"
        ),
        None => info!("No open position to restore"),
    }

    // ── 6. Schedulers ─────────────────────────────────────────────────────────
    let strategy_timer = spawn_strategy_timer(state.clone());
    let stop_loss_timer = spawn_stop_loss_timer(state.clone());

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    let app = routes::router(state);

    info!(?bind_addr, "🚀 Confluence server starting");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    strategy_timer.abort();
    stop_loss_timer.abort();
    info!("👋 Shut down");
    Ok(())
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn PositionStore>> {
    if config.dry_run {
        warn!("🧪 DRY_RUN — positions are kept in memory only");
        return Ok(Arc::new(MemoryStore::new()));
    }

    #[cfg(feature = "postgres")]
    {
        let url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is required when DRY_RUN=false")?;
        let store = store::PgStore::connect(url).await.context("connecting to PostgreSQL")?;
        info!("🗄️  PostgreSQL position store ready");
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "postgres"))]
    {
        anyhow::bail!("DRY_RUN=false needs a durable store: rebuild with `--features postgres`")
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl-C handler failed — shutting down");
    }
    info!("🛑 Shutdown signal received");
}
