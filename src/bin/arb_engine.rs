//! Arbitrage engine binary: wires config, both venue gateways, the shared
//! orderbook cache, the log sink, and the task registry, then waits for
//! shutdown.
//!
//! A concrete `OpportunityScanner` and the operator surface that turns its
//! candidates into `TaskConfig`s handed to the registry live outside this
//! binary's scope; this wires the collaborators they depend on (both
//! gateways, the cache, the fill aggregator, the log sink, the registry)
//! and keeps them alive for the process lifetime.

use std::sync::Arc;

use polymarket_arb_bot::bin_common::{load_config_from_env, ConfigType};
use polymarket::application::registry::{RegistryDeps, TaskRegistry};
use polymarket::application::{FillAggregator, LogSink};
use polymarket::config::EngineConfig;
use polymarket::infrastructure::{init_tracing, GatewayA, GatewayB, OrderbookCache};
use polymarket::utils::{Heartbeat, ShutdownManager};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = load_config_from_env(ConfigType::Engine);
    let config = EngineConfig::load(&config_path)?;
    info!(path = %config_path.display(), "engine configuration loaded");

    let cache = Arc::new(OrderbookCache::from_config(&config.orderbook_cache));
    let log_sink = Arc::new(LogSink::spawn(config.log_sink.clone()));

    let gateway_a = Arc::new(GatewayA::connect(&config.venue_a, &config.private_key).await?);
    let gateway_b = Arc::new(GatewayB::connect(&config.venue_b, &config.private_key, cache.clone()).await?);

    let gateway_b_runner = gateway_b.clone();
    tokio::spawn(async move { gateway_b_runner.run().await });

    let fills = Arc::new(FillAggregator::new());
    let (mut fill_rx, fill_shutdown) = gateway_a.subscribe_fills(&config.venue_a).await?;
    let dispatch_fills = fills.clone();
    tokio::spawn(async move {
        while let Some(event) = fill_rx.recv().await {
            dispatch_fills.observe_event(&event.order_hash, &event);
        }
    });

    let registry = Arc::new(TaskRegistry::new(Arc::new(RegistryDeps {
        gateway_a: gateway_a.clone(),
        gateway_b: gateway_b.clone(),
        cache: cache.clone(),
        fills,
        log_sink: log_sink.clone(),
        executor_cfg: config.executor.clone(),
    })));

    let shutdown = ShutdownManager::new();
    shutdown.spawn_signal_handler();

    let mut heartbeat = Heartbeat::new(300);
    info!("arb-engine started, active tasks: {}", registry.active_count());

    while shutdown.is_running() {
        if heartbeat.should_beat() {
            info!(active_tasks = registry.active_count(), "heartbeat");
            heartbeat.beat();
        }
        shutdown.interruptible_sleep(std::time::Duration::from_millis(500)).await;
    }

    gateway_b.shutdown();
    fill_shutdown.store(false, std::sync::atomic::Ordering::Release);
    for snapshot in registry.list() {
        if !snapshot.progress.status.is_terminal() {
            let cancelled = registry
                .cancel(&snapshot.config.id, std::time::Duration::from_secs(30))
                .await;
            if !cancelled {
                error!(task_id = %snapshot.config.id, "task did not reach a terminal state before shutdown");
            }
        }
    }

    info!("arb-engine stopped");
    Ok(())
}
