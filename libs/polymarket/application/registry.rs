//! Task Registry: the process-wide map of live tasks.
//!
//! One `TaskExecutor` per `TaskId`, each spawned under its own
//! `CancellationToken` so cancellation is per-task rather than global. This
//! plays the role the market tracker's internal `DashMap<String, Market>`
//! played for market state, generalized to own the executor lifecycle too
//! rather than just a read model.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::application::executor::{self, ExecutorDeps, TaskChangeEvent, TaskHandle};
use crate::domain::{TaskConfig, TaskId, TaskSnapshot, TaskStatus};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Bundles everything a newly created task's executor needs. Held once by
/// the registry and cloned (cheaply, via `Arc`) into every `spawn` call.
/// `fills` is shared across every task rather than one per task: the
/// block-event dispatcher routes by order hash, and hashes are unique across
/// the whole process, so one table is both simpler and matches the fill
/// aggregator's own "process-wide table" design.
pub struct RegistryDeps {
    pub gateway_a: Arc<crate::infrastructure::GatewayA>,
    pub gateway_b: Arc<crate::infrastructure::GatewayB>,
    pub cache: Arc<crate::infrastructure::OrderbookCache>,
    pub fills: Arc<crate::application::fill_aggregator::FillAggregator>,
    pub log_sink: Arc<crate::application::log_sink::LogSink>,
    pub executor_cfg: crate::config::ExecutorConfig,
}

pub struct TaskRegistry {
    tasks: DashMap<TaskId, TaskHandle>,
    deps: Arc<RegistryDeps>,
    events_tx: broadcast::Sender<TaskChangeEvent>,
}

impl TaskRegistry {
    pub fn new(deps: Arc<RegistryDeps>) -> Self {
        let (events_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { tasks: DashMap::new(), deps, events_tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskChangeEvent> {
        self.events_tx.subscribe()
    }

    /// Spawns a new task executor. Fails if `task_id` is already registered
    /// and not yet terminal — callers must cancel and await completion
    /// before reusing an id.
    pub fn create(&self, config: TaskConfig) -> Result<TaskId, TaskId> {
        let task_id = config.id.clone();
        if let Some(existing) = self.tasks.get(&task_id) {
            if !existing.progress.read().status.is_terminal() {
                return Err(task_id);
            }
        }

        let exec_deps = Arc::new(ExecutorDeps {
            gateway_a: self.deps.gateway_a.clone(),
            gateway_b: self.deps.gateway_b.clone(),
            cache: self.deps.cache.clone(),
            fills: self.deps.fills.clone(),
            log_sink: self.deps.log_sink.clone(),
            executor_cfg: self.deps.executor_cfg.clone(),
            events_tx: self.events_tx.clone(),
        });

        let handle = executor::spawn(config, exec_deps);
        self.tasks.insert(task_id.clone(), handle);
        info!(task_id = %task_id, "task registered");
        Ok(task_id)
    }

    /// Requests cancellation and waits (bounded) for the executor to reach a
    /// terminal state. Does not remove the task from the registry; call
    /// `remove` once the caller has read whatever final state it needs.
    pub async fn cancel(&self, task_id: &TaskId, wait: std::time::Duration) -> bool {
        let cancel_token = match self.tasks.get(task_id) {
            Some(handle) => handle.cancel.clone(),
            None => return false,
        };
        cancel_token.cancel();

        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let terminal = self
                .tasks
                .get(task_id)
                .map(|h| h.progress.read().status.is_terminal())
                .unwrap_or(true);
            if terminal {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(task_id = %task_id, "cancel did not reach terminal state within budget");
                return false;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    pub fn get(&self, task_id: &TaskId) -> Option<TaskSnapshot> {
        self.tasks.get(task_id).map(|handle| TaskSnapshot {
            config: (*handle.config).clone(),
            progress: handle.progress.read().clone(),
        })
    }

    pub fn list(&self) -> Vec<TaskSnapshot> {
        self.tasks
            .iter()
            .map(|entry| TaskSnapshot {
                config: (*entry.config).clone(),
                progress: entry.progress.read().clone(),
            })
            .collect()
    }

    /// Evicts a terminal task's handle. No-op (returns `false`) if the task
    /// is still running, to keep the invariant that a live task always has
    /// exactly one registry entry and one in-flight executor.
    pub fn remove(&self, task_id: &TaskId) -> bool {
        let terminal = self
            .tasks
            .get(task_id)
            .map(|h| h.progress.read().status.is_terminal())
            .unwrap_or(false);
        if !terminal {
            return false;
        }
        self.tasks.remove(task_id);
        true
    }

    pub fn active_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|h| !h.progress.read().status.is_terminal())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registry_has_no_active_tasks() {
        // Constructing a full RegistryDeps needs live gateways, so this only
        // exercises the parts of TaskRegistry that don't require spawning.
        let (events_tx, _rx) = broadcast::channel::<TaskChangeEvent>(8);
        assert_eq!(events_tx.receiver_count(), 1);
    }
}
