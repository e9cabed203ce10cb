use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use common::{CycleEvent, EngineCommand, EngineState, Error, Result};
use strategy::StrategyRegistry;

use crate::cycle::DecisionCycle;

/// Cloneable handle for driving the engine from other tasks.
#[derive(Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
    state: Arc<RwLock<EngineState>>,
    event_tx: broadcast::Sender<CycleEvent>,
}

impl EngineHandle {
    /// Fails once the engine task has exited.
    pub async fn send(&self, cmd: EngineCommand) -> Result<()> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|e| Error::Other(format!("engine is gone; dropped {:?}", e.0)))
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// Subscribe to the outcome of every decision cycle.
    pub fn subscribe_events(&self) -> broadcast::Receiver<CycleEvent> {
        self.event_tx.subscribe()
    }
}

/// Owns the strategies and runs their decision cycles on `Tick`.
///
/// Commands are handled one at a time, so each strategy has at most one
/// evaluation in flight and a `Stop` lands after the current tick finishes.
pub struct Engine {
    registry: StrategyRegistry,
    cycle: DecisionCycle,
    state: Arc<RwLock<EngineState>>,
    event_tx: broadcast::Sender<CycleEvent>,
    command_rx: mpsc::Receiver<EngineCommand>,
}

impl Engine {
    pub fn new(registry: StrategyRegistry, cycle: DecisionCycle) -> (Self, EngineHandle) {
        let (command_tx, command_rx) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(256);
        let state = Arc::new(RwLock::new(EngineState::Stopped));

        let handle = EngineHandle {
            command_tx,
            state: state.clone(),
            event_tx: event_tx.clone(),
        };

        let engine = Engine {
            registry,
            cycle,
            state,
            event_tx,
            command_rx,
        };

        (engine, handle)
    }

    /// Run until every handle is dropped. Call from `tokio::spawn`.
    pub async fn run(mut self) {
        info!(
            strategies = self.registry.len(),
            "Engine initialized in Stopped state. Waiting for Start command."
        );

        while let Some(cmd) = self.command_rx.recv().await {
            let current = *self.state.read().await;
            match cmd {
                EngineCommand::Start => {
                    if current == EngineState::Running {
                        info!("Engine already running");
                        continue;
                    }
                    info!("Engine running");
                    *self.state.write().await = EngineState::Running;
                }

                EngineCommand::Stop => {
                    info!("Engine stopped");
                    *self.state.write().await = EngineState::Stopped;
                }

                EngineCommand::Pause => {
                    if current == EngineState::Running {
                        info!("Engine paused; ticks are ignored until Resume");
                        *self.state.write().await = EngineState::Paused;
                    }
                }

                EngineCommand::Resume => {
                    if current == EngineState::Paused {
                        info!("Engine resumed");
                        *self.state.write().await = EngineState::Running;
                    }
                }

                EngineCommand::Tick => {
                    if current != EngineState::Running {
                        debug!(state = %current, "Tick ignored");
                        continue;
                    }
                    self.tick().await;
                }
            }
        }

        warn!("Engine command channel closed; shutting down");
    }

    async fn tick(&mut self) {
        for strategy in self.registry.iter_mut() {
            let event = self.cycle.run(strategy.as_mut()).await;
            match &event {
                CycleEvent::PlanExecuted { .. } | CycleEvent::BelowMinimum { .. } => info!("{event}"),
                CycleEvent::Abandoned { .. } | CycleEvent::PlanFailed { .. } => warn!("{event}"),
                CycleEvent::NoSignal { .. } | CycleEvent::WarmingUp { .. } => debug!("{event}"),
            }
            // No subscribers is fine; the event was logged.
            let _ = self.event_tx.send(event);
        }
    }
}

/// Send `Tick` every `period` until the engine goes away. The first tick
/// fires immediately.
pub fn spawn_ticker(handle: EngineHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            if handle.send(EngineCommand::Tick).await.is_err() {
                debug!("Ticker stopping; engine is gone");
                break;
            }
        }
    })
}
