use std::sync::Arc;

use tracing::{debug, error, info};

use common::{Error, OrderConfirmation, OrderIntent, OrderKind, OrderSink};
use risk::TradePlan;

/// Every order of a plan, as confirmed by the exchange.
#[derive(Debug, Clone)]
pub struct Execution {
    pub entries: Vec<OrderConfirmation>,
    pub stop_loss: OrderConfirmation,
}

/// A plan that stopped part-way. `filled` holds the entries confirmed before
/// `failed` was refused; when `failed` is an entry no stop-loss was placed.
#[derive(Debug, thiserror::Error)]
#[error(
    "{} order for {} failed after {} confirmed entries: {source}",
    kind_label(.failed.kind),
    .failed.instrument,
    .filled.len()
)]
pub struct ExecutionFailure {
    pub filled: Vec<OrderConfirmation>,
    pub failed: OrderIntent,
    #[source]
    pub source: Error,
}

fn kind_label(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Market => "entry",
        OrderKind::StopLoss => "stop-loss",
    }
}

/// Hands trade plans to the exchange.
///
/// This is the ONLY component that calls `OrderSink::submit`. Entries go
/// out in plan order and the stop-loss follows only once every entry is
/// confirmed, so a stop never rests against a position that was not opened.
pub struct PlanExecutor {
    sink: Arc<dyn OrderSink>,
}

impl PlanExecutor {
    pub fn new(sink: Arc<dyn OrderSink>) -> Self {
        Self { sink }
    }

    pub async fn execute(&self, plan: &TradePlan) -> Result<Execution, ExecutionFailure> {
        let mut filled = Vec::with_capacity(plan.entries.len());

        for intent in &plan.entries {
            info!(
                instrument = %intent.instrument,
                side = %intent.side,
                qty = intent.quantity,
                reference = intent.reference_price,
                "Submitting entry"
            );
            match self.sink.submit(intent).await {
                Ok(confirmation) => {
                    info!(
                        order_id = %confirmation.order_id,
                        instrument = %confirmation.instrument,
                        price = confirmation.price,
                        "Entry confirmed"
                    );
                    filled.push(confirmation);
                }
                Err(source) => {
                    error!(instrument = %intent.instrument, error = %source, "Entry rejected; stop-loss withheld");
                    return Err(ExecutionFailure {
                        filled,
                        failed: intent.clone(),
                        source,
                    });
                }
            }
        }

        // The exchange may take its fee out of the bought asset.
        let stop = match filled.first() {
            Some(primary) => plan.stop_loss_for(primary.quantity),
            None => plan.stop_loss.clone(),
        };
        if stop.quantity < plan.stop_loss.quantity {
            debug!(
                planned = plan.stop_loss.quantity,
                held = stop.quantity,
                "Stop-loss sized to confirmed fill"
            );
        }
        match self.sink.submit(&stop).await {
            Ok(stop_loss) => {
                info!(
                    order_id = %stop_loss.order_id,
                    instrument = %stop_loss.instrument,
                    stop = stop.reference_price,
                    "Stop-loss placed"
                );
                Ok(Execution {
                    entries: filled,
                    stop_loss,
                })
            }
            Err(source) => {
                error!(instrument = %stop.instrument, error = %source, "Stop-loss rejected; position is unprotected");
                Err(ExecutionFailure {
                    filled,
                    failed: stop,
                    source,
                })
            }
        }
    }
}
