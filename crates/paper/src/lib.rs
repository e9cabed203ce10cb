use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use common::{
    AccountSource, Candle, Error, MarketDataSource, OrderConfirmation, OrderIntent, OrderKind,
    OrderSide, OrderSink, RejectionReason, Result,
};

/// A stop-loss accepted by the paper exchange and not yet triggered.
#[derive(Debug, Clone, PartialEq)]
pub struct RestingStop {
    pub order_id: String,
    pub instrument: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub stop_price: f64,
}

impl RestingStop {
    fn triggered_by(&self, price: f64) -> bool {
        match self.side {
            OrderSide::Sell => price <= self.stop_price,
            OrderSide::Buy => price >= self.stop_price,
        }
    }
}

#[derive(Debug, Default)]
struct Ledger {
    /// Asset → free amount. Short sells may drive a base asset negative.
    balances: HashMap<String, f64>,
    stops: Vec<RestingStop>,
}

/// Simulated exchange for paper trading and tests.
///
/// Fills market orders at the latest known price (falling back to the
/// intent's reference price) with configurable slippage, keeps a per-asset
/// ledger, and holds stop-losses until `update_price` crosses them.
/// Nothing ever reaches a real exchange.
pub struct PaperClient {
    quote_asset: String,
    ledger: Arc<RwLock<Ledger>>,
    /// Latest known price per instrument, updated via `update_price`.
    prices: Arc<RwLock<HashMap<String, f64>>>,
    /// Candle history served through `MarketDataSource`.
    candles: Arc<RwLock<HashMap<String, Vec<Candle>>>>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
}

impl PaperClient {
    pub fn new(quote_asset: impl Into<String>, initial_balance: f64, slippage_bps: f64) -> Self {
        let quote_asset = quote_asset.into();
        info!(
            quote = %quote_asset,
            balance = initial_balance,
            slippage_bps = slippage_bps,
            "PaperClient initialized"
        );
        let mut ledger = Ledger::default();
        ledger.balances.insert(quote_asset.clone(), initial_balance);
        Self {
            quote_asset,
            ledger: Arc::new(RwLock::new(ledger)),
            prices: Arc::new(RwLock::new(HashMap::new())),
            candles: Arc::new(RwLock::new(HashMap::new())),
            slippage_bps,
        }
    }

    /// Replace the candle history for an instrument. The last close also
    /// becomes its current price.
    pub async fn seed_candles(&self, instrument: &str, mut candles: Vec<Candle>) {
        candles.sort_by_key(|c| c.timestamp);
        if let Some(last) = candles.last() {
            self.prices.write().await.insert(instrument.to_string(), last.close);
        }
        self.candles.write().await.insert(instrument.to_string(), candles);
    }

    /// Set the latest price and fill any resting stop it crosses.
    /// Returns confirmations for the stops that fired.
    pub async fn update_price(&self, instrument: &str, price: f64) -> Vec<OrderConfirmation> {
        self.prices.write().await.insert(instrument.to_string(), price);

        let mut ledger = self.ledger.write().await;
        let (fired, resting): (Vec<_>, Vec<_>) = ledger
            .stops
            .drain(..)
            .partition(|s| s.instrument == instrument && s.triggered_by(price));
        ledger.stops = resting;

        let mut fills = Vec::with_capacity(fired.len());
        for stop in fired {
            let fill_price = self.slipped(stop.side, price);
            // Stops close exposure; they are never refused for balance.
            self.settle(&mut ledger, &stop.instrument, stop.side, stop.quantity, fill_price);
            info!(
                order_id = %stop.order_id,
                instrument = %stop.instrument,
                stop = stop.stop_price,
                fill = fill_price,
                "Paper stop-loss triggered"
            );
            fills.push(OrderConfirmation {
                order_id: stop.order_id,
                instrument: stop.instrument,
                side: stop.side,
                price: fill_price,
                quantity: stop.quantity,
                timestamp: Utc::now(),
            });
        }
        fills
    }

    pub async fn resting_stops(&self) -> Vec<RestingStop> {
        self.ledger.read().await.stops.clone()
    }

    pub async fn balances(&self) -> HashMap<String, f64> {
        self.ledger.read().await.balances.clone()
    }

    fn base_asset<'a>(&self, instrument: &'a str) -> Option<&'a str> {
        instrument
            .strip_suffix(self.quote_asset.as_str())
            .filter(|base| !base.is_empty())
    }

    /// Buys pay more, sells receive less.
    fn slipped(&self, side: OrderSide, price: f64) -> f64 {
        let slip = self.slippage_bps / 10_000.0;
        match side {
            OrderSide::Buy => price * (1.0 + slip),
            OrderSide::Sell => price * (1.0 - slip),
        }
    }

    fn settle(&self, ledger: &mut Ledger, instrument: &str, side: OrderSide, qty: f64, price: f64) {
        let Some(base) = self.base_asset(instrument) else {
            return;
        };
        let (base_delta, quote_delta) = match side {
            OrderSide::Buy => (qty, -qty * price),
            OrderSide::Sell => (-qty, qty * price),
        };
        *ledger.balances.entry(base.to_string()).or_default() += base_delta;
        *ledger.balances.entry(self.quote_asset.clone()).or_default() += quote_delta;
    }

    async fn mark_price(&self, intent: &OrderIntent) -> Option<f64> {
        let known = self.prices.read().await.get(&intent.instrument).copied();
        known
            .or(Some(intent.reference_price))
            .filter(|p| p.is_finite() && *p > 0.0)
    }
}

fn rejected(reason: RejectionReason) -> Error {
    Error::OrderRejected { reason }
}

#[async_trait]
impl OrderSink for PaperClient {
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderConfirmation> {
        if !(intent.quantity.is_finite() && intent.quantity > 0.0) {
            return Err(rejected(RejectionReason::Other(format!(
                "quantity must be positive, got {}",
                intent.quantity
            ))));
        }
        if self.base_asset(&intent.instrument).is_none() {
            warn!(instrument = %intent.instrument, quote = %self.quote_asset, "Paper order for unknown instrument");
            return Err(rejected(RejectionReason::UnknownInstrument));
        }
        let order_id = Uuid::new_v4().to_string();

        if intent.kind == OrderKind::StopLoss {
            let stop = RestingStop {
                order_id: order_id.clone(),
                instrument: intent.instrument.clone(),
                side: intent.side,
                quantity: intent.quantity,
                stop_price: intent.reference_price,
            };
            debug!(?stop, "Paper stop-loss resting");
            self.ledger.write().await.stops.push(stop);
            return Ok(OrderConfirmation {
                order_id,
                instrument: intent.instrument.clone(),
                side: intent.side,
                price: intent.reference_price,
                quantity: intent.quantity,
                timestamp: Utc::now(),
            });
        }

        let mid_price = self
            .mark_price(intent)
            .await
            .ok_or_else(|| rejected(RejectionReason::UnknownInstrument))?;
        let fill_price = self.slipped(intent.side, mid_price);

        let mut ledger = self.ledger.write().await;
        if intent.side == OrderSide::Buy {
            let cost = fill_price * intent.quantity;
            let available = ledger.balances.get(&self.quote_asset).copied().unwrap_or(0.0);
            if cost > available {
                debug!(cost, available, "Paper buy exceeds quote balance");
                return Err(rejected(RejectionReason::InsufficientBalance));
            }
        }
        self.settle(&mut ledger, &intent.instrument, intent.side, intent.quantity, fill_price);
        drop(ledger);

        debug!(
            instrument = %intent.instrument,
            side = %intent.side,
            mid = mid_price,
            fill = fill_price,
            qty = intent.quantity,
            "Paper fill simulated"
        );

        Ok(OrderConfirmation {
            order_id,
            instrument: intent.instrument.clone(),
            side: intent.side,
            price: fill_price,
            quantity: intent.quantity,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl AccountSource for PaperClient {
    async fn balance(&self, asset: &str) -> Result<f64> {
        Ok(self.ledger.read().await.balances.get(asset).copied().unwrap_or(0.0))
    }
}

#[async_trait]
impl MarketDataSource for PaperClient {
    async fn current_price(&self, instrument: &str) -> Result<f64> {
        self.prices
            .read()
            .await
            .get(instrument)
            .copied()
            .ok_or_else(|| Error::DataUnavailable(format!("No paper price for {instrument}")))
    }

    async fn historical_candles(
        &self,
        instrument: &str,
        _timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>> {
        let candles = self.candles.read().await;
        let series = candles
            .get(instrument)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::DataUnavailable(format!("No paper candles for {instrument}")))?;
        let start = series.len().saturating_sub(count);
        Ok(series[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn bars(closes: &[f64]) -> Vec<Candle> {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::point(t0 + Duration::hours(i as i64), c))
            .collect()
    }

    #[tokio::test]
    async fn buy_fill_applies_positive_slippage() {
        let client = PaperClient::new("USDT", 10_000.0, 10.0);
        client.update_price("BTCUSDT", 1000.0).await;

        let intent = OrderIntent::market("BTCUSDT", OrderSide::Buy, 0.01, 1000.0);
        let fill = client.submit(&intent).await.unwrap();

        let expected = 1000.0 * (1.0 + 10.0 / 10_000.0);
        assert!((fill.price - expected).abs() < 1e-6, "fill {}, expected {expected}", fill.price);
        assert!(!fill.order_id.is_empty());
    }

    #[tokio::test]
    async fn sell_fill_applies_negative_slippage() {
        let client = PaperClient::new("USDT", 10_000.0, 10.0);
        client.update_price("ETHUSDT", 500.0).await;

        let fill = client
            .submit(&OrderIntent::market("ETHUSDT", OrderSide::Sell, 1.0, 500.0))
            .await
            .unwrap();
        assert!((fill.price - 500.0 * 0.999).abs() < 1e-6);
    }

    #[tokio::test]
    async fn buy_moves_balances() {
        let client = PaperClient::new("USDT", 1_000.0, 0.0);
        client.update_price("ETHUSDT", 100.0).await;
        client
            .submit(&OrderIntent::market("ETHUSDT", OrderSide::Buy, 2.0, 100.0))
            .await
            .unwrap();

        assert_eq!(client.balance("USDT").await.unwrap(), 800.0);
        assert_eq!(client.balance("ETH").await.unwrap(), 2.0);
        assert_eq!(client.balance("DOGE").await.unwrap(), 0.0);
        assert_eq!(client.balances().await.len(), 2);
    }

    #[tokio::test]
    async fn falls_back_to_reference_price() {
        let client = PaperClient::new("USDT", 1_000.0, 0.0);
        let fill = client
            .submit(&OrderIntent::market("SOLUSDT", OrderSide::Buy, 1.0, 25.0))
            .await
            .unwrap();
        assert_eq!(fill.price, 25.0);
    }

    #[tokio::test]
    async fn rejects_buy_beyond_balance() {
        let client = PaperClient::new("USDT", 100.0, 0.0);
        client.update_price("BTCUSDT", 30_000.0).await;
        let err = client
            .submit(&OrderIntent::market("BTCUSDT", OrderSide::Buy, 1.0, 30_000.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OrderRejected { reason: RejectionReason::InsufficientBalance }
        ));
        assert_eq!(client.balance("USDT").await.unwrap(), 100.0);
    }

    #[tokio::test]
    async fn rejects_instrument_outside_quote() {
        let client = PaperClient::new("USDT", 100.0, 0.0);
        let err = client
            .submit(&OrderIntent::market("BTCEUR", OrderSide::Buy, 0.001, 30_000.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OrderRejected { reason: RejectionReason::UnknownInstrument }
        ));
    }

    #[tokio::test]
    async fn stop_loss_rests_until_crossed() {
        let client = PaperClient::new("USDT", 1_000.0, 0.0);
        client.update_price("BTCUSDT", 100.0).await;
        client
            .submit(&OrderIntent::market("BTCUSDT", OrderSide::Buy, 2.0, 100.0))
            .await
            .unwrap();
        let stop = client
            .submit(&OrderIntent::stop_loss("BTCUSDT", OrderSide::Sell, 2.0, 95.0))
            .await
            .unwrap();
        assert_eq!(stop.price, 95.0);
        assert_eq!(client.resting_stops().await.len(), 1);

        assert!(client.update_price("BTCUSDT", 97.0).await.is_empty());
        let fired = client.update_price("BTCUSDT", 94.0).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].order_id, stop.order_id);
        assert!(client.resting_stops().await.is_empty());
        assert_eq!(client.balance("BTC").await.unwrap(), 0.0);
        assert_eq!(client.balance("USDT").await.unwrap(), 800.0 + 2.0 * 94.0);
    }

    #[tokio::test]
    async fn serves_most_recent_candles() {
        let client = PaperClient::new("USDT", 0.0, 0.0);
        client.seed_candles("BTCUSDT", bars(&[1.0, 2.0, 3.0, 4.0])).await;

        let last_two = client.historical_candles("BTCUSDT", "1h", 2).await.unwrap();
        assert_eq!(last_two.iter().map(|c| c.close).collect::<Vec<_>>(), vec![3.0, 4.0]);
        assert_eq!(client.current_price("BTCUSDT").await.unwrap(), 4.0);
        assert_eq!(client.historical_candles("BTCUSDT", "1h", 10).await.unwrap().len(), 4);

        assert!(matches!(
            client.historical_candles("ETHUSDT", "1h", 2).await,
            Err(Error::DataUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn rejects_non_positive_quantity() {
        let client = PaperClient::new("USDT", 1_000.0, 0.0);
        let err = client
            .submit(&OrderIntent::market("BTCUSDT", OrderSide::Buy, 0.0, 100.0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::OrderRejected { .. }));
    }
}
