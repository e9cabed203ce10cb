use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use common::{
    AccountSource, Candle, Error, MarketDataSource, OrderConfirmation, OrderIntent, OrderKind,
    OrderSide, OrderSink, RejectionReason, Result,
};

const BASE_URL: &str = "https://api.binance.com";

/// Binance error codes with a dedicated rejection reason.
const CODE_INSUFFICIENT_BALANCE: i64 = -2010;
const CODE_INVALID_SYMBOL: i64 = -1121;

/// REST API client for Binance spot.
///
/// Market data endpoints are public, so a client built with `public()`
/// serves prices and candles for paper trading without credentials.
pub struct BinanceClient {
    api_key: String,
    secret: String,
    base_url: String,
    http: Client,
}

impl BinanceClient {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            secret: secret.into(),
            base_url: BASE_URL.to_string(),
            http,
        })
    }

    /// Client for the unsigned market data endpoints only.
    pub fn public() -> Result<Self> {
        Self::new("", "")
    }

    fn sign(&self, query: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| Error::Config(format!("Invalid Binance secret: {e}")))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn signed_query(&self, params: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::Config("Binance credentials are required for signed endpoints".into()));
        }
        let ts = Utc::now().timestamp_millis();
        let query = if params.is_empty() {
            format!("timestamp={ts}")
        } else {
            format!("{params}&timestamp={ts}")
        };
        let signature = self.sign(&query)?;
        Ok(format!("{query}&signature={signature}"))
    }

    async fn public_get(&self, path: &str, query: &str) -> Result<String> {
        let url = format!("{}{path}?{query}", self.base_url);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_get(&self, path: &str, params: &str) -> Result<String> {
        let url = format!("{}{path}?{}", self.base_url, self.signed_query(params)?);
        let resp = self
            .http
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }

    async fn signed_post(&self, path: &str, params: &str) -> Result<String> {
        let body = self.signed_query(params)?;
        let url = format!("{}{path}", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        read_body(resp).await
    }
}

/// Non-2xx responses come back as `Error::OrderRejected` carrying the
/// exchange's code and message; callers re-map them for their endpoint.
async fn read_body(resp: Response) -> Result<String> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| Error::Http(e.to_string()))?;
    if status.is_success() {
        return Ok(body);
    }
    let reason = match serde_json::from_str::<ApiError>(&body) {
        Ok(api) => rejection_reason(api.code, api.msg),
        Err(_) => RejectionReason::Exchange(format!("HTTP {status}: {body}")),
    };
    Err(Error::OrderRejected { reason })
}

fn rejection_reason(code: i64, msg: String) -> RejectionReason {
    match code {
        CODE_INSUFFICIENT_BALANCE if msg.to_lowercase().contains("insufficient balance") => {
            RejectionReason::InsufficientBalance
        }
        CODE_INVALID_SYMBOL => RejectionReason::UnknownInstrument,
        _ => RejectionReason::Exchange(format!("{code}: {msg}")),
    }
}

fn as_data_unavailable(e: Error) -> Error {
    match e {
        Error::OrderRejected { reason } => Error::DataUnavailable(reason.to_string()),
        other => other,
    }
}

/// Quantities and prices as Binance expects them: plain decimal, no
/// exponent, no trailing zeros.
fn format_decimal(value: f64) -> String {
    let fixed = format!("{value:.8}");
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

fn order_params(intent: &OrderIntent) -> String {
    let mut params = format!(
        "symbol={}&side={}&quantity={}",
        intent.instrument,
        intent.side,
        format_decimal(intent.quantity)
    );
    match intent.kind {
        OrderKind::Market => params.push_str("&type=MARKET"),
        OrderKind::StopLoss => {
            params.push_str("&type=STOP_LOSS&stopPrice=");
            params.push_str(&format_decimal(intent.reference_price));
        }
    }
    params.push_str("&newOrderRespType=FULL");
    params
}

fn parse_f64(value: &Value, field: &str) -> Result<f64> {
    let parsed = match value {
        Value::String(s) => s.parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    parsed.ok_or_else(|| Error::DataUnavailable(format!("kline field '{field}' is not a number: {value}")))
}

fn parse_millis(value: &Value, field: &str) -> Result<DateTime<Utc>> {
    value
        .as_i64()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| Error::DataUnavailable(format!("kline field '{field}' is not a timestamp: {value}")))
}

/// Parse a `/api/v3/klines` body into candles closed at or before `now`,
/// oldest first, keeping at most `count`.
fn parse_klines(body: &str, now: DateTime<Utc>, count: usize) -> Result<Vec<Candle>> {
    let rows: Vec<Vec<Value>> = serde_json::from_str(body)?;
    let mut candles = Vec::with_capacity(rows.len());
    for row in &rows {
        if row.len() < 7 {
            return Err(Error::DataUnavailable(format!("short kline row: {row:?}")));
        }
        // The last row is usually the bar still forming.
        if parse_millis(&row[6], "close_time")? > now {
            continue;
        }
        candles.push(Candle {
            timestamp: parse_millis(&row[0], "open_time")?,
            open: parse_f64(&row[1], "open")?,
            high: parse_f64(&row[2], "high")?,
            low: parse_f64(&row[3], "low")?,
            close: parse_f64(&row[4], "close")?,
            volume: parse_f64(&row[5], "volume")?,
        });
    }
    let start = candles.len().saturating_sub(count);
    Ok(candles.split_off(start))
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn current_price(&self, instrument: &str) -> Result<f64> {
        let body = self
            .public_get("/api/v3/ticker/price", &format!("symbol={instrument}"))
            .await
            .map_err(as_data_unavailable)?;
        let ticker: PriceTicker = serde_json::from_str(&body)?;
        ticker
            .price
            .parse::<f64>()
            .map_err(|e| Error::DataUnavailable(format!("bad price for {instrument}: {e}")))
    }

    async fn historical_candles(
        &self,
        instrument: &str,
        timeframe: &str,
        count: usize,
    ) -> Result<Vec<Candle>> {
        // One extra row covers the still-open bar that gets dropped.
        let limit = (count + 1).min(1000);
        let query = format!("symbol={instrument}&interval={timeframe}&limit={limit}");
        let body = self
            .public_get("/api/v3/klines", &query)
            .await
            .map_err(as_data_unavailable)?;
        let candles = parse_klines(&body, Utc::now(), count)?;
        debug!(instrument, timeframe, count = candles.len(), "Fetched klines");
        Ok(candles)
    }
}

#[async_trait]
impl AccountSource for BinanceClient {
    async fn balance(&self, asset: &str) -> Result<f64> {
        let body = self
            .signed_get("/api/v3/account", "")
            .await
            .map_err(|e| Error::AccountQueryFailed(e.to_string()))?;
        let account: AccountResponse = serde_json::from_str(&body)
            .map_err(|e| Error::AccountQueryFailed(e.to_string()))?;

        let free = account
            .balances
            .iter()
            .find(|b| b.asset == asset)
            .map(|b| b.free.parse::<f64>())
            .transpose()
            .map_err(|e| Error::AccountQueryFailed(format!("bad {asset} balance: {e}")))?;
        Ok(free.unwrap_or(0.0))
    }
}

#[async_trait]
impl OrderSink for BinanceClient {
    async fn submit(&self, intent: &OrderIntent) -> Result<OrderConfirmation> {
        let params = order_params(intent);
        debug!(instrument = %intent.instrument, side = %intent.side, kind = ?intent.kind, "Submitting order to Binance");
        let body = self.signed_post("/api/v3/order", &params).await?;

        let resp: OrderResponse = serde_json::from_str(&body).map_err(|e| Error::OrderRejected {
            reason: RejectionReason::Other(format!("unreadable order response: {e}")),
        })?;

        let quantity = match intent.kind {
            OrderKind::Market => resp.net_quantity(intent).unwrap_or(intent.quantity),
            OrderKind::StopLoss => intent.quantity,
        };
        Ok(OrderConfirmation {
            order_id: resp.order_id.to_string(),
            instrument: intent.instrument.clone(),
            side: intent.side,
            price: resp.average_fill_price().unwrap_or(intent.reference_price),
            quantity,
            timestamp: Utc::now(),
        })
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: i64,
    #[serde(default)]
    executed_qty: Option<String>,
    #[serde(default)]
    fills: Vec<FillDetail>,
}

impl OrderResponse {
    /// Quantity-weighted price across partial fills.
    fn average_fill_price(&self) -> Option<f64> {
        let (notional, qty) = self.fills.iter().fold((0.0, 0.0), |(n, q), f| {
            let price = f.price.parse::<f64>().unwrap_or(0.0);
            let fill_qty = f.qty.parse::<f64>().unwrap_or(0.0);
            (n + price * fill_qty, q + fill_qty)
        });
        (qty > 0.0).then(|| notional / qty)
    }

    /// Base quantity the order left in the account. Binance charges a buy's
    /// commission in the bought asset unless the account pays fees in BNB.
    fn net_quantity(&self, intent: &OrderIntent) -> Option<f64> {
        let gross = match self.executed_qty.as_deref() {
            Some(executed) => executed.parse::<f64>().ok()?,
            None if !self.fills.is_empty() => self
                .fills
                .iter()
                .map(|f| f.qty.parse::<f64>().unwrap_or(0.0))
                .sum(),
            None => return None,
        };
        if intent.side != OrderSide::Buy {
            return Some(gross);
        }
        let fees: f64 = self
            .fills
            .iter()
            .filter(|f| is_base_asset(&intent.instrument, &f.commission_asset))
            .map(|f| f.commission.parse::<f64>().unwrap_or(0.0))
            .sum();
        Some((gross - fees).max(0.0))
    }
}

/// Whether `asset` is the base of `symbol`, e.g. BTC in BTCUSDT.
fn is_base_asset(symbol: &str, asset: &str) -> bool {
    !asset.is_empty() && symbol.len() > asset.len() && symbol.starts_with(asset)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillDetail {
    price: String,
    qty: String,
    #[serde(default)]
    commission: String,
    #[serde(default)]
    commission_asset: String,
}

#[derive(Deserialize)]
struct AccountResponse {
    balances: Vec<Balance>,
}

#[derive(Deserialize)]
struct Balance {
    asset: String,
    free: String,
}

#[derive(Deserialize)]
struct PriceTicker {
    price: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_binance_reference() {
        let client = BinanceClient::new(
            "vmPUZE6mv9SD5VNHk4HlWFsOr6aKE2zvsw0MuIgwCIPy6utIco14y7Ju91duEh8A",
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
        )
        .unwrap();
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        assert_eq!(
            client.sign(query).unwrap(),
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn public_client_refuses_signed_calls() {
        let client = BinanceClient::public().unwrap();
        assert!(matches!(client.signed_query(""), Err(Error::Config(_))));
    }

    #[test]
    fn decimals_have_no_exponent_or_trailing_zeros() {
        assert_eq!(format_decimal(0.006), "0.006");
        assert_eq!(format_decimal(2.0), "2");
        assert_eq!(format_decimal(1e-9), "0");
        assert_eq!(format_decimal(95.25), "95.25");
    }

    #[test]
    fn market_and_stop_params() {
        let market = OrderIntent::market("BTCUSDT", OrderSide::Buy, 0.5, 100.0);
        assert_eq!(
            order_params(&market),
            "symbol=BTCUSDT&side=BUY&quantity=0.5&type=MARKET&newOrderRespType=FULL"
        );
        let stop = OrderIntent::stop_loss("BTCUSDT", OrderSide::Sell, 0.5, 95.0);
        assert_eq!(
            order_params(&stop),
            "symbol=BTCUSDT&side=SELL&quantity=0.5&type=STOP_LOSS&stopPrice=95&newOrderRespType=FULL"
        );
    }

    #[test]
    fn klines_drop_the_open_bar() {
        let body = r#"[
            [1704067200000,"100.0","101.0","99.0","100.5","10.0",1704070799999,"0",1,"0","0","0"],
            [1704070800000,"100.5","102.0","100.0","101.5","12.0",1704074399999,"0",1,"0","0","0"],
            [1704074400000,"101.5","103.0","101.0","102.5","3.0",1704077999999,"0",1,"0","0","0"]
        ]"#;
        let now = Utc.timestamp_millis_opt(1_704_075_000_000).unwrap();
        let candles = parse_klines(body, now, 20).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].close, 101.5);
        assert_eq!(candles[0].timestamp.timestamp_millis(), 1_704_067_200_000);

        let last_one = parse_klines(body, now, 1).unwrap();
        assert_eq!(last_one.len(), 1);
        assert_eq!(last_one[0].close, 101.5);
    }

    #[test]
    fn malformed_kline_is_data_unavailable() {
        let body = r#"[[1704067200000,"x","101.0","99.0","100.5","10.0",1704070799999]]"#;
        let now = Utc.timestamp_millis_opt(1_704_075_000_000).unwrap();
        assert!(matches!(parse_klines(body, now, 5), Err(Error::DataUnavailable(_))));
    }

    #[test]
    fn error_codes_map_to_rejections() {
        assert_eq!(
            rejection_reason(-2010, "Account has insufficient balance for requested action.".into()),
            RejectionReason::InsufficientBalance
        );
        assert_eq!(
            rejection_reason(-1121, "Invalid symbol.".into()),
            RejectionReason::UnknownInstrument
        );
        assert!(matches!(
            rejection_reason(-1013, "Filter failure: LOT_SIZE".into()),
            RejectionReason::Exchange(_)
        ));
    }

    #[test]
    fn average_fill_weights_by_quantity() {
        let resp: OrderResponse = serde_json::from_str(
            r#"{"orderId":28,"fills":[{"price":"100.0","qty":"1.0"},{"price":"110.0","qty":"3.0"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.average_fill_price(), Some(107.5));
        assert_eq!(resp.order_id, 28);
    }

    #[test]
    fn buy_quantity_is_net_of_base_commission() {
        let resp: OrderResponse = serde_json::from_str(
            r#"{"orderId":29,"executedQty":"0.50000000","fills":[
                {"price":"400.0","qty":"0.3","commission":"0.0003","commissionAsset":"BTC"},
                {"price":"401.0","qty":"0.2","commission":"0.0002","commissionAsset":"BTC"}
            ]}"#,
        )
        .unwrap();
        let buy = OrderIntent::market("BTCUSDT", OrderSide::Buy, 0.5, 400.0);
        let net = resp.net_quantity(&buy).unwrap();
        assert!((net - 0.4995).abs() < 1e-12, "got {net}");

        let sell = OrderIntent::market("BTCUSDT", OrderSide::Sell, 0.5, 400.0);
        assert_eq!(resp.net_quantity(&sell), Some(0.5));
    }

    #[test]
    fn fees_in_other_assets_leave_quantity_whole() {
        let resp: OrderResponse = serde_json::from_str(
            r#"{"orderId":30,"fills":[{"price":"400.0","qty":"0.5","commission":"0.01","commissionAsset":"BNB"}]}"#,
        )
        .unwrap();
        let buy = OrderIntent::market("BTCUSDT", OrderSide::Buy, 0.5, 400.0);
        assert_eq!(resp.net_quantity(&buy), Some(0.5));

        let bare: OrderResponse = serde_json::from_str(r#"{"orderId":31}"#).unwrap();
        assert_eq!(bare.net_quantity(&buy), None);
        assert!(is_base_asset("ETHBTC", "ETH"));
        assert!(!is_base_asset("ETHBTC", "BTC"));
    }
}
