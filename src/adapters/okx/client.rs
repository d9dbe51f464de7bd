//! OKX v5 REST gateway.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::credentials::OkxCredentials;
use super::signer;
use crate::domain::condition::Side;
use crate::domain::error::SigtraderError;
use crate::ports::config_port::ConfigPort;
use crate::ports::exchange_port::{
    AccountOverview, CandleQuery, CandleRow, CurrencyBalance, ExchangeGateway, OrderReceipt,
    OrderType,
};

pub const DEFAULT_BASE_URL: &str = "https://www.okx.com";
pub const DEFAULT_TIMEOUT_SECS: i64 = 10;

const CANDLES_PATH: &str = "/api/v5/market/candles";
const HISTORY_CANDLES_PATH: &str = "/api/v5/market/history-candles";
const BALANCE_PATH: &str = "/api/v5/account/balance";
const ORDER_PATH: &str = "/api/v5/trade/order";

/// `{code, msg, data}` wrapper around every response.
#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

pub struct OkxGateway {
    client: Client,
    base_url: String,
    credentials: Option<OkxCredentials>,
}

impl OkxGateway {
    /// Without credentials only the public market endpoints work.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Option<OkxCredentials>,
    ) -> Result<Self, SigtraderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SigtraderError::Network {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    /// Reads `[exchange] base_url, timeout_secs`.
    pub fn from_config(
        config: &dyn ConfigPort,
        credentials: Option<OkxCredentials>,
    ) -> Result<Self, SigtraderError> {
        let base_url = config
            .get_string("exchange", "base_url")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let timeout_secs = config
            .get_int("exchange", "timeout_secs", DEFAULT_TIMEOUT_SECS)
            .max(1) as u64;
        Self::new(&base_url, Duration::from_secs(timeout_secs), credentials)
    }

    fn require_credentials(&self) -> Result<&OkxCredentials, SigtraderError> {
        self.credentials
            .as_ref()
            .ok_or_else(|| SigtraderError::ConfigMissing {
                section: "env".into(),
                key: super::credentials::ENV_API_KEY.into(),
            })
    }

    /// Send one request and unwrap the envelope, returning `data`.
    ///
    /// Requests are signed whenever credentials are present.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: Option<&str>,
        body: Option<String>,
    ) -> Result<Value, SigtraderError> {
        let path_with_query = match query {
            Some(q) if !q.is_empty() => format!("{path}?{q}"),
            _ => path.to_string(),
        };
        let url = format!("{}{}", self.base_url, path_with_query);
        let body = body.unwrap_or_default();
        debug!(method = %method, url = %url, "okx request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");

        if let Some(creds) = &self.credentials {
            let headers =
                signer::signed_headers(creds, Utc::now(), method.as_str(), &path_with_query, &body)?;
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| SigtraderError::Network {
            reason: e.to_string(),
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| SigtraderError::Network {
            reason: e.to_string(),
        })?;

        let envelope: Envelope = match serde_json::from_str(&text) {
            Ok(env) => env,
            Err(e) if status.is_success() => {
                return Err(SigtraderError::Network {
                    reason: format!("malformed response from {path}: {e}"),
                });
            }
            Err(_) => {
                return Err(SigtraderError::Network {
                    reason: format!("HTTP {status} from {path}"),
                });
            }
        };

        if envelope.code != "0" {
            return Err(SigtraderError::Exchange {
                code: envelope.code,
                message: envelope.msg,
            });
        }
        if !status.is_success() {
            return Err(SigtraderError::Network {
                reason: format!("HTTP {status} from {path}"),
            });
        }
        Ok(envelope.data)
    }

    async fn candles(
        &self,
        path: &str,
        query: &CandleQuery<'_>,
    ) -> Result<Vec<CandleRow>, SigtraderError> {
        let limit = query.limit.to_string();
        let before = query.before.map(|v| v.to_string());
        let after = query.after.map(|v| v.to_string());
        let mut params: Vec<(&str, &str)> = vec![
            ("instId", query.inst_id),
            ("bar", query.timeframe),
            ("limit", limit.as_str()),
        ];
        if let Some(b) = &before {
            params.push(("before", b.as_str()));
        }
        if let Some(a) = &after {
            params.push(("after", a.as_str()));
        }
        let qs = serde_urlencoded::to_string(&params).map_err(|e| SigtraderError::InvalidInput {
            reason: format!("failed to encode candle query: {e}"),
        })?;

        let data = self.request(Method::GET, path, Some(&qs), None).await?;
        Ok(parse_candle_rows(&data))
    }
}

fn parse_num(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn parse_candle_row(cells: &[Value]) -> Option<CandleRow> {
    let ts_ms = match cells.first()? {
        Value::String(s) => s.parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    Some(CandleRow {
        ts_ms,
        open: parse_num(cells.get(1)?)?,
        high: parse_num(cells.get(2)?)?,
        low: parse_num(cells.get(3)?)?,
        close: parse_num(cells.get(4)?)?,
        volume: parse_num(cells.get(5)?)?,
    })
}

/// Rows arrive as `[ts, o, h, l, c, vol, ...]` string arrays. Malformed rows are skipped.
fn parse_candle_rows(data: &Value) -> Vec<CandleRow> {
    let Some(rows) = data.as_array() else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let parsed = row.as_array().and_then(|cells| parse_candle_row(cells));
            if parsed.is_none() {
                warn!(row = %row, "skipping malformed candle row");
            }
            parsed
        })
        .collect()
}

fn parse_account(data: &Value) -> AccountOverview {
    let Some(first) = data.as_array().and_then(|a| a.first()) else {
        return AccountOverview::default();
    };
    let details = first
        .get("details")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|d| CurrencyBalance {
                    ccy: d
                        .get("ccy")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    eq: d.get("eq").and_then(parse_num),
                    eq_usd: d.get("eqUsd").and_then(parse_num),
                })
                .collect()
        })
        .unwrap_or_default();
    AccountOverview {
        total_eq: first.get("totalEq").and_then(parse_num),
        details,
    }
}

/// Order results carry a per-order `sCode`; a non-zero value is a rejection.
fn parse_order(data: Value) -> Result<OrderReceipt, SigtraderError> {
    let first = data.as_array().and_then(|a| a.first());
    if let Some(item) = first
        && let Some(code) = item.get("sCode").and_then(Value::as_str)
        && code != "0"
    {
        return Err(SigtraderError::Exchange {
            code: code.to_string(),
            message: item
                .get("sMsg")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        });
    }
    let order_id = first
        .and_then(|item| item.get("ordId"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    Ok(OrderReceipt {
        order_id,
        raw: data,
    })
}

#[async_trait]
impl ExchangeGateway for OkxGateway {
    async fn get_candles(&self, query: &CandleQuery<'_>) -> Result<Vec<CandleRow>, SigtraderError> {
        self.candles(CANDLES_PATH, query).await
    }

    async fn get_history_candles(
        &self,
        query: &CandleQuery<'_>,
    ) -> Result<Vec<CandleRow>, SigtraderError> {
        self.candles(HISTORY_CANDLES_PATH, query).await
    }

    async fn get_account_overview(&self) -> Result<AccountOverview, SigtraderError> {
        self.require_credentials()?;
        let data = self.request(Method::GET, BALANCE_PATH, None, None).await?;
        Ok(parse_account(&data))
    }

    async fn place_order(
        &self,
        inst_id: &str,
        side: Side,
        size: f64,
        order_type: OrderType,
    ) -> Result<OrderReceipt, SigtraderError> {
        self.require_credentials()?;
        if !size.is_finite() || size <= 0.0 {
            return Err(SigtraderError::InvalidInput {
                reason: format!("order size must be positive, got {size}"),
            });
        }
        let body = serde_json::json!({
            "instId": inst_id,
            "side": side.as_str().to_ascii_lowercase(),
            "sz": size.to_string(),
            "ordType": order_type.as_str(),
        })
        .to_string();
        let data = self.request(Method::POST, ORDER_PATH, None, Some(body)).await?;
        parse_order(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candle_rows_parse_strings_and_skip_bad_rows() {
        let data = json!([
            ["1700003600000", "101", "102", "100", "101.5", "12.5", "0", "0", "1"],
            ["oops", "1", "1", "1", "1", "1"],
            ["1700000000000", "100", "101", "99", "100.5", "10"],
            ["1700007200000", "1"]
        ]);
        let rows = parse_candle_rows(&data);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ts_ms, 1_700_003_600_000);
        assert_eq!(rows[0].close, 101.5);
        assert_eq!(rows[1].volume, 10.0);
    }

    #[test]
    fn account_overview_parses_total_and_details() {
        let data = json!([{
            "totalEq": "1523.75",
            "details": [
                {"ccy": "USDT", "eq": "1000.5", "eqUsd": "1000.5"},
                {"ccy": "BTC", "eq": "0.01", "eqUsd": ""}
            ]
        }]);
        let overview = parse_account(&data);
        assert_eq!(overview.total_eq, Some(1523.75));
        assert_eq!(overview.details.len(), 2);
        assert_eq!(overview.details[1].ccy, "BTC");
        assert_eq!(overview.details[1].eq_usd, None);
        assert_eq!(parse_account(&json!([])), AccountOverview::default());
    }

    #[test]
    fn order_rejection_is_exchange_error() {
        let err = parse_order(json!([{"ordId": "", "sCode": "51008", "sMsg": "Insufficient balance"}]))
            .unwrap_err();
        assert!(matches!(err, SigtraderError::Exchange { code, .. } if code == "51008"));

        let receipt = parse_order(json!([{"ordId": "123", "sCode": "0", "sMsg": ""}])).unwrap();
        assert_eq!(receipt.order_id.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn private_endpoints_need_credentials() {
        let gateway = OkxGateway::new("http://127.0.0.1:9", Duration::from_secs(1), None).unwrap();
        let err = gateway.get_account_overview().await.unwrap_err();
        assert!(matches!(err, SigtraderError::ConfigMissing { .. }));
    }
}
