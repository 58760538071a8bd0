//! Extraction of asset metrics from Messari metrics payloads.
//!
//! Payload shape (only the fields we read):
//! ```json
//! {"data": {"name": "Bitcoin", "symbol": "BTC", "market_data": {
//!     "price_usd": 1234.5,
//!     "percent_change_usd_last_1_hour": -0.3,
//!     "ohlcv_last_1_hour": {"volume": 98765.4}}}}
//! ```

use crate::error::{FeedError, FeedResult};
use serde_json::Value;
use sicc_core::AssetMetrics;

/// Extract the metrics record, failing on the first missing field.
pub fn parse_messari_metrics(raw: &Value) -> FeedResult<AssetMetrics> {
    let data = &raw["data"];
    let market = &data["market_data"];

    Ok(AssetMetrics {
        name: string_field(&data["name"], "data.name")?,
        symbol: string_field(&data["symbol"], "data.symbol")?,
        price_usd: number_field(&market["price_usd"], "data.market_data.price_usd")?,
        volume_last_1h: number_field(
            &market["ohlcv_last_1_hour"]["volume"],
            "data.market_data.ohlcv_last_1_hour.volume",
        )?,
        percent_change_last_1h: number_field(
            &market["percent_change_usd_last_1_hour"],
            "data.market_data.percent_change_usd_last_1_hour",
        )?,
    })
}

/// Render a payload straight to its alert block.
pub fn messari_block(raw: &Value) -> FeedResult<String> {
    parse_messari_metrics(raw).map(|metrics| metrics.render_block())
}

fn string_field(value: &Value, path: &'static str) -> FeedResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or(FeedError::MissingField(path))
}

fn number_field(value: &Value, path: &'static str) -> FeedResult<f64> {
    value.as_f64().ok_or(FeedError::MissingField(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "status": {"elapsed": 3},
            "data": {
                "id": "1e31218a",
                "name": "Bitcoin",
                "symbol": "BTC",
                "market_data": {
                    "price_usd": 1234.567,
                    "percent_change_usd_last_1_hour": -3.456,
                    "ohlcv_last_1_hour": {"open": 1230.0, "volume": 987654.4}
                }
            }
        })
    }

    #[test]
    fn test_parse_messari_metrics() {
        let metrics = parse_messari_metrics(&payload()).unwrap();
        assert_eq!(metrics.name, "Bitcoin");
        assert_eq!(metrics.symbol, "BTC");
        assert_eq!(metrics.price_usd, 1234.567);
        assert_eq!(metrics.volume_last_1h, 987654.4);
        assert_eq!(metrics.percent_change_last_1h, -3.456);
    }

    #[test]
    fn test_messari_block() {
        let block = messari_block(&payload()).unwrap();
        assert_eq!(
            block,
            "Bitcoin [BTC]\nCurrent Price: $1,234.57\nVolume(1h): 987,654\nPercent Change(1h): -3.46%\n\n"
        );
    }

    #[test]
    fn test_missing_volume_fails() {
        let mut raw = payload();
        raw["data"]["market_data"]["ohlcv_last_1_hour"] = Value::Null;
        let err = parse_messari_metrics(&raw).unwrap_err();
        assert!(matches!(
            err,
            FeedError::MissingField("data.market_data.ohlcv_last_1_hour.volume")
        ));
    }

    #[test]
    fn test_null_price_fails() {
        let mut raw = payload();
        raw["data"]["market_data"]["price_usd"] = Value::Null;
        assert!(matches!(
            parse_messari_metrics(&raw),
            Err(FeedError::MissingField("data.market_data.price_usd"))
        ));
    }

    #[test]
    fn test_missing_data_fails() {
        let raw = json!({"status": {"error_code": 404, "error_message": "Not Found"}});
        assert!(matches!(
            parse_messari_metrics(&raw),
            Err(FeedError::MissingField("data.name"))
        ));
    }
}
