//! Alert dispatch: fetch every ticker, join in order, send one message.

use crate::config::AlertSettings;
use crate::conversation::ConversationApi;
use crate::error::DispatchError;
use chrono::{DateTime, Local, TimeZone};
use futures_util::future::{join_all, try_join_all};
use sicc_core::Ticker;
use sicc_feeds::{FeedError, MarketDataSource};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How the dispatcher treats failed ticker fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchPolicy {
    /// Any failure aborts the dispatch; nothing is sent.
    #[default]
    AbortOnFirstFailure,
    /// Send whatever succeeded and report the failed tickers.
    CollectAll,
}

/// One run's message: ordered blocks plus the signed timestamp line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub blocks: Vec<String>,
    pub timestamp_line: String,
}

impl AlertMessage {
    /// Build a message stamped with `now`.
    pub fn new<Tz: TimeZone>(blocks: Vec<String>, signature: &str, now: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self {
            blocks,
            timestamp_line: format!("{} -- {}", signature, format_timestamp(now)),
        }
    }

    /// Message text as delivered.
    pub fn body(&self) -> String {
        let mut body = String::from("~\n");
        for block in &self.blocks {
            body.push_str(block);
        }
        body.push_str(&self.timestamp_line);
        body
    }
}

/// US-style local date and time, e.g. `3/14/2021 9:05:07 AM`.
pub fn format_timestamp<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    now.format("%-m/%-d/%Y %-I:%M:%S %p").to_string()
}

/// Result of one dispatch run.
#[derive(Debug)]
pub struct DispatchReport {
    /// SID of the sent message; `None` on a dry run
    pub message_sid: Option<String>,
    /// Delivered (or, on a dry run, rendered) message text
    pub body: String,
    /// Tickers included in the message, in list order
    pub included: Vec<Ticker>,
    /// Tickers left out under [`FetchPolicy::CollectAll`]
    pub failed: Vec<(Ticker, FeedError)>,
}

/// Fetches market data for all tickers and delivers a single digest.
pub struct AlertDispatcher {
    source: Arc<dyn MarketDataSource>,
    api: Arc<dyn ConversationApi>,
    settings: AlertSettings,
    tickers: Vec<Ticker>,
    policy: FetchPolicy,
    dry_run: bool,
}

impl AlertDispatcher {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        api: Arc<dyn ConversationApi>,
        settings: AlertSettings,
        tickers: Vec<Ticker>,
    ) -> Self {
        Self {
            source,
            api,
            settings,
            tickers,
            policy: FetchPolicy::default(),
            dry_run: false,
        }
    }

    pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Render and log the message without sending it.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Fetch and transform every ticker concurrently, keeping list order.
    async fn collect_blocks(
        &self,
    ) -> Result<(Vec<(Ticker, String)>, Vec<(Ticker, FeedError)>), DispatchError> {
        let fetches = self.tickers.iter().map(|ticker| async move {
            match self.source.fetch_block(ticker).await {
                Ok(block) => Ok((ticker.clone(), block)),
                Err(e) => Err((ticker.clone(), e)),
            }
        });

        match self.policy {
            FetchPolicy::AbortOnFirstFailure => {
                let blocks = try_join_all(fetches)
                    .await
                    .map_err(|(ticker, source)| DispatchError::Fetch {
                        ticker: ticker.to_string(),
                        source,
                    })?;
                Ok((blocks, Vec::new()))
            }
            FetchPolicy::CollectAll => {
                let mut blocks = Vec::new();
                let mut failed = Vec::new();
                for result in join_all(fetches).await {
                    match result {
                        Ok(entry) => blocks.push(entry),
                        Err((ticker, e)) => {
                            warn!(ticker = %ticker, error = %e, "Leaving ticker out of alert");
                            failed.push((ticker, e));
                        }
                    }
                }
                if blocks.is_empty() {
                    return Err(DispatchError::AllFetchesFailed(
                        failed.iter().map(|(t, _)| t.to_string()).collect(),
                    ));
                }
                Ok((blocks, failed))
            }
        }
    }

    /// Run one dispatch against a conversation.
    pub async fn dispatch(&self, conversation_sid: &str) -> Result<DispatchReport, DispatchError> {
        if self.tickers.is_empty() {
            return Err(DispatchError::NoTickers);
        }

        info!(
            tickers = self.tickers.len(),
            source = self.source.name(),
            policy = ?self.policy,
            "Fetching market data"
        );

        let (entries, failed) = self.collect_blocks().await?;
        let (included, blocks): (Vec<Ticker>, Vec<String>) = entries.into_iter().unzip();

        let message = AlertMessage::new(blocks, &self.settings.signature, &Local::now());
        let body = message.body();
        debug!(length = body.len(), "Built alert message");

        if self.dry_run {
            info!("Dry run, alert not sent:\n{}", body);
            return Ok(DispatchReport {
                message_sid: None,
                body,
                included,
                failed,
            });
        }

        let sent = self
            .api
            .send_message(conversation_sid, &self.settings.author, &body)
            .await?;
        info!(
            message = %sent.sid,
            conversation = %conversation_sid,
            "Successfully sent crypto alert"
        );

        Ok(DispatchReport {
            message_sid: Some(sent.sid),
            body,
            included,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{MockCall, MockConversationApi};
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;
    use sicc_feeds::MockMarketSource;
    use std::time::Duration;

    const CONV: &str = "CH00000000000000000000000000000001";

    fn source() -> MockMarketSource {
        MockMarketSource::new()
            .with_asset("btc", "Bitcoin", "BTC", 1234.567, 987654.4, -3.456)
            .with_asset("eth", "Ethereum", "ETH", 2000.0, 1500.6, 0.5)
            .with_asset("ada", "Cardano", "ADA", 0.456, 12345678.0, 12.0)
    }

    fn tickers(list: &str) -> Vec<Ticker> {
        Ticker::parse_list(list)
    }

    fn dispatcher(
        source: MockMarketSource,
        api: Arc<MockConversationApi>,
        list: &str,
    ) -> AlertDispatcher {
        AlertDispatcher::new(Arc::new(source), api, AlertSettings::default(), tickers(list))
    }

    fn is_send(call: &MockCall) -> bool {
        matches!(call, MockCall::SendMessage { .. })
    }

    #[test]
    fn test_format_timestamp() {
        let now = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2021, 3, 14, 9, 5, 7)
            .unwrap();
        assert_eq!(format_timestamp(&now), "3/14/2021 9:05:07 AM");

        let evening = Utc.with_ymd_and_hms(2024, 11, 2, 21, 30, 0).unwrap();
        assert_eq!(format_timestamp(&evening), "11/2/2024 9:30:00 PM");
    }

    #[test]
    fn test_alert_message_body() {
        let now = Utc.with_ymd_and_hms(2021, 3, 14, 0, 15, 0).unwrap();
        let message = AlertMessage::new(
            vec!["A [A]\n...\n\n".to_string(), "B [B]\n...\n\n".to_string()],
            "From Sicc Crypto Bot",
            &now,
        );
        assert_eq!(
            message.body(),
            "~\nA [A]\n...\n\nB [B]\n...\n\nFrom Sicc Crypto Bot -- 3/14/2021 12:15:00 AM"
        );
    }

    #[tokio::test]
    async fn test_dispatch_sends_one_ordered_message() {
        let api = Arc::new(MockConversationApi::new());
        // Slow first ticker: completion order differs from list order
        let source = source().with_delay("btc", Duration::from_millis(30));
        let report = dispatcher(source, api.clone(), "btc,eth,ada")
            .dispatch(CONV)
            .await
            .unwrap();

        assert_eq!(api.count_calls(is_send), 1);
        let sent = api.sent_messages(CONV);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].author.as_deref(), Some("Sicc Crypto Bot"));

        let body = sent[0].body.clone().unwrap();
        assert_eq!(body, report.body);
        assert!(body.starts_with("~\nBitcoin [BTC]\n"));

        let btc = body.find("Bitcoin [BTC]").unwrap();
        let eth = body.find("Ethereum [ETH]").unwrap();
        let ada = body.find("Cardano [ADA]").unwrap();
        assert!(btc < eth && eth < ada);

        assert!(body.contains("Current Price: $1,234.57\n"));
        assert!(body.contains("Volume(1h): 987,654\n"));
        assert!(body.contains("Percent Change(1h): -3.46%\n"));
        assert!(body.contains("Current Price: $0.46\n"));

        let stamp_lines: Vec<&str> = body
            .lines()
            .filter(|l| l.starts_with("From Sicc Crypto Bot -- "))
            .collect();
        assert_eq!(stamp_lines.len(), 1);
        assert!(body.lines().last().unwrap().starts_with("From Sicc Crypto Bot -- "));

        assert_eq!(report.included, tickers("btc,eth,ada"));
        assert!(report.failed.is_empty());
        assert!(report.message_sid.unwrap().starts_with("IM"));
    }

    #[tokio::test]
    async fn test_dispatch_aborts_on_failed_fetch() {
        let api = Arc::new(MockConversationApi::new());
        let result = dispatcher(source(), api.clone(), "btc,doge,eth")
            .dispatch(CONV)
            .await;

        match result {
            Err(DispatchError::Fetch { ticker, source }) => {
                assert_eq!(ticker, "doge");
                assert!(matches!(source, FeedError::Status { status: 404, .. }));
            }
            other => panic!("expected fetch error, got {:?}", other),
        }
        assert_eq!(api.count_calls(is_send), 0);
    }

    #[tokio::test]
    async fn test_dispatch_aborts_on_malformed_payload() {
        let api = Arc::new(MockConversationApi::new());
        let source = source().with_payload("eth", serde_json::json!({"data": {}}));
        let result = dispatcher(source, api.clone(), "btc,eth").dispatch(CONV).await;

        assert!(matches!(
            result,
            Err(DispatchError::Fetch { source: FeedError::MissingField(_), .. })
        ));
        assert_eq!(api.count_calls(is_send), 0);
    }

    #[tokio::test]
    async fn test_dispatch_collect_all_sends_partial() {
        let api = Arc::new(MockConversationApi::new());
        let report = dispatcher(source(), api.clone(), "btc,doge,eth")
            .with_policy(FetchPolicy::CollectAll)
            .dispatch(CONV)
            .await
            .unwrap();

        assert_eq!(api.count_calls(is_send), 1);
        assert_eq!(report.included, tickers("btc,eth"));
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.as_str(), "doge");
        assert!(report.body.contains("Bitcoin [BTC]"));
        assert!(report.body.contains("Ethereum [ETH]"));
    }

    #[tokio::test]
    async fn test_dispatch_collect_all_every_fetch_fails() {
        let api = Arc::new(MockConversationApi::new());
        let result = dispatcher(MockMarketSource::new(), api.clone(), "btc,eth")
            .with_policy(FetchPolicy::CollectAll)
            .dispatch(CONV)
            .await;

        match result {
            Err(DispatchError::AllFetchesFailed(failed)) => {
                assert_eq!(failed, vec!["btc".to_string(), "eth".to_string()]);
            }
            other => panic!("expected all-failed error, got {:?}", other),
        }
        assert_eq!(api.count_calls(is_send), 0);
    }

    #[tokio::test]
    async fn test_dispatch_dry_run_sends_nothing() {
        let api = Arc::new(MockConversationApi::new());
        let report = dispatcher(source(), api.clone(), "btc")
            .with_dry_run(true)
            .dispatch(CONV)
            .await
            .unwrap();

        assert!(report.message_sid.is_none());
        assert!(report.body.contains("Bitcoin [BTC]"));
        assert_eq!(api.count_calls(is_send), 0);
    }

    #[tokio::test]
    async fn test_dispatch_delivery_failure() {
        let api = Arc::new(MockConversationApi::new().failing_send());
        let result = dispatcher(source(), api.clone(), "btc").dispatch(CONV).await;

        assert!(matches!(result, Err(DispatchError::Delivery(_))));
        assert_eq!(api.count_calls(is_send), 1);
    }

    #[tokio::test]
    async fn test_dispatch_no_tickers() {
        let api = Arc::new(MockConversationApi::new());
        let result = dispatcher(source(), api.clone(), "").dispatch(CONV).await;
        assert!(matches!(result, Err(DispatchError::NoTickers)));
        assert!(api.calls().is_empty());
    }
}
