use chrono::DateTime;
use chrono::TimeDelta;
use chrono::Utc;
use coco_taxonomy::Datum;
use coco_taxonomy::Item;
use coco_taxonomy::Record;
use coco_taxonomy::Type;
use reqwest::Method;
use reqwest::RequestBuilder;
use reqwest::Response;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::RemoteConfig;
use crate::error::RemoteError;
use crate::error::Result;

/// Receives the one-shot, user-visible failure messages of the remote
/// helpers.
pub trait Notifier: Send + Sync {
    fn toast(&self, message: &str);
}

/// A [`Notifier`] that only logs. Suits headless callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn toast(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// Window of a history fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// The `span` leading up to now.
    pub fn trailing(span: TimeDelta) -> Self {
        let to = Utc::now();
        Self { from: to - span, to }
    }

    /// The last `days` days; `None` when `days` does not fit a time span.
    pub fn trailing_days(days: i64) -> Option<Self> {
        TimeDelta::try_days(days).map(Self::trailing)
    }
}

impl Default for TimeRange {
    /// The trailing 14 days.
    fn default() -> Self {
        Self::trailing(TimeDelta::days(14))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// HTTP side of the taxonomy: history fetches, publishing and sample data.
///
/// The high-level helpers never return errors. A failure is reported once
/// through the [`Notifier`] and leaves local state as it was. The `fetch_*`
/// and `post_*` building blocks return the error instead.
pub struct Remote {
    config: RemoteConfig,
    client: reqwest::Client,
    notifier: Arc<dyn Notifier>,
}

impl Remote {
    pub fn new(config: RemoteConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            notifier,
        }
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        let builder = self.client.request(method, self.config.endpoint(segments)?);
        Ok(match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| status.to_string());
        Err(RemoteError::Status { status, message })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn report(&self, what: &str, err: &RemoteError) {
        tracing::error!("{what} failed: {err}");
        self.notifier.toast(&err.to_string());
    }

    /// `GET /data/{id}?from=&to=`, both bounds in epoch milliseconds.
    pub async fn fetch_data(&self, item_id: &str, range: TimeRange) -> Result<Vec<Datum>> {
        let response = self
            .request(Method::GET, &["data", item_id])?
            .query(&[
                ("from", range.from.timestamp_millis()),
                ("to", range.to.timestamp_millis()),
            ])
            .send()
            .await?;
        Self::decode(Self::check(response).await?).await
    }

    /// `POST /data/{id}` with the property values as a JSON object.
    pub async fn post_data(&self, item_id: &str, data: &Record) -> Result<()> {
        let response = self
            .request(Method::POST, &["data", item_id])?
            .json(data)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// `GET /fake/{type}`, with `parameters` sent as a JSON-encoded array
    /// of property names when given.
    pub async fn fetch_fake(&self, type_name: &str, parameters: Option<&[String]>) -> Result<Record> {
        let mut builder = self.request(Method::GET, &["fake", type_name])?;
        if let Some(parameters) = parameters {
            builder = builder.query(&[("parameters", serde_json::to_string(parameters)?)]);
        }
        let response = builder.send().await?;
        Self::decode(Self::check(response).await?).await
    }

    /// Replaces the item's history with the server's values for `range`
    /// (the trailing 14 days when `None`).
    pub async fn load_data(&self, item: &Item, range: Option<TimeRange>) {
        let range = range.unwrap_or_default();
        tracing::debug!(
            "loading data for `{item}` from {} to {}",
            range.from,
            range.to
        );
        match self.fetch_data(item.id(), range).await {
            Ok(history) => item.set_data(history),
            Err(e) => self.report(&format!("loading data for `{}`", item.id()), &e),
        }
    }

    /// Publishes one set of values for the item. The local item is not
    /// updated; the server echoes accepted values as `new_data`.
    pub async fn publish(&self, item: &Item, data: &Record) {
        tracing::debug!("publishing data for `{item}`");
        if let Err(e) = self.post_data(item.id(), data).await {
            self.report(&format!("publishing data for `{}`", item.id()), &e);
        }
    }

    /// Server-generated sample values for `tp`; an empty record on failure.
    pub async fn fake_data(&self, tp: &Type, parameters: Option<&[String]>) -> Record {
        match self.fetch_fake(tp.name(), parameters).await {
            Ok(values) => values,
            Err(e) => {
                self.report(&format!("fetching sample data for `{}`", tp.name()), &e);
                Record::new()
            }
        }
    }

    pub fn spawn_load_data(
        self: &Arc<Self>,
        item: Arc<Item>,
        range: Option<TimeRange>,
    ) -> JoinHandle<()> {
        let remote = Arc::clone(self);
        tokio::spawn(async move { remote.load_data(&item, range).await })
    }

    pub fn spawn_publish(self: &Arc<Self>, item: Arc<Item>, data: Record) -> JoinHandle<()> {
        let remote = Arc::clone(self);
        tokio::spawn(async move { remote.publish(&item, &data).await })
    }
}
