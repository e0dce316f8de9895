use crate::config::{Config, Credentials};
use crate::error::Error;
use crate::metrics::{flatten_daily_metrics, MetricRow, MultiDailyMetricsPage};
use crate::token::TokenManager;
use chrono::{Datelike, NaiveDate};
use log::debug;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A flat record handed to the warehouse: column name to JSON value.
pub type Record = Map<String, Value>;

#[async_trait::async_trait]
pub trait BusinessProfileApi: Send + Sync + 'static {
    /// Fetches every account visible to the credentials.
    /// # Arguments
    /// * `token` - The current access token, possibly empty or expired.
    /// # Returns
    /// The accounts together with the token that is current after the call.
    async fn fetch_accounts(&self, token: String) -> Result<(Vec<Account>, String), Error>;

    /// Fetches every location of one account, each tagged with `accountId`.
    /// # Arguments
    /// * `token` - The current access token.
    /// * `account_id` - The bare account id, without the `accounts/` prefix.
    async fn fetch_locations(
        &self,
        token: String,
        account_id: &str,
    ) -> Result<(Vec<Location>, String), Error>;

    /// Fetches the configured daily metrics of one location over `start..=end`,
    /// flattened into one row per date.
    /// # Arguments
    /// * `token` - The current access token.
    /// * `location_id` - The bare location id, without the `locations/` prefix.
    /// * `start` - The first day of the range.
    /// * `end` - The last day of the range.
    async fn fetch_daily_metrics(
        &self,
        token: String,
        location_id: &str,
        start: &NaiveDate,
        end: &NaiveDate,
    ) -> Result<(Vec<MetricRow>, String), Error>;
}

/// A business account; vendor fields other than `name` are passed through untouched.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub fields: Record,
}

/// A location, back-referencing its owning account as `accounts/{id}`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(flatten)]
    pub fields: Record,
}

impl Account {
    /// The id part of `accounts/{id}`.
    pub fn id(&self) -> Option<&str> {
        resource_id(self.name.as_deref()?)
    }

    pub fn into_record(self) -> Record {
        let mut record = self.fields;
        if let Some(name) = self.name {
            record.insert("name".to_string(), Value::String(name));
        }
        record
    }
}

impl Location {
    /// The id part of `locations/{id}`.
    pub fn id(&self) -> Option<&str> {
        resource_id(self.name.as_deref()?)
    }

    pub fn into_record(self) -> Record {
        let mut record = self.fields;
        if let Some(name) = self.name {
            record.insert("name".to_string(), Value::String(name));
        }
        if let Some(account_id) = self.account_id {
            record.insert("accountId".to_string(), Value::String(account_id));
        }
        record
    }
}

fn resource_id(name: &str) -> Option<&str> {
    name.split('/').nth(1).filter(|id| !id.is_empty())
}

/// A single page of a cursor-paginated list response.
pub trait Page: DeserializeOwned {
    type Item;

    /// Splits the page into its records and the cursor of the next page, if any.
    fn into_parts(self) -> (Vec<Self::Item>, Option<String>);
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountsPage {
    #[serde(default)]
    accounts: Vec<Account>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationsPage {
    #[serde(default)]
    locations: Vec<Location>,
    next_page_token: Option<String>,
}

impl Page for AccountsPage {
    type Item = Account;

    fn into_parts(self) -> (Vec<Account>, Option<String>) {
        (self.accounts, self.next_page_token)
    }
}

impl Page for LocationsPage {
    type Item = Location;

    fn into_parts(self) -> (Vec<Location>, Option<String>) {
        (self.locations, self.next_page_token)
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    tokens: TokenManager,
    account_api_url: String,
    business_info_api_url: String,
    performance_api_url: String,
    read_mask: String,
    daily_metrics: Vec<String>,
}

impl ApiClient {
    pub fn new(config: &Config, credentials: Credentials) -> Self {
        let client = Client::new();

        ApiClient {
            tokens: TokenManager::new(client.clone(), config, credentials),
            client,
            account_api_url: config.account_api_url.to_string(),
            business_info_api_url: config.business_info_api_url.to_string(),
            performance_api_url: config.performance_api_url.to_string(),
            read_mask: config.read_mask.to_string(),
            daily_metrics: config.daily_metrics.clone(),
        }
    }

    /// Walks every page of `url`, checking the token's freshness before each request.
    ///
    /// Any transport, status or decode error aborts the walk.
    async fn fetch_all_pages<P: Page>(
        &self,
        mut token: String,
        url: Url,
    ) -> Result<(Vec<P::Item>, String), Error> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            token = self.tokens.ensure_fresh(token).await?;

            let mut page_url = url.clone();
            if let Some(cursor) = &cursor {
                page_url.query_pairs_mut().append_pair("pageToken", cursor);
            }

            let page = self
                .client
                .get(page_url)
                .bearer_auth(&token)
                .send()
                .await?
                .error_for_status()?
                .json::<P>()
                .await?;

            let (page_items, next_page_token) = page.into_parts();
            debug!("Fetched {} records from {}", page_items.len(), url);
            items.extend(page_items);

            match next_page_token {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok((items, token))
    }
}

fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, Error> {
    let mut url = Url::parse(base_url)?;
    url.path_segments_mut()
        .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[async_trait::async_trait]
impl BusinessProfileApi for ApiClient {
    async fn fetch_accounts(&self, token: String) -> Result<(Vec<Account>, String), Error> {
        let url = endpoint(&self.account_api_url, &["v1", "accounts"])?;

        self.fetch_all_pages::<AccountsPage>(token, url).await
    }

    async fn fetch_locations(
        &self,
        token: String,
        account_id: &str,
    ) -> Result<(Vec<Location>, String), Error> {
        let mut url = endpoint(
            &self.business_info_api_url,
            &["v1", "accounts", account_id, "locations"],
        )?;
        url.query_pairs_mut().append_pair("readMask", &self.read_mask);

        let (mut locations, token) = self.fetch_all_pages::<LocationsPage>(token, url).await?;

        let owner = format!("accounts/{}", account_id);
        for location in locations.iter_mut() {
            location.account_id = Some(owner.clone());
        }

        Ok((locations, token))
    }

    async fn fetch_daily_metrics(
        &self,
        token: String,
        location_id: &str,
        start: &NaiveDate,
        end: &NaiveDate,
    ) -> Result<(Vec<MetricRow>, String), Error> {
        let action = format!("{}:fetchMultiDailyMetricsTimeSeries", location_id);
        let mut url = endpoint(&self.performance_api_url, &["v1", "locations", &action])?;
        {
            let mut query = url.query_pairs_mut();
            for metric in &self.daily_metrics {
                query.append_pair("dailyMetrics", metric);
            }
            for (bound, date) in [("start_date", start), ("end_date", end)] {
                query
                    .append_pair(&format!("dailyRange.{}.year", bound), &date.year().to_string())
                    .append_pair(&format!("dailyRange.{}.month", bound), &date.month().to_string())
                    .append_pair(&format!("dailyRange.{}.day", bound), &date.day().to_string());
            }
        }

        let (blocks, token) = self
            .fetch_all_pages::<MultiDailyMetricsPage>(token, url)
            .await?;
        let rows = flatten_daily_metrics(blocks, &format!("locations/{}", location_id))?;

        Ok((rows, token))
    }
}
