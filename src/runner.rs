use crate::api_client::{ApiClient, BusinessProfileApi, Location, Record};
use crate::config::{Config, Credentials};
use crate::data::{metric_rows_to_batch, records_to_batch};
use crate::error::Error;
use crate::metrics::MetricRow;
use crate::sink::{ParquetSink, WarehouseSink};
use chrono::{NaiveDate, Utc};
use datafusion::arrow::array::RecordBatch;
use log::{error, info, warn};

/// Destination tables of one run.
pub struct Tables {
    pub accounts: String,
    pub locations: String,
    pub metrics: String,
}

impl From<&Config> for Tables {
    fn from(config: &Config) -> Self {
        Tables {
            accounts: config.accounts_table.clone(),
            locations: config.locations_table.clone(),
            metrics: config.metrics_table.clone(),
        }
    }
}

/// Row counts written per table; a failed or skipped write counts as 0.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub accounts: usize,
    pub locations: usize,
    pub metrics: usize,
}

pub async fn extract_and_load_business_profile(
    config: Config,
    start: &NaiveDate,
    end: &NaiveDate,
) -> Result<LoadSummary, Error> {
    if start > end {
        return Err(Error::StartDateAfterEndDate {
            start_date: start.to_string(),
            end_date: end.to_string(),
        });
    }

    let credentials = Credentials::resolve(&config)?;
    let sink = ParquetSink::connect(&config.output_dir).await?;
    let api_client = ApiClient::new(&config, credentials);
    let tables = Tables::from(&config);

    run(&api_client, &sink, &tables, start, end).await
}

/// Accounts, then every account's locations, then every location's metrics.
///
/// Accounts are written as soon as they are fetched; locations and metrics are
/// written once every account has been walked. Fetch failures abort the run,
/// tables already written stay written.
pub async fn run<A, S>(
    api: &A,
    sink: &S,
    tables: &Tables,
    start: &NaiveDate,
    end: &NaiveDate,
) -> Result<LoadSummary, Error>
where
    A: BusinessProfileApi + ?Sized,
    S: WarehouseSink + ?Sized,
{
    let mut summary = LoadSummary::default();
    let token = String::new();

    let (accounts, mut token) = api.fetch_accounts(token).await?;
    info!("Fetched {} accounts", accounts.len());

    let account_ids: Vec<String> = accounts
        .iter()
        .filter_map(|account| {
            let id = account.id();
            if id.is_none() {
                warn!("Skipping account without a resource name");
            }
            id.map(str::to_string)
        })
        .collect();

    let account_records: Vec<Record> = accounts.into_iter().map(|a| a.into_record()).collect();
    summary.accounts = write_records(sink, &tables.accounts, &account_records).await;

    let mut locations: Vec<Location> = Vec::new();
    let mut metric_rows: Vec<MetricRow> = Vec::new();

    for account_id in &account_ids {
        let (account_locations, refreshed) = api.fetch_locations(token, account_id).await?;
        token = refreshed;
        info!(
            "Fetched {} locations for accounts/{}",
            account_locations.len(),
            account_id
        );

        for location in &account_locations {
            let Some(location_id) = location.id() else {
                warn!("Skipping location without a resource name in accounts/{}", account_id);
                continue;
            };

            let (rows, refreshed) = api
                .fetch_daily_metrics(token, location_id, start, end)
                .await?;
            token = refreshed;
            metric_rows.extend(rows);
        }

        locations.extend(account_locations);
    }

    summary.metrics = write_metrics(sink, &tables.metrics, &metric_rows).await;

    let location_records: Vec<Record> = locations.into_iter().map(|l| l.into_record()).collect();
    summary.locations = write_records(sink, &tables.locations, &location_records).await;

    Ok(summary)
}

async fn write_records<S: WarehouseSink + ?Sized>(sink: &S, table: &str, records: &[Record]) -> usize {
    if records.is_empty() {
        warn!("No rows to copy in {} table, skipping write.", table);
        return 0;
    }

    write_table(sink, table, records_to_batch(records, Utc::now())).await
}

async fn write_metrics<S: WarehouseSink + ?Sized>(sink: &S, table: &str, rows: &[MetricRow]) -> usize {
    if rows.is_empty() {
        warn!("No rows to copy in {} table, skipping write.", table);
        return 0;
    }

    write_table(sink, table, metric_rows_to_batch(rows, Utc::now())).await
}

// Sink failures are reported and counted as an empty write; the run carries on.
async fn write_table<S: WarehouseSink + ?Sized>(
    sink: &S,
    table: &str,
    batch: Result<RecordBatch, Error>,
) -> usize {
    let result = match batch {
        Ok(batch) => sink.overwrite_table(table, batch).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(rows) => {
            info!("{} rows copied in {} table.", rows, table);
            rows
        }
        Err(err) => {
            error!("Error occurred while copying rows to {} table: {}", table, err);
            0
        }
    }
}
