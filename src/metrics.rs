use crate::api_client::Page;
use crate::error::Error;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;

/// One response page of `locations/{id}:fetchMultiDailyMetricsTimeSeries`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiDailyMetricsPage {
    #[serde(default)]
    multi_daily_metric_time_series: Option<Vec<MultiDailyMetricTimeSeries>>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiDailyMetricTimeSeries {
    #[serde(default)]
    daily_metric_time_series: Vec<DailyMetricTimeSeries>,
}

/// A metric block: one metric's time series for a single location.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DailyMetricTimeSeries {
    pub(crate) daily_metric: String,
    #[serde(default)]
    pub(crate) time_series: TimeSeries,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    #[serde(default)]
    pub(crate) dated_values: Vec<DatedValue>,
}

#[derive(Deserialize, Debug)]
pub struct DatedValue {
    pub(crate) date: ApiDate,
    #[serde(default)]
    pub(crate) value: Option<RawCount>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct ApiDate {
    #[serde(default)]
    pub(crate) year: i32,
    #[serde(default)]
    pub(crate) month: u32,
    #[serde(default)]
    pub(crate) day: u32,
}

/// Counts arrive as JSON strings (int64 encoding) but plain numbers are accepted too.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum RawCount {
    Number(i64),
    Text(String),
}

impl Page for MultiDailyMetricsPage {
    type Item = DailyMetricTimeSeries;

    fn into_parts(self) -> (Vec<Self::Item>, Option<String>) {
        let blocks = self
            .multi_daily_metric_time_series
            .unwrap_or_default()
            .into_iter()
            .flat_map(|series| series.daily_metric_time_series)
            .collect();

        (blocks, self.next_page_token)
    }
}

impl ApiDate {
    fn to_naive_date(self) -> Result<NaiveDate, Error> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or(Error::InvalidDate {
            date: format!("{:04}-{:02}-{:02}", self.year, self.month, self.day),
        })
    }
}

impl RawCount {
    fn to_count(&self) -> Result<i64, Error> {
        match self {
            RawCount::Number(n) => Ok(*n),
            RawCount::Text(text) => text.trim().parse().map_err(|_| Error::InvalidMetricValue {
                value: text.clone(),
            }),
        }
    }
}

/// One flattened row: the metric counts of a location on a single day.
///
/// Only metrics that reported a value for `date` have an entry in `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRow {
    pub date: NaiveDate,
    pub location_id: String,
    pub values: BTreeMap<String, i64>,
}

/// Flattens per-metric time series into one row per date, tagged with `location_id`.
///
/// Within each block, entries dated before that block's earliest date are dropped.
/// Rows come out ordered by date; no blocks means no rows.
pub fn flatten_daily_metrics(
    blocks: Vec<DailyMetricTimeSeries>,
    location_id: &str,
) -> Result<Vec<MetricRow>, Error> {
    let mut rows: BTreeMap<NaiveDate, MetricRow> = BTreeMap::new();

    for block in blocks {
        let dated_values = block
            .time_series
            .dated_values
            .iter()
            .map(|dv| Ok((dv.date.to_naive_date()?, dv.value.as_ref())))
            .collect::<Result<Vec<_>, Error>>()?;

        let Some(min_date) = dated_values.iter().map(|(date, _)| *date).min() else {
            continue;
        };

        for (date, value) in dated_values {
            if date < min_date {
                continue;
            }

            let count = value.map(RawCount::to_count).transpose()?.unwrap_or(0);

            rows.entry(date)
                .or_insert_with(|| MetricRow {
                    date,
                    location_id: location_id.to_string(),
                    values: BTreeMap::new(),
                })
                .values
                .insert(block.daily_metric.clone(), count);
        }
    }

    Ok(rows.into_values().collect())
}
