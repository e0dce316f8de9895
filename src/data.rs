use crate::api_client::Record;
use crate::error::Error;
use crate::metrics::MetricRow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use datafusion::arrow::array::{
    ArrayRef, Date64Builder, Int64Builder, RecordBatch, StringBuilder, StringDictionaryBuilder,
    TimestampMillisecondArray,
};
use datafusion::arrow::datatypes::{DataType, Field, Int32Type, Schema, TimeUnit};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

pub const LOAD_TIMESTAMP_COLUMN: &str = "LOADTIMESTAMP";
pub const DATE_COLUMN: &str = "Date";
pub const LOCATION_ID_COLUMN: &str = "locationId";

/// Converts pass-through API records into a [`RecordBatch`].
///
/// Every top-level key found in any record becomes a nullable `Utf8` column, in
/// sorted order. Strings are kept verbatim, other JSON values are stored as JSON
/// text and missing keys become nulls.
///
/// # Arguments
/// * `records` - The records to convert
/// * `loaded_at` - The load timestamp stamped on every row
///
/// # Returns
/// A Result containing either a [`RecordBatch`] or an [`Error`]
pub fn records_to_batch(records: &[Record], loaded_at: DateTime<Utc>) -> Result<RecordBatch, Error> {
    let columns: BTreeSet<&String> = records.iter().flat_map(|r| r.keys()).collect();

    let mut fields = Vec::with_capacity(columns.len() + 1);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len() + 1);

    for column in columns {
        let mut builder = StringBuilder::with_capacity(records.len(), records.len() * 16);
        for record in records {
            match record.get(column.as_str()) {
                None | Some(Value::Null) => builder.append_null(),
                Some(Value::String(s)) => builder.append_value(s),
                Some(other) => builder.append_value(other.to_string()),
            }
        }

        fields.push(Field::new(column.as_str(), DataType::Utf8, true));
        arrays.push(Arc::new(builder.finish()));
    }

    fields.push(load_timestamp_field());
    arrays.push(load_timestamp_array(loaded_at, records.len()));

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

/// Converts flattened metric rows into a [`RecordBatch`].
///
/// Columns are `Date`, one nullable `Int64` column per metric seen in any row,
/// `locationId` and the load timestamp. A metric a row did not report stays null.
///
/// # Arguments
/// * `rows` - The flattened metric rows
/// * `loaded_at` - The load timestamp stamped on every row
///
/// # Returns
/// A Result containing either a [`RecordBatch`] or an [`Error`]
pub fn metric_rows_to_batch(
    rows: &[MetricRow],
    loaded_at: DateTime<Utc>,
) -> Result<RecordBatch, Error> {
    let metrics: BTreeSet<&String> = rows.iter().flat_map(|r| r.values.keys()).collect();
    let num_rows = rows.len();

    let mut date_builder = Date64Builder::with_capacity(num_rows);
    let mut location_id_builder = StringDictionaryBuilder::<Int32Type>::new();
    for row in rows {
        date_builder.append_value(date_as_unix_ms(&row.date));
        location_id_builder.append(&row.location_id)?;
    }

    let mut fields = vec![Field::new(DATE_COLUMN, DataType::Date64, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(date_builder.finish())];

    for metric in metrics {
        let mut builder = Int64Builder::with_capacity(num_rows);
        for row in rows {
            builder.append_option(row.values.get(metric.as_str()).copied());
        }

        fields.push(Field::new(metric.as_str(), DataType::Int64, true));
        arrays.push(Arc::new(builder.finish()));
    }

    fields.push(Field::new(
        LOCATION_ID_COLUMN,
        DataType::Dictionary(Box::new(DataType::Int32), Box::new(DataType::Utf8)),
        false,
    ));
    arrays.push(Arc::new(location_id_builder.finish()));

    fields.push(load_timestamp_field());
    arrays.push(load_timestamp_array(loaded_at, num_rows));

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

fn load_timestamp_field() -> Field {
    Field::new(
        LOAD_TIMESTAMP_COLUMN,
        DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
        false,
    )
}

// Truncated to whole seconds.
fn load_timestamp_array(loaded_at: DateTime<Utc>, len: usize) -> ArrayRef {
    let millis = loaded_at.timestamp() * 1000;
    Arc::new(TimestampMillisecondArray::from(vec![millis; len]).with_timezone("UTC"))
}

fn date_as_unix_ms(date: &NaiveDate) -> i64 {
    let unix_duration = *date - NaiveDateTime::UNIX_EPOCH.date();

    unix_duration.num_milliseconds()
}
