use crate::error::Error;
use datafusion::arrow::array::RecordBatch;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::SessionContext;
use log::info;
use std::path::PathBuf;
use tokio::fs;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait WarehouseSink: Send + Sync + 'static {
    /// Replaces the whole contents of a table.
    ///
    /// # Arguments
    /// * `table` - The destination table name.
    /// * `batch` - The rows that make up the table after the write.
    ///
    /// # Returns
    /// A Result containing either the number of rows written or an Error.
    async fn overwrite_table(&self, table: &str, batch: RecordBatch) -> Result<usize, Error>;
}

/// A warehouse kept as a directory of Parquet files, one file per table.
pub struct ParquetSink {
    ctx: SessionContext,
    output_dir: PathBuf,
}

impl ParquetSink {
    /// Opens the warehouse directory, creating it if needed.
    pub async fn connect(output_dir: &str) -> Result<Self, Error> {
        let output_dir = PathBuf::from(output_dir);
        fs::create_dir_all(&output_dir).await?;
        info!("Warehouse opened at {}", output_dir.display());

        Ok(ParquetSink {
            ctx: SessionContext::new(),
            output_dir,
        })
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{}.parquet", table))
    }
}

#[async_trait::async_trait]
impl WarehouseSink for ParquetSink {
    async fn overwrite_table(&self, table: &str, batch: RecordBatch) -> Result<usize, Error> {
        let path = self.table_path(table);
        let num_rows = batch.num_rows();

        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }

        let df = self.ctx.read_batch(batch)?;
        df.write_parquet(
            &path.to_string_lossy(),
            DataFrameWriteOptions::new().with_single_file_output(true),
            None,
        )
        .await?;

        Ok(num_rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::{Int64Array, StringArray};
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use datafusion::prelude::ParquetReadOptions;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn batch(names: &[&str]) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("name", DataType::Utf8, false),
            Field::new("rank", DataType::Int64, false),
        ]));
        let ranks: Vec<i64> = (0..names.len() as i64).collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(names.to_vec())),
                Arc::new(Int64Array::from(ranks)),
            ],
        )
        .unwrap()
    }

    async fn count_rows(path: &Path) -> usize {
        let ctx = SessionContext::new();
        let df = ctx
            .read_parquet(path.to_str().unwrap(), ParquetReadOptions::default())
            .await
            .unwrap();
        df.count().await.unwrap()
    }

    #[tokio::test]
    async fn test_connect_creates_output_dir() {
        let temp_dir = TempDir::new().unwrap();
        let output_dir = temp_dir.path().join("warehouse");

        let sink = ParquetSink::connect(output_dir.to_str().unwrap()).await.unwrap();
        assert!(output_dir.is_dir());
        assert_eq!(
            sink.table_path("DB.SCHEMA.ACCOUNTS"),
            output_dir.join("DB.SCHEMA.ACCOUNTS.parquet")
        );
    }

    #[tokio::test]
    async fn test_overwrite_table_writes_parquet() {
        let temp_dir = TempDir::new().unwrap();
        let sink = ParquetSink::connect(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        let rows = sink
            .overwrite_table("ACCOUNTS", batch(&["accounts/1", "accounts/2"]))
            .await
            .unwrap();

        assert_eq!(rows, 2);
        let path = sink.table_path("ACCOUNTS");
        assert!(path.is_file());
        assert_eq!(count_rows(&path).await, 2);
    }

    #[tokio::test]
    async fn test_overwrite_table_replaces_contents() {
        let temp_dir = TempDir::new().unwrap();
        let sink = ParquetSink::connect(temp_dir.path().to_str().unwrap())
            .await
            .unwrap();

        sink.overwrite_table("METRICS", batch(&["a", "b", "c"]))
            .await
            .unwrap();
        let rows = sink.overwrite_table("METRICS", batch(&["d"])).await.unwrap();

        assert_eq!(rows, 1);
        assert_eq!(count_rows(&sink.table_path("METRICS")).await, 1);
    }
}
