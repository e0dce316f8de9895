mod api_client;
mod config;
mod data;
mod error;
mod metrics;
mod runner;
mod sink;
#[cfg(test)]
mod test_utils;
mod token;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use config::Config;
use error::Error;
use log::{error, info};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Fetch,
}

#[derive(Subcommand)]
enum Fetch {
    Fetch {
        #[arg(help = "Date should be in the form YYYY-MM-DD", value_parser = validate_date, env = "START_DATE")]
        start: NaiveDate,

        #[arg(help = "Date should be in the form YYYY-MM-DD", value_parser = validate_date, env = "END_DATE")]
        end: NaiveDate,
    },
}

fn validate_date(s: &str) -> Result<NaiveDate, String> {
    let error_message = "Invalid date, expected YYYY-MM-DD";

    let parts = s
        .split("-")
        .map(|part| part.parse::<u16>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| error_message)?;

    match parts.as_slice() {
        &[year, month, day] if month <= 12 && day <= 31 => {
            Ok(
                NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .ok_or(error_message)?,
            )
        }
        _ => Err(error_message.to_string()),
    }
}

/// Sets up `LEVEL : YYYY-MM-DD HH:MM:SS : message` logging, appending to a
/// per-day file under `log_dir` when one is given.
fn init_logging(log_dir: Option<&Path>) -> Result<(), Error> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} : {} : {}",
            record.level(),
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.args()
        )
    });

    if let Some(log_dir) = log_dir {
        fs::create_dir_all(log_dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_dir.join(format!("{}.log", Local::now().format("%Y-%m-%d"))))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    init_logging(args.config.log_dir.as_deref())?;

    match &args.command {
        Fetch::Fetch { start, end } => {
            match runner::extract_and_load_business_profile(args.config, start, end).await {
                Ok(summary) => info!(
                    "Run finished: {} accounts, {} locations, {} metric rows loaded",
                    summary.accounts, summary.locations, summary.metrics
                ),
                Err(err) => {
                    error!("Something unexpected occurred, aborting the run: {}", err);
                    std::process::exit(1);
                }
            }
        }
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_date() {
        assert_eq!(
            validate_date("2023-06-01"),
            Ok(NaiveDate::from_ymd_opt(2023, 6, 1).unwrap())
        );
    }

    #[test]
    fn test_validate_date_rejects_bad_input() {
        assert!(validate_date("2023-13-01").is_err());
        assert!(validate_date("2023-02-30").is_err());
        assert!(validate_date("2023/06/01").is_err());
        assert!(validate_date("2023-06").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "business-profile-connector",
            "--client-id",
            "id",
            "--daily-metrics",
            "CALL_CLICKS,WEBSITE_CLICKS",
            "--metrics-table",
            "DB.GBP.METRICS",
            "fetch",
            "2023-06-01",
            "2023-06-10",
        ])
        .unwrap();

        assert_eq!(args.config.daily_metrics, vec!["CALL_CLICKS", "WEBSITE_CLICKS"]);
        assert_eq!(args.config.metrics_table, "DB.GBP.METRICS");
        assert_eq!(args.config.read_mask, "title,storeCode,name");
        assert!(matches!(
            args.command,
            Fetch::Fetch { start, .. } if start == NaiveDate::from_ymd_opt(2023, 6, 1).unwrap()
        ));
    }
}
