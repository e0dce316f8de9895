use crate::error::Error;
use clap::Args as ClapArgs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_TOKEN_URL: &str = "https://accounts.google.com/o/oauth2/token";
const DEFAULT_TOKEN_INFO_URL: &str = "https://www.googleapis.com/oauth2/v1/tokeninfo";
const DEFAULT_ACCOUNT_API_URL: &str = "https://mybusinessaccountmanagement.googleapis.com";
const DEFAULT_BUSINESS_INFO_API_URL: &str = "https://mybusinessbusinessinformation.googleapis.com";
const DEFAULT_PERFORMANCE_API_URL: &str = "https://businessprofileperformance.googleapis.com";
const DEFAULT_READ_MASK: &str = "title,storeCode,name";
const DEFAULT_DAILY_METRICS: &str = "WEBSITE_CLICKS,CALL_CLICKS,BUSINESS_IMPRESSIONS_DESKTOP_MAPS";
const OUTPUT_DIR: &str = "./";

#[derive(ClapArgs)]
pub struct Config {
    #[arg(long, default_value = DEFAULT_TOKEN_URL, env = "TOKEN_URL")]
    pub(crate) token_url: String,

    #[arg(long, default_value = DEFAULT_TOKEN_INFO_URL, env = "TOKEN_INFO_URL")]
    pub(crate) token_info_url: String,

    #[arg(long, default_value = DEFAULT_ACCOUNT_API_URL, env = "ACCOUNT_API_URL")]
    pub(crate) account_api_url: String,

    #[arg(long, default_value = DEFAULT_BUSINESS_INFO_API_URL, env = "BUSINESS_INFO_API_URL")]
    pub(crate) business_info_api_url: String,

    #[arg(long, default_value = DEFAULT_PERFORMANCE_API_URL, env = "PERFORMANCE_API_URL")]
    pub(crate) performance_api_url: String,

    /// JSON file holding `client_id`, `client_secret` and `refresh_token`
    #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
    pub(crate) credentials_file: Option<PathBuf>,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub(crate) client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub(crate) client_secret: Option<String>,

    #[arg(long, env = "GOOGLE_REFRESH_TOKEN", hide_env_values = true)]
    pub(crate) refresh_token: Option<String>,

    #[arg(long, default_value = DEFAULT_READ_MASK, env = "READ_MASK")]
    pub(crate) read_mask: String,

    #[arg(long, default_value = DEFAULT_DAILY_METRICS, env = "DAILY_METRICS", value_delimiter = ',')]
    pub(crate) daily_metrics: Vec<String>,

    #[arg(long, default_value = OUTPUT_DIR, env = "OUTPUT_DIR")]
    pub(crate) output_dir: String,

    #[arg(long, default_value = "ACCOUNTS", env = "ACCOUNTS_TABLE")]
    pub(crate) accounts_table: String,

    #[arg(long, default_value = "ACCOUNT_LOCATIONS", env = "LOCATIONS_TABLE")]
    pub(crate) locations_table: String,

    #[arg(long, default_value = "METRICS", env = "METRICS_TABLE")]
    pub(crate) metrics_table: String,

    /// Append logs to `<LOG_DIR>/<YYYY-MM-DD>.log` instead of stderr
    #[arg(long, env = "LOG_DIR")]
    pub(crate) log_dir: Option<PathBuf>,
}

/// OAuth2 client credentials used to mint access tokens.
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub(crate) client_id: String,
    pub(crate) client_secret: String,
    pub(crate) refresh_token: String,
}

#[derive(Deserialize, Default)]
struct CredentialsFile {
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
}

impl Credentials {
    /// Builds the credentials from the optional credentials file, with explicit
    /// flags or environment values taking precedence over the file.
    pub fn resolve(config: &Config) -> Result<Self, Error> {
        let file = match &config.credentials_file {
            Some(path) => read_credentials_file(path)?,
            None => CredentialsFile::default(),
        };

        Ok(Credentials {
            client_id: pick("client_id", &config.client_id, file.client_id)?,
            client_secret: pick("client_secret", &config.client_secret, file.client_secret)?,
            refresh_token: pick("refresh_token", &config.refresh_token, file.refresh_token)?,
        })
    }
}

fn read_credentials_file(path: &Path) -> Result<CredentialsFile, Error> {
    let to_error = |message: String| Error::CredentialsFile {
        path: path.to_path_buf(),
        message,
    };

    let raw = fs::read_to_string(path).map_err(|e| to_error(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| to_error(e.to_string()))
}

fn pick(
    field: &'static str,
    explicit: &Option<String>,
    from_file: Option<String>,
) -> Result<String, Error> {
    explicit
        .clone()
        .or(from_file)
        .filter(|value| !value.is_empty())
        .ok_or(Error::MissingCredential { field })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_config;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_from_explicit_values() {
        let config = test_config("http://localhost");
        let credentials = Credentials::resolve(&config).unwrap();
        assert_eq!(credentials.client_id, "test_client");
        assert_eq!(credentials.client_secret, "test_secret");
        assert_eq!(credentials.refresh_token, "test_refresh");
    }

    #[test]
    fn test_resolve_from_file_with_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("google-business-creds.json");
        fs::write(
            &path,
            r#"{"client_id": "file_client", "client_secret": "file_secret", "refresh_token": "file_refresh"}"#,
        )
        .unwrap();

        let mut config = test_config("http://localhost");
        config.credentials_file = Some(path);
        config.client_id = None;
        config.client_secret = None;
        config.refresh_token = Some("flag_refresh".to_string());

        let credentials = Credentials::resolve(&config).unwrap();
        assert_eq!(credentials.client_id, "file_client");
        assert_eq!(credentials.client_secret, "file_secret");
        assert_eq!(credentials.refresh_token, "flag_refresh");
    }

    #[test]
    fn test_resolve_missing_field() {
        let mut config = test_config("http://localhost");
        config.client_secret = None;

        let result = Credentials::resolve(&config);
        assert!(matches!(
            result.unwrap_err(),
            Error::MissingCredential { field } if field == "client_secret"
        ));
    }

    #[test]
    fn test_resolve_unreadable_file() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config("http://localhost");
        config.credentials_file = Some(temp_dir.path().join("missing.json"));

        let result = Credentials::resolve(&config);
        assert!(matches!(result.unwrap_err(), Error::CredentialsFile { .. }));
    }
}
