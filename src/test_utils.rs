//! Shared fixtures for the unit tests.

use crate::config::{Config, Credentials};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A config whose OAuth and API endpoints all live under `base_url`.
pub fn test_config(base_url: &str) -> Config {
    Config {
        token_url: format!("{}/token", base_url),
        token_info_url: format!("{}/tokeninfo", base_url),
        account_api_url: base_url.to_string(),
        business_info_api_url: base_url.to_string(),
        performance_api_url: base_url.to_string(),
        credentials_file: None,
        client_id: Some("test_client".to_string()),
        client_secret: Some("test_secret".to_string()),
        refresh_token: Some("test_refresh".to_string()),
        read_mask: "title,storeCode,name".to_string(),
        daily_metrics: vec!["WEBSITE_CLICKS".to_string(), "CALL_CLICKS".to_string()],
        output_dir: "./test_output".to_string(),
        accounts_table: "ACCOUNTS".to_string(),
        locations_table: "ACCOUNT_LOCATIONS".to_string(),
        metrics_table: "METRICS".to_string(),
        log_dir: None,
    }
}

pub fn test_credentials() -> Credentials {
    Credentials {
        client_id: "test_client".to_string(),
        client_secret: "test_secret".to_string(),
        refresh_token: "test_refresh".to_string(),
    }
}

/// Makes the introspection endpoint report `token` as valid for an hour.
pub async fn mount_fresh_token(server: &MockServer, token: &str) {
    Mock::given(method("GET"))
        .and(path("/tokeninfo"))
        .and(query_param("access_token", token))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "expires_in": 3599 })))
        .mount(server)
        .await;
}
