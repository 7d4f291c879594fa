use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use crate::config::{parse_base_url, SignalConfig};
use crate::error::ExternalSignalError;
use crate::signals::NewsSource;

#[derive(Debug, Deserialize)]
struct EverythingResponse {
    status: String,
    #[serde(default)]
    articles: Vec<Article>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Article {
    title: Option<String>,
    description: Option<String>,
}

/// Keyword search against a NewsAPI-compatible `/v2/everything` endpoint.
#[derive(Debug, Clone)]
pub struct NewsApiClient {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
    page_size: usize,
}

impl NewsApiClient {
    pub fn new(config: &SignalConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build news HTTP client")?;
        let base_url = parse_base_url(&config.news_base_url).context("invalid news base URL")?;

        Ok(Self {
            client,
            base_url,
            api_key: config.news_api_key.clone(),
            page_size: config.news_page_size,
        })
    }
}

#[async_trait]
impl NewsSource for NewsApiClient {
    /// Returns one "title description" snippet per article that has a title.
    async fn search(&self, query: &str) -> Result<Vec<String>, ExternalSignalError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ExternalSignalError::MissingCredential);
        };

        let url = self
            .base_url
            .join("v2/everything")
            .map_err(|err| ExternalSignalError::Transport(err.to_string()))?;
        let page_size = self.page_size.to_string();

        debug!(query, "searching news");
        let response = self
            .client
            .get(url)
            .header("X-Api-Key", api_key)
            .query(&[("q", query), ("pageSize", page_size.as_str())])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed = serde_json::from_str::<EverythingResponse>(&body);

        if !status.is_success() {
            return Err(match parsed {
                Ok(EverythingResponse {
                    code: Some(code),
                    message,
                    ..
                }) => ExternalSignalError::Api {
                    code,
                    message: message.unwrap_or_default(),
                },
                _ => ExternalSignalError::Status {
                    code: status.as_u16(),
                    body,
                },
            });
        }

        let parsed = parsed.map_err(|err| ExternalSignalError::Malformed(err.to_string()))?;
        if parsed.status != "ok" {
            return Err(ExternalSignalError::Api {
                code: parsed.code.unwrap_or_else(|| parsed.status.clone()),
                message: parsed.message.unwrap_or_default(),
            });
        }

        Ok(parsed
            .articles
            .into_iter()
            .filter_map(|article| {
                let title = article.title.filter(|t| !t.trim().is_empty())?;
                Some(match article.description {
                    Some(description) if !description.trim().is_empty() => {
                        format!("{title} {description}")
                    }
                    _ => title,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String, api_key: Option<&str>) -> NewsApiClient {
        NewsApiClient::new(&SignalConfig {
            news_api_key: api_key.map(str::to_string),
            news_base_url: base_url,
            timeout: Duration::from_secs(5),
            ..SignalConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn search_joins_title_and_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .and(query_param("q", "Sudan War"))
            .and(query_param("pageSize", "15"))
            .and(header("X-Api-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "totalResults": 3,
                "articles": [
                    {"title": "Fighting spreads", "description": "Thousands flee the capital"},
                    {"title": null, "description": "dropped"},
                    {"title": "Aid convoy arrives", "description": null}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snippets = client(server.uri(), Some("test-key"))
            .search("Sudan War")
            .await
            .unwrap();
        assert_eq!(
            snippets,
            vec![
                "Fighting spreads Thousands flee the capital".to_string(),
                "Aid convoy arrives".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn base_url_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/newsapi/v2/everything"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "ok",
                "articles": [{"title": "Shelters fill up", "description": null}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snippets = client(format!("{}/newsapi", server.uri()), Some("test-key"))
            .search("floods")
            .await
            .unwrap();
        assert_eq!(snippets, vec!["Shelters fill up".to_string()]);
    }

    #[tokio::test]
    async fn missing_key_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(server.uri(), None).search("flood").await.unwrap_err();
        assert_eq!(err, ExternalSignalError::MissingCredential);
    }

    #[tokio::test]
    async fn auth_failure_surfaces_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "status": "error",
                "code": "apiKeyInvalid",
                "message": "Your API key is invalid"
            })))
            .mount(&server)
            .await;

        let err = client(server.uri(), Some("bad")).search("flood").await.unwrap_err();
        assert_eq!(
            err,
            ExternalSignalError::Api {
                code: "apiKeyInvalid".to_string(),
                message: "Your API key is invalid".to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/everything"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>busy</html>"))
            .mount(&server)
            .await;

        let err = client(server.uri(), Some("k")).search("flood").await.unwrap_err();
        assert!(matches!(err, ExternalSignalError::Malformed(_)));
    }

    #[tokio::test]
    async fn server_error_without_payload_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client(server.uri(), Some("k")).search("flood").await.unwrap_err();
        assert_eq!(
            err,
            ExternalSignalError::Status {
                code: 503,
                body: "unavailable".to_string()
            }
        );
    }
}
