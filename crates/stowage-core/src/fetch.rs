use std::time::Duration;

use async_trait::async_trait;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const FETCH_RETRY_DELAYS_SECS: [u64; 3] = [0, 2, 5];

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("failed to build download client: {0}")]
    ClientBuild(reqwest::Error),
    #[error("failed to download {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download failed with HTTP {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("download of {url} timed out")]
    Timeout { url: String },
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    retry_delays_secs: Vec<u64>,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            retry_delays_secs: FETCH_RETRY_DELAYS_SECS.to_vec(),
        }
    }
}

impl HttpFetcher {
    #[must_use]
    pub fn with_retry_delays(retry_delays_secs: Vec<u64>) -> Self {
        Self { retry_delays_secs }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .connect_timeout(FETCH_CONNECT_TIMEOUT)
            .user_agent(format!("stowage/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::ClientBuild)?;

        let mut last_error = None;

        for delay_secs in &self.retry_delays_secs {
            if *delay_secs > 0 {
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }

            match download_once(&client, url).await {
                Ok(bytes) => return Ok(bytes),
                Err(error) => {
                    log::debug!("Download of {url} failed: {error}");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Timeout {
            url: url.to_string(),
        }))
    }
}

async fn download_once(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| classify(url, source))?;

    if !response.status().is_success() {
        return Err(FetchError::Status {
            url: url.to_string(),
            status: response.status(),
        });
    }

    response
        .bytes()
        .await
        .map(|bytes| bytes.to_vec())
        .map_err(|source| classify(url, source))
}

fn classify(url: &str, source: reqwest::Error) -> FetchError {
    if source.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FetchError, Fetcher, HttpFetcher};

    #[tokio::test]
    async fn empty_retry_schedule_reports_timeout_without_network() {
        let fetcher = HttpFetcher::with_retry_delays(Vec::new());

        let result = fetcher.fetch("https://example.invalid/key.gpg").await;

        assert!(matches!(result, Err(FetchError::Timeout { ref url }) if url.ends_with("key.gpg")));
    }

    #[test]
    fn status_error_mentions_code_and_url() {
        let error = FetchError::Status {
            url: "https://pkgs.example/key".to_string(),
            status: reqwest::StatusCode::NOT_FOUND,
        };

        let message = error.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("https://pkgs.example/key"));
    }
}
