//! HTTP boundary of the relay client. Everything above this trait deals in
//! JSON values, which lets tests script the relay without a server.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RelayConfig;
use crate::error::RelayError;

pub type Query = Vec<(&'static str, String)>;

#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn get(&self, path: &str, query: &Query) -> Result<Value, RelayError>;
    async fn post(&self, path: &str, body: &Value) -> Result<Value, RelayError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base().to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn read(res: reqwest::Response) -> Result<Value, RelayError> {
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(RelayError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl RelayTransport for HttpTransport {
    async fn get(&self, path: &str, query: &Query) -> Result<Value, RelayError> {
        let res = self.client.get(self.url(path)).query(query).send().await?;
        Self::read(res).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RelayError> {
        let res = self.client.post(self.url(path)).json(body).send().await?;
        Self::read(res).await
    }
}
