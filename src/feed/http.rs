//! JSON-over-HTTP feed client

use crate::config::FeedConfig;
use crate::feed::{FeedError, FeedPage, FeedSource, Target, TargetKind};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;

/// Feed client for the tag and user listing endpoints
pub struct HttpFeed {
    client: Client,
    base: Url,
    login: Option<String>,
    password: Option<String>,
    rank_token: String,
}

impl HttpFeed {
    /// Builds a client against `config.base_url`
    pub fn new(client: Client, config: &FeedConfig) -> Result<Self, FeedError> {
        // Trailing slash so relative joins keep the API prefix
        let base = if config.base_url.ends_with('/') {
            Url::parse(&config.base_url)?
        } else {
            Url::parse(&format!("{}/", config.base_url))?
        };

        Ok(Self {
            client,
            base,
            login: config.login.clone(),
            password: config.password.clone(),
            rank_token: format!("{:032x}", rand::rng().random::<u128>()),
        })
    }

    /// Listing endpoint for a target
    pub fn endpoint(&self, target: &Target) -> Result<Url, FeedError> {
        let relative = match target.kind {
            TargetKind::Hashtag => format!("feed/tag/{}/", target.name),
            TargetKind::User => format!("feed/user/{}/username/", target.name),
        };
        Ok(self.base.join(&relative)?)
    }
}

#[async_trait]
impl FeedSource for HttpFeed {
    async fn fetch_page(
        &self,
        target: &Target,
        cursor: Option<&str>,
    ) -> Result<FeedPage, FeedError> {
        let mut request = self
            .client
            .get(self.endpoint(target)?)
            .query(&[("rank_token", self.rank_token.as_str())]);

        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            request = request.query(&[("max_id", cursor)]);
        }
        if let Some(login) = &self.login {
            request = request.basic_auth(login, self.password.as_deref());
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FeedError::Auth(format!("HTTP {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        Ok(FeedPage::from_json(&body))
    }
}
