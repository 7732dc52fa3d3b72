//! Card database lookups
//!
//! Talks to the Pokémon TCG API (`GET /cards?q=...&pageSize=6`). Only two
//! query shapes are used: set code plus number, and a name prefix.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LookupSettings;

/// Lookup failures. An empty result set is not an error.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("card lookup request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("card lookup returned HTTP {status}")]
    Status { status: u16 },
    #[error("card lookup returned an unreadable response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Card set information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSet {
    #[serde(default)]
    pub name: Option<String>,
}

/// Card artwork URLs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardImages {
    #[serde(default)]
    pub small: Option<String>,
    #[serde(default)]
    pub large: Option<String>,
}

/// A card as returned by the lookup service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub rarity: Option<String>,
    #[serde(default)]
    pub set: CardSet,
    #[serde(default)]
    pub images: CardImages,
}

impl CardRecord {
    pub fn set_name(&self) -> Option<&str> {
        self.set.name.as_deref()
    }

    /// Preferred image: small, falling back to large
    pub fn image_url(&self) -> Option<&str> {
        self.images.small.as_deref().or(self.images.large.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct CardsResponse {
    #[serde(default)]
    data: Vec<CardRecord>,
}

/// Query for a set code and card number
pub fn code_query(set_code: &str, number: &str) -> String {
    format!("set.ptcgoCode:{} number:{}", set_code, number)
}

/// Prefix query for a card name
pub fn name_query(name: &str) -> String {
    format!("name:{}*", name)
}

/// Parse a `/cards` response body
pub fn parse_cards(body: &str, limit: usize) -> Result<Vec<CardRecord>, LookupError> {
    let response: CardsResponse = serde_json::from_str(body)?;
    let mut cards = response.data;
    cards.truncate(limit);
    Ok(cards)
}

/// The two searches the scanner needs
#[async_trait]
pub trait CardSearch: Send + Sync {
    async fn search_by_code(&self, set_code: &str, number: &str) -> Result<Vec<CardRecord>, LookupError>;

    async fn search_by_name(&self, name: &str) -> Result<Vec<CardRecord>, LookupError>;
}

/// Largest page the scanner asks for
pub const MAX_PAGE_SIZE: u32 = 6;

/// HTTP client for the card database
pub struct LookupClient {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    api_key: Option<String>,
}

impl LookupClient {
    pub fn new(settings: &LookupSettings) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(concat!("card-scanner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(LookupError::Client)?;

        let page_size = settings.page_size.clamp(1, MAX_PAGE_SIZE);
        if page_size != settings.page_size {
            warn!(
                "lookup.page_size {} out of range, using {}",
                settings.page_size, page_size
            );
        }

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            page_size,
            api_key: settings.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// Results requested per search, always within `1..=MAX_PAGE_SIZE`
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn cards_url(&self) -> String {
        format!("{}/cards", self.base_url)
    }

    /// Run a raw query against `/cards`
    pub async fn query(&self, query: &str) -> Result<Vec<CardRecord>, LookupError> {
        debug!("Card lookup q={:?} pageSize={}", query, self.page_size);

        let page_size = self.page_size.to_string();
        let mut request = self
            .client
            .get(self.cards_url())
            .query(&[("q", query), ("pageSize", page_size.as_str())]);

        if let Some(key) = &self.api_key {
            request = request.header("X-Api-Key", key);
        }

        let response = request.send().await.map_err(LookupError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(LookupError::Transport)?;
        let cards = parse_cards(&body, self.page_size as usize)?;

        info!("Card lookup {:?} returned {} result(s)", query, cards.len());
        Ok(cards)
    }
}

#[async_trait]
impl CardSearch for LookupClient {
    async fn search_by_code(&self, set_code: &str, number: &str) -> Result<Vec<CardRecord>, LookupError> {
        self.query(&code_query(set_code, number)).await
    }

    async fn search_by_name(&self, name: &str) -> Result<Vec<CardRecord>, LookupError> {
        self.query(&name_query(name)).await
    }
}
