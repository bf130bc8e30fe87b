//! Outbound clients built once from configuration and shared by the HTTP
//! handlers, the assistant tools and the CLI.

use anyhow::Result;

use crate::config::Config;
use crate::embedding::{self, EmbeddingProvider};
use crate::feeding::Feeder;
use crate::llm::Providers;
use crate::mfds::MfdsClient;
use crate::pubmed::PubMedClient;
use crate::scholar::ScholarClient;
use crate::usda::UsdaClient;

pub struct Clients {
    pub embedder: Box<dyn EmbeddingProvider>,
    pub pubmed: PubMedClient,
    pub scholar: ScholarClient,
    pub providers: Providers,
    /// `None` without a USDA key.
    pub usda: Option<UsdaClient>,
    /// `None` without an MFDS key.
    pub mfds: Option<MfdsClient>,
}

impl Clients {
    pub fn from_config(config: &Config) -> Result<Self> {
        let clients = Self {
            embedder: embedding::create_provider(config)?,
            pubmed: PubMedClient::new(&config.apis, &config.papers)?,
            scholar: ScholarClient::new(&config.apis, &config.papers)?,
            providers: Providers::from_config(&config.apis, &config.chat)?,
            usda: UsdaClient::from_config(&config.apis)?,
            mfds: MfdsClient::from_config(&config.apis)?,
        };
        tracing::info!(
            embedding = clients.embedder.model_name(),
            pubmed_key = clients.pubmed.has_key(),
            anthropic = clients.providers.anthropic.is_some(),
            openai = clients.providers.openai.is_some(),
            usda = clients.usda.is_some(),
            mfds = clients.mfds.is_some(),
            "external clients configured"
        );
        Ok(clients)
    }

    pub fn feeder<'a>(&'a self, pool: &'a sqlx::SqlitePool, config: &'a Config) -> Feeder<'a> {
        Feeder {
            pool,
            embedder: self.embedder.as_ref(),
            pubmed: &self.pubmed,
            scholar: &self.scholar,
            config: &config.papers,
        }
    }
}
