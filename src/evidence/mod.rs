//! Evidence gathering for detected spikes.
//!
//! Each anomaly becomes one free-text question answered by a search-grounded
//! model. A failed lookup never aborts the batch: the anomaly carries an
//! error sentinel in place of the summary.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ModelsConfig;
use crate::detect::AnomalyRecord;
use crate::genai::{CollaboratorError, GeminiClient};

/// Anything that can answer a research question with a text summary.
#[async_trait::async_trait]
pub trait EvidenceLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<String, CollaboratorError>;
}

/// Search-grounded Gemini lookup.
pub struct GeminiSearch {
    client: GeminiClient,
}

impl GeminiSearch {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn from_config(cfg: &ModelsConfig) -> Result<Self, CollaboratorError> {
        Ok(Self::new(GeminiClient::from_env(&cfg.search_model, cfg)?))
    }
}

#[async_trait::async_trait]
impl EvidenceLookup for GeminiSearch {
    async fn lookup(&self, query: &str) -> Result<String, CollaboratorError> {
        info!(model = %self.client.model(), %query, "Executing search lookup");
        self.client.generate(query, true).await
    }
}

/// An anomaly together with what the lookup found about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchedAnomaly {
    #[serde(flatten)]
    pub anomaly: AnomalyRecord,
    pub research_summary: String,
}

/// The research question for one anomaly.
pub fn compose_query(anomaly: &AnomalyRecord) -> String {
    format!(
        "What caused a spike in interest for the song \"{}\" by \"{}\" in {} around {}? \
         Look for social media trends, TikTok challenges, celebrity endorsements, or local events.",
        anomaly.track_name, anomaly.artist_name, anomaly.country, anomaly.date
    )
}

/// Summary text recorded when a lookup fails.
pub fn error_sentinel(query: &str) -> String {
    format!("Error: Could not perform search for query '{}'.", query)
}

/// Look up every anomaly with at most `concurrency` requests in flight.
/// Output order matches input order.
pub async fn gather(
    lookup: &dyn EvidenceLookup,
    anomalies: Vec<AnomalyRecord>,
    concurrency: usize,
) -> Vec<ResearchedAnomaly> {
    stream::iter(anomalies)
        .map(|anomaly| async move {
            let query = compose_query(&anomaly);
            info!(track = %anomaly.track_name, country = %anomaly.country, "Investigating anomaly");
            let research_summary = match lookup.lookup(&query).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(track = %anomaly.track_name, country = %anomaly.country, error = %e, "Evidence lookup failed");
                    error_sentinel(&query)
                }
            };
            ResearchedAnomaly {
                anomaly,
                research_summary,
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
