//! External nomenclature services.
//!
//! - [`RxNavReference`]: RxNav approximate-term search, then the ingredient
//!   (`tty=IN`) of the best candidate
//! - [`OpenFdaReference`]: openFDA drug labels, `openfda.generic_name`
//! - [`ChainedReference`]: first source with an answer wins

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::{DrugError, DrugResult};

/// Maps a free-text drug name to a generic ingredient name.
#[async_trait]
pub trait DrugReference: Send + Sync {
    /// `Ok(None)` when the service has no match.
    async fn generic_name(&self, term: &str) -> DrugResult<Option<String>>;
}

async fn get_json(client: &Client, url: &str, query: &[(&str, &str)]) -> DrugResult<Option<Value>> {
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !status.is_success() {
        return Err(DrugError::Upstream(status.as_u16()));
    }
    Ok(Some(response.json::<Value>().await?))
}

// =========================================================================
// RxNav
// =========================================================================

pub struct RxNavReference {
    client: Client,
    base_url: String,
}

impl RxNavReference {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn ingredient_for(&self, rxcui: &str) -> DrugResult<Option<String>> {
        let url = format!("{}/rxcui/{}/related.json", self.base_url, rxcui);
        let Some(body) = get_json(&self.client, &url, &[("tty", "IN")]).await? else {
            return Ok(None);
        };
        let name = body["relatedGroup"]["conceptGroup"]
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|group| group["conceptProperties"].as_array().into_iter().flatten())
            .find_map(|concept| concept["name"].as_str())
            .map(|s| s.to_lowercase());
        Ok(name)
    }
}

#[async_trait]
impl DrugReference for RxNavReference {
    async fn generic_name(&self, term: &str) -> DrugResult<Option<String>> {
        let url = format!("{}/approximateTerm.json", self.base_url);
        let Some(body) = get_json(&self.client, &url, &[("term", term), ("maxEntries", "1")]).await?
        else {
            return Ok(None);
        };

        let Some(candidate) = body["approximateGroup"]["candidate"]
            .as_array()
            .and_then(|c| c.first())
        else {
            debug!(term, "rxnav: no candidate");
            return Ok(None);
        };

        if let Some(rxcui) = candidate["rxcui"].as_str() {
            if let Some(ingredient) = self.ingredient_for(rxcui).await? {
                return Ok(Some(ingredient));
            }
        }
        Ok(candidate["name"]
            .as_str()
            .filter(|n| !n.trim().is_empty())
            .map(|n| n.trim().to_lowercase()))
    }
}

// =========================================================================
// openFDA
// =========================================================================

pub struct OpenFdaReference {
    client: Client,
    base_url: String,
}

impl OpenFdaReference {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl DrugReference for OpenFdaReference {
    async fn generic_name(&self, term: &str) -> DrugResult<Option<String>> {
        let term = term.replace('"', "");
        let search = format!(
            "openfda.brand_name:\"{term}\" OR openfda.generic_name:\"{term}\""
        );
        let url = format!("{}/drug/label.json", self.base_url);
        let Some(body) = get_json(&self.client, &url, &[("search", search.as_str()), ("limit", "1")]).await?
        else {
            return Ok(None);
        };
        Ok(body["results"][0]["openfda"]["generic_name"][0]
            .as_str()
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty()))
    }
}

// =========================================================================
// Chain
// =========================================================================

/// Tries each source in order. A source error is logged and skipped; the
/// last error is returned only if no source answered.
pub struct ChainedReference {
    sources: Vec<Arc<dyn DrugReference>>,
}

impl ChainedReference {
    pub fn new(sources: Vec<Arc<dyn DrugReference>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl DrugReference for ChainedReference {
    async fn generic_name(&self, term: &str) -> DrugResult<Option<String>> {
        let mut last_error = None;
        for source in &self.sources {
            match source.generic_name(term).await {
                Ok(Some(name)) => return Ok(Some(name)),
                Ok(None) => {}
                Err(e) => {
                    debug!(term, error = %e, "reference source failed");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
