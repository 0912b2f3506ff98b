//! Predicate (edge) normalization client.
//!
//! Unlike node normalization, a bad response here never fails the build: a
//! missing key, a 404, or any other unexpected status all fall back to the
//! configured default predicate (spec §7).

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::model::DEFAULT_PREDICATE;

#[derive(Debug, Deserialize)]
struct PredicateEntry {
    identifier: String,
}

/// Batched, memoizing client for `<base>/resolve_predicate`.
pub struct EdgeNormalizer {
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
    default_predicate: String,
    cache: BTreeMap<String, String>,
}

impl EdgeNormalizer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, batch_size: usize) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            batch_size,
            default_predicate: DEFAULT_PREDICATE.to_string(),
            cache: BTreeMap::new(),
        }
    }

    /// Resolve `default_predicate` against the `/versions` endpoint at
    /// construction time: the second-to-last entry is "current stable".
    /// Falls back to the fixed constant on any failure.
    pub async fn bootstrap_default_predicate(&mut self) {
        let versions_url = format!("{}/versions", self.base_url.trim_end_matches("/resolve_predicate"));
        match self.client.get(&versions_url).send().await {
            Ok(response) if response.status().is_success() => {
                if let Ok(versions) = response.json::<Vec<String>>().await {
                    if versions.len() >= 2 {
                        self.default_predicate = versions[versions.len() - 2].clone();
                    }
                }
            }
            _ => {
                tracing::warn!("could not resolve current stable predicate version, using default");
            }
        }
    }

    pub async fn normalize_edges(&mut self, predicates: &[String]) -> BTreeMap<String, String> {
        let to_fetch: std::collections::BTreeSet<String> =
            predicates.iter().filter(|p| !self.cache.contains_key(*p)).cloned().collect();
        let batches: Vec<Vec<String>> =
            to_fetch.into_iter().collect::<Vec<_>>().chunks(self.batch_size).map(|c| c.to_vec()).collect();

        for batch in batches {
            let query: Vec<(&str, &str)> = batch.iter().map(|p| ("predicate", p.as_str())).collect();
            let response = self.client.get(&self.base_url).query(&query).send().await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let body: BTreeMap<String, Option<PredicateEntry>> =
                        response.json().await.unwrap_or_default();
                    for predicate in &batch {
                        let resolved = body
                            .get(predicate)
                            .and_then(|entry| entry.as_ref())
                            .map(|entry| entry.identifier.clone())
                            .unwrap_or_else(|| self.default_predicate.clone());
                        self.cache.insert(predicate.clone(), resolved);
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        "edge normalization returned HTTP {} for a batch of {} predicates, using default",
                        response.status(),
                        batch.len()
                    );
                    for predicate in &batch {
                        self.cache.insert(predicate.clone(), self.default_predicate.clone());
                    }
                }
                Err(e) => {
                    tracing::warn!("edge normalization transport error: {}, using default", e);
                    for predicate in &batch {
                        self.cache.insert(predicate.clone(), self.default_predicate.clone());
                    }
                }
            }
        }

        predicates
            .iter()
            .map(|p| (p.clone(), self.cache.get(p).cloned().unwrap_or_else(|| self.default_predicate.clone())))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn resolves_known_predicate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve_predicate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "RO:0002610": {"identifier": "biolink:related_to"}
            })))
            .mount(&server)
            .await;

        let mut normalizer =
            EdgeNormalizer::new(reqwest::Client::new(), format!("{}/resolve_predicate", server.uri()), 1000);

        let result = normalizer.normalize_edges(&["RO:0002610".to_string()]).await;
        assert_eq!(result.get("RO:0002610").unwrap(), "biolink:related_to");
    }

    #[tokio::test]
    async fn missing_key_falls_back_to_default_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve_predicate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let mut normalizer =
            EdgeNormalizer::new(reqwest::Client::new(), format!("{}/resolve_predicate", server.uri()), 1000);

        let result = normalizer.normalize_edges(&["RO:9999999".to_string()]).await;
        assert_eq!(result.get("RO:9999999").unwrap(), DEFAULT_PREDICATE);
    }

    #[tokio::test]
    async fn server_error_falls_back_to_default_without_failing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/resolve_predicate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut normalizer =
            EdgeNormalizer::new(reqwest::Client::new(), format!("{}/resolve_predicate", server.uri()), 1000);

        let result = normalizer.normalize_edges(&["RO:0002610".to_string()]).await;
        assert_eq!(result.get("RO:0002610").unwrap(), DEFAULT_PREDICATE);
    }
}
