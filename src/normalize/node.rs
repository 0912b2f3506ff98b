//! Node (identifier) normalization client.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

use crate::err::NormalizationError;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedNode {
    pub id: String,
    pub name: String,
    pub synonyms: BTreeSet<String>,
    pub all_types: BTreeSet<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdEntry {
    identifier: String,
    label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct NormalizationResult {
    id: IdEntry,
    #[serde(rename = "equivalent_identifiers")]
    equivalent_identifiers: Vec<IdEntry>,
    #[serde(rename = "type")]
    types: Vec<String>,
}

fn un_curie(curie: &str) -> &str {
    curie.split_once(':').map(|(_, rest)| rest).unwrap_or(curie)
}

fn parse_normalization_result(result: NormalizationResult) -> NormalizedNode {
    let mut name = result.id.label.clone().unwrap_or_default();
    let mut synonyms = BTreeSet::new();

    for syn in &result.equivalent_identifiers {
        synonyms.insert(syn.identifier.clone());
        if name.is_empty() {
            if let Some(label) = &syn.label {
                name = label.clone();
            }
        }
    }

    if name.is_empty() {
        name = un_curie(&result.id.identifier).to_string();
    }

    NormalizedNode {
        id: result.id.identifier,
        name,
        synonyms,
        all_types: result.types.into_iter().collect(),
    }
}

/// Batched, memoizing client for `<base>/get_normalized_nodes`.
pub struct NodeNormalizer {
    client: reqwest::Client,
    base_url: String,
    batch_size: usize,
    cache: BTreeMap<String, Option<NormalizedNode>>,
}

impl NodeNormalizer {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, batch_size: usize) -> Self {
        Self { client, base_url: base_url.into(), batch_size, cache: BTreeMap::new() }
    }

    /// Normalize `ids`, returning a map covering every requested id.
    ///
    /// Ids already seen this process (memoized) skip the network entirely;
    /// remaining ids are deduplicated and split into `batch_size`-sized
    /// POST requests.
    pub async fn normalize_nodes(
        &mut self,
        ids: &[String],
    ) -> Result<BTreeMap<String, Option<NormalizedNode>>, NormalizationError> {
        let to_fetch: BTreeSet<String> =
            ids.iter().filter(|id| !self.cache.contains_key(*id)).cloned().collect();
        let batches: Vec<Vec<String>> =
            to_fetch.into_iter().collect::<Vec<_>>().chunks(self.batch_size).map(|c| c.to_vec()).collect();

        for batch in batches {
            let response = self
                .client
                .post(&self.base_url)
                .json(&serde_json::json!({ "curies": batch }))
                .send()
                .await?;

            let status = response.status();
            if status.is_success() {
                let body: BTreeMap<String, Option<NormalizationResult>> = response.json().await?;
                for id in &batch {
                    match body.get(id) {
                        Some(Some(_)) => {
                            let result = body.get(id).unwrap().clone().unwrap();
                            self.cache.insert(id.clone(), Some(parse_normalization_result(result)));
                        }
                        Some(None) => {
                            self.cache.insert(id.clone(), None);
                        }
                        None => {
                            return Err(NormalizationError::MissingNodeEntry(id.clone()));
                        }
                    }
                }
            } else if status.as_u16() == 404 {
                for id in &batch {
                    tracing::warn!("found no norm response for {}", id);
                    self.cache.insert(id.clone(), None);
                }
            } else {
                return Err(NormalizationError::BadNodeResponse {
                    status: status.as_u16(),
                    batch_size: batch.len(),
                });
            }
        }

        Ok(ids.iter().map(|id| (id.clone(), self.cache.get(id).cloned().flatten())).collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn parses_best_id_label() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_normalized_nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "HGNC:1100": {
                    "id": {"identifier": "NCBIGene:672", "label": "BRCA1"},
                    "equivalent_identifiers": [{"identifier": "NCBIGene:672", "label": "BRCA1"}],
                    "type": ["biolink:Gene", "biolink:NamedThing"]
                }
            })))
            .mount(&server)
            .await;

        let mut normalizer =
            NodeNormalizer::new(reqwest::Client::new(), format!("{}/get_normalized_nodes", server.uri()), 1000);

        let result = normalizer.normalize_nodes(&["HGNC:1100".to_string()]).await.unwrap();
        let node = result.get("HGNC:1100").unwrap().as_ref().unwrap();
        assert_eq!(node.id, "NCBIGene:672");
        assert_eq!(node.name, "BRCA1");
    }

    #[tokio::test]
    async fn maps_404_batch_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_normalized_nodes"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let mut normalizer =
            NodeNormalizer::new(reqwest::Client::new(), format!("{}/get_normalized_nodes", server.uri()), 1000);

        let result = normalizer.normalize_nodes(&["X:1".to_string()]).await.unwrap();
        assert!(result.get("X:1").unwrap().is_none());
    }

    #[tokio::test]
    async fn non_200_non_404_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_normalized_nodes"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut normalizer =
            NodeNormalizer::new(reqwest::Client::new(), format!("{}/get_normalized_nodes", server.uri()), 1000);

        let err = normalizer.normalize_nodes(&["X:1".to_string()]).await.unwrap_err();
        assert!(matches!(err, NormalizationError::BadNodeResponse { status: 500, .. }));
    }

    #[tokio::test]
    async fn second_call_on_same_ids_issues_no_new_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/get_normalized_nodes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "X:1": serde_json::Value::Null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut normalizer =
            NodeNormalizer::new(reqwest::Client::new(), format!("{}/get_normalized_nodes", server.uri()), 1000);

        normalizer.normalize_nodes(&["X:1".to_string()]).await.unwrap();
        normalizer.normalize_nodes(&["X:1".to_string()]).await.unwrap();
    }
}
