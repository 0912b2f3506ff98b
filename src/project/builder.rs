//! Graph construction glue (spec §4.I): turns reader hits and normalizer
//! results into [`GraphNode`]/[`GraphEdge`] values, and resolves the one
//! predicate every association edge shares.

use std::collections::BTreeSet;

use crate::model::{
    Association, GraphEdge, GraphNode, GwasHit, MwasHit, Study, ASSOCIATION_RELATION, CHEMICAL_SUBSTANCE, GENE,
    SEQUENCE_VARIANT,
};
use crate::normalize::{EdgeNormalizer, NormalizedNode};

/// Builds nodes/edges for one project's build run and caches the
/// association predicate (a single GET, resolved on first use).
pub struct GraphBuilder {
    association_predicate: Option<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self { association_predicate: None }
    }

    /// The predicate every association edge carries, resolved from
    /// [`ASSOCIATION_RELATION`] on first call and cached thereafter.
    pub async fn association_predicate(&mut self, edge_normalizer: &mut EdgeNormalizer) -> String {
        if let Some(predicate) = &self.association_predicate {
            return predicate.clone();
        }
        let resolved = edge_normalizer
            .normalize_edges(&[ASSOCIATION_RELATION.to_string()])
            .await
            .get(ASSOCIATION_RELATION)
            .cloned()
            .unwrap_or_else(|| ASSOCIATION_RELATION.to_string());
        self.association_predicate = Some(resolved.clone());
        resolved
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A trait node for a study, synthesized when trait normalization returned
/// nothing (spec §4.H, `process_traits`).
pub fn synthesized_trait_node(study: &Study) -> GraphNode {
    let mut node = GraphNode::new(study.original_trait_id.clone(), [study.original_trait_type.clone()]);
    node.name = Some(study.original_trait_label.clone());
    node
}

fn node_from_normalized(id: &str, fallback_name: &str, normalized: Option<&NormalizedNode>, all_types: BTreeSet<String>) -> GraphNode {
    let mut node = GraphNode::new(id.to_string(), all_types);
    match normalized {
        Some(normalized) => {
            node.name = Some(normalized.name.clone());
            node.synonyms = normalized.synonyms.clone();
        }
        None => {
            node.name = Some(fallback_name.to_string());
        }
    }
    node
}

/// A sequence-variant node for a GWAS hit. `all_types` is always the fixed
/// variant type-set, regardless of what node normalization reports (spec
/// §4.H, `build_hits`).
pub fn variant_node(hit: &GwasHit, normalized: Option<&NormalizedNode>) -> GraphNode {
    let id = normalized.map(|n| n.id.as_str()).unwrap_or(&hit.record.original_id);
    node_from_normalized(id, &hit.hgvs, normalized, BTreeSet::from([SEQUENCE_VARIANT.to_string()]))
}

/// A chemical-substance node for an MWAS hit.
pub fn metabolite_node(hit: &MwasHit, normalized: Option<&NormalizedNode>) -> GraphNode {
    let id = normalized.map(|n| n.id.as_str()).unwrap_or(&hit.record.original_id);
    let fallback_name = hit.record.original_name.as_deref().unwrap_or(&hit.record.original_id);
    node_from_normalized(id, fallback_name, normalized, BTreeSet::from([CHEMICAL_SUBSTANCE.to_string()]))
}

pub fn gene_node(gene_id: &str) -> GraphNode {
    GraphNode::new(gene_id.to_string(), [GENE.to_string()])
}

#[allow(clippy::too_many_arguments)]
pub fn association_edge(
    trait_id: &str,
    hit_id: &str,
    original_hit_id: &str,
    predicate: &str,
    namespace: &str,
    project_id: i64,
    project_name: &str,
    association: Association,
) -> GraphEdge {
    let mut properties = serde_json::Map::new();
    properties.insert("p_value".to_string(), serde_json::Value::from(association.p_value));
    properties.insert("strength".to_string(), serde_json::Value::from(association.beta));
    properties.insert("ctime".to_string(), serde_json::Value::from(chrono::Utc::now().to_rfc3339()));

    GraphEdge {
        subject_id: trait_id.to_string(),
        object_id: hit_id.to_string(),
        original_object_id: original_hit_id.to_string(),
        predicate: predicate.to_string(),
        relation: ASSOCIATION_RELATION.to_string(),
        provided_by: "infores:rags".to_string(),
        namespace: Some(namespace.to_string()),
        project_id: Some(project_id),
        project_name: Some(project_name.to_string()),
        properties,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::HitRecord;
    use std::collections::BTreeSet as Set;

    #[test]
    fn variant_node_falls_back_to_original_id_when_unnormalized() {
        let hit = GwasHit {
            record: HitRecord::new("NC_000001.10:g.100A>T", None),
            hgvs: "NC_000001.10:g.100A>T".to_string(),
            chrom: "1".to_string(),
            pos: 100,
            reference: "A".to_string(),
            alt: "T".to_string(),
        };
        let node = variant_node(&hit, None);
        assert_eq!(node.id, "NC_000001.10:g.100A>T");
        assert_eq!(node.all_types, Set::from([SEQUENCE_VARIANT.to_string()]));
        assert_eq!(node.name.as_deref(), Some("NC_000001.10:g.100A>T"));
    }

    #[test]
    fn variant_node_uses_normalized_id_and_name() {
        let hit = GwasHit {
            record: HitRecord::new("NC_000001.10:g.100A>T", None),
            hgvs: "NC_000001.10:g.100A>T".to_string(),
            chrom: "1".to_string(),
            pos: 100,
            reference: "A".to_string(),
            alt: "T".to_string(),
        };
        let normalized = NormalizedNode {
            id: "CAID:123".to_string(),
            name: "rs1".to_string(),
            synonyms: Set::from(["ROBO_VAR:key|1|100|b|A|T".to_string()]),
            all_types: Set::new(),
        };
        let node = variant_node(&hit, Some(&normalized));
        assert_eq!(node.id, "CAID:123");
        assert_eq!(node.name.as_deref(), Some("rs1"));
        assert!(node.synonyms.contains("ROBO_VAR:key|1|100|b|A|T"));
    }
}
