//! The build state machine (spec §4.H): `process_traits -> search_studies ->
//! build_hits -> build_associations -> annotate_hits`, each phase
//! idempotent and committing per-study.

use std::collections::{BTreeSet, HashSet};

use crate::annotate::Annotator;
use crate::err::{ErrorType, RagsError};
use crate::graph::{BufferedWriter, GraphStore};
use crate::model::{GraphNode, Project, StudyKind, SEQUENCE_VARIANT};
use crate::normalize::{EdgeNormalizer, NodeNormalizer};
use crate::readers::gwas::{GwasFile, GwasReader};
use crate::readers::mwas::{MwasFile, MwasReader};
use crate::readers::StudyReader;
use crate::store::{HitSelector, ProjectStore};

use super::builder::{self, GraphBuilder};

/// Outcome of one phase call (spec §4.H): `{success, success_message,
/// warnings, errors}`. Per-study failures land in `errors` without aborting
/// the phase; only a store/graph connectivity failure returns `Err` instead.
#[derive(Debug, Default)]
pub struct PhaseResult {
    pub success: bool,
    pub success_message: String,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl PhaseResult {
    fn ok(message: impl Into<String>) -> Self {
        Self { success: true, success_message: message.into(), warnings: Vec::new(), errors: Vec::new() }
    }
}

pub struct ProjectManager {
    store: ProjectStore,
    graph_store: GraphStore,
    node_normalizer: NodeNormalizer,
    edge_normalizer: EdgeNormalizer,
    annotator: Annotator,
    builder: GraphBuilder,
    data_dir: std::path::PathBuf,
}

impl ProjectManager {
    pub fn new(
        store: ProjectStore,
        graph_store: GraphStore,
        node_normalizer: NodeNormalizer,
        edge_normalizer: EdgeNormalizer,
        annotator: Annotator,
        data_dir: std::path::PathBuf,
    ) -> Self {
        Self {
            store,
            graph_store,
            node_normalizer,
            edge_normalizer,
            annotator,
            builder: GraphBuilder::new(),
            data_dir,
        }
    }

    fn resolve_path(&self, file_path: &str) -> String {
        self.data_dir.join(file_path).to_string_lossy().into_owned()
    }

    /// Normalize every study's trait and write its node; synthesizes a
    /// fallback node when normalization returns nothing.
    pub async fn process_traits(&mut self, project_id: i64, force: bool) -> Result<PhaseResult, RagsError> {
        let mut studies = self.store.get_all_studies(project_id).await?;
        studies.retain(|s| force || !s.trait_normalized);
        if studies.is_empty() {
            return Ok(PhaseResult::ok("No studies require trait normalization."));
        }

        let trait_ids: Vec<String> = studies.iter().map(|s| s.original_trait_id.clone()).collect();
        let normalized = self.node_normalizer.normalize_nodes(&trait_ids).await?;

        let mut warnings = Vec::new();
        let mut writer = BufferedWriter::new(&self.graph_store);

        for mut study in studies {
            match normalized.get(&study.original_trait_id).and_then(|n| n.as_ref()) {
                Some(node) => {
                    study.normalized_trait_id = Some(node.id.clone());
                    study.normalized_trait_label = Some(node.name.clone());
                    let mut graph_node = GraphNode::new(node.id.clone(), node.all_types.clone());
                    graph_node.name = Some(node.name.clone());
                    graph_node.synonyms = node.synonyms.clone();
                    writer.write_node(graph_node).await?;
                }
                None => {
                    warnings.push(format!(
                        "no normalization result for trait {}, using original id",
                        study.original_trait_id
                    ));
                    writer.write_node(builder::synthesized_trait_node(&study)).await?;
                    study.normalized_trait_id = Some(study.original_trait_id.clone());
                    study.normalized_trait_label = Some(study.original_trait_label.clone());
                }
            }
            study.trait_normalized = true;
            self.store.save_study(&study).await?;
        }

        writer.flush().await?;
        Ok(PhaseResult { success: true, success_message: "Trait normalization complete.".to_string(), warnings, errors: Vec::new() })
    }

    /// Scan each unsearched study's file for significant hits and persist
    /// them. Reader failures are recorded as `BUILDING` errors (spec §7's
    /// deliberate taxonomy choice) and do not abort other studies.
    pub async fn search_studies(&mut self, project_id: i64) -> Result<PhaseResult, RagsError> {
        let mut studies = self.store.get_all_studies(project_id).await?;
        studies.retain(|s| !s.searched);
        if studies.is_empty() {
            return Ok(PhaseResult::ok("No unsearched studies."));
        }

        let mut errors = Vec::new();
        let mut searched_count = 0;

        for mut study in studies {
            let full_path = self.resolve_path(&study.file_path);
            let outcome = match study.study_type {
                StudyKind::Gwas => {
                    let mut file = GwasFile::new(full_path);
                    file.has_tabix = study.has_tabix;
                    let reader = GwasReader::new(file);
                    let outcome = reader.find_significant_hits(study.p_value_cutoff);
                    if outcome.success {
                        if let Some(hits) = &outcome.hits {
                            let batch: Vec<_> = crate::hits::HitsContainer::iterate(hits).cloned().collect();
                            self.store.save_gwas_hits(project_id, study.id, &batch).await?;
                        }
                    }
                    (outcome.success, outcome.hit_count, outcome.error_message)
                }
                StudyKind::Mwas => {
                    let file = MwasFile::new(full_path);
                    let reader = MwasReader::new(file);
                    let outcome = reader.find_significant_hits(study.p_value_cutoff);
                    if outcome.success {
                        if let Some(hits) = &outcome.hits {
                            let batch: Vec<_> = crate::hits::HitsContainer::iterate(hits).cloned().collect();
                            self.store.save_mwas_hits(project_id, study.id, &batch).await?;
                        }
                    }
                    (outcome.success, outcome.hit_count, outcome.error_message)
                }
            };

            let (success, hit_count, error_message) = outcome;
            if success {
                study.searched = true;
                study.num_hits = Some(hit_count);
                self.store.clear_study_errors_by_type(study.id, ErrorType::Searching).await?;
                searched_count += 1;
            } else {
                let message = error_message.unwrap_or_else(|| "unknown error scanning study".to_string());
                tracing::warn!("study {} failed to search: {}", study.study_name, message);
                self.store.create_study_error(study.id, ErrorType::Building, &message).await?;
                errors.push(format!("{}: {}", study.study_name, message));
            }
            self.store.save_study(&study).await?;
        }

        Ok(PhaseResult {
            success: true,
            success_message: format!("Searched {searched_count} studies."),
            warnings: Vec::new(),
            errors,
        })
    }

    /// Normalize every unprocessed hit's original id and write its node.
    pub async fn build_hits(&mut self, project_id: i64, force: bool) -> Result<PhaseResult, RagsError> {
        let selector = if force { HitSelector::All } else { HitSelector::Unprocessed };
        let mut gwas_hits = self.store.get_gwas_hits(project_id, selector).await?;
        let mut mwas_hits = self.store.get_mwas_hits(project_id, selector).await?;

        if gwas_hits.is_empty() && mwas_hits.is_empty() {
            return Ok(PhaseResult::ok("No unprocessed hits."));
        }

        let mut writer = BufferedWriter::new(&self.graph_store);

        let gwas_ids: Vec<String> = gwas_hits.iter().map(|h| h.record.original_id.clone()).collect();
        let normalized_variants = self.node_normalizer.normalize_nodes(&gwas_ids).await?;
        for hit in &mut gwas_hits {
            let normalized = normalized_variants.get(&hit.record.original_id).and_then(|n| n.as_ref());
            let node = builder::variant_node(hit, normalized);
            writer.write_node(node).await?;
            hit.record.normalized = true;
            hit.record.normalized_id = normalized.map(|n| n.id.clone());
            hit.record.normalized_name = normalized.map(|n| n.name.clone());
            self.store.save_gwas_hit(hit).await?;
        }

        let mwas_ids: Vec<String> = mwas_hits.iter().map(|h| h.record.original_id.clone()).collect();
        let normalized_metabolites = self.node_normalizer.normalize_nodes(&mwas_ids).await?;
        for hit in &mut mwas_hits {
            let normalized = normalized_metabolites.get(&hit.record.original_id).and_then(|n| n.as_ref());
            let node = builder::metabolite_node(hit, normalized);
            writer.write_node(node).await?;
            hit.record.normalized = true;
            hit.record.normalized_id = normalized.map(|n| n.id.clone());
            hit.record.normalized_name = normalized.map(|n| n.name.clone());
            self.store.save_mwas_hit(hit).await?;
        }

        writer.flush().await?;
        Ok(PhaseResult::ok(format!(
            "Built {} GWAS and {} MWAS hit nodes.",
            gwas_hits.len(),
            mwas_hits.len()
        )))
    }

    /// Emit association edges for every study, incrementally unless
    /// `force` is set.
    pub async fn build_associations(&mut self, project: &Project, force: bool) -> Result<PhaseResult, RagsError> {
        let studies = self.store.get_all_studies(project.id).await?;
        if studies.is_empty() {
            return Ok(PhaseResult::ok("Project has no studies."));
        }

        let predicate = self.builder.association_predicate(&mut self.edge_normalizer).await;
        let mut writer = BufferedWriter::new(&self.graph_store);
        let mut total_associations = 0i64;

        for mut study in studies {
            let selector = if study.written && !force { HitSelector::Unwritten } else { HitSelector::All };
            let trait_id = study.normalized_trait_id.clone().unwrap_or_else(|| study.original_trait_id.clone());
            let mut seen = HashSet::new();
            let mut count = 0i64;
            let full_path = self.resolve_path(&study.file_path);

            match study.study_type {
                StudyKind::Gwas => {
                    let mut file = GwasFile::new(full_path);
                    file.has_tabix = study.has_tabix;
                    let reader = GwasReader::new(file);
                    let mut hits = self.store.get_gwas_hits_for_study(study.id, selector).await?;
                    for hit in &mut hits {
                        let hit_id = hit.record.effective_id().to_string();
                        if !seen.insert(hit_id.clone()) {
                            continue;
                        }
                        let Some(association) = reader.get_association(hit) else { continue };
                        if study.max_p_value.is_some_and(|max| association.p_value > max) {
                            continue;
                        }
                        let edge = builder::association_edge(
                            &trait_id,
                            &hit_id,
                            &hit.record.original_id,
                            &predicate,
                            &study.study_name,
                            project.id,
                            &project.name,
                            association,
                        );
                        writer.write_edge(edge).await?;
                        hit.record.written = true;
                        self.store.save_gwas_hit(hit).await?;
                        count += 1;
                    }
                }
                StudyKind::Mwas => {
                    let reader = MwasReader::new(MwasFile::new(full_path));
                    let mut hits = self.store.get_mwas_hits_for_study(study.id, selector).await?;
                    for hit in &mut hits {
                        let hit_id = hit.record.effective_id().to_string();
                        if !seen.insert(hit_id.clone()) {
                            continue;
                        }
                        let Some(association) = reader.get_association(hit) else { continue };
                        if study.max_p_value.is_some_and(|max| association.p_value > max) {
                            continue;
                        }
                        let edge = builder::association_edge(
                            &trait_id,
                            &hit_id,
                            &hit.record.original_id,
                            &predicate,
                            &study.study_name,
                            project.id,
                            &project.name,
                            association,
                        );
                        writer.write_edge(edge).await?;
                        hit.record.written = true;
                        self.store.save_mwas_hit(hit).await?;
                        count += 1;
                    }
                }
            }

            study.num_associations = Some(study.num_associations.unwrap_or(0) + count);
            study.written = true;
            self.store.save_study(&study).await?;
            total_associations += count;
        }

        writer.flush().await?;
        Ok(PhaseResult::ok(format!("Wrote {total_associations} association edges.")))
    }

    /// Annotate every not-yet-annotated variant node reachable by an
    /// association edge in this project.
    pub async fn annotate_hits(&mut self, project_id: i64) -> Result<PhaseResult, RagsError> {
        let rows = self
            .graph_store
            .custom_read_query(
                "MATCH (t)-[r {project_id: $project_id}]->(v:SequenceVariant) \
                 OPTIONAL MATCH (v)-[ann]->() WHERE ann.provided_by = 'infores:snpeff' \
                 WITH v, count(ann) AS annotated \
                 WHERE annotated = 0 \
                 RETURN DISTINCT v.id AS id, v.equivalent_identifiers AS equivalent_identifiers",
                None,
            )
            .await?;

        if rows.is_empty() {
            return Ok(PhaseResult::ok("No unannotated variants."));
        }

        let variant_nodes: Vec<GraphNode> = rows
            .iter()
            .filter_map(|row| {
                let id: String = row.get("id").ok()?;
                let synonyms: Vec<String> = row.get("equivalent_identifiers").unwrap_or_default();
                let mut node = GraphNode::new(id, [SEQUENCE_VARIANT.to_string()]);
                node.synonyms = synonyms.into_iter().collect::<BTreeSet<_>>();
                Some(node)
            })
            .collect();

        let result = self.annotator.annotate(&variant_nodes).await?;

        let gene_ids: Vec<String> = result.nodes.iter().map(|n| n.id.clone()).collect();
        let normalized_genes = self.node_normalizer.normalize_nodes(&gene_ids).await?;
        let predicates: Vec<String> = result.edges.iter().map(|e| e.predicate.clone()).collect();
        let normalized_predicates = self.edge_normalizer.normalize_edges(&predicates).await;

        let mut writer = BufferedWriter::new(&self.graph_store);
        let mut seen = HashSet::new();
        let mut written_edges = 0i64;

        for edge in result.edges {
            let normalized_gene = normalized_genes.get(&edge.object_id).and_then(|n| n.as_ref());
            let gene_id = normalized_gene.map(|n| n.id.clone()).unwrap_or_else(|| edge.object_id.clone());
            let normalized_predicate =
                normalized_predicates.get(&edge.predicate).cloned().unwrap_or_else(|| edge.predicate.clone());

            let dedup_key = (edge.subject_id.clone(), gene_id.clone(), normalized_predicate.clone());
            if !seen.insert(dedup_key) {
                continue;
            }

            let mut gene_node = builder::gene_node(&gene_id);
            if let Some(normalized_gene) = normalized_gene {
                gene_node.name = Some(normalized_gene.name.clone());
                gene_node.synonyms = normalized_gene.synonyms.clone();
            }
            writer.write_node(gene_node).await?;

            let mut edge = edge;
            edge.object_id = gene_id.clone();
            edge.predicate = normalized_predicate;
            writer.write_edge(edge).await?;
            written_edges += 1;
        }

        writer.flush().await?;
        Ok(PhaseResult::ok(format!("Wrote {written_edges} annotation edges.")))
    }
}
