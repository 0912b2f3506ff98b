//! External variant annotation (spec §4.F): hand sequence-variant nodes to
//! an external annotator tool via a generated VCF, and turn its output back
//! into gene nodes and variant-to-gene edges.
//!
//! Unlike the source this is modeled on, temp files are removed on every
//! exit path (including a failed subprocess), not just the success path.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::config::AnnotatorConfig;
use crate::err::AnnotationFailedError;
use crate::model::{GraphEdge, GraphNode, GENE};

const GENE_BIOTYPES_TO_IGNORE: &[&str] = &[];
const INTERGENIC_REGION_PREDICATE: &str = "GAMMA:0000102";
const PROVIDED_BY: &str = "infores:snpeff";

/// Annotator tool identity, scraped from the `##SnpEffVersion=`/`##SnpEffCmd=`
/// header lines of its own output (spec §4.F).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationMetadata {
    pub tool_version: Option<String>,
    pub tool_cmd: Option<String>,
}

pub struct AnnotationResult {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub metadata: AnnotationMetadata,
}

pub struct Annotator {
    config: AnnotatorConfig,
    rags_home: PathBuf,
    http: reqwest::Client,
}

impl Annotator {
    pub fn new(config: AnnotatorConfig, rags_home: PathBuf, http: reqwest::Client) -> Self {
        Self { config, rags_home, http }
    }

    fn snpeff_dir(&self) -> PathBuf {
        self.rags_home.join("snpEff")
    }

    /// Downloads and unpacks the annotator tool into `rags_home` if it
    /// isn't there already. A no-op on every call after the first.
    pub async fn provision(&self) -> Result<(), AnnotationFailedError> {
        let snpeff_dir = self.snpeff_dir();
        if snpeff_dir.is_dir() {
            return Ok(());
        }

        tracing::info!("annotator tool not found at {}, downloading", snpeff_dir.display());
        let response = self
            .http
            .get(&self.config.tool_url)
            .send()
            .await
            .map_err(|e| AnnotationFailedError::Provisioning(e.to_string()))?;
        let bytes = response.bytes().await.map_err(|e| AnnotationFailedError::Provisioning(e.to_string()))?;

        let rags_home = self.rags_home.clone();
        tokio::task::spawn_blocking(move || -> Result<(), AnnotationFailedError> {
            std::fs::create_dir_all(&rags_home)?;
            let cursor = std::io::Cursor::new(bytes);
            let mut archive = zip::ZipArchive::new(cursor)
                .map_err(|e| AnnotationFailedError::Provisioning(format!("bad annotator archive: {e}")))?;
            archive.extract(&rags_home).map_err(|e| AnnotationFailedError::Provisioning(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| AnnotationFailedError::Provisioning(e.to_string()))??;

        Ok(())
    }

    /// Annotate a batch of sequence-variant nodes. Every node with a
    /// `ROBO_VAR:` synonym contributes one VCF line; nodes without one are
    /// silently skipped (unnormalized or non-sequence-variant hits never
    /// reach here in practice).
    pub async fn annotate(&self, variant_nodes: &[GraphNode]) -> Result<AnnotationResult, AnnotationFailedError> {
        self.provision().await?;

        let stamp = variant_nodes.len();
        let vcf_path = self.rags_home.join(format!("temp_{stamp}.vcf"));
        let annotated_path = self.rags_home.join(format!("temp_{stamp}_annotated.vcf"));
        let _cleanup = TempFileGuard { paths: vec![vcf_path.clone(), annotated_path.clone()] };

        tracing::debug!("creating VCF file from {} source nodes", variant_nodes.len());
        let vcf_contents = create_vcf_from_variant_nodes(variant_nodes);
        tokio::fs::write(&vcf_path, vcf_contents).await?;

        tracing::debug!("running annotator, writing {}", annotated_path.display());
        self.run_annotator(&vcf_path, &annotated_path).await?;

        tracing::debug!("parsing annotated VCF back into nodes and edges");
        let contents = tokio::fs::read_to_string(&annotated_path).await?;
        Ok(extract_annotations_from_vcf(&contents))
    }

    async fn run_annotator(&self, vcf_path: &Path, annotated_path: &Path) -> Result<(), AnnotationFailedError> {
        let out_file = std::fs::File::create(annotated_path)?;
        let status = tokio::process::Command::new(&self.config.java_bin)
            .current_dir(self.snpeff_dir())
            .arg("-Xmx12g")
            .arg("-jar")
            .arg("snpEff.jar")
            .arg("-noStats")
            .arg("-ud")
            .arg(self.config.ud_distance.to_string())
            .arg(&self.config.reference_genome)
            .arg(vcf_path)
            .stdout(Stdio::from(out_file))
            .stderr(Stdio::piped())
            .status()
            .await?;

        if !status.success() {
            return Err(AnnotationFailedError::NonZeroExit {
                status: status.code().unwrap_or(-1),
                log_path: annotated_path.display().to_string(),
            });
        }
        Ok(())
    }
}

/// Removes every listed path on drop, best-effort, regardless of whether
/// the annotation run that created them succeeded.
struct TempFileGuard {
    paths: Vec<PathBuf>,
}

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            if let Err(e) = std::fs::remove_file(path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("failed to remove temp file {}: {}", path.display(), e);
                }
            }
        }
    }
}

fn create_vcf_from_variant_nodes(source_nodes: &[GraphNode]) -> String {
    let mut out = String::from("##fileformat=VCFv4.2");
    out.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n");

    for node in source_nodes {
        let Some(robo_curie) = node.synonyms.iter().find(|s| s.starts_with("ROBO_VAR")) else {
            continue;
        };
        let Some((_, robo_key)) = robo_curie.split_once(':') else { continue };
        let params: Vec<&str> = robo_key.split('|').collect();
        if params.len() < 6 {
            continue;
        }
        let chromosome = params[1];
        let Ok(mut position) = params[2].parse::<i64>() else { continue };
        let mut ref_allele = params[4].to_string();
        let mut alt_allele = params[5].to_string();

        if ref_allele.is_empty() {
            ref_allele = "N".to_string();
            alt_allele = format!("N{alt_allele}");
        } else if alt_allele.is_empty() {
            alt_allele = "N".to_string();
            ref_allele = format!("N{ref_allele}");
        } else {
            position += 1;
        }

        out.push_str(&format!("{chromosome}\t{position}\t{}\t{ref_allele}\t{alt_allele}\t\tPASS\t\n", node.id));
    }
    out
}

fn extract_annotations_from_vcf(annotated_vcf: &str) -> AnnotationResult {
    let ignore: HashSet<&str> = GENE_BIOTYPES_TO_IGNORE.iter().copied().collect();
    let mut nodes = Vec::new();
    let mut edges = Vec::new();
    let mut metadata = AnnotationMetadata::default();

    for line in annotated_vcf.lines() {
        if line.starts_with('#') {
            if line.contains("SnpEffVersion") {
                metadata.tool_version = line.split('=').nth(1).map(|v| v.trim().to_string());
            } else if line.contains("SnpEffCmd") {
                metadata.tool_cmd = line.split('=').nth(1).map(|v| v.trim().to_string());
            }
            continue;
        }
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 8 {
            continue;
        }
        let variant_id = fields[2];
        let Some(ann_field) = fields[7].split(';').find(|f| f.starts_with("ANN=")) else { continue };

        let mut annotations_to_write: BTreeMap<String, BTreeMap<String, Option<i64>>> = BTreeMap::new();

        for annotation in ann_field[4..].split(',') {
            let parts: Vec<&str> = annotation.split('|').collect();
            if parts.len() < 15 {
                continue;
            }
            let effects = parts[1].split('&');
            let genes = parts[4].split('-');
            let gene_biotype = parts[7];
            let distance_info = parts[14];
            if ignore.contains(gene_biotype) {
                continue;
            }

            for gene in genes {
                let gene_id = format!("ENSEMBL:{gene}");
                let distance: Option<i64> = if distance_info.is_empty() {
                    None
                } else {
                    distance_info.parse().ok()
                };
                for effect in effects.clone() {
                    let effect_predicate = if effect == "intergenic_region" {
                        INTERGENIC_REGION_PREDICATE.to_string()
                    } else {
                        format!("SNPEFF:{effect}")
                    };
                    annotations_to_write.entry(effect_predicate).or_default().insert(gene_id.clone(), distance);
                }
            }
        }

        for (effect_predicate, gene_distances) in annotations_to_write {
            for (gene_id, distance) in gene_distances {
                let mut properties = serde_json::Map::new();
                if let Some(distance) = distance {
                    properties.insert("distance_to_feature".to_string(), serde_json::Value::from(distance));
                }

                nodes.push(GraphNode::new(gene_id.clone(), [GENE.to_string()]));
                edges.push(GraphEdge {
                    subject_id: variant_id.to_string(),
                    object_id: gene_id.clone(),
                    original_object_id: gene_id,
                    predicate: effect_predicate.clone(),
                    relation: effect_predicate,
                    provided_by: PROVIDED_BY.to_string(),
                    namespace: None,
                    project_id: None,
                    project_name: None,
                    properties,
                });
            }
        }
    }

    AnnotationResult { nodes, edges, metadata }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::BTreeSet;

    fn node_with_synonym(id: &str, synonym: &str) -> GraphNode {
        let mut node = GraphNode::new(id.to_string(), []);
        node.synonyms = BTreeSet::from([synonym.to_string()]);
        node
    }

    #[test]
    fn vcf_line_shifts_position_when_both_alleles_present() {
        let node = node_with_synonym("HGVS:1", "ROBO_VAR:key|1|1000|build|A|T");
        let vcf = create_vcf_from_variant_nodes(&[node]);
        assert!(vcf.contains("1\t1001\tHGVS:1\tA\tT\t"));
    }

    #[test]
    fn vcf_line_pads_missing_ref_with_n() {
        let node = node_with_synonym("HGVS:2", "ROBO_VAR:key|1|1000|build||T");
        let vcf = create_vcf_from_variant_nodes(&[node]);
        assert!(vcf.contains("1\t1000\tHGVS:2\tN\tNT\t"));
    }

    #[test]
    fn vcf_line_pads_missing_alt_with_n() {
        let node = node_with_synonym("HGVS:3", "ROBO_VAR:key|1|1000|build|A|");
        let vcf = create_vcf_from_variant_nodes(&[node]);
        assert!(vcf.contains("1\t1000\tHGVS:3\tNA\tN\t"));
    }

    #[test]
    fn parses_ann_field_into_gene_nodes_and_edges() {
        let vcf = "chr1\t1000\tHGVS:1\tA\tT\t\tPASS\tANN=T|missense_variant&splice_region_variant|MODERATE|GENE1|ENSG1-ENSG2|transcript|t1||1/1|c.1A>T|p.M1L|1|1|1|100|\n";
        let result = extract_annotations_from_vcf(vcf);
        assert_eq!(result.nodes.len(), 4);
        assert!(result.edges.iter().any(|e| e.predicate == "SNPEFF:missense_variant" && e.object_id == "ENSEMBL:ENSG1"));
        assert!(result.edges.iter().any(|e| e.predicate == "SNPEFF:splice_region_variant" && e.object_id == "ENSEMBL:ENSG2"));
        assert!(result.edges.iter().all(|e| e.properties.get("distance_to_feature").and_then(|v| v.as_i64()) == Some(100)));
    }

    #[test]
    fn parses_tool_metadata_from_header_lines() {
        let vcf = "##SnpEffVersion=\"5.1d (build 2022-04-19)\"\n##SnpEffCmd=\"SnpEff  GRCh38.99\"\n\
                   chr1\t1000\tHGVS:1\tA\tT\t\tPASS\tANN=T|intergenic_region|MODIFIER||ENSG1|||||||||500|\n";
        let result = extract_annotations_from_vcf(vcf);
        assert_eq!(result.metadata.tool_version.as_deref(), Some("\"5.1d (build 2022-04-19)\""));
        assert_eq!(result.metadata.tool_cmd.as_deref(), Some("\"SnpEff  GRCh38.99\""));
    }

    #[test]
    fn remaps_intergenic_region_predicate() {
        let vcf = "chr1\t1000\tHGVS:1\tA\tT\t\tPASS\tANN=T|intergenic_region|MODIFIER||ENSG1|||||||||500|\n";
        let result = extract_annotations_from_vcf(vcf);
        assert_eq!(result.edges.len(), 1);
        assert_eq!(result.edges[0].predicate, "GAMMA:0000102");
    }
}
