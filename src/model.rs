//! Data model for the build pipeline (spec §3).
//!
//! Types here are plain data; the state machine in [`crate::project`] owns
//! all transition logic. Every type derives `serde` so it can cross a
//! (out-of-scope) HTTP boundary without a translation layer.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// The two supported study types.
///
/// Design note: the source dispatches on a study-type string; we reimplement
/// that as a tagged enum that selects the reader/container/persistor
/// triple at construction time (see [`crate::project::builder::GraphBuilder`]).
#[derive(
    Serialize, Deserialize, strum_macros::Display, strum_macros::EnumString, Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum StudyKind {
    #[strum(serialize = "GWAS")]
    #[serde(rename = "GWAS")]
    Gwas,
    #[strum(serialize = "MWAS")]
    #[serde(rename = "MWAS")]
    Mwas,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub name: String,
}

/// Lifecycle: `fresh -> trait_normalized -> searched -> hits_written -> associations_written`.
///
/// The flags below are the monotonic witnesses of that lifecycle; there is
/// no separate `StudyState` enum because every transition is recorded by a
/// `bool`/`Option` field that a forced rebuild may re-traverse but never
/// un-sets outside of `force`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Study {
    pub id: i64,
    pub project_id: i64,
    pub study_name: String,
    pub study_type: StudyKind,
    pub file_path: String,
    pub p_value_cutoff: f64,
    pub max_p_value: Option<f64>,
    pub has_tabix: bool,

    pub original_trait_id: String,
    pub original_trait_type: String,
    pub original_trait_label: String,
    pub normalized_trait_id: Option<String>,
    pub normalized_trait_label: Option<String>,
    pub trait_normalized: bool,

    pub searched: bool,
    pub written: bool,
    pub num_hits: Option<i64>,
    pub num_associations: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub id: i64,
    pub study_id: i64,
    pub error_type: crate::err::ErrorType,
    pub error_message: String,
}

/// Fields shared by `GWASHit` and `MWASHit` (spec §3, `Hit`).
#[derive(Debug, Clone, PartialEq)]
pub struct HitRecord {
    pub id: i64,
    pub project_id: i64,
    pub study_id: i64,
    pub original_id: String,
    pub original_name: Option<String>,
    pub normalized: bool,
    pub normalized_id: Option<String>,
    pub normalized_name: Option<String>,
    pub written: bool,
}

impl HitRecord {
    /// New, not-yet-persisted hit (id filled in by the store on insert).
    pub fn new(original_id: impl Into<String>, original_name: Option<String>) -> Self {
        Self {
            id: 0,
            project_id: 0,
            study_id: 0,
            original_id: original_id.into(),
            original_name,
            normalized: false,
            normalized_id: None,
            normalized_name: None,
            written: false,
        }
    }

    /// The id to key a node/edge off of: the normalized id if we have one,
    /// else the original id (spec's "deliberate fallback").
    pub fn effective_id(&self) -> &str {
        self.normalized_id.as_deref().unwrap_or(&self.original_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GwasHit {
    pub record: HitRecord,
    pub hgvs: String,
    pub chrom: String,
    pub pos: i64,
    pub reference: String,
    pub alt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MwasHit {
    pub record: HitRecord,
}

/// A p-value/effect-size pair read back out of a study file for one hit
/// (spec §4.A, `get_association`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Association {
    pub p_value: f64,
    pub beta: f64,
}

pub const ROOT_ENTITY: &str = "NamedThing";
pub const SEQUENCE_VARIANT: &str = "SequenceVariant";
pub const CHEMICAL_SUBSTANCE: &str = "ChemicalSubstance";
pub const GENE: &str = "Gene";

/// Association-relation RO term pinned as authoritative input to predicate
/// normalization (spec §4.I, §9 open question).
pub const ASSOCIATION_RELATION: &str = "RO:0002610";

/// Fallback predicate used when edge normalization has nothing for us.
pub const DEFAULT_PREDICATE: &str = "biolink:related_to";

/// A node in the output property graph (spec §3, `Graph Node`).
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: String,
    pub name: Option<String>,
    /// Every type label besides the implicit root; the root is always
    /// added on write, callers need not include it here.
    pub all_types: BTreeSet<String>,
    pub synonyms: BTreeSet<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, all_types: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            all_types: all_types.into_iter().collect(),
            synonyms: BTreeSet::new(),
            properties: serde_json::Map::new(),
        }
    }
}

/// An edge in the output property graph (spec §3, `Graph Edge`).
///
/// Identity for in-build dedup is `(subject_id, object_id,
/// original_object_id, predicate, namespace)` — see
/// [`GraphEdge::dedup_key`]. Distinct `project_id`s are always distinct,
/// even with all other fields equal.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub subject_id: String,
    pub object_id: String,
    pub original_object_id: String,
    pub predicate: String,
    pub relation: String,
    pub provided_by: String,
    pub namespace: Option<String>,
    pub project_id: Option<i64>,
    pub project_name: Option<String>,
    pub properties: serde_json::Map<String, serde_json::Value>,
}

impl GraphEdge {
    pub fn dedup_key(&self) -> (String, String, String, String, Option<String>, Option<i64>) {
        (
            self.subject_id.clone(),
            self.object_id.clone(),
            self.original_object_id.clone(),
            self.predicate.clone(),
            self.namespace.clone(),
            self.project_id,
        )
    }
}
