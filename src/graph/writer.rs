//! Buffered, scoped-acquisition graph writer (spec §4.D, §9 "Graph writer
//! state").
//!
//! The "already written" node set and the per-type/per-predicate queues are
//! private to the writer; callers only see `open -> write_* -> close`.
//! Flushing is async, so callers must call [`BufferedWriter::flush`]
//! themselves on every exit path (including an error return) — there is no
//! `Drop` impl to fall back on.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use neo4rs::{BoltMap, BoltType};

use crate::err::GraphDbConnectionError;
use crate::graph::store::GraphStore;
use crate::model::{GraphEdge, GraphNode, ROOT_ENTITY};

const DEFAULT_FLUSH_THRESHOLD: usize = 10_000;
const MAX_WRITTEN_NODES: usize = 100_000;

pub struct BufferedWriter<'a> {
    store: &'a GraphStore,
    written_nodes: HashSet<String>,
    node_queues: BTreeMap<BTreeSet<String>, Vec<GraphNode>>,
    edge_queues: BTreeMap<String, Vec<GraphEdge>>,
    flush_threshold: usize,
}

impl<'a> BufferedWriter<'a> {
    pub fn new(store: &'a GraphStore) -> Self {
        Self::with_flush_threshold(store, DEFAULT_FLUSH_THRESHOLD)
    }

    pub fn with_flush_threshold(store: &'a GraphStore, flush_threshold: usize) -> Self {
        Self {
            store,
            written_nodes: HashSet::new(),
            node_queues: BTreeMap::new(),
            edge_queues: BTreeMap::new(),
            flush_threshold,
        }
    }

    /// No-op if `node.id` has already been written in this writer's
    /// lifetime.
    pub async fn write_node(&mut self, mut node: GraphNode) -> Result<(), GraphDbConnectionError> {
        if self.written_nodes.contains(&node.id) {
            return Ok(());
        }
        if node.name.as_deref().unwrap_or_default().is_empty() {
            tracing::warn!("Writing node {}, it's missing a name", node.id);
        }

        node.properties.insert(
            "equivalent_identifiers".to_string(),
            serde_json::Value::from(node.synonyms.iter().cloned().collect::<Vec<_>>()),
        );
        node.properties.insert(
            "category".to_string(),
            serde_json::Value::from(node.all_types.iter().cloned().collect::<Vec<_>>()),
        );
        if let Some(name) = &node.name {
            node.properties.insert("name".to_string(), serde_json::Value::from(name.clone()));
        }

        self.written_nodes.insert(node.id.clone());
        let queue = self.node_queues.entry(node.all_types.clone()).or_default();
        queue.push(node);
        if queue.len() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Appends unconditionally; edge identity is left to the graph
    /// semantics of the upsert, not in-writer dedup.
    pub async fn write_edge(&mut self, edge: GraphEdge) -> Result<(), GraphDbConnectionError> {
        let queue = self.edge_queues.entry(edge.predicate.clone()).or_default();
        queue.push(edge);
        if queue.len() >= self.flush_threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Drain every non-empty queue through the graph store, one batched
    /// transaction per queue.
    pub async fn flush(&mut self) -> Result<(), GraphDbConnectionError> {
        for (all_types, nodes) in self.node_queues.iter_mut() {
            if nodes.is_empty() {
                continue;
            }
            flush_node_chunk(self.store, all_types, nodes).await?;
            nodes.clear();
        }

        for (predicate, edges) in self.edge_queues.iter_mut() {
            if edges.is_empty() {
                continue;
            }
            flush_edge_chunk(self.store, predicate, edges).await?;
            edges.clear();
        }

        if self.written_nodes.len() > MAX_WRITTEN_NODES {
            self.written_nodes.clear();
        }

        Ok(())
    }
}

/// `neo4rs` has no blanket conversion from `serde_json::Value`; every
/// property map handed to the driver has to be walked into `BoltType` by
/// hand.
fn json_to_bolt(value: &serde_json::Value) -> BoltType {
    match value {
        serde_json::Value::Null => BoltType::Null(neo4rs::BoltNull),
        serde_json::Value::Bool(b) => BoltType::Boolean((*b).into()),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => BoltType::Integer(i.into()),
            None => BoltType::Float(n.as_f64().unwrap_or_default().into()),
        },
        serde_json::Value::String(s) => BoltType::String(s.as_str().into()),
        serde_json::Value::Array(items) => {
            let list: Vec<BoltType> = items.iter().map(json_to_bolt).collect();
            BoltType::List(list.into())
        }
        serde_json::Value::Object(map) => {
            let mut bolt_map = BoltMap::new();
            for (key, val) in map {
                bolt_map.put(key.as_str().into(), json_to_bolt(val));
            }
            BoltType::Map(bolt_map)
        }
    }
}

fn bolt_string(value: impl Into<String>) -> BoltType {
    BoltType::String(value.into().into())
}

fn bolt_opt_string(value: &Option<String>) -> BoltType {
    match value {
        Some(v) => bolt_string(v.clone()),
        None => BoltType::Null(neo4rs::BoltNull),
    }
}

fn bolt_opt_i64(value: Option<i64>) -> BoltType {
    match value {
        Some(v) => BoltType::Integer(v.into()),
        None => BoltType::Null(neo4rs::BoltNull),
    }
}

fn labels_clause(all_types: &BTreeSet<String>) -> String {
    std::iter::once(ROOT_ENTITY.to_string())
        .chain(all_types.iter().cloned())
        .map(|t| format!(":{t}"))
        .collect()
}

async fn flush_node_chunk(
    store: &GraphStore,
    all_types: &BTreeSet<String>,
    nodes: &[GraphNode],
) -> Result<(), GraphDbConnectionError> {
    let labels = labels_clause(all_types);
    let cypher = format!(
        "UNWIND $batches AS row \
         MERGE (a:{ROOT_ENTITY} {{id: row.id}}) \
         ON CREATE SET a{labels} \
         SET a += row.properties"
    );

    let batch: Vec<BoltType> = nodes
        .iter()
        .map(|n| {
            let mut row = BoltMap::new();
            row.put("id".into(), bolt_string(n.id.clone()));
            row.put("properties".into(), json_to_bolt(&serde_json::Value::Object(n.properties.clone())));
            BoltType::Map(row)
        })
        .collect();

    tracing::debug!("flushing {} nodes with types {:?}", nodes.len(), all_types);
    store
        .session()
        .run(neo4rs::query(&cypher).param("batches", batch))
        .await?;
    Ok(())
}

async fn flush_edge_chunk(
    store: &GraphStore,
    predicate: &str,
    edges: &[GraphEdge],
) -> Result<(), GraphDbConnectionError> {
    let relation_label = predicate.replace([':', '-', '.'], "_");
    let cypher = format!(
        "UNWIND $batches AS row \
         MATCH (a:{ROOT_ENTITY} {{id: row.subject_id}}), (b:{ROOT_ENTITY} {{id: row.object_id}}) \
         CREATE (a)-[r:{relation_label}]->(b) \
         SET r.predicate = row.predicate, \
             r.relation = row.relation, \
             r.provided_by = row.provided_by, \
             r.namespace = row.namespace, \
             r.project_id = row.project_id, \
             r.project_name = row.project_name, \
             r.original_object_id = row.original_object_id, \
             r += row.properties"
    );

    let batch: Vec<BoltType> = edges
        .iter()
        .map(|e| {
            let mut row = BoltMap::new();
            row.put("subject_id".into(), bolt_string(e.subject_id.clone()));
            row.put("object_id".into(), bolt_string(e.object_id.clone()));
            row.put("original_object_id".into(), bolt_string(e.original_object_id.clone()));
            row.put("predicate".into(), bolt_string(e.predicate.clone()));
            row.put("relation".into(), bolt_string(e.relation.clone()));
            row.put("provided_by".into(), bolt_string(e.provided_by.clone()));
            row.put("namespace".into(), bolt_opt_string(&e.namespace));
            row.put("project_id".into(), bolt_opt_i64(e.project_id));
            row.put("project_name".into(), bolt_opt_string(&e.project_name));
            row.put("properties".into(), json_to_bolt(&serde_json::Value::Object(e.properties.clone())));
            BoltType::Map(row)
        })
        .collect();

    tracing::debug!("flushing {} edges with predicate {}", edges.len(), predicate);
    store
        .session()
        .run(neo4rs::query(&cypher).param("batches", batch))
        .await?;
    Ok(())
}
