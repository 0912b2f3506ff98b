//! Thin shim over the property-graph database, spoken via a Bolt driver
//! (spec §4.E).

use neo4rs::{query, Graph};

use crate::config::GraphStoreConfig;
use crate::err::GraphDbConnectionError;

pub struct GraphStore {
    graph: Graph,
}

impl GraphStore {
    pub async fn connect(config: &GraphStoreConfig) -> Result<Self, GraphDbConnectionError> {
        let graph = Graph::new(config.bolt_uri(), &config.user, &config.password).await?;
        Ok(Self { graph })
    }

    /// A scoped handle to run one or more queries against a single session.
    pub fn session(&self) -> &Graph {
        &self.graph
    }

    pub async fn custom_read_query(
        &self,
        cypher: &str,
        limit: Option<usize>,
    ) -> Result<Vec<neo4rs::Row>, GraphDbConnectionError> {
        let cypher = match limit {
            Some(limit) => format!("{cypher} limit {limit}"),
            None => cypher.to_string(),
        };

        tracing::debug!("graph db query: {}", cypher);
        let mut stream = self.graph.execute(query(&cypher)).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    pub async fn custom_write_query(&self, cypher: &str) -> Result<(), GraphDbConnectionError> {
        tracing::debug!("graph db query: {}", cypher);
        self.graph.run(query(cypher)).await?;
        Ok(())
    }

    /// Remove every edge carrying `project_id`; orphan nodes are acceptable
    /// and may be shared with other projects.
    pub async fn delete_project(&self, project_id: i64) -> Result<(), GraphDbConnectionError> {
        let cypher = "MATCH ()-[r {project_id: $project_id}]-() DELETE r";
        self.graph.run(query(cypher).param("project_id", project_id)).await?;
        Ok(())
    }
}
