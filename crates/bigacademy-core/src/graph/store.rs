//! SQLite-backed property graph store
//!
//! Every list query is ordered by SQLite's implicit `rowid`, so results come
//! back in creation order. An upsert that hits an existing id keeps its row
//! and therefore its position.

use std::path::PathBuf;

use chrono::Utc;
use sqlx::{FromRow, Sqlite, SqliteConnection, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use super::types::{
    format_timestamp, parse_timestamp, AgentStatistics, Direction, Edge, GraphStatistics, Node,
    NodeType, Properties, RelationshipType, Session,
};
use crate::error::{Error, Result};
use crate::storage::{Database, DatabaseConfig};

/// Default edge weight
pub const DEFAULT_WEIGHT: f64 = 1.0;

#[derive(Debug, FromRow)]
struct NodeRow {
    id: String,
    node_type: String,
    properties: String,
    created_at: String,
    updated_at: String,
}

impl NodeRow {
    fn into_node(self) -> Result<Node> {
        let record = format!("nodes/{}", self.id);
        Ok(Node {
            properties: decode_properties(&self.properties, &record)?,
            created_at: parse_timestamp(&self.created_at, &record)?,
            updated_at: parse_timestamp(&self.updated_at, &record)?,
            node_type: NodeType::from(self.node_type),
            id: self.id,
        })
    }
}

#[derive(Debug, FromRow)]
struct EdgeRow {
    id: String,
    source_id: String,
    target_id: String,
    relationship_type: String,
    properties: String,
    weight: f64,
    created_at: String,
}

impl EdgeRow {
    fn into_edge(self) -> Result<Edge> {
        let record = format!("edges/{}", self.id);
        Ok(Edge {
            properties: decode_properties(&self.properties, &record)?,
            created_at: parse_timestamp(&self.created_at, &record)?,
            relationship_type: RelationshipType::from(self.relationship_type),
            weight: self.weight,
            source_id: self.source_id,
            target_id: self.target_id,
            id: self.id,
        })
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: String,
    agent_name: String,
    source_id: String,
    source_type: String,
    total_chunks: i64,
    total_tokens: i64,
    extraction_metadata: String,
    created_at: String,
}

impl SessionRow {
    fn into_session(self) -> Result<Session> {
        let record = format!("agent_sessions/{}", self.id);
        Ok(Session {
            extraction_metadata: decode_properties(&self.extraction_metadata, &record)?,
            created_at: parse_timestamp(&self.created_at, &record)?,
            total_chunks: self.total_chunks.max(0) as u64,
            total_tokens: self.total_tokens.max(0) as u64,
            agent_name: self.agent_name,
            source_id: self.source_id,
            source_type: self.source_type,
            id: self.id,
        })
    }
}

fn decode_properties(raw: &str, record: &str) -> Result<Properties> {
    match serde_json::from_str::<serde_json::Value>(raw)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(Error::CorruptRecord(format!(
            "{}: property bag is not an object: {}",
            record, other
        ))),
    }
}

/// Statements shared by [`GraphStore`] and [`GraphTransaction`]
mod queries {
    use super::*;

    const NODE_COLUMNS: &str = "id, node_type, properties, created_at, updated_at";
    const EDGE_COLUMNS: &str =
        "id, source_id, target_id, relationship_type, properties, weight, created_at";

    pub(super) async fn upsert_node(
        conn: &mut SqliteConnection,
        node_type: &NodeType,
        properties: &Properties,
        id: Option<&str>,
    ) -> Result<String> {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let now = format_timestamp(&Utc::now());
        let encoded = serde_json::to_string(properties)?;

        sqlx::query(
            r#"
            INSERT INTO nodes (id, node_type, properties, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                node_type = excluded.node_type,
                properties = excluded.properties,
                updated_at = MAX(nodes.updated_at, excluded.updated_at)
            "#,
        )
        .bind(&id)
        .bind(node_type.as_str())
        .bind(&encoded)
        .bind(&now)
        .bind(&now)
        .execute(&mut *conn)
        .await?;

        debug!(node_id = %id, node_type = %node_type, "Upserted node");
        Ok(id)
    }

    pub(super) async fn add_edge(
        conn: &mut SqliteConnection,
        source_id: &str,
        target_id: &str,
        relationship_type: &RelationshipType,
        properties: Option<&Properties>,
        weight: f64,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let encoded = match properties {
            Some(props) => serde_json::to_string(props)?,
            None => "{}".to_string(),
        };

        sqlx::query(
            r#"
            INSERT INTO edges (
                id, source_id, target_id, relationship_type, properties, weight, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(source_id)
        .bind(target_id)
        .bind(relationship_type.as_str())
        .bind(&encoded)
        .bind(weight)
        .bind(format_timestamp(&Utc::now()))
        .execute(&mut *conn)
        .await?;

        debug!(
            edge_id = %id,
            source_id = %source_id,
            target_id = %target_id,
            relationship_type = %relationship_type,
            "Added edge"
        );
        Ok(id)
    }

    pub(super) async fn get_node(conn: &mut SqliteConnection, id: &str) -> Result<Option<Node>> {
        let row: Option<NodeRow> =
            sqlx::query_as(&format!("SELECT {} FROM nodes WHERE id = ?", NODE_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        row.map(NodeRow::into_node).transpose()
    }

    pub(super) async fn get_edge(conn: &mut SqliteConnection, id: &str) -> Result<Option<Edge>> {
        let row: Option<EdgeRow> =
            sqlx::query_as(&format!("SELECT {} FROM edges WHERE id = ?", EDGE_COLUMNS))
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;

        row.map(EdgeRow::into_edge).transpose()
    }

    pub(super) async fn find_nodes(
        conn: &mut SqliteConnection,
        node_type: Option<&NodeType>,
        filter: Option<&Properties>,
    ) -> Result<Vec<Node>> {
        let rows: Vec<NodeRow> = match node_type {
            Some(node_type) => {
                sqlx::query_as(&format!(
                    "SELECT {} FROM nodes WHERE node_type = ? ORDER BY rowid",
                    NODE_COLUMNS
                ))
                .bind(node_type.as_str())
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query_as(&format!("SELECT {} FROM nodes ORDER BY rowid", NODE_COLUMNS))
                    .fetch_all(&mut *conn)
                    .await?
            }
        };

        let mut nodes = Vec::with_capacity(rows.len());
        for row in rows {
            let node = row.into_node()?;
            if filter.is_none_or(|f| node.matches(f)) {
                nodes.push(node);
            }
        }
        Ok(nodes)
    }

    pub(super) async fn get_relationships(
        conn: &mut SqliteConnection,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Edge>> {
        let endpoint = match direction {
            Direction::Outgoing => "source_id = ?1",
            Direction::Incoming => "target_id = ?1",
            Direction::Both => "(source_id = ?1 OR target_id = ?1)",
        };
        let type_clause = if relationship_type.is_some() {
            " AND relationship_type = ?2"
        } else {
            ""
        };
        let sql = format!(
            "SELECT {} FROM edges WHERE {}{} ORDER BY rowid",
            EDGE_COLUMNS, endpoint, type_clause
        );

        let mut query = sqlx::query_as::<_, EdgeRow>(&sql).bind(node_id);
        if let Some(relationship_type) = relationship_type {
            query = query.bind(relationship_type.as_str());
        }
        let rows = query.fetch_all(&mut *conn).await?;

        rows.into_iter().map(EdgeRow::into_edge).collect()
    }

    /// SQLite integers are signed
    fn sql_count(value: u64, field: &str) -> Result<i64> {
        i64::try_from(value).map_err(|_| {
            Error::InvalidInput(format!("{} {} exceeds the storable maximum", field, value))
        })
    }

    pub(super) async fn record_session(
        conn: &mut SqliteConnection,
        session: &Session,
    ) -> Result<()> {
        let total_chunks = sql_count(session.total_chunks, "total_chunks")?;
        let total_tokens = sql_count(session.total_tokens, "total_tokens")?;

        sqlx::query(
            r#"
            INSERT INTO agent_sessions (
                id, agent_name, source_id, source_type,
                total_chunks, total_tokens, extraction_metadata, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.agent_name)
        .bind(&session.source_id)
        .bind(&session.source_type)
        .bind(total_chunks)
        .bind(total_tokens)
        .bind(serde_json::to_string(&session.extraction_metadata)?)
        .bind(format_timestamp(&session.created_at))
        .execute(&mut *conn)
        .await?;

        debug!(session_id = %session.id, agent = %session.agent_name, "Recorded session");
        Ok(())
    }

    pub(super) async fn list_sessions(
        conn: &mut SqliteConnection,
        agent_name: &str,
    ) -> Result<Vec<Session>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, agent_name, source_id, source_type,
                   total_chunks, total_tokens, extraction_metadata, created_at
            FROM agent_sessions
            WHERE agent_name = ?
            ORDER BY rowid
            "#,
        )
        .bind(agent_name)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    pub(super) async fn get_statistics(
        conn: &mut SqliteConnection,
        agent_name: Option<&str>,
    ) -> Result<GraphStatistics> {
        let node_rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type")
                .fetch_all(&mut *conn)
                .await?;
        let edge_rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT relationship_type, COUNT(*) FROM edges GROUP BY relationship_type",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut stats = GraphStatistics::default();
        for (tag, count) in node_rows {
            stats.node_counts.insert(NodeType::from(tag), count.max(0) as u64);
        }
        for (tag, count) in edge_rows {
            stats
                .edge_counts
                .insert(RelationshipType::from(tag), count.max(0) as u64);
        }

        if let Some(agent_name) = agent_name {
            let (sessions, chunks, tokens): (i64, i64, i64) = sqlx::query_as(
                r#"
                SELECT COUNT(*), COALESCE(SUM(total_chunks), 0), COALESCE(SUM(total_tokens), 0)
                FROM agent_sessions
                WHERE agent_name = ?
                "#,
            )
            .bind(agent_name)
            .fetch_one(&mut *conn)
            .await?;

            stats.agent = Some(AgentStatistics {
                session_count: sessions.max(0) as u64,
                total_chunks: chunks.max(0) as u64,
                total_tokens: tokens.max(0) as u64,
            });
        }

        Ok(stats)
    }
}

/// Persistent property graph
///
/// Every call commits before it returns. Callers that share one store across
/// tasks must serialize writes themselves.
#[derive(Debug, Clone)]
pub struct GraphStore {
    db: Database,
}

impl GraphStore {
    /// Wrap an already opened database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open (or create) a file-backed store, applying migrations
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db = Database::open(path).await?;
        info!(path = %db.path().display(), "Opened knowledge graph");
        Ok(Self::new(db))
    }

    /// Open a store with explicit database options
    pub async fn with_config(config: DatabaseConfig) -> Result<Self> {
        Ok(Self::new(Database::new(config).await?))
    }

    /// Create an in-memory store (useful for testing)
    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::in_memory().await?))
    }

    /// Get the underlying database
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Insert a node, or fully replace the one with the same id
    ///
    /// A missing id is generated. `created_at` is kept on replace and
    /// `updated_at` never moves backwards.
    pub async fn upsert_node(
        &self,
        node_type: NodeType,
        properties: Properties,
        id: Option<&str>,
    ) -> Result<String> {
        let mut conn = self.db.pool().acquire().await?;
        queries::upsert_node(&mut conn, &node_type, &properties, id).await
    }

    /// Insert a new edge. Identical edges are never merged.
    pub async fn add_edge(
        &self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
        properties: Option<Properties>,
        weight: f64,
    ) -> Result<String> {
        let mut conn = self.db.pool().acquire().await?;
        queries::add_edge(
            &mut conn,
            source_id,
            target_id,
            &relationship_type,
            properties.as_ref(),
            weight,
        )
        .await
    }

    pub async fn get_node(&self, id: &str) -> Result<Option<Node>> {
        let mut conn = self.db.pool().acquire().await?;
        queries::get_node(&mut conn, id).await
    }

    pub async fn get_edge(&self, id: &str) -> Result<Option<Edge>> {
        let mut conn = self.db.pool().acquire().await?;
        queries::get_edge(&mut conn, id).await
    }

    /// Find nodes by type and exact-match property filter, in creation order
    ///
    /// The filter is applied after loading the typed set. A `null` filter
    /// value matches a missing key.
    pub async fn find_nodes(
        &self,
        node_type: Option<&NodeType>,
        filter: Option<&Properties>,
    ) -> Result<Vec<Node>> {
        let mut conn = self.db.pool().acquire().await?;
        queries::find_nodes(&mut conn, node_type, filter).await
    }

    /// First node (by creation order) matching the type and filter
    pub async fn find_node(
        &self,
        node_type: &NodeType,
        filter: &Properties,
    ) -> Result<Option<Node>> {
        Ok(self
            .find_nodes(Some(node_type), Some(filter))
            .await?
            .into_iter()
            .next())
    }

    /// Edges touching a node, in creation order
    pub async fn get_relationships(
        &self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Edge>> {
        let mut conn = self.db.pool().acquire().await?;
        queries::get_relationships(&mut conn, node_id, relationship_type, direction).await
    }

    /// Append a session audit record
    pub async fn record_session(&self, session: &Session) -> Result<()> {
        let mut conn = self.db.pool().acquire().await?;
        queries::record_session(&mut conn, session).await
    }

    /// Sessions recorded for an agent, oldest first
    pub async fn list_sessions(&self, agent_name: &str) -> Result<Vec<Session>> {
        let mut conn = self.db.pool().acquire().await?;
        queries::list_sessions(&mut conn, agent_name).await
    }

    /// Node and edge counts by type, plus session totals when an agent is named
    pub async fn get_statistics(&self, agent_name: Option<&str>) -> Result<GraphStatistics> {
        let mut conn = self.db.pool().acquire().await?;
        queries::get_statistics(&mut conn, agent_name).await
    }

    /// Open a write scope whose changes publish together on [`GraphTransaction::commit`]
    pub async fn begin(&self) -> Result<GraphTransaction> {
        let tx = self.db.pool().begin().await?;
        Ok(GraphTransaction { tx })
    }

    /// Release the connection pool. Later calls fail with a storage error.
    pub async fn close(&self) {
        self.db.close().await;
        debug!("Knowledge graph closed");
    }

    pub fn is_closed(&self) -> bool {
        self.db.is_closed()
    }
}

/// Write scope over the graph
///
/// Reads inside the scope see its own writes. Dropping it without calling
/// [`commit`](Self::commit) rolls everything back.
pub struct GraphTransaction {
    tx: Transaction<'static, Sqlite>,
}

impl GraphTransaction {
    pub async fn upsert_node(
        &mut self,
        node_type: NodeType,
        properties: Properties,
        id: Option<&str>,
    ) -> Result<String> {
        queries::upsert_node(&mut self.tx, &node_type, &properties, id).await
    }

    pub async fn add_edge(
        &mut self,
        source_id: &str,
        target_id: &str,
        relationship_type: RelationshipType,
        properties: Option<Properties>,
        weight: f64,
    ) -> Result<String> {
        queries::add_edge(
            &mut self.tx,
            source_id,
            target_id,
            &relationship_type,
            properties.as_ref(),
            weight,
        )
        .await
    }

    pub async fn get_node(&mut self, id: &str) -> Result<Option<Node>> {
        queries::get_node(&mut self.tx, id).await
    }

    pub async fn get_edge(&mut self, id: &str) -> Result<Option<Edge>> {
        queries::get_edge(&mut self.tx, id).await
    }

    pub async fn find_nodes(
        &mut self,
        node_type: Option<&NodeType>,
        filter: Option<&Properties>,
    ) -> Result<Vec<Node>> {
        queries::find_nodes(&mut self.tx, node_type, filter).await
    }

    pub async fn find_node(
        &mut self,
        node_type: &NodeType,
        filter: &Properties,
    ) -> Result<Option<Node>> {
        Ok(queries::find_nodes(&mut self.tx, Some(node_type), Some(filter))
            .await?
            .into_iter()
            .next())
    }

    pub async fn get_relationships(
        &mut self,
        node_id: &str,
        relationship_type: Option<&RelationshipType>,
        direction: Direction,
    ) -> Result<Vec<Edge>> {
        queries::get_relationships(&mut self.tx, node_id, relationship_type, direction).await
    }

    pub async fn record_session(&mut self, session: &Session) -> Result<()> {
        queries::record_session(&mut self.tx, session).await
    }

    /// Publish every write made in this scope
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    /// Discard every write made in this scope
    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::properties;
    use serde_json::json;
    use std::time::Duration;

    async fn create_store() -> GraphStore {
        GraphStore::in_memory().await.expect("Failed to create store")
    }

    #[tokio::test]
    async fn test_node_round_trip_preserves_nested_values() {
        let store = create_store().await;
        let props = properties(json!({
            "name": "backend",
            "count": 3,
            "ratio": 3.0,
            "tags": ["rust", "sql"],
            "nested": {"deep": {"flag": true, "none": null}}
        }));

        let id = store
            .upsert_node(NodeType::Agent, props.clone(), None)
            .await
            .unwrap();
        let node = store.get_node(&id).await.unwrap().expect("node should exist");

        assert_eq!(node.node_type, NodeType::Agent);
        assert_eq!(node.properties, props);
        assert!(node.properties["count"].is_i64());
        assert!(node.properties["ratio"].is_f64());
        assert_eq!(node.created_at, node.updated_at);
    }

    #[tokio::test]
    async fn test_float_properties_round_trip_exactly() {
        let store = create_store().await;
        let values = [
            1.0715660391465826e-75,
            -1.81996730402717e-179,
            -1.603964615428183e143,
            0.1 + 0.2,
            f64::MIN_POSITIVE,
            f64::MAX,
        ];

        for value in values {
            let props = properties(json!({ "v": value }));
            let id = store.upsert_node(NodeType::KnowledgeChunk, props, None).await.unwrap();
            let node = store.get_node(&id).await.unwrap().unwrap();
            let stored = node.properties["v"].as_f64().unwrap();
            assert_eq!(stored.to_bits(), value.to_bits(), "{} came back as {}", value, stored);
        }

        let props = properties(json!({ "big": u64::MAX, "neg": i64::MIN }));
        let id = store.upsert_node(NodeType::Source, props.clone(), None).await.unwrap();
        assert_eq!(store.get_node(&id).await.unwrap().unwrap().properties, props);
    }

    #[tokio::test]
    async fn test_upsert_replaces_properties() {
        let store = create_store().await;
        let id = store
            .upsert_node(
                NodeType::Source,
                properties(json!({"url": "a", "stale": 1})),
                Some("src-1"),
            )
            .await
            .unwrap();
        assert_eq!(id, "src-1");
        let first = store.get_node(&id).await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        store
            .upsert_node(NodeType::Source, properties(json!({"url": "b"})), Some("src-1"))
            .await
            .unwrap();
        let second = store.get_node(&id).await.unwrap().unwrap();

        assert_eq!(second.properties, properties(json!({"url": "b"})));
        assert!(second.property("stale").is_none());
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);

        let all = store.find_nodes(None, None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_edges_are_kept() {
        let store = create_store().await;
        let a = store
            .upsert_node(NodeType::Agent, Properties::new(), None)
            .await
            .unwrap();
        let b = store
            .upsert_node(NodeType::Skill, Properties::new(), None)
            .await
            .unwrap();

        let e1 = store
            .add_edge(&a, &b, RelationshipType::SpecializesIn, None, DEFAULT_WEIGHT)
            .await
            .unwrap();
        let e2 = store
            .add_edge(&a, &b, RelationshipType::SpecializesIn, None, DEFAULT_WEIGHT)
            .await
            .unwrap();

        assert_ne!(e1, e2);
        assert!(store.get_edge(&e1).await.unwrap().is_some());
        assert!(store.get_edge(&e2).await.unwrap().is_some());

        let edges = store
            .get_relationships(&a, Some(&RelationshipType::SpecializesIn), Direction::Outgoing)
            .await
            .unwrap();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].id, e1);
        assert_eq!(edges[1].id, e2);
    }

    #[tokio::test]
    async fn test_edge_properties_and_weight() {
        let store = create_store().await;
        let id = store
            .add_edge(
                "s",
                "t",
                RelationshipType::Contains,
                Some(properties(json!({"session_id": "x"}))),
                0.75,
            )
            .await
            .unwrap();

        let edge = store.get_edge(&id).await.unwrap().unwrap();
        assert_eq!(edge.weight, 0.75);
        assert_eq!(edge.properties["session_id"], json!("x"));
        assert_eq!(edge.relationship_type, RelationshipType::Contains);

        let bare = store
            .add_edge("s", "t", RelationshipType::Contains, None, DEFAULT_WEIGHT)
            .await
            .unwrap();
        let bare = store.get_edge(&bare).await.unwrap().unwrap();
        assert!(bare.properties.is_empty());
        assert_eq!(bare.weight, 1.0);
    }

    #[tokio::test]
    async fn test_find_nodes_with_filter() {
        let store = create_store().await;
        for name in ["alpha", "beta", "alpha"] {
            store
                .upsert_node(NodeType::Agent, properties(json!({"name": name})), None)
                .await
                .unwrap();
        }
        store
            .upsert_node(NodeType::Skill, properties(json!({"name": "alpha"})), None)
            .await
            .unwrap();

        let agents = store.find_nodes(Some(&NodeType::Agent), None).await.unwrap();
        assert_eq!(agents.len(), 3);

        let filter = properties(json!({"name": "alpha"}));
        let alphas = store
            .find_nodes(Some(&NodeType::Agent), Some(&filter))
            .await
            .unwrap();
        assert_eq!(alphas.len(), 2);

        let first = store.find_node(&NodeType::Agent, &filter).await.unwrap().unwrap();
        assert_eq!(first.id, alphas[0].id);

        let everything = store.find_nodes(None, Some(&filter)).await.unwrap();
        assert_eq!(everything.len(), 3);

        let missing = properties(json!({"title": null}));
        let untitled = store
            .find_nodes(Some(&NodeType::Agent), Some(&missing))
            .await
            .unwrap();
        assert_eq!(untitled.len(), 3);

        let unknown = store
            .find_node(&NodeType::Agent, &properties(json!({"name": "gamma"})))
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_relationship_directions() {
        let store = create_store().await;
        let a = store.upsert_node(NodeType::Agent, Properties::new(), None).await.unwrap();
        let b = store.upsert_node(NodeType::Source, Properties::new(), None).await.unwrap();
        let c = store
            .upsert_node(NodeType::KnowledgeChunk, Properties::new(), None)
            .await
            .unwrap();

        store.add_edge(&a, &b, RelationshipType::ExtractsFrom, None, 1.0).await.unwrap();
        store.add_edge(&b, &c, RelationshipType::Contains, None, 1.0).await.unwrap();
        store.add_edge(&a, &c, RelationshipType::LearnsFrom, None, 1.0).await.unwrap();

        let out = store.get_relationships(&b, None, Direction::Outgoing).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target_id, c);

        let incoming = store.get_relationships(&b, None, Direction::Incoming).await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].source_id, a);

        let both = store.get_relationships(&b, None, Direction::Both).await.unwrap();
        assert_eq!(both.len(), 2);

        let learns = store
            .get_relationships(&c, Some(&RelationshipType::LearnsFrom), Direction::Both)
            .await
            .unwrap();
        assert_eq!(learns.len(), 1);
        assert_eq!(learns[0].source_id, a);

        let none = store.get_relationships("nope", None, Direction::Both).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_statistics() {
        let store = create_store().await;
        let a = store.upsert_node(NodeType::Agent, Properties::new(), None).await.unwrap();
        let t = store.upsert_node(NodeType::Technology, Properties::new(), None).await.unwrap();
        store
            .upsert_node(NodeType::Other("Team".into()), Properties::new(), None)
            .await
            .unwrap();
        store.add_edge(&a, &t, RelationshipType::Requires, None, 1.0).await.unwrap();

        store
            .record_session(&Session::new("backend", "repo-1", "github", 4, 100, Properties::new()))
            .await
            .unwrap();
        store
            .record_session(&Session::new("backend", "repo-2", "github", 2, 50, Properties::new()))
            .await
            .unwrap();

        let stats = store.get_statistics(None).await.unwrap();
        assert_eq!(stats.nodes_of(&NodeType::Agent), 1);
        assert_eq!(stats.nodes_of(&NodeType::Other("Team".into())), 1);
        assert_eq!(stats.nodes_of(&NodeType::Skill), 0);
        assert_eq!(stats.edges_of(&RelationshipType::Requires), 1);
        assert_eq!(stats.total_nodes(), 3);
        assert!(stats.agent.is_none());

        let stats = store.get_statistics(Some("backend")).await.unwrap();
        assert_eq!(
            stats.agent,
            Some(AgentStatistics {
                session_count: 2,
                total_chunks: 6,
                total_tokens: 150
            })
        );

        let stats = store.get_statistics(Some("nobody")).await.unwrap();
        assert_eq!(stats.agent, Some(AgentStatistics::default()));
    }

    #[tokio::test]
    async fn test_sessions_listed_in_order() {
        let store = create_store().await;
        let mut metadata = Properties::new();
        metadata.insert("branch".into(), json!("main"));

        let first = Session::new("backend", "repo-1", "github", 1, 10, metadata.clone());
        let second = Session::new("backend", "repo-2", "github", 2, 20, Properties::new());
        store.record_session(&first).await.unwrap();
        store.record_session(&second).await.unwrap();
        store
            .record_session(&Session::new("frontend", "repo-3", "github", 3, 30, Properties::new()))
            .await
            .unwrap();

        let sessions = store.list_sessions("backend").await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, first.id);
        assert_eq!(sessions[0].extraction_metadata, metadata);
        assert_eq!(sessions[1].id, second.id);
    }

    #[tokio::test]
    async fn test_oversized_session_totals_rejected() {
        let store = create_store().await;
        let too_big = i64::MAX as u64 + 1;
        let session = Session::new("backend", "repo", "github", 1, too_big, Properties::new());

        let err = store.record_session(&session).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(store.list_sessions("backend").await.unwrap().is_empty());

        let largest =
            Session::new("backend", "repo", "github", 1, i64::MAX as u64, Properties::new());
        store.record_session(&largest).await.unwrap();
        assert_eq!(store.list_sessions("backend").await.unwrap()[0].total_tokens, i64::MAX as u64);
    }

    #[tokio::test]
    async fn test_unknown_tags_survive() {
        let store = create_store().await;
        let a = store
            .upsert_node(NodeType::Other("Repository".into()), Properties::new(), None)
            .await
            .unwrap();
        let e = store
            .add_edge(&a, &a, RelationshipType::Other("FORKED_FROM".into()), None, 1.0)
            .await
            .unwrap();

        let node = store.get_node(&a).await.unwrap().unwrap();
        assert_eq!(node.node_type, NodeType::Other("Repository".into()));
        let edge = store.get_edge(&e).await.unwrap().unwrap();
        assert_eq!(edge.relationship_type, RelationshipType::Other("FORKED_FROM".into()));

        // a self-loop appears once when matching both directions
        let both = store.get_relationships(&a, None, Direction::Both).await.unwrap();
        assert_eq!(both.len(), 1);
    }

    #[tokio::test]
    async fn test_transaction_commit_and_rollback() {
        let store = create_store().await;

        let mut tx = store.begin().await.unwrap();
        let kept = tx
            .upsert_node(NodeType::Agent, properties(json!({"name": "kept"})), None)
            .await
            .unwrap();
        assert!(tx.get_node(&kept).await.unwrap().is_some());
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let dropped = tx
            .upsert_node(NodeType::Agent, properties(json!({"name": "dropped"})), None)
            .await
            .unwrap();
        tx.add_edge(&kept, &dropped, RelationshipType::LearnsFrom, None, 1.0)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.upsert_node(NodeType::Agent, Properties::new(), Some("never"))
            .await
            .unwrap();
        drop(tx);

        assert!(store.get_node(&kept).await.unwrap().is_some());
        assert!(store.get_node(&dropped).await.unwrap().is_none());
        assert!(store.get_node("never").await.unwrap().is_none());
        let stats = store.get_statistics(None).await.unwrap();
        assert_eq!(stats.total_edges(), 0);
    }

    #[tokio::test]
    async fn test_closed_store_fails() {
        let store = create_store().await;
        store.close().await;
        store.close().await;
        assert!(store.is_closed());

        let err = store.get_node("x").await.unwrap_err();
        assert!(err.is_storage());
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kb.db");

        let store = GraphStore::open(&path).await.unwrap();
        let id = store
            .upsert_node(NodeType::Agent, properties(json!({"name": "persisted"})), None)
            .await
            .unwrap();
        store.close().await;

        let reopened = GraphStore::open(&path).await.unwrap();
        let node = reopened.get_node(&id).await.unwrap().unwrap();
        assert_eq!(node.str_property("name"), Some("persisted"));
        reopened.close().await;
    }
}
