//! SQLite storage backend for cogmap

use super::traits::{
    ChangeSet, GraphStore, OpenStore, StorageError, StorageResult, VersionHeader,
};
use crate::graph::{
    ActorId, Comment, Edge, EdgeId, GraphId, GraphSnapshot, KnowledgeGraph, Node, NodeId, Version,
    VersionId,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Raw node columns, in `NODE_COLUMNS` order
type NodeRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    Option<String>,
);

/// Raw graph columns, in `GRAPH_COLUMNS` order
type GraphRow = (String, Option<String>, String, Option<String>, i64, String);

const NODE_COLUMNS: &str =
    "id, graph_id, label, description, node_type, color, comments_json, owner_id";
const EDGE_COLUMNS: &str = "id, graph_id, source_id, target_id, label";
const GRAPH_COLUMNS: &str =
    "id, title, owner_id, current_version_id, last_sequence, created_at";

/// SQLite-backed graph store
///
/// Uses a single SQLite database with tables for graphs, nodes, edges and
/// versions. Thread-safe via an internal mutex on the connection; every
/// mutating operation runs inside one transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS graphs (
                id TEXT PRIMARY KEY,
                title TEXT,
                owner_id TEXT NOT NULL,
                current_version_id TEXT,
                last_sequence INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            -- Node ids are globally unique, not just per graph
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                graph_id TEXT NOT NULL,
                label TEXT,
                description TEXT,
                node_type TEXT,
                color TEXT,
                comments_json TEXT NOT NULL DEFAULT '[]',
                owner_id TEXT,
                FOREIGN KEY (graph_id) REFERENCES graphs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_graph
                ON nodes(graph_id);

            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                graph_id TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                label TEXT,
                FOREIGN KEY (graph_id) REFERENCES graphs(id) ON DELETE CASCADE,
                FOREIGN KEY (source_id) REFERENCES nodes(id) ON DELETE CASCADE,
                FOREIGN KEY (target_id) REFERENCES nodes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_edges_graph
                ON edges(graph_id);
            CREATE INDEX IF NOT EXISTS idx_edges_source
                ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target
                ON edges(target_id);

            CREATE TABLE IF NOT EXISTS versions (
                id TEXT PRIMARY KEY,
                graph_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                snapshot_json TEXT NOT NULL,
                node_count INTEGER NOT NULL,
                edge_count INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (graph_id, sequence),
                FOREIGN KEY (graph_id) REFERENCES graphs(id) ON DELETE CASCADE
            );

            -- Enable foreign keys
            PRAGMA foreign_keys = ON;

            -- Enable WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::DateParse(e.to_string()))
    }

    fn row_to_node(row: NodeRow) -> StorageResult<Node> {
        let (id, graph_id, label, description, node_type, color, comments_json, owner_id) = row;
        Ok(Node {
            id: NodeId::from_string(id),
            graph_id: GraphId::from_string(graph_id),
            label,
            description,
            node_type,
            color,
            comments: serde_json::from_str(&comments_json)?,
            owner_id: owner_id.map(ActorId::new),
        })
    }

    fn row_to_graph(row: GraphRow) -> StorageResult<KnowledgeGraph> {
        let (id, title, owner_id, current_version_id, last_sequence, created_at) = row;
        Ok(KnowledgeGraph {
            id: GraphId::from_string(id),
            title,
            owner_id: ActorId::new(owner_id),
            current_version_id: current_version_id.map(VersionId::from_string),
            last_sequence: last_sequence.max(0) as u64,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    fn graph_exists(conn: &Connection, graph_id: &GraphId) -> StorageResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM graphs WHERE id = ?1",
            params![graph_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn require_graph(conn: &Connection, graph_id: &GraphId) -> StorageResult<()> {
        if Self::graph_exists(conn, graph_id)? {
            Ok(())
        } else {
            Err(StorageError::GraphNotFound(graph_id.to_string()))
        }
    }

    fn node_exists(conn: &Connection, graph_id: &GraphId, node_id: &NodeId) -> StorageResult<bool> {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM nodes WHERE graph_id = ?1 AND id = ?2",
            params![graph_id.as_str(), node_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn insert_node(conn: &Connection, graph_id: &GraphId, node: &Node) -> StorageResult<()> {
        let comments_json = serde_json::to_string(&node.comments)?;
        conn.execute(
            r#"
            INSERT INTO nodes (id, graph_id, label, description, node_type, color, comments_json, owner_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                node.id.as_str(),
                graph_id.as_str(),
                node.label,
                node.description,
                node.node_type,
                node.color,
                comments_json,
                node.owner_id.as_ref().map(|o| o.as_str()),
            ],
        )?;
        Ok(())
    }

    /// Insert an edge if both endpoints are nodes of the graph.
    ///
    /// Returns false (and stores nothing) for a dangling edge.
    fn insert_edge(conn: &Connection, graph_id: &GraphId, edge: &Edge) -> StorageResult<bool> {
        if !Self::node_exists(conn, graph_id, &edge.source)?
            || !Self::node_exists(conn, graph_id, &edge.target)?
        {
            tracing::warn!(
                graph_id = %graph_id,
                source = %edge.source,
                target = %edge.target,
                "dropping edge with endpoint outside the graph"
            );
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO edges (id, graph_id, source_id, target_id, label) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                edge.id.as_str(),
                graph_id.as_str(),
                edge.source.as_str(),
                edge.target.as_str(),
                edge.label,
            ],
        )?;
        Ok(true)
    }

    fn query_nodes(conn: &Connection, graph_id: &GraphId) -> StorageResult<Vec<Node>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM nodes WHERE graph_id = ?1 ORDER BY rowid",
            NODE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![graph_id.as_str()], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
                row.get(6)?,
                row.get(7)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(Self::row_to_node(row?)?);
        }
        Ok(nodes)
    }

    fn query_edges(conn: &Connection, graph_id: &GraphId) -> StorageResult<Vec<Edge>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM edges WHERE graph_id = ?1 ORDER BY rowid",
            EDGE_COLUMNS
        ))?;
        let rows = stmt.query_map(params![graph_id.as_str()], |row| {
            Ok(Edge {
                id: EdgeId::from_string(row.get::<_, String>(0)?),
                graph_id: GraphId::from_string(row.get::<_, String>(1)?),
                source: NodeId::from_string(row.get::<_, String>(2)?),
                target: NodeId::from_string(row.get::<_, String>(3)?),
                label: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StorageError::from)
    }

    /// Delete every node and edge of a graph and insert `snapshot` verbatim
    fn replace_contents(
        conn: &Connection,
        graph_id: &GraphId,
        snapshot: &GraphSnapshot,
    ) -> StorageResult<()> {
        conn.execute("DELETE FROM edges WHERE graph_id = ?1", params![graph_id.as_str()])?;
        conn.execute("DELETE FROM nodes WHERE graph_id = ?1", params![graph_id.as_str()])?;
        for node in &snapshot.nodes {
            Self::insert_node(conn, graph_id, node)?;
        }
        for edge in &snapshot.edges {
            Self::insert_edge(conn, graph_id, edge)?;
        }
        Ok(())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    // === Graph Operations ===

    fn create_graph(&self, graph: &KnowledgeGraph) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO graphs (id, title, owner_id, current_version_id, last_sequence, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                graph.id.as_str(),
                graph.title,
                graph.owner_id.as_str(),
                graph.current_version_id.as_ref().map(|v| v.as_str()),
                graph.last_sequence as i64,
                graph.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn load_graph(&self, id: &GraphId) -> StorageResult<Option<KnowledgeGraph>> {
        let conn = self.conn()?;
        let row: Option<GraphRow> = conn
            .query_row(
                &format!("SELECT {} FROM graphs WHERE id = ?1", GRAPH_COLUMNS),
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .optional()?;

        row.map(Self::row_to_graph).transpose()
    }

    fn list_graphs(&self) -> StorageResult<Vec<KnowledgeGraph>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM graphs ORDER BY title, created_at",
            GRAPH_COLUMNS
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })?;

        let mut graphs = Vec::new();
        for row in rows {
            graphs.push(Self::row_to_graph(row?)?);
        }
        Ok(graphs)
    }

    fn rename_graph(&self, id: &GraphId, title: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE graphs SET title = ?2 WHERE id = ?1",
            params![id.as_str(), title],
        )?;
        Ok(updated > 0)
    }

    fn delete_graph(&self, id: &GraphId) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        // Explicit cascade, so correctness doesn't hinge on the FK pragma
        tx.execute("DELETE FROM edges WHERE graph_id = ?1", params![id.as_str()])?;
        tx.execute("DELETE FROM nodes WHERE graph_id = ?1", params![id.as_str()])?;
        tx.execute("DELETE FROM versions WHERE graph_id = ?1", params![id.as_str()])?;
        let deleted = tx.execute("DELETE FROM graphs WHERE id = ?1", params![id.as_str()])?;

        tx.commit()?;
        Ok(deleted > 0)
    }

    // === Node Operations ===

    fn load_node(&self, graph_id: &GraphId, node_id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.conn()?;
        let row: Option<NodeRow> = conn
            .query_row(
                &format!(
                    "SELECT {} FROM nodes WHERE graph_id = ?1 AND id = ?2",
                    NODE_COLUMNS
                ),
                params![graph_id.as_str(), node_id.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                },
            )
            .optional()?;

        row.map(Self::row_to_node).transpose()
    }

    fn load_nodes(&self, graph_id: &GraphId) -> StorageResult<Vec<Node>> {
        let conn = self.conn()?;
        Self::query_nodes(&conn, graph_id)
    }

    fn delete_node(&self, graph_id: &GraphId, node_id: &NodeId) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        if !Self::node_exists(&tx, graph_id, node_id)? {
            return Ok(false);
        }

        // Cascade: incident edges in both directions
        tx.execute(
            "DELETE FROM edges WHERE graph_id = ?1 AND (source_id = ?2 OR target_id = ?2)",
            params![graph_id.as_str(), node_id.as_str()],
        )?;
        tx.execute(
            "DELETE FROM nodes WHERE graph_id = ?1 AND id = ?2",
            params![graph_id.as_str(), node_id.as_str()],
        )?;

        tx.commit()?;
        Ok(true)
    }

    fn append_comment(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        comment: &Comment,
    ) -> StorageResult<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT comments_json FROM nodes WHERE graph_id = ?1 AND id = ?2",
                params![graph_id.as_str(), node_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(existing) = existing else {
            return Ok(false);
        };

        let mut comments: Vec<Comment> = serde_json::from_str(&existing)?;
        comments.push(comment.clone());
        tx.execute(
            "UPDATE nodes SET comments_json = ?3 WHERE graph_id = ?1 AND id = ?2",
            params![
                graph_id.as_str(),
                node_id.as_str(),
                serde_json::to_string(&comments)?
            ],
        )?;

        tx.commit()?;
        Ok(true)
    }

    // === Edge Operations ===

    fn load_edges(&self, graph_id: &GraphId) -> StorageResult<Vec<Edge>> {
        let conn = self.conn()?;
        Self::query_edges(&conn, graph_id)
    }

    // === Bulk Operations ===

    fn load_snapshot(&self, graph_id: &GraphId) -> StorageResult<GraphSnapshot> {
        // One lock for both reads so the pair is consistent
        let conn = self.conn()?;
        Ok(GraphSnapshot::new(
            Self::query_nodes(&conn, graph_id)?,
            Self::query_edges(&conn, graph_id)?,
        ))
    }

    fn apply_changes(&self, graph_id: &GraphId, changes: &ChangeSet) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::require_graph(&tx, graph_id)?;

        for node in &changes.created {
            Self::insert_node(&tx, graph_id, node)?;
        }

        for patch in &changes.patched {
            let updated = tx.execute(
                r#"
                UPDATE nodes SET
                    label = COALESCE(?3, label),
                    description = COALESCE(?4, description),
                    node_type = COALESCE(?5, node_type),
                    color = COALESCE(?6, color)
                WHERE graph_id = ?1 AND id = ?2
                "#,
                params![
                    graph_id.as_str(),
                    patch.id.as_str(),
                    patch.label,
                    patch.description,
                    patch.node_type,
                    patch.color,
                ],
            )?;
            if updated == 0 {
                // Dropping `tx` rolls back everything above
                return Err(StorageError::NodeNotFound(patch.id.to_string()));
            }
        }

        tx.execute("DELETE FROM edges WHERE graph_id = ?1", params![graph_id.as_str()])?;
        for edge in &changes.edges {
            Self::insert_edge(&tx, graph_id, edge)?;
        }

        tx.commit()?;
        Ok(())
    }

    // === Version Operations ===

    fn list_versions(&self, graph_id: &GraphId) -> StorageResult<Vec<VersionHeader>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, sequence, created_at, node_count, edge_count
            FROM versions WHERE graph_id = ?1 ORDER BY sequence
            "#,
        )?;
        let rows = stmt.query_map(params![graph_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut headers = Vec::new();
        for row in rows {
            let (id, sequence, created_at, node_count, edge_count) = row?;
            headers.push(VersionHeader {
                id: VersionId::from_string(id),
                graph_id: graph_id.clone(),
                sequence: sequence.max(0) as u64,
                created_at: Self::parse_timestamp(&created_at)?,
                node_count: node_count.max(0) as usize,
                edge_count: edge_count.max(0) as usize,
            });
        }
        Ok(headers)
    }

    fn load_version(
        &self,
        graph_id: &GraphId,
        version_id: &VersionId,
    ) -> StorageResult<Option<Version>> {
        let conn = self.conn()?;
        let row: Option<(i64, String, String)> = conn
            .query_row(
                "SELECT sequence, snapshot_json, created_at FROM versions WHERE graph_id = ?1 AND id = ?2",
                params![graph_id.as_str(), version_id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((sequence, snapshot_json, created_at)) => Ok(Some(Version {
                id: version_id.clone(),
                graph_id: graph_id.clone(),
                sequence: sequence.max(0) as u64,
                snapshot: serde_json::from_str(&snapshot_json)?,
                created_at: Self::parse_timestamp(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    fn append_version(&self, version: &Version, prune_after: Option<u64>) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::require_graph(&tx, &version.graph_id)?;

        if let Some(sequence) = prune_after {
            let pruned = tx.execute(
                "DELETE FROM versions WHERE graph_id = ?1 AND sequence > ?2",
                params![version.graph_id.as_str(), sequence as i64],
            )?;
            if pruned > 0 {
                tracing::debug!(
                    graph_id = %version.graph_id,
                    pruned,
                    after = sequence,
                    "pruned abandoned versions"
                );
            }
        }

        tx.execute(
            r#"
            INSERT INTO versions (id, graph_id, sequence, snapshot_json, node_count, edge_count, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                version.id.as_str(),
                version.graph_id.as_str(),
                version.sequence as i64,
                serde_json::to_string(&version.snapshot)?,
                version.snapshot.nodes.len() as i64,
                version.snapshot.edges.len() as i64,
                version.created_at.to_rfc3339(),
            ],
        )?;

        tx.execute(
            r#"
            UPDATE graphs SET
                current_version_id = ?2,
                last_sequence = MAX(last_sequence, ?3)
            WHERE id = ?1
            "#,
            params![
                version.graph_id.as_str(),
                version.id.as_str(),
                version.sequence as i64
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn restore_version(
        &self,
        graph_id: &GraphId,
        version_id: &VersionId,
        snapshot: &GraphSnapshot,
    ) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        Self::require_graph(&tx, graph_id)?;

        let belongs: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM versions WHERE graph_id = ?1 AND id = ?2",
            params![graph_id.as_str(), version_id.as_str()],
            |row| row.get(0),
        )?;
        if !belongs {
            return Err(StorageError::VersionNotFound(version_id.to_string()));
        }

        Self::replace_contents(&tx, graph_id, snapshot)?;
        tx.execute(
            "UPDATE graphs SET current_version_id = ?2 WHERE id = ?1",
            params![graph_id.as_str(), version_id.as_str()],
        )?;

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::NodePatch;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn create_test_graph(store: &SqliteStore) -> GraphId {
        let graph = KnowledgeGraph::new(ActorId::new("owner")).with_title("Test graph");
        let id = graph.id.clone();
        store.create_graph(&graph).unwrap();
        id
    }

    fn create_test_node(graph_id: &GraphId, id: &str, label: &str) -> Node {
        Node::new(graph_id.clone())
            .with_id(NodeId::from_string(id))
            .with_label(label)
            .with_owner(ActorId::new("owner"))
    }

    fn seed(store: &SqliteStore, graph_id: &GraphId, ids: &[&str], edges: &[(&str, &str)]) {
        let changes = ChangeSet {
            created: ids.iter().map(|id| create_test_node(graph_id, id, id)).collect(),
            patched: Vec::new(),
            edges: edges
                .iter()
                .map(|(s, t)| Edge::new(graph_id.clone(), NodeId::from(*s), NodeId::from(*t)))
                .collect(),
        };
        store.apply_changes(graph_id, &changes).unwrap();
    }

    #[test]
    fn test_graph_round_trip() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);

        let loaded = store.load_graph(&graph_id).unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("Test graph"));
        assert_eq!(loaded.owner_id.as_str(), "owner");
        assert!(loaded.current_version_id.is_none());
        assert_eq!(loaded.last_sequence, 0);
    }

    #[test]
    fn test_list_graphs_ordered_by_title() {
        let store = create_test_store();
        for title in ["zeta", "alpha", "mu"] {
            store
                .create_graph(&KnowledgeGraph::new(ActorId::new("u")).with_title(title))
                .unwrap();
        }
        let titles: Vec<_> = store
            .list_graphs()
            .unwrap()
            .into_iter()
            .map(|g| g.title.unwrap())
            .collect();
        assert_eq!(titles, vec!["alpha", "mu", "zeta"]);
    }

    #[test]
    fn test_apply_changes_creates_and_patches() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(&store, &graph_id, &["a"], &[]);

        let mut patch = NodePatch::new(NodeId::from("a"));
        patch.label = Some("renamed".to_string());
        let changes = ChangeSet {
            created: vec![create_test_node(&graph_id, "b", "B")],
            patched: vec![patch],
            edges: vec![Edge::new(graph_id.clone(), NodeId::from("a"), NodeId::from("b"))],
        };
        store.apply_changes(&graph_id, &changes).unwrap();

        let a = store.load_node(&graph_id, &NodeId::from("a")).unwrap().unwrap();
        assert_eq!(a.label.as_deref(), Some("renamed"));
        assert_eq!(a.owner_id, Some(ActorId::new("owner")));
        assert_eq!(store.load_nodes(&graph_id).unwrap().len(), 2);
        assert_eq!(store.load_edges(&graph_id).unwrap().len(), 1);
    }

    #[test]
    fn test_patch_leaves_absent_fields_untouched() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        let node = create_test_node(&graph_id, "a", "A")
            .with_description("original")
            .with_color("#FFB347");
        store
            .apply_changes(
                &graph_id,
                &ChangeSet {
                    created: vec![node],
                    ..Default::default()
                },
            )
            .unwrap();

        let mut patch = NodePatch::new(NodeId::from("a"));
        patch.color = Some("#77DD77".to_string());
        store
            .apply_changes(
                &graph_id,
                &ChangeSet {
                    patched: vec![patch],
                    ..Default::default()
                },
            )
            .unwrap();

        let a = store.load_node(&graph_id, &NodeId::from("a")).unwrap().unwrap();
        assert_eq!(a.description.as_deref(), Some("original"));
        assert_eq!(a.color.as_deref(), Some("#77DD77"));
        assert_eq!(a.label.as_deref(), Some("A"));
    }

    #[test]
    fn test_apply_changes_replaces_edge_set() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(&store, &graph_id, &["a", "b", "c"], &[("a", "b"), ("b", "c")]);

        let changes = ChangeSet {
            edges: vec![Edge::new(graph_id.clone(), NodeId::from("c"), NodeId::from("a"))],
            ..Default::default()
        };
        store.apply_changes(&graph_id, &changes).unwrap();

        let edges = store.load_edges(&graph_id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source.as_str(), "c");
        assert_eq!(edges[0].target.as_str(), "a");
    }

    #[test]
    fn test_dangling_edge_is_never_stored() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(&store, &graph_id, &["a"], &[("a", "ghost")]);
        assert!(store.load_edges(&graph_id).unwrap().is_empty());
    }

    #[test]
    fn test_edge_to_node_of_other_graph_is_dropped() {
        let store = create_test_store();
        let g1 = create_test_graph(&store);
        let g2 = create_test_graph(&store);
        seed(&store, &g1, &["a"], &[]);
        seed(&store, &g2, &["b"], &[]);

        let changes = ChangeSet {
            edges: vec![Edge::new(g2.clone(), NodeId::from("b"), NodeId::from("a"))],
            ..Default::default()
        };
        store.apply_changes(&g2, &changes).unwrap();
        assert!(store.load_edges(&g2).unwrap().is_empty());
    }

    #[test]
    fn test_failed_patch_rolls_back_whole_change_set() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(&store, &graph_id, &["a", "b"], &[("a", "b")]);

        let changes = ChangeSet {
            created: vec![create_test_node(&graph_id, "c", "C")],
            patched: vec![NodePatch::new(NodeId::from("missing"))],
            edges: Vec::new(),
        };
        let err = store.apply_changes(&graph_id, &changes).unwrap_err();
        assert!(matches!(err, StorageError::NodeNotFound(_)));

        // Nothing landed: no new node, old edge intact
        assert_eq!(store.load_nodes(&graph_id).unwrap().len(), 2);
        assert_eq!(store.load_edges(&graph_id).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_node_cascades_only_incident_edges() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(
            &store,
            &graph_id,
            &["a", "b", "c", "d"],
            &[("a", "b"), ("c", "a"), ("c", "d")],
        );

        assert!(store.delete_node(&graph_id, &NodeId::from("a")).unwrap());

        let edges = store.load_edges(&graph_id).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source.as_str(), "c");
        assert_eq!(edges[0].target.as_str(), "d");
        assert!(!store.delete_node(&graph_id, &NodeId::from("a")).unwrap());
    }

    #[test]
    fn test_append_comment_preserves_order() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(&store, &graph_id, &["a"], &[]);

        let first = Comment::new(ActorId::new("u1"), "first");
        let second = Comment::new(ActorId::new("u2"), "second");
        assert!(store.append_comment(&graph_id, &NodeId::from("a"), &first).unwrap());
        assert!(store.append_comment(&graph_id, &NodeId::from("a"), &second).unwrap());

        let a = store.load_node(&graph_id, &NodeId::from("a")).unwrap().unwrap();
        assert_eq!(a.comments, vec![first, second]);
    }

    #[test]
    fn test_append_comment_to_missing_node() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        let c = Comment::new(ActorId::new("u1"), "hello");
        assert!(!store.append_comment(&graph_id, &NodeId::from("nope"), &c).unwrap());
    }

    #[test]
    fn test_append_version_prunes_and_advances_pointer() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);

        let v1 = Version::new(graph_id.clone(), 1, GraphSnapshot::default());
        let v2 = Version::new(graph_id.clone(), 2, GraphSnapshot::default());
        store.append_version(&v1, None).unwrap();
        store.append_version(&v2, None).unwrap();

        // Branch from v1: v2 must disappear
        let v3 = Version::new(graph_id.clone(), 3, GraphSnapshot::default());
        store.append_version(&v3, Some(1)).unwrap();

        let seqs: Vec<u64> = store
            .list_versions(&graph_id)
            .unwrap()
            .iter()
            .map(|h| h.sequence)
            .collect();
        assert_eq!(seqs, vec![1, 3]);

        let graph = store.load_graph(&graph_id).unwrap().unwrap();
        assert_eq!(graph.current_version_id, Some(v3.id));
        assert_eq!(graph.last_sequence, 3);
    }

    #[test]
    fn test_duplicate_sequence_is_rejected() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        store
            .append_version(&Version::new(graph_id.clone(), 1, GraphSnapshot::default()), None)
            .unwrap();
        let dup = Version::new(graph_id.clone(), 1, GraphSnapshot::default());
        assert!(store.append_version(&dup, None).is_err());
    }

    #[test]
    fn test_restore_version_rejects_foreign_version() {
        let store = create_test_store();
        let g1 = create_test_graph(&store);
        let g2 = create_test_graph(&store);
        let v = Version::new(g1.clone(), 1, GraphSnapshot::default());
        store.append_version(&v, None).unwrap();

        let err = store
            .restore_version(&g2, &v.id, &GraphSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, StorageError::VersionNotFound(_)));
    }

    #[test]
    fn test_restore_version_puts_rows_back_verbatim() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(&store, &graph_id, &["a", "b"], &[("a", "b")]);
        let snapshot = store.load_snapshot(&graph_id).unwrap();
        let v = Version::new(graph_id.clone(), 1, snapshot.clone());
        store.append_version(&v, None).unwrap();

        store.delete_node(&graph_id, &NodeId::from("a")).unwrap();
        store.restore_version(&graph_id, &v.id, &snapshot).unwrap();

        assert_eq!(store.load_snapshot(&graph_id).unwrap(), snapshot);
    }

    #[test]
    fn test_delete_graph_cascades() {
        let store = create_test_store();
        let graph_id = create_test_graph(&store);
        seed(&store, &graph_id, &["a", "b"], &[("a", "b")]);
        store
            .append_version(&Version::new(graph_id.clone(), 1, GraphSnapshot::default()), None)
            .unwrap();

        assert!(store.delete_graph(&graph_id).unwrap());
        assert!(store.load_graph(&graph_id).unwrap().is_none());
        assert!(store.load_nodes(&graph_id).unwrap().is_empty());
        assert!(store.load_edges(&graph_id).unwrap().is_empty());
        assert!(store.list_versions(&graph_id).unwrap().is_empty());
        assert!(!store.delete_graph(&graph_id).unwrap());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cogmap.db");

        let graph_id = {
            let store = SqliteStore::open(&path).unwrap();
            let id = create_test_graph(&store);
            seed(&store, &id, &["a"], &[]);
            id
        };

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.load_graph(&graph_id).unwrap().is_some());
        assert_eq!(store.load_nodes(&graph_id).unwrap().len(), 1);
    }
}
