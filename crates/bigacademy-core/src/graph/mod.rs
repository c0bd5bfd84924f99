//! Property graph - typed nodes and weighted edges over SQLite
//!
//! # Example
//!
//! ```ignore
//! use bigacademy_core::graph::{Direction, GraphStore, NodeType, RelationshipType};
//!
//! let store = GraphStore::in_memory().await?;
//! let agent = store.upsert_node(NodeType::Agent, props, None).await?;
//! let edges = store
//!     .get_relationships(&agent, Some(&RelationshipType::LearnsFrom), Direction::Outgoing)
//!     .await?;
//! ```

pub mod store;
pub mod types;

pub use store::{GraphStore, GraphTransaction, DEFAULT_WEIGHT};
pub use types::{
    properties, AgentStatistics, Direction, Edge, GraphStatistics, Node, NodeType, Properties,
    RelationshipType, Session,
};
