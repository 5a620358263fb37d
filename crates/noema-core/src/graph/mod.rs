//! The graph store: typed nodes/edges, adjacency, JSON persistence, and merge-by-name.

mod node;
mod store;

pub use node::{generate_node_id, normalize_name, Edge, MemoryType, Node, NodeType};
pub use store::{save_snapshot, Graph, GraphDump};
