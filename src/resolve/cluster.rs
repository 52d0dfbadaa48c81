//! Candidate graph and transitive clustering.
//!
//! Nodes are every record under consideration, singletons included; an edge
//! joins two records whose pair was accepted. Clusters are the connected
//! components, so matches chain: A~B and B~C put A, B and C together whether
//! or not A~C was ever scored.

use std::collections::{BTreeMap, HashMap};

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;

use crate::models::{Cluster, PairKey};

/// Undirected graph of record ids; edge weights keep the accepted score
#[derive(Debug, Clone, Default)]
pub struct CandidateGraph {
    graph: UnGraph<String, f64>,
    nodes: HashMap<String, NodeIndex>,
}

impl CandidateGraph {
    /// Graph with one node per id and no edges
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut graph = Self::default();
        for id in ids {
            graph.add_node(id.into());
        }
        graph
    }

    fn add_node(&mut self, id: String) -> NodeIndex {
        if let Some(ix) = self.nodes.get(&id) {
            return *ix;
        }
        let ix = self.graph.add_node(id.clone());
        self.nodes.insert(id, ix);
        ix
    }

    /// Add an accepted pair. Returns false if either id is not a node.
    pub fn add_edge(&mut self, pair: &PairKey, score: f64) -> bool {
        match (self.nodes.get(&pair.a), self.nodes.get(&pair.b)) {
            (Some(&a), Some(&b)) => {
                self.graph.update_edge(a, b, score);
                true
            }
            _ => false,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Connected components, each sorted, ordered by lead id
    pub fn clusters(&self) -> Vec<Cluster> {
        let mut components = UnionFind::<usize>::new(self.graph.node_count());
        for edge in self.graph.raw_edges() {
            components.union(edge.source().index(), edge.target().index());
        }

        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for ix in self.graph.node_indices() {
            groups
                .entry(components.find(ix.index()))
                .or_default()
                .push(self.graph[ix].clone());
        }

        let mut clusters: Vec<Cluster> = groups.into_values().map(Cluster::new).collect();
        clusters.sort();
        clusters
    }
}
