//! Path layout: pick overlap edges so that every vertex keeps at most one of them and no cycle
//! forms, then chain the reads through their same-sequence edges.
use crate::config::{LayoutAlgorithm, LayoutConfig};
use crate::find_union::FindUnion;
use crate::graph::{AssemblyGraph, EdgeId, Vertex};
use std::collections::{HashMap, HashSet};

pub trait LayoutStrategy {
    /// Paths as ordered edge lists, each starting and ending with a same-sequence edge.
    fn find_paths(&self, graph: &AssemblyGraph) -> Vec<Vec<EdgeId>>;
}

/// Offers edges from the cheapest to the most expensive.
#[derive(Debug, Clone, Copy)]
pub struct KruskalPath {
    pub min_reads: usize,
}

/// Offers edges from the highest to the lowest score.
#[derive(Debug, Clone, Copy)]
pub struct GreedyScorePath {
    pub min_reads: usize,
}

impl LayoutStrategy for KruskalPath {
    fn find_paths(&self, graph: &AssemblyGraph) -> Vec<Vec<EdgeId>> {
        let mut edges = overlap_edges(graph);
        edges.sort_by(|&a, &b| {
            let (ea, eb) = (graph.edge(a), graph.edge(b));
            ea.cost
                .cmp(&eb.cost)
                .then(eb.score.total_cmp(&ea.score))
                .then(endpoint_key(graph, a).cmp(&endpoint_key(graph, b)))
        });
        chain_paths(graph, &select_edges(graph, &edges), self.min_reads)
    }
}

impl LayoutStrategy for GreedyScorePath {
    fn find_paths(&self, graph: &AssemblyGraph) -> Vec<Vec<EdgeId>> {
        let mut edges = overlap_edges(graph);
        edges.sort_by(|&a, &b| {
            let (ea, eb) = (graph.edge(a), graph.edge(b));
            eb.score
                .total_cmp(&ea.score)
                .then(ea.cost.cmp(&eb.cost))
                .then(endpoint_key(graph, a).cmp(&endpoint_key(graph, b)))
        });
        chain_paths(graph, &select_edges(graph, &edges), self.min_reads)
    }
}

/// The layout strategy named in the configuration.
pub fn strategy(config: &LayoutConfig) -> Box<dyn LayoutStrategy> {
    let min_reads = config.ploidy_adjusted_min_path_length();
    match config.algorithm {
        LayoutAlgorithm::Kruskal => Box::new(KruskalPath { min_reads }),
        LayoutAlgorithm::GreedyScore => Box::new(GreedyScorePath { min_reads }),
    }
}

fn overlap_edges(graph: &AssemblyGraph) -> Vec<EdgeId> {
    graph
        .edges()
        .into_iter()
        .filter(|&id| !graph.edge(id).is_same_sequence())
        .collect()
}

// Edge ids depend on the insertion order, vertex ids do not.
fn endpoint_key(graph: &AssemblyGraph, id: EdgeId) -> (usize, usize) {
    let edge = graph.edge(id);
    let (u1, u2) = (edge.vertex1.unique_id(), edge.vertex2.unique_id());
    (u1.min(u2), u1.max(u2))
}

fn select_edges(graph: &AssemblyGraph, ordered: &[EdgeId]) -> HashMap<usize, EdgeId> {
    let mut components = FindUnion::new(graph.num_sequences());
    let mut selected: HashMap<usize, EdgeId> = HashMap::new();
    for &id in ordered {
        let edge = graph.edge(id);
        let (u1, u2) = (edge.vertex1.unique_id(), edge.vertex2.unique_id());
        if selected.contains_key(&u1) || selected.contains_key(&u2) {
            continue;
        }
        if components.unite(edge.vertex1.sequence, edge.vertex2.sequence) != Some(true) {
            continue;
        }
        selected.insert(u1, id);
        selected.insert(u2, id);
    }
    debug!("LAYOUTEDGES\t{}", selected.len() / 2);
    selected
}

/// Walk every chain of selected edges from one of its ends.
fn chain_paths(
    graph: &AssemblyGraph,
    selected: &HashMap<usize, EdgeId>,
    min_reads: usize,
) -> Vec<Vec<EdgeId>> {
    let mut sequences: Vec<usize> = graph
        .vertices()
        .into_iter()
        .filter(|v| v.is_start)
        .map(|v| v.sequence)
        .collect();
    sequences.sort_unstable();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut paths = vec![];
    for seq in sequences {
        if visited.contains(&seq) {
            continue;
        }
        let (start, end) = (Vertex::new(seq, true), Vertex::new(seq, false));
        let mut entry = if !selected.contains_key(&start.unique_id()) {
            start
        } else if !selected.contains_key(&end.unique_id()) {
            end
        } else {
            // Inside a chain. Reached from one of its ends.
            continue;
        };
        let mut path = vec![];
        let mut num_reads = 0;
        loop {
            visited.insert(entry.sequence);
            num_reads += 1;
            path.push(graph.same_sequence_edge_of(entry));
            let exit = entry.mate();
            let Some(&id) = selected.get(&exit.unique_id()) else {
                break;
            };
            path.push(id);
            entry = match graph.edge(id).connecting_vertex(exit) {
                Some(next) => next,
                None => unreachable!("Edge {} does not touch {}", graph.edge(id), exit),
            };
        }
        if min_reads <= num_reads {
            paths.push(path);
        }
    }
    paths
}

impl AssemblyGraph {
    /// Find and store the layout paths. Returns the number of paths stored.
    pub fn build_layout(&mut self, strategy: &dyn LayoutStrategy) -> usize {
        let paths = strategy.find_paths(self);
        let num_paths = paths.len();
        for path in paths {
            self.add_path(path);
        }
        info!("LAYOUT\t{}", num_paths);
        num_paths
    }
}
