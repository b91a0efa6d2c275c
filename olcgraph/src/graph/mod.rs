//! The assembly graph.
//! Each read owns two vertices (its start and its end) connected by a "same-sequence" edge.
//! Overlaps between reads are edges between vertices of different reads, and containments are
//! embedding relations between reads. Vertices, edges, and embeddings live in arenas addressed
//! by dense integers; removal leaves a tombstone which is dropped by [AssemblyGraph::compact].
use crate::distribution::Distribution;
use definitions::ReadSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub mod embedding;
pub mod sanitize;

pub type EdgeId = usize;
pub type EmbeddingId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Vertex {
    pub sequence: usize,
    pub is_start: bool,
}

impl Vertex {
    pub fn new(sequence: usize, is_start: bool) -> Self {
        Self {
            sequence,
            is_start,
        }
    }
    /// Dense identifier: `2 * sequence` for the start vertex, `2 * sequence + 1` for the end.
    pub fn unique_id(&self) -> usize {
        2 * self.sequence + (!self.is_start) as usize
    }
    pub fn from_unique_id(id: usize) -> Self {
        Self {
            sequence: id / 2,
            is_start: id % 2 == 0,
        }
    }
    /// The other vertex of the same read.
    pub fn mate(&self) -> Self {
        Self {
            sequence: self.sequence,
            is_start: !self.is_start,
        }
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let end = if self.is_start { "S" } else { "E" };
        write!(f, "{}{}", self.sequence, end)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct VertexState {
    degree_unfiltered: usize,
}

/// Which graph objects a relationship connects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoints {
    /// Unique ids of the two vertices of an edge.
    Vertices(usize, usize),
    /// Host and embedded sequence of an embedding.
    Sequences { host: usize, sequence: usize },
}

/// The metrics shared by edges and embeddings, consumed by the scoring.
pub trait Relationship {
    fn overlap(&self) -> usize;
    fn coverage_shared_kmers(&self) -> usize;
    fn weighted_coverage_shared_kmers(&self) -> usize;
    fn mismatches(&self) -> usize;
    fn evidence_proportion(&self) -> f64;
    fn length_sum(&self) -> usize;
    fn endpoints(&self) -> Endpoints;
    fn indels_per_kbp(&self) -> f64 {
        match self.overlap() {
            0 => 0f64,
            ovl => 1000f64 * self.mismatches() as f64 / ovl as f64,
        }
    }
    fn is_embedding(&self) -> bool {
        matches!(self.endpoints(), Endpoints::Sequences { .. })
    }
}

/// An overlap between two reads, or the edge joining the two vertices of the same read.
/// Evidence coordinates are in the forward strand of the respective read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub vertex1: Vertex,
    pub vertex2: Vertex,
    pub overlap: usize,
    pub length1: usize,
    pub length2: usize,
    pub num_shared_kmers: usize,
    pub coverage_shared_kmers: usize,
    pub weighted_coverage_shared_kmers: usize,
    /// Estimated number of indels in the overlap.
    pub mismatches: usize,
    pub overlap_sd: f64,
    pub vertex1_evidence_start: usize,
    pub vertex1_evidence_end: usize,
    pub vertex2_evidence_start: usize,
    pub vertex2_evidence_end: usize,
    pub score: f64,
    pub cost: u64,
    pub is_layout: bool,
}

impl Edge {
    pub fn new(vertex1: Vertex, vertex2: Vertex, overlap: usize, length1: usize, length2: usize) -> Self {
        Self {
            vertex1,
            vertex2,
            overlap,
            length1,
            length2,
            num_shared_kmers: 0,
            coverage_shared_kmers: 0,
            weighted_coverage_shared_kmers: 0,
            mismatches: 0,
            overlap_sd: 0f64,
            vertex1_evidence_start: 0,
            vertex1_evidence_end: 0,
            vertex2_evidence_start: 0,
            vertex2_evidence_end: 0,
            score: 0f64,
            cost: 0,
            is_layout: false,
        }
    }
    /// The trivial edge between the start and the end of a read.
    pub fn same_sequence(sequence: usize, length: usize) -> Self {
        let (start, end) = (Vertex::new(sequence, true), Vertex::new(sequence, false));
        let mut edge = Self::new(start, end, length, length, length);
        edge.num_shared_kmers = length;
        edge.coverage_shared_kmers = length;
        edge.weighted_coverage_shared_kmers = length;
        edge.vertex1_evidence_end = length.saturating_sub(1);
        edge.vertex2_evidence_end = length.saturating_sub(1);
        edge
    }
    pub fn is_same_sequence(&self) -> bool {
        self.vertex1.sequence == self.vertex2.sequence
    }
    pub fn touches(&self, vertex: Vertex) -> bool {
        self.vertex1 == vertex || self.vertex2 == vertex
    }
    /// The other endpoint of the edge, if `vertex` is one of them.
    pub fn connecting_vertex(&self, vertex: Vertex) -> Option<Vertex> {
        if self.vertex1 == vertex {
            Some(self.vertex2)
        } else if self.vertex2 == vertex {
            Some(self.vertex1)
        } else {
            None
        }
    }
    pub fn shared_vertex(&self, other: &Edge) -> Option<Vertex> {
        [self.vertex1, self.vertex2]
            .into_iter()
            .find(|&v| other.touches(v))
    }
    /// Evidenced interval of the overlap on the read of `vertex`.
    pub fn evidence_on(&self, vertex: Vertex) -> Option<(usize, usize)> {
        if self.vertex1 == vertex {
            Some((self.vertex1_evidence_start, self.vertex1_evidence_end))
        } else if self.vertex2 == vertex {
            Some((self.vertex2_evidence_start, self.vertex2_evidence_end))
        } else {
            None
        }
    }
}

impl Relationship for Edge {
    fn overlap(&self) -> usize {
        self.overlap
    }
    fn coverage_shared_kmers(&self) -> usize {
        self.coverage_shared_kmers
    }
    fn weighted_coverage_shared_kmers(&self) -> usize {
        self.weighted_coverage_shared_kmers
    }
    fn mismatches(&self) -> usize {
        self.mismatches
    }
    fn evidence_proportion(&self) -> f64 {
        if self.overlap == 0 {
            return 0f64;
        }
        let span1 = self.vertex1_evidence_end.saturating_sub(self.vertex1_evidence_start);
        let span2 = self.vertex2_evidence_end.saturating_sub(self.vertex2_evidence_start);
        ((span1 + span2) as f64 / (2 * self.overlap) as f64).min(1f64)
    }
    fn length_sum(&self) -> usize {
        self.length1 + self.length2
    }
    fn endpoints(&self) -> Endpoints {
        Endpoints::Vertices(self.vertex1.unique_id(), self.vertex2.unique_id())
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}-{} ovl:{} csk:{} wcsk:{} ev:{:.2} ikbp:{:.1} score:{} cost:{}",
            self.vertex1,
            self.vertex2,
            self.overlap,
            self.coverage_shared_kmers,
            self.weighted_coverage_shared_kmers,
            self.evidence_proportion(),
            self.indels_per_kbp(),
            self.score,
            self.cost
        )
    }
}

/// `sequence` is contained in `host` at `[host_start, host_end)`, forward coordinates of the host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub sequence: usize,
    pub host: usize,
    pub host_start: usize,
    pub host_end: usize,
    pub reverse: bool,
    pub host_evidence_start: usize,
    pub host_evidence_end: usize,
    pub sequence_length: usize,
    pub host_length: usize,
    pub num_shared_kmers: usize,
    pub coverage_shared_kmers: usize,
    pub weighted_coverage_shared_kmers: usize,
    pub mismatches: usize,
    pub score: f64,
    pub cost: u64,
}

impl Embedding {
    pub fn new(
        sequence: usize,
        sequence_length: usize,
        reverse: bool,
        host: usize,
        host_length: usize,
        (host_start, host_end): (usize, usize),
    ) -> Self {
        Self {
            sequence,
            host,
            host_start,
            host_end,
            reverse,
            host_evidence_start: host_start,
            host_evidence_end: host_end,
            sequence_length,
            host_length,
            num_shared_kmers: 0,
            coverage_shared_kmers: 0,
            weighted_coverage_shared_kmers: 0,
            mismatches: 0,
            score: 0f64,
            cost: 0,
        }
    }
}

impl Relationship for Embedding {
    fn overlap(&self) -> usize {
        self.sequence_length
    }
    fn coverage_shared_kmers(&self) -> usize {
        self.coverage_shared_kmers
    }
    fn weighted_coverage_shared_kmers(&self) -> usize {
        self.weighted_coverage_shared_kmers
    }
    fn mismatches(&self) -> usize {
        self.mismatches
    }
    fn evidence_proportion(&self) -> f64 {
        let span = self.host_end.saturating_sub(self.host_start);
        if span == 0 {
            return 0f64;
        }
        let evidence = self
            .host_evidence_end
            .saturating_sub(self.host_evidence_start);
        (evidence as f64 / span as f64).min(1f64)
    }
    fn length_sum(&self) -> usize {
        self.sequence_length + self.host_length
    }
    fn endpoints(&self) -> Endpoints {
        Endpoints::Sequences {
            host: self.host,
            sequence: self.sequence,
        }
    }
}

impl std::fmt::Display for Embedding {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}<{}[{}-{}{}] ev:{}-{} ikbp:{:.1} score:{} cost:{}",
            self.sequence,
            self.host,
            self.host_start,
            self.host_end,
            if self.reverse { "-" } else { "+" },
            self.host_evidence_start,
            self.host_evidence_end,
            self.indels_per_kbp(),
            self.score,
            self.cost
        )
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyGraph {
    reads: Arc<ReadSet>,
    /// Characters replacing the original read, after error correction.
    corrected: HashMap<usize, Vec<u8>>,
    cumulative_lengths: Vec<u64>,
    /// Indexed by vertex unique id.
    vertices: Vec<Option<VertexState>>,
    /// Indexed by vertex unique id.
    adjacency: Vec<Vec<EdgeId>>,
    edges: Vec<Option<Edge>>,
    num_edges: usize,
    embeddings: Vec<Option<Embedding>>,
    embedded_by_host: HashMap<usize, Vec<EmbeddingId>>,
    embedded_by_sequence: HashMap<usize, Vec<EmbeddingId>>,
    paths: Vec<Vec<EdgeId>>,
    ploidy: usize,
}

impl AssemblyGraph {
    pub fn new(reads: Arc<ReadSet>) -> Self {
        let n = reads.len();
        let cumulative_lengths = reads
            .raw_reads
            .iter()
            .scan(0u64, |sum, r| {
                *sum += r.seq.len() as u64;
                Some(*sum)
            })
            .collect();
        let mut graph = Self {
            reads,
            corrected: HashMap::new(),
            cumulative_lengths,
            vertices: vec![Some(VertexState::default()); 2 * n],
            adjacency: vec![vec![]; 2 * n],
            edges: Vec::with_capacity(n),
            num_edges: 0,
            embeddings: vec![],
            embedded_by_host: HashMap::new(),
            embedded_by_sequence: HashMap::new(),
            paths: vec![],
            ploidy: crate::config::DEF_PLOIDY,
        };
        for i in 0..n {
            let length = graph.sequence_length(i);
            graph.add_edge(Edge::same_sequence(i, length));
        }
        graph
    }
    /// Copy of the graph restricted to the given reads (all reads if `None`).
    /// Paths are not copied.
    pub fn subgraph(&self, reads: Option<&HashSet<usize>>) -> Self {
        let keep = |seq: usize| reads.map(|r| r.contains(&seq)).unwrap_or(true);
        let n = self.num_sequences();
        let vertices: Vec<_> = self
            .vertices
            .iter()
            .enumerate()
            .map(|(uid, state)| state.filter(|_| keep(uid / 2)))
            .collect();
        let mut subgraph = Self {
            reads: self.reads.clone(),
            corrected: self.corrected.clone(),
            cumulative_lengths: self.cumulative_lengths.clone(),
            vertices,
            adjacency: vec![vec![]; 2 * n],
            edges: vec![],
            num_edges: 0,
            embeddings: vec![],
            embedded_by_host: HashMap::new(),
            embedded_by_sequence: HashMap::new(),
            paths: vec![],
            ploidy: self.ploidy,
        };
        for id in self.edges() {
            let edge = self.edge(id);
            if keep(edge.vertex1.sequence) && keep(edge.vertex2.sequence) {
                subgraph.add_edge(edge.clone());
            }
        }
        for embedded in self.embeddings.iter().flatten() {
            if keep(embedded.sequence) && keep(embedded.host) {
                subgraph.add_embedded(embedded.clone());
            }
        }
        subgraph
    }
    pub fn reads(&self) -> &ReadSet {
        &self.reads
    }
    pub fn num_sequences(&self) -> usize {
        self.reads.len()
    }
    /// Current characters of the read, corrected ones if available.
    pub fn sequence(&self, idx: usize) -> &[u8] {
        match self.corrected.get(&idx) {
            Some(seq) => seq,
            None => self.reads.seq(idx),
        }
    }
    pub fn sequence_length(&self, idx: usize) -> usize {
        self.sequence(idx).len()
    }
    pub fn sequence_name(&self, idx: usize) -> &str {
        self.reads.name(idx)
    }
    /// Sum of the original lengths of reads `0..=idx`.
    pub fn cumulative_length(&self, idx: usize) -> u64 {
        self.cumulative_lengths[idx]
    }
    pub fn median_length(&self) -> usize {
        let mut lengths: Vec<_> = (0..self.num_sequences())
            .map(|i| self.sequence_length(i))
            .collect();
        lengths.sort_unstable();
        lengths.get(lengths.len() / 2).copied().unwrap_or(0)
    }
    /// Replace the characters of a read. The graph owns the buffer from now on.
    pub fn set_corrected_sequence(&mut self, idx: usize, seq: Vec<u8>) {
        assert!(idx < self.num_sequences(), "{idx} is out of range");
        self.corrected.insert(idx, seq);
    }
    pub fn is_corrected(&self, idx: usize) -> bool {
        self.corrected.contains_key(&idx)
    }
    /// The reads with their current characters.
    pub fn current_read_set(&self) -> ReadSet {
        let mut reads = (*self.reads).clone();
        for (&idx, seq) in self.corrected.iter() {
            reads.raw_reads[idx].seq = String::from_utf8_lossy(seq).to_string();
        }
        reads
    }
    pub fn ploidy(&self) -> usize {
        self.ploidy
    }
    pub fn set_ploidy(&mut self, ploidy: usize) {
        self.ploidy = ploidy;
    }
    pub fn vertex(&self, sequence: usize, is_start: bool) -> Option<Vertex> {
        let vertex = Vertex::new(sequence, is_start);
        self.contains_vertex(vertex).then_some(vertex)
    }
    pub fn vertex_by_unique_id(&self, uid: usize) -> Option<Vertex> {
        let vertex = Vertex::from_unique_id(uid);
        self.contains_vertex(vertex).then_some(vertex)
    }
    pub fn contains_vertex(&self, vertex: Vertex) -> bool {
        matches!(self.vertices.get(vertex.unique_id()), Some(Some(_)))
    }
    /// Live vertices, ordered by unique id.
    pub fn vertices(&self) -> Vec<Vertex> {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(uid, state)| state.map(|_| Vertex::from_unique_id(uid)))
            .collect()
    }
    /// Degree recorded by the last call to `update_vertex_degrees`.
    pub fn degree_unfiltered(&self, vertex: Vertex) -> usize {
        self.vertices[vertex.unique_id()]
            .map(|s| s.degree_unfiltered)
            .unwrap_or(0)
    }
    pub fn update_vertex_degrees(&mut self) {
        for (uid, state) in self.vertices.iter_mut().enumerate() {
            if let Some(state) = state.as_mut() {
                state.degree_unfiltered = self.adjacency[uid].len();
            }
        }
    }
    pub fn vertex_degree_distribution(&self) -> Distribution {
        let mut dist = Distribution::new(0f64, 100f64, 1f64);
        for vertex in self.vertices() {
            dist.add(self.edges_of(vertex).len() as f64);
        }
        dist
    }
    pub fn add_edge(&mut self, edge: Edge) -> EdgeId {
        let (v1, v2) = (edge.vertex1, edge.vertex2);
        assert!(
            self.contains_vertex(v1) && self.contains_vertex(v2),
            "Edge {} has a removed endpoint",
            edge
        );
        if edge.is_same_sequence() {
            assert!(v1 != v2, "Self loop on {}", v1);
            let duplicated = self.adjacency[v1.unique_id()]
                .iter()
                .any(|&id| self.edge(id).is_same_sequence());
            assert!(!duplicated, "Second same-sequence edge on {}", v1.sequence);
        }
        let id = self.edges.len();
        self.adjacency[v1.unique_id()].push(id);
        self.adjacency[v2.unique_id()].push(id);
        self.edges.push(Some(edge));
        self.num_edges += 1;
        id
    }
    pub fn remove_edge(&mut self, id: EdgeId) {
        if let Some(edge) = self.edges.get_mut(id).and_then(|e| e.take()) {
            for uid in [edge.vertex1.unique_id(), edge.vertex2.unique_id()] {
                self.adjacency[uid].retain(|&e| e != id);
            }
            self.num_edges -= 1;
        }
    }
    /// Remove both vertices of the read together with every edge touching them.
    /// Embedding relations of the read are kept.
    pub fn remove_vertices(&mut self, sequence: usize) {
        let (start, end) = (Vertex::new(sequence, true), Vertex::new(sequence, false));
        let mut to_remove: Vec<EdgeId> = [start, end]
            .iter()
            .flat_map(|v| self.adjacency[v.unique_id()].iter().copied())
            .collect();
        to_remove.sort_unstable();
        to_remove.dedup();
        for id in to_remove {
            self.remove_edge(id);
        }
        for v in [start, end] {
            self.vertices[v.unique_id()] = None;
            self.adjacency[v.unique_id()].clear();
        }
    }
    pub fn edge(&self, id: EdgeId) -> &Edge {
        match self.edges.get(id) {
            Some(Some(edge)) => edge,
            _ => panic!("Edge {} was removed or never existed", id),
        }
    }
    pub fn edge_mut(&mut self, id: EdgeId) -> &mut Edge {
        match self.edges.get_mut(id) {
            Some(Some(edge)) => edge,
            _ => panic!("Edge {} was removed or never existed", id),
        }
    }
    pub fn is_live_edge(&self, id: EdgeId) -> bool {
        matches!(self.edges.get(id), Some(Some(_)))
    }
    /// Live edges, in insertion order.
    pub fn edges(&self) -> Vec<EdgeId> {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(id, e)| e.as_ref().map(|_| id))
            .collect()
    }
    pub fn edges_of(&self, vertex: Vertex) -> &[EdgeId] {
        match self.adjacency.get(vertex.unique_id()) {
            Some(edges) => edges,
            None => &[],
        }
    }
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }
    /// The edge between the two vertices of the read, if the read still has vertices.
    pub fn same_sequence_edge(&self, sequence: usize) -> Option<EdgeId> {
        let start = self.vertex(sequence, true)?;
        Some(self.same_sequence_edge_of(start))
    }
    /// Panics if the vertex has no same-sequence edge, which means the graph is corrupted.
    pub fn same_sequence_edge_of(&self, vertex: Vertex) -> EdgeId {
        self.edges_of(vertex)
            .iter()
            .copied()
            .find(|&id| self.edge(id).is_same_sequence())
            .unwrap_or_else(|| panic!("Same sequence edge not found for vertex {}", vertex))
    }
    pub fn edge_between(&self, v1: Vertex, v2: Vertex) -> Option<EdgeId> {
        self.edges_of(v1)
            .iter()
            .copied()
            .find(|&id| self.edge(id).connecting_vertex(v1) == Some(v2))
    }
    pub fn add_embedded(&mut self, embedded: Embedding) -> EmbeddingId {
        let id = self.embeddings.len();
        self.embedded_by_host
            .entry(embedded.host)
            .or_default()
            .push(id);
        self.embedded_by_sequence
            .entry(embedded.sequence)
            .or_default()
            .push(id);
        self.embeddings.push(Some(embedded));
        id
    }
    pub fn remove_embedded(&mut self, id: EmbeddingId) {
        if let Some(embedded) = self.embeddings.get_mut(id).and_then(|e| e.take()) {
            for (map, key) in [
                (&mut self.embedded_by_host, embedded.host),
                (&mut self.embedded_by_sequence, embedded.sequence),
            ] {
                if let Some(ids) = map.get_mut(&key) {
                    ids.retain(|&e| e != id);
                    if ids.is_empty() {
                        map.remove(&key);
                    }
                }
            }
        }
    }
    /// Remove every embedding where the read is either the host or the embedded sequence.
    pub fn remove_embedded_relations(&mut self, sequence: usize) {
        let mut ids: Vec<_> = self
            .embedded_by_host(sequence)
            .iter()
            .chain(self.embedded_by_sequence(sequence).iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        for id in ids {
            self.remove_embedded(id);
        }
    }
    /// Remove the vertices of every embedded read. Returns the number of pruned reads.
    pub fn prune_embedded_sequences(&mut self) -> usize {
        let mut embedded: Vec<_> = self.embedded_by_sequence.keys().copied().collect();
        embedded.sort_unstable();
        let mut pruned = 0;
        for seq in embedded {
            if self.vertex(seq, true).is_some() {
                self.remove_vertices(seq);
                pruned += 1;
            }
        }
        debug!("PRUNE\t{}", pruned);
        pruned
    }
    pub fn embedding(&self, id: EmbeddingId) -> &Embedding {
        match self.embeddings.get(id) {
            Some(Some(e)) => e,
            _ => panic!("Embedding {} was removed or never existed", id),
        }
    }
    pub fn embedding_mut(&mut self, id: EmbeddingId) -> &mut Embedding {
        match self.embeddings.get_mut(id) {
            Some(Some(e)) => e,
            _ => panic!("Embedding {} was removed or never existed", id),
        }
    }
    /// Live embeddings, in insertion order.
    pub fn embeddings(&self) -> Vec<EmbeddingId> {
        self.embeddings
            .iter()
            .enumerate()
            .filter_map(|(id, e)| e.as_ref().map(|_| id))
            .collect()
    }
    pub fn embedded_by_host(&self, host: usize) -> &[EmbeddingId] {
        self.embedded_by_host
            .get(&host)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }
    pub fn embedded_by_sequence(&self, sequence: usize) -> &[EmbeddingId] {
        self.embedded_by_sequence
            .get(&sequence)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }
    pub fn is_embedded(&self, sequence: usize) -> bool {
        self.embedded_by_sequence.contains_key(&sequence)
    }
    /// Number of reads embedded in at least one host.
    pub fn embedded_count(&self) -> usize {
        self.embedded_by_sequence.len()
    }
    /// Store a layout path and flag its edges as layout edges.
    /// Panics if consecutive edges do not share a vertex.
    pub fn add_path(&mut self, path: Vec<EdgeId>) {
        for w in path.windows(2) {
            let (e1, e2) = (self.edge(w[0]), self.edge(w[1]));
            assert!(
                e1.shared_vertex(e2).is_some(),
                "Edges {} and {} do not chain",
                e1,
                e2
            );
        }
        for &id in path.iter() {
            self.edge_mut(id).is_layout = true;
        }
        self.paths.push(path);
    }
    pub fn paths(&self) -> &[Vec<EdgeId>] {
        &self.paths
    }
    /// Reads on the path, in path order.
    pub fn path_reads(&self, path: &[EdgeId]) -> Vec<usize> {
        let mut reads: Vec<usize> = vec![];
        for &id in path {
            let edge = self.edge(id);
            for seq in [edge.vertex1.sequence, edge.vertex2.sequence] {
                if !reads.contains(&seq) {
                    reads.push(seq);
                }
            }
        }
        reads
    }
    /// Drop the tombstones of removed edges and embeddings, renumbering the survivors.
    /// Ids obtained before the call are invalidated, except through the stored paths.
    pub fn compact(&mut self) {
        let mut edge_map = vec![None; self.edges.len()];
        let edges = std::mem::take(&mut self.edges);
        for (old, edge) in edges.into_iter().enumerate() {
            if let Some(edge) = edge {
                edge_map[old] = Some(self.edges.len());
                self.edges.push(Some(edge));
            }
        }
        for adj in self.adjacency.iter_mut() {
            for id in adj.iter_mut() {
                let old = *id;
                *id = edge_map[old].unwrap_or_else(|| unreachable!("Dangling edge {}", old));
            }
        }
        for path in self.paths.iter_mut() {
            path.retain(|&id| edge_map[id].is_some());
            path.iter_mut().for_each(|id| *id = edge_map[*id].unwrap_or(*id));
        }
        let embeddings = std::mem::take(&mut self.embeddings);
        self.embedded_by_host.clear();
        self.embedded_by_sequence.clear();
        for embedded in embeddings.into_iter().flatten() {
            self.add_embedded(embedded);
        }
    }
}
