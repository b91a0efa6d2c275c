//! Conversion of k-mer hit clusters into edges and embeddings.
//! Candidates are computed by rayon workers, each query independently, and sent over a channel
//! to a single writer thread which owns the graph while it is being built.
use crate::config::RelationshipConfig;
use crate::graph::{AssemblyGraph, Edge, Embedding, Vertex};
use crate::hits::{ClusteringPrimitive, HitSource, KmerHitCluster};
use definitions::ReadSet;
use rayon::prelude::*;

/// A relationship ready to be inserted into the graph.
#[derive(Debug, Clone)]
pub enum Candidate {
    Edge(Edge),
    Embedding(Embedding),
}

/// Statistics of a cluster derived from its hits without a base-level alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulatedAlignment {
    /// Subject bases covered by at least one shared k-mer.
    pub coverage: usize,
    /// Same as `coverage`, every base weighted by the inverse frequency of its k-mer.
    pub weighted_coverage: usize,
    /// Sum of the diagonal shifts between consecutive hits.
    pub mismatches: usize,
}

pub fn simulate_alignment(cluster: &KmerHitCluster) -> SimulatedAlignment {
    let k = cluster.kmer_length;
    let slen = cluster.subject_length;
    let mut hits = cluster.hits.clone();
    hits.sort_by_key(|h| (h.subject_pos, h.query_pos));
    let (mut coverage, mut weighted) = (0usize, 0f64);
    // End of the subject region already counted.
    let mut covered_until = 0;
    for hit in hits.iter() {
        let start = hit.subject_pos.max(covered_until);
        let end = (hit.subject_pos + k).min(slen);
        if start < end {
            coverage += end - start;
            weighted += (end - start) as f64 * hit.weight.min(1f64);
            covered_until = end;
        }
    }
    // Cluster hits are sorted by query position.
    let mismatches = cluster
        .hits
        .windows(2)
        .map(|w| {
            let dq = w[1].query_pos as i64 - w[0].query_pos as i64;
            let ds = w[1].subject_pos as i64 - w[0].subject_pos as i64;
            (ds - dq).unsigned_abs() as usize
        })
        .sum();
    SimulatedAlignment {
        coverage,
        weighted_coverage: weighted.round() as usize,
        mismatches,
    }
}

/// Counts of the relationships inserted by [RelationshipBuilder::build].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub edges: usize,
    pub embeddings: usize,
}

pub struct RelationshipBuilder<'a, H: HitSource, C: ClusteringPrimitive> {
    hits: &'a H,
    clusterer: &'a C,
    config: RelationshipConfig,
}

impl<'a, H: HitSource, C: ClusteringPrimitive> RelationshipBuilder<'a, H, C> {
    pub fn new(hits: &'a H, clusterer: &'a C, config: RelationshipConfig) -> Self {
        Self {
            hits,
            clusterer,
            config,
        }
    }
    /// Find the relationships of every read against the reads with smaller indices and insert
    /// them into the graph.
    pub fn build(&self, graph: &mut AssemblyGraph) -> BuildSummary {
        let reads = graph.current_read_set();
        let (sender, receiver) = crossbeam_channel::bounded::<Candidate>(1024);
        let summary = std::thread::scope(|scope| {
            let writer = scope.spawn(move || {
                let mut summary = BuildSummary::default();
                for candidate in receiver {
                    match candidate {
                        Candidate::Edge(edge) => {
                            graph.add_edge(edge);
                            summary.edges += 1;
                        }
                        Candidate::Embedding(embedded) => {
                            graph.add_embedded(embedded);
                            summary.embeddings += 1;
                        }
                    }
                }
                summary
            });
            (0..reads.len())
                .into_par_iter()
                .for_each_with(sender, |sender, query| {
                    for candidate in self.candidates(&reads, query) {
                        if sender.send(candidate).is_err() {
                            // The writer is gone. Its panic is re-raised by the join below.
                            return;
                        }
                    }
                });
            writer
                .join()
                .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
        });
        info!(
            "RELATIONSHIPS\t{}\t{}\t{}",
            reads.len(),
            summary.edges,
            summary.embeddings
        );
        summary
    }
    /// Relationships between `query`, in both orientations, and the reads with smaller indices.
    pub fn candidates(&self, reads: &ReadSet, query: usize) -> Vec<Candidate> {
        let forward = reads.seq(query);
        let reverse = bio::alphabets::dna::revcomp(forward);
        let mut candidates = vec![];
        for (query_rc, seq) in [(false, forward), (true, reverse.as_slice())] {
            let hits = self.hits.hits(query, seq);
            let min_count = (self.config.min_proportion_overlap
                * self.config.min_kmer_percentage
                * hits.self_hits as f64
                / 100f64)
                .floor() as usize;
            let mut subjects: Vec<_> = hits
                .by_subject
                .iter()
                .filter(|(subject, hits)| **subject < query && min_count <= hits.len())
                .collect();
            subjects.sort_unstable_by_key(|x| *x.0);
            for (&subject, subject_hits) in subjects {
                let best = self
                    .clusterer
                    .cluster(subject, seq.len(), reads.length(subject), subject_hits)
                    .into_iter()
                    .max_by_key(|c| c.num_different_kmers);
                let cluster = match best {
                    Some(cluster) if self.passes_filters(&cluster, hits.self_hits) => cluster,
                    _ => continue,
                };
                candidates.push(self.classify(query, query_rc, &cluster));
            }
        }
        candidates
    }
    pub fn passes_filters(&self, cluster: &KmerHitCluster, self_hits: usize) -> bool {
        let cfg = &self.config;
        let (qlen, slen) = (
            cluster.query_length as f64,
            cluster.subject_length as f64,
        );
        let overlap = cluster.predicted_overlap() as f64;
        if overlap < cfg.min_proportion_overlap * qlen || overlap < cfg.min_proportion_overlap * slen
        {
            return false;
        }
        let query_evidence = cluster
            .query_evidence_end
            .saturating_sub(cluster.query_evidence_start);
        let subject_evidence = cluster
            .subject_evidence_end
            .saturating_sub(cluster.subject_evidence_start);
        if (query_evidence as f64) < cfg.min_proportion_evidence * overlap
            || (subject_evidence as f64) < cfg.min_proportion_evidence * overlap
        {
            return false;
        }
        let expected = overlap * self_hits as f64 / qlen;
        let pct = 100f64 * cluster.num_different_kmers as f64 / expected;
        cfg.min_kmer_percentage <= pct
    }
    /// Decide whether the cluster is an embedding of the query in the subject or an overlap edge.
    pub fn classify(&self, query: usize, query_rc: bool, cluster: &KmerHitCluster) -> Candidate {
        let (qlen, slen) = (cluster.query_length, cluster.subject_length);
        let subject = cluster.subject_idx;
        let (start, end) = (cluster.subject_predicted_start, cluster.subject_predicted_end);
        let aln = simulate_alignment(cluster);
        // Query evidence on the forward strand of the query.
        let query_evidence = match query_rc {
            false => (cluster.query_evidence_start, cluster.query_evidence_end),
            true => (
                qlen.saturating_sub(cluster.query_evidence_end),
                qlen.saturating_sub(cluster.query_evidence_start),
            ),
        };
        let subject_evidence = (cluster.subject_evidence_start, cluster.subject_evidence_end);
        let within_start = 0 <= start;
        let within_end = end <= slen as i64;
        if within_start != within_end {
            let overlap = cluster.predicted_overlap();
            let (v1, v2, ev1, ev2, len1, len2) = if within_start {
                // The query extends past the end of the subject.
                let subject_end = Vertex::new(subject, false);
                let query_vertex = Vertex::new(query, !query_rc);
                (subject_end, query_vertex, subject_evidence, query_evidence, slen, qlen)
            } else {
                // The query starts before the subject.
                let query_vertex = Vertex::new(query, query_rc);
                let subject_start = Vertex::new(subject, true);
                (query_vertex, subject_start, query_evidence, subject_evidence, qlen, slen)
            };
            let mut edge = Edge::new(v1, v2, overlap, len1, len2);
            (edge.vertex1_evidence_start, edge.vertex1_evidence_end) = ev1;
            (edge.vertex2_evidence_start, edge.vertex2_evidence_end) = ev2;
            edge.num_shared_kmers = cluster.num_different_kmers;
            edge.overlap_sd = cluster.overlap_sd;
            edge.coverage_shared_kmers = aln.coverage;
            edge.weighted_coverage_shared_kmers = aln.weighted_coverage;
            edge.mismatches = aln.mismatches;
            trace!("EDGE\t{}", edge);
            Candidate::Edge(edge)
        } else {
            // Contained, or of nearly identical length when both bounds are out of range.
            let host_start = start.clamp(0, slen as i64) as usize;
            let host_end = end.clamp(0, slen as i64) as usize;
            let mut embedded = Embedding::new(query, qlen, query_rc, subject, slen, (host_start, host_end));
            embedded.host_evidence_start = subject_evidence.0;
            embedded.host_evidence_end = subject_evidence.1;
            embedded.num_shared_kmers = cluster.num_different_kmers;
            embedded.coverage_shared_kmers = aln.coverage;
            embedded.weighted_coverage_shared_kmers = aln.weighted_coverage;
            embedded.mismatches = aln.mismatches;
            trace!("EMBEDDED\t{}", embedded);
            Candidate::Embedding(embedded)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Relationship;
    use crate::hits::{DiagonalClusterer, KmerHit, KmerTable};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;
    use std::sync::Arc;
    fn genome(seed: u64, len: usize) -> Vec<u8> {
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(seed);
        (0..len).map(|_| b"ACGT"[rng.gen_range(0..4)]).collect()
    }
    fn build(reads: &[Vec<u8>]) -> (AssemblyGraph, BuildSummary) {
        let mut graph = AssemblyGraph::new(Arc::new(ReadSet::from_seqs(reads)));
        let table = KmerTable::new(reads, 15, 100);
        let clusterer = DiagonalClusterer::new(15);
        let builder = RelationshipBuilder::new(&table, &clusterer, RelationshipConfig::default());
        let summary = builder.build(&mut graph);
        (graph, summary)
    }
    #[test]
    fn simulated_alignment() {
        let hits = vec![
            KmerHit::new(0, 100),
            KmerHit::new(10, 110),
            KmerHit::new(20, 122),
        ];
        let cluster = KmerHitCluster::summarize(0, 1_000, 1_000, 15, hits).unwrap();
        let aln = simulate_alignment(&cluster);
        // [100, 115) + [115, 125) + [125, 137)
        assert_eq!(aln.coverage, 37);
        assert_eq!(aln.weighted_coverage, 37);
        assert_eq!(aln.mismatches, 2);
    }
    #[test]
    fn forward_overlap_is_an_edge() {
        let g = genome(10, 6_000);
        let reads = vec![g[..4_000].to_vec(), g[2_500..].to_vec()];
        let (graph, summary) = build(&reads);
        assert_eq!(summary, BuildSummary { edges: 1, embeddings: 0 });
        let end0 = graph.vertex(0, false).unwrap();
        let start1 = graph.vertex(1, true).unwrap();
        let id = graph.edge_between(end0, start1).unwrap();
        let edge = graph.edge(id);
        assert_eq!(edge.overlap, 1_500);
        assert_eq!(edge.evidence_on(end0), Some((2_500, 4_000)));
        assert_eq!(edge.evidence_on(start1), Some((0, 1_500)));
        assert_eq!(edge.mismatches, 0);
        assert!(edge.evidence_proportion() > 0.99);
    }
    #[test]
    fn reverse_complemented_overlap_is_an_edge() {
        let g = genome(11, 6_000);
        let second = bio::alphabets::dna::revcomp(&g[2_500..]);
        let reads = vec![g[..4_000].to_vec(), second];
        let (graph, summary) = build(&reads);
        assert_eq!(summary.edges, 1);
        // The end of read 0 touches the end of the reversed read 1.
        let end0 = graph.vertex(0, false).unwrap();
        let end1 = graph.vertex(1, false).unwrap();
        let id = graph.edge_between(end0, end1).unwrap();
        let edge = graph.edge(id);
        assert_eq!(edge.overlap, 1_500);
        assert_eq!(edge.evidence_on(end1), Some((2_000, 3_500)));
    }
    #[test]
    fn contained_read_is_embedded() {
        let g = genome(12, 6_000);
        let reads = vec![g.clone(), bio::alphabets::dna::revcomp(&g[1_000..3_000])];
        let (graph, summary) = build(&reads);
        assert_eq!(summary, BuildSummary { edges: 0, embeddings: 1 });
        let id = graph.embedded_by_sequence(1)[0];
        let embedded = graph.embedding(id);
        assert_eq!(embedded.host, 0);
        assert!(embedded.reverse);
        assert_eq!((embedded.host_start, embedded.host_end), (1_000, 3_000));
        assert_eq!(embedded.coverage_shared_kmers, 2_000);
    }
    #[test]
    fn unrelated_reads_are_ignored() {
        let reads = vec![genome(13, 3_000), genome(14, 3_000)];
        let (graph, summary) = build(&reads);
        assert_eq!(summary, BuildSummary::default());
        assert_eq!(graph.num_edges(), 2);
    }
}
