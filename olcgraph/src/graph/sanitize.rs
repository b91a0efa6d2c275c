//! Repeat prediction, safe edge selection, and removal of chimeric reads.
use super::{AssemblyGraph, EdgeId, Relationship, Vertex};
use crate::config::{ChimeraConfig, SafeEdgeConfig};
use crate::distribution::{Distribution, NormalFit};
use std::collections::HashSet;

/// Why a read was excised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suspicion {
    /// Two unrelated fragments joined together.
    Chimera,
    /// An end where almost no long overlap passes the quality bar.
    DanglingEnd,
}

fn median(mut xs: Vec<i64>, default: i64) -> i64 {
    xs.sort_unstable();
    xs.get(xs.len() / 2).copied().unwrap_or(default)
}

impl AssemblyGraph {
    /// Vertices whose unfiltered degree is an outlier of the degree distribution.
    /// Call `update_vertex_degrees` first.
    pub fn predict_repetitive_vertices(&self, config: &SafeEdgeConfig) -> HashSet<usize> {
        let mut degrees = Distribution::new(0f64, 10_000f64, 1f64);
        let vertices: Vec<Vertex> = self
            .vertices()
            .into_iter()
            .filter(|v| !self.is_embedded(v.sequence))
            .collect();
        for &v in vertices.iter() {
            degrees.add(self.degree_unfiltered(v) as f64);
        }
        let normal = NormalFit::new(degrees.average(), degrees.variance());
        let repetitive: HashSet<usize> = vertices
            .iter()
            .filter(|&&v| config.repetitive_cumulative < normal.cdf(self.degree_unfiltered(v) as f64))
            .map(|v| v.unique_id())
            .collect();
        info!(
            "REPEAT\tVertices:{}\tDegree:{:.2}({:.2})\tRepetitive:{}",
            degrees.count(),
            normal.mean(),
            normal.sd(),
            repetitive.len()
        );
        repetitive
    }
    /// No other non-trivial edge at `vertex` has both a larger or equal overlap and a larger or
    /// equal weighted coverage.
    pub fn is_best_edge(&self, vertex: Vertex, id: EdgeId) -> bool {
        let target = self.edge(id);
        self.edges_of(vertex)
            .iter()
            .filter(|&&e| e != id)
            .map(|&e| self.edge(e))
            .filter(|e| !e.is_same_sequence())
            .all(|e| {
                !(target.overlap <= e.overlap
                    && target.weighted_coverage_shared_kmers <= e.weighted_coverage_shared_kmers)
            })
    }
    pub fn is_reciprocal_best(&self, id: EdgeId) -> bool {
        let edge = self.edge(id);
        self.is_best_edge(edge.vertex1, id) && self.is_best_edge(edge.vertex2, id)
    }
    pub fn is_safe_edge(
        &self,
        id: EdgeId,
        repetitive: &HashSet<usize>,
        config: &SafeEdgeConfig,
    ) -> bool {
        let edge = self.edge(id);
        if edge.is_same_sequence()
            || edge.evidence_proportion() < config.min_evidence_proportion
            || config.max_indels_per_kbp < edge.indels_per_kbp()
        {
            return false;
        }
        let (v1, v2) = (edge.vertex1, edge.vertex2);
        let both_simple = self.edges_of(v1).len() == 2 && self.edges_of(v2).len() == 2;
        let repeat = repetitive.contains(&v1.unique_id()) || repetitive.contains(&v2.unique_id());
        both_simple || (!repeat && self.is_reciprocal_best(id))
    }
    pub fn select_safe_edges(
        &self,
        repetitive: &HashSet<usize>,
        config: &SafeEdgeConfig,
    ) -> Vec<EdgeId> {
        self.edges()
            .into_iter()
            .filter(|&id| self.is_safe_edge(id, repetitive, config))
            .collect()
    }
    /// Evaluate a read against the chimera and dangling-end rules.
    /// Reads without vertices (removed or pruned) are never suspicious.
    pub fn suspicion(&self, sequence: usize, config: &ChimeraConfig) -> Option<Suspicion> {
        let (vs, ve) = (self.vertex(sequence, true)?, self.vertex(sequence, false)?);
        let seq_len = self.sequence_length(sequence) as i64;
        let unknown = config.unknown_flank;
        let mut embedded: Vec<_> = self
            .embedded_by_host(sequence)
            .iter()
            .map(|&id| self.embedding(id))
            .collect();
        embedded.sort_by_key(|e| e.host_evidence_start);
        let mut evidence_ends_left: Vec<i64> = vec![];
        let mut evidence_starts_right: Vec<i64> = vec![];
        let mut predicted_end_left = 0;
        let mut predicted_start_right = seq_len;
        for e in embedded.iter() {
            let (ev_start, ev_end) = (e.host_evidence_start as i64, e.host_evidence_end as i64);
            let unknown_left = ev_start - e.host_start as i64;
            let unknown_right = e.host_end as i64 - ev_end;
            if unknown < unknown_right && unknown_left < unknown {
                evidence_ends_left.push(ev_end);
                predicted_end_left = predicted_end_left.max(e.host_end as i64);
            }
            if unknown < unknown_left && unknown_right < unknown {
                evidence_starts_right.push(ev_start);
                predicted_start_right = predicted_start_right.min(e.host_start as i64);
            }
        }
        let edges_start: Vec<_> = self
            .edges_of(vs)
            .iter()
            .map(|&id| self.edge(id))
            .filter(|e| !e.is_same_sequence())
            .collect();
        let edges_end: Vec<_> = self
            .edges_of(ve)
            .iter()
            .map(|&id| self.edge(id))
            .filter(|e| !e.is_same_sequence())
            .collect();
        let evidence = |e: &super::Edge, v: Vertex| -> (i64, i64) {
            let (s, t) = e.evidence_on(v).unwrap_or((0, 0));
            (s as i64, t as i64)
        };
        let min_obs = config.min_flank_observations;
        if evidence_ends_left.len() < min_obs || evidence_starts_right.len() < min_obs {
            for &e in edges_start.iter() {
                let (ev_start, ev_end) = evidence(e, vs);
                let unknown_left = ev_start;
                let unknown_right = e.overlap as i64 - ev_end;
                if unknown_right < 0 {
                    continue;
                }
                if unknown < unknown_right && unknown_left < unknown {
                    evidence_ends_left.push(ev_end);
                    predicted_end_left = predicted_end_left.max(e.overlap as i64);
                }
                if unknown < unknown_left && unknown_right < unknown {
                    evidence_starts_right.push(ev_start);
                }
            }
            for &e in edges_end.iter() {
                let (ev_start, ev_end) = evidence(e, ve);
                let unknown_left = e.overlap as i64 - (seq_len - ev_start);
                let unknown_right = seq_len - ev_end;
                if unknown_left < 0 {
                    continue;
                }
                if unknown < unknown_right && unknown_left < unknown {
                    evidence_ends_left.push(ev_end);
                }
                if unknown < unknown_left && unknown_right < unknown {
                    evidence_starts_right.push(ev_start);
                    predicted_start_right = predicted_start_right.min(seq_len - e.overlap as i64);
                }
            }
        }
        let num_left = evidence_ends_left.len();
        let num_right = evidence_starts_right.len();
        let evidence_end_left = median(evidence_ends_left, 0);
        let evidence_start_right = median(evidence_starts_right, seq_len);
        let min_evidence_start = evidence_start_right.min(evidence_end_left);
        let max_evidence_end = evidence_start_right.max(evidence_end_left);
        let (tight, margin) = (config.tight_bound, config.crossing_margin);
        let mut num_crossing = embedded
            .iter()
            .filter(|e| {
                let (ev_start, ev_end) = (e.host_evidence_start as i64, e.host_evidence_end as i64);
                let unknown_left = ev_start - e.host_start as i64;
                let unknown_right = e.host_end as i64 - ev_end;
                unknown_left < tight
                    && unknown_right < tight
                    && margin < min_evidence_start - ev_start
                    && margin < ev_end - max_evidence_end
            })
            .count();
        let good_overlap = config.good_overlap_fraction * seq_len as f64;
        let passes = |e: &super::Edge| {
            config.pass_evidence_proportion <= e.evidence_proportion()
                && e.indels_per_kbp() <= config.pass_indels_per_kbp
        };
        let (mut good_start, mut pass_start) = (0, 0);
        for &e in edges_start.iter() {
            let (ev_start, ev_end) = evidence(e, vs);
            let unknown_right = e.overlap as i64 - ev_end;
            if ev_start < tight && unknown_right < tight && margin < ev_end - max_evidence_end {
                num_crossing += 1;
            }
            if good_overlap < e.overlap as f64 {
                good_start += 1;
                pass_start += passes(e) as usize;
            }
        }
        let (mut good_end, mut pass_end) = (0, 0);
        for &e in edges_end.iter() {
            let (ev_start, ev_end) = evidence(e, ve);
            let unknown_left = e.overlap as i64 - (seq_len - ev_start);
            let unknown_right = seq_len - ev_end;
            if unknown_left < tight && unknown_right < tight && margin < min_evidence_start - ev_start
            {
                num_crossing += 1;
            }
            if good_overlap < e.overlap as f64 {
                good_end += 1;
                pass_end += passes(e) as usize;
            }
        }
        let d1 = evidence_end_left - predicted_start_right;
        let d2 = predicted_end_left - evidence_start_right;
        let d3 = predicted_end_left - evidence_end_left;
        let d4 = evidence_start_right - predicted_start_right;
        debug!(
            "CHIMERA\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            sequence,
            seq_len,
            num_left,
            num_right,
            evidence_end_left,
            evidence_start_right,
            predicted_end_left,
            predicted_start_right,
            num_crossing,
            good_start,
            good_end
        );
        let (opposite, same) = (config.min_opposite_gap, config.min_same_gap);
        let dangling = |good: usize, pass: usize| {
            config.min_good_overlaps < good
                && pass as f64 <= config.pass_fraction * good as f64 + 1f64
        };
        if num_crossing < config.max_crossing
            && opposite < d1
            && opposite < d2
            && same < d3
            && same < d4
        {
            Some(Suspicion::Chimera)
        } else if dangling(good_start, pass_start) || dangling(good_end, pass_end) {
            Some(Suspicion::DanglingEnd)
        } else {
            None
        }
    }
    pub fn is_chimeric(&self, sequence: usize, config: &ChimeraConfig) -> bool {
        self.suspicion(sequence, config).is_some()
    }
    /// Evaluate every read on the current graph, then excise the suspicious ones:
    /// their vertices, their edges, and all their embedding relations.
    pub fn remove_chimeric_reads(&mut self, config: &ChimeraConfig) -> Vec<usize> {
        let suspicious: Vec<(usize, Suspicion)> = (0..self.num_sequences())
            .filter_map(|seq| self.suspicion(seq, config).map(|s| (seq, s)))
            .collect();
        for &(seq, kind) in suspicious.iter() {
            debug!("EXCISE\t{}\t{:?}", seq, kind);
            self.remove_vertices(seq);
            self.remove_embedded_relations(seq);
        }
        info!("CHIMERA\tRemoved:{}", suspicious.len());
        suspicious.into_iter().map(|(seq, _)| seq).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{overlap_edge, toy_graph};
    use super::super::Embedding;
    use super::*;
    // Embeddings covering [start, end) of host 0 with the given evidence bounds.
    fn embed(
        graph: &mut AssemblyGraph,
        seq: usize,
        (start, end): (usize, usize),
        (ev_start, ev_end): (usize, usize),
    ) {
        let len = graph.sequence_length(0);
        let mut e = Embedding::new(seq, end - start, false, 0, len, (start, end));
        e.host_evidence_start = ev_start;
        e.host_evidence_end = ev_end;
        graph.add_embedded(e);
    }
    #[test]
    fn concatenated_read_is_chimeric() {
        // Read 0 (20kbp) is the junction of two fragments at 10kbp.
        let mut lengths = vec![20_000];
        lengths.extend(std::iter::repeat(6_000).take(12));
        let mut graph = toy_graph(&lengths);
        for i in 0..6 {
            // Left fragment reads: predicted to run past the junction, evidenced up to it.
            let start = 6_000 + 100 * i;
            embed(&mut graph, 1 + i, (start, start + 6_000), (start, 10_000));
            // Right fragment reads.
            let end = 14_000 - 100 * i;
            embed(&mut graph, 7 + i, (end - 6_000, end), (10_000, end));
        }
        // Calibration parameters of the chimera rule.
        let config = ChimeraConfig::default();
        assert_eq!(graph.suspicion(0, &config), Some(Suspicion::Chimera));
        let removed = graph.remove_chimeric_reads(&config);
        assert_eq!(removed, vec![0]);
        assert!(graph.vertex(0, true).is_none());
        assert_eq!(graph.embedded_count(), 0);
        // Idempotent.
        assert!(graph.remove_chimeric_reads(&config).is_empty());
    }
    #[test]
    fn uniformly_covered_read_is_not_chimeric() {
        let mut lengths = vec![20_000];
        lengths.extend(std::iter::repeat(5_000).take(16));
        let mut graph = toy_graph(&lengths);
        for i in 0..16 {
            let start = 1_000 * i;
            embed(&mut graph, 1 + i, (start, start + 5_000), (start + 50, start + 4_950));
        }
        let config = ChimeraConfig::default();
        assert_eq!(graph.suspicion(0, &config), None);
        assert!(graph.remove_chimeric_reads(&config).is_empty());
        assert_eq!(graph.embedded_count(), 16);
    }
    #[test]
    fn low_quality_end_is_dangling() {
        let mut lengths = vec![10_000];
        lengths.extend(std::iter::repeat(10_000).take(8));
        let mut graph = toy_graph(&lengths);
        for i in 1..=8 {
            let mut edge = overlap_edge(&graph, Vertex::new(0, false), Vertex::new(i, true), 8_000);
            edge.mismatches = 1_000;
            graph.add_edge(edge);
        }
        let config = ChimeraConfig::default();
        assert_eq!(graph.suspicion(0, &config), Some(Suspicion::DanglingEnd));
        let mut graph = toy_graph(&lengths);
        for i in 1..=8 {
            let edge = overlap_edge(&graph, Vertex::new(0, false), Vertex::new(i, true), 8_000);
            graph.add_edge(edge);
        }
        assert_eq!(graph.suspicion(0, &config), None);
    }
    #[test]
    fn safe_edges_are_symmetric() {
        let mut graph = toy_graph(&[10_000, 10_000, 10_000, 10_000]);
        let e01 = overlap_edge(&graph, Vertex::new(0, false), Vertex::new(1, true), 6_000);
        let e01 = graph.add_edge(e01);
        let e12 = overlap_edge(&graph, Vertex::new(2, true), Vertex::new(1, false), 5_000);
        let e12 = graph.add_edge(e12);
        let e13 = overlap_edge(&graph, Vertex::new(1, false), Vertex::new(3, true), 3_000);
        let e13 = graph.add_edge(e13);
        graph.update_vertex_degrees();
        let config = SafeEdgeConfig::default();
        let repetitive = graph.predict_repetitive_vertices(&config);
        assert!(repetitive.is_empty());
        let safe = graph.select_safe_edges(&repetitive, &config);
        assert!(safe.contains(&e01));
        assert!(safe.contains(&e12));
        assert!(!safe.contains(&e13));
        for id in graph.edges() {
            let edge = graph.edge(id);
            let forward = graph.is_best_edge(edge.vertex1, id) && graph.is_best_edge(edge.vertex2, id);
            let backward = graph.is_best_edge(edge.vertex2, id) && graph.is_best_edge(edge.vertex1, id);
            assert_eq!(forward, backward);
            assert_eq!(graph.is_reciprocal_best(id), forward);
        }
        let mut flipped = graph.edge(e12).clone();
        std::mem::swap(&mut flipped.vertex1, &mut flipped.vertex2);
        std::mem::swap(&mut flipped.length1, &mut flipped.length2);
        std::mem::swap(&mut flipped.vertex1_evidence_start, &mut flipped.vertex2_evidence_start);
        std::mem::swap(&mut flipped.vertex1_evidence_end, &mut flipped.vertex2_evidence_end);
        graph.remove_edge(e12);
        let flipped = graph.add_edge(flipped);
        assert!(graph.is_safe_edge(flipped, &repetitive, &config));
    }
    #[test]
    fn incomparable_edges_are_both_best() {
        let mut graph = toy_graph(&[10_000, 10_000, 10_000, 10_000]);
        let v = Vertex::new(0, false);
        let mut a = overlap_edge(&graph, v, Vertex::new(1, true), 1_000);
        a.weighted_coverage_shared_kmers = 900;
        let a = graph.add_edge(a);
        let mut b = overlap_edge(&graph, v, Vertex::new(2, true), 1_200);
        b.weighted_coverage_shared_kmers = 300;
        let b = graph.add_edge(b);
        assert!(graph.is_best_edge(v, a));
        assert!(graph.is_best_edge(v, b));
        // Dominated on both counts.
        let mut c = overlap_edge(&graph, v, Vertex::new(3, true), 800);
        c.weighted_coverage_shared_kmers = 200;
        let c = graph.add_edge(c);
        assert!(!graph.is_best_edge(v, c));
        assert!(graph.is_best_edge(v, a));
        assert!(graph.is_best_edge(v, b));
    }
}
