//! Statistical scoring of edges and embeddings.
//! Six metrics are fitted by Normal approximations over a clean sample of "safe" edges,
//! and every relationship gets a score (higher is better) and a cost (lower is better).
use crate::config::{AssemblyConfig, ScoringConfig};
use crate::distribution::{phred, upper_median, Distribution, NormalFit};
use crate::graph::{AssemblyGraph, Endpoints, Relationship, Vertex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

const NUM_METRICS: usize = 6;
/// Number of smallest values averaged to cap the median endpoint IKBP.
const SMALLEST_IKBP: usize = 5;

/// Normal fits of the edge metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDistributions {
    pub overlap: NormalFit,
    pub coverage: NormalFit,
    pub weighted_coverage: NormalFit,
    pub overlap_sd: NormalFit,
    pub evidence_proportion: NormalFit,
    pub ikbp: NormalFit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSummary {
    pub name: String,
    pub mean: f64,
    pub sd: f64,
}

impl EdgeDistributions {
    pub fn summary(&self) -> Vec<FitSummary> {
        let fits = [
            ("overlap", self.overlap),
            ("coverage_shared_kmers", self.coverage),
            ("weighted_coverage_shared_kmers", self.weighted_coverage),
            ("overlap_sd", self.overlap_sd),
            ("evidence_proportion", self.evidence_proportion),
            ("indels_per_kbp", self.ikbp),
        ];
        fits.iter()
            .map(|(name, fit)| FitSummary {
                name: name.to_string(),
                mean: fit.mean(),
                sd: fit.sd(),
            })
            .collect()
    }
}

fn metric_histograms() -> [Distribution; NUM_METRICS] {
    [
        Distribution::new(0f64, 100_000f64, 1_000f64),
        Distribution::new(0f64, 100_000f64, 1_000f64),
        Distribution::new(0f64, 100_000f64, 1_000f64),
        Distribution::new(0f64, 500f64, 10f64),
        Distribution::new(0f64, 1.1, 0.02),
        Distribution::new(0f64, 100f64, 1f64),
    ]
}

fn length_sum_key<R: Relationship>(rel: &R) -> usize {
    rel.length_sum() / 1_000
}

/// Average IKBP of an endpoint: the median of its relationships' IKBP, capped by the mean
/// of the smallest values. Endpoints without relationships get 1.
pub fn average_ikbp(mut values: Vec<f64>) -> f64 {
    let median = match upper_median(&mut values) {
        Some(m) => m,
        None => return 1f64,
    };
    let n = values.len().min(SMALLEST_IKBP);
    let smallest = values[..n].iter().sum::<f64>() / n as f64;
    median.min(smallest)
}

impl AssemblyGraph {
    /// Fit the metric distributions. Safe edges are the training sample when there are enough
    /// of them, otherwise the mode is searched in the distribution of all edges.
    pub fn estimate_distributions(
        &self,
        safe: &HashSet<usize>,
        config: &ScoringConfig,
    ) -> EdgeDistributions {
        let mut dists_safe = metric_histograms();
        let mut dists_all = metric_histograms();
        for id in self.edges() {
            let edge = self.edge(id);
            if edge.is_same_sequence() {
                continue;
            }
            let values = [
                edge.overlap as f64,
                edge.coverage_shared_kmers as f64,
                edge.weighted_coverage_shared_kmers as f64,
                edge.overlap_sd,
                edge.evidence_proportion(),
                edge.indels_per_kbp(),
            ];
            for (dist, &x) in dists_all.iter_mut().zip(values.iter()) {
                dist.add(x);
            }
            if safe.contains(&id) {
                for (dist, &x) in dists_safe.iter_mut().zip(values.iter()) {
                    dist.add(x);
                }
            }
        }
        let num_safe = dists_safe[0].count() as usize;
        info!("SAFE\t{}", num_safe);
        let mut fits = [NormalFit::new(0f64, 0f64); NUM_METRICS];
        for (i, fit) in fits.iter_mut().enumerate() {
            let (all, safe) = (&dists_all[i], &dists_safe[i]);
            let mut mean = if config.min_safe_edges < num_safe {
                safe.local_mode(safe.average() / 2f64, safe.average() * 2f64)
            } else if i < 5 {
                all.local_mode(all.average(), all.max_value())
            } else {
                all.local_mode(all.min_value(), all.average())
            };
            if i == 5 {
                mean = mean.max(all.average());
            }
            let mut sd = all.peak_standard_deviation(mean);
            match i {
                5 => sd = sd.max(mean),
                4 => sd = sd.max(0.03),
                _ => {}
            }
            let mut variance = sd * sd;
            if i < 3 {
                variance = variance.max(mean);
            }
            *fit = NormalFit::new(mean, variance);
        }
        let [overlap, coverage, weighted_coverage, overlap_sd, evidence_proportion, ikbp] = fits;
        EdgeDistributions {
            overlap,
            coverage,
            weighted_coverage,
            overlap_sd,
            evidence_proportion,
            ikbp,
        }
    }
    /// IKBP distributions of edges and embeddings, bucketed by the sum of lengths in kbp.
    pub fn length_sum_distributions(&self) -> BTreeMap<usize, Distribution> {
        let mut dists: BTreeMap<usize, Distribution> = BTreeMap::new();
        let new = || Distribution::new(0f64, 100f64, 1f64);
        for id in self.edges() {
            let edge = self.edge(id);
            if !edge.is_same_sequence() {
                let dist = dists.entry(length_sum_key(edge)).or_insert_with(new);
                dist.add(edge.indels_per_kbp());
            }
        }
        for id in self.embeddings() {
            let embedded = self.embedding(id);
            let dist = dists.entry(length_sum_key(embedded)).or_insert_with(new);
            dist.add(embedded.indels_per_kbp());
        }
        dists
    }
    fn vertex_average_ikbp(&self, vertex: Vertex) -> f64 {
        let values = self
            .edges_of(vertex)
            .iter()
            .map(|&id| self.edge(id))
            .filter(|e| !e.is_same_sequence())
            .map(|e| e.indels_per_kbp())
            .collect();
        average_ikbp(values)
    }
    fn sequence_average_ikbp(&self, sequence: usize) -> f64 {
        let values = self
            .embedded_by_host(sequence)
            .iter()
            .chain(self.embedded_by_sequence(sequence).iter())
            .map(|&id| self.embedding(id).indels_per_kbp())
            .collect();
        average_ikbp(values)
    }
    /// Degree update, repeat prediction, distribution fitting, and annotation of every edge
    /// and embedding with a score and a cost.
    pub fn update_scores(&mut self, config: &AssemblyConfig) -> EdgeDistributions {
        self.update_vertex_degrees();
        let repetitive = self.predict_repetitive_vertices(&config.safe_edges);
        let safe: HashSet<usize> = self
            .select_safe_edges(&repetitive, &config.safe_edges)
            .into_iter()
            .collect();
        let dists = self.estimate_distributions(&safe, &config.scoring);
        for fit in dists.summary() {
            info!("FIT\t{}\t{:.3}\t{:.3}", fit.name, fit.mean, fit.sd);
        }
        let by_length_sum = self.length_sum_distributions();
        for (key, dist) in by_length_sum.iter() {
            debug!(
                "LENSUM\t{}\t{:.2}\t{:.2}\t{}",
                key,
                dist.average(),
                dist.variance().sqrt(),
                dist.count()
            );
        }
        let limit = dists.ikbp.mean() + 2f64 * dists.ikbp.sd();
        let mut vertex_ikbp = HashMap::new();
        let mut sequence_ikbp = HashMap::new();
        let mut high_ikbp = vec![];
        for seq in 0..self.num_sequences() {
            let (start, end) = match (self.vertex(seq, true), self.vertex(seq, false)) {
                (Some(s), Some(e)) => (s, e),
                _ => continue,
            };
            let (avg_start, avg_end) = (self.vertex_average_ikbp(start), self.vertex_average_ikbp(end));
            if limit < avg_start || limit < avg_end {
                debug!("HIGHIKBP\t{}\t{:.2}\t{:.2}\t{:.2}", seq, avg_start, avg_end, limit);
                high_ikbp.push(seq);
            }
            vertex_ikbp.insert(start.unique_id(), avg_start);
            vertex_ikbp.insert(end.unique_id(), avg_end);
            sequence_ikbp.insert(seq, self.sequence_average_ikbp(seq));
        }
        if config.scoring.remove_high_ikbp_reads {
            info!("HIGHIKBP\tRemoved:{}", high_ikbp.len());
            for &seq in high_ikbp.iter() {
                self.remove_vertices(seq);
            }
        }
        let calculator = ScoreCostCalculator {
            dists,
            by_length_sum,
            vertex_ikbp,
            sequence_ikbp,
            config: config.scoring,
        };
        for id in self.edges() {
            let (score, cost) = calculator.score_and_cost(self.edge(id));
            let edge = self.edge_mut(id);
            edge.score = score;
            edge.cost = cost;
        }
        for id in self.embeddings() {
            let (score, cost) = calculator.score_and_cost(self.embedding(id));
            let embedded = self.embedding_mut(id);
            embedded.score = score;
            embedded.cost = cost;
        }
        dists
    }
}

/// Score and cost of relationships, given the graph-wide fits.
#[derive(Debug, Clone)]
pub struct ScoreCostCalculator {
    dists: EdgeDistributions,
    by_length_sum: BTreeMap<usize, Distribution>,
    /// Average IKBP by vertex unique id.
    vertex_ikbp: HashMap<usize, f64>,
    /// Average IKBP of embeddings by sequence id.
    sequence_ikbp: HashMap<usize, f64>,
    config: ScoringConfig,
}

impl ScoreCostCalculator {
    pub fn new(
        dists: EdgeDistributions,
        by_length_sum: BTreeMap<usize, Distribution>,
        vertex_ikbp: HashMap<usize, f64>,
        sequence_ikbp: HashMap<usize, f64>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            dists,
            by_length_sum,
            vertex_ikbp,
            sequence_ikbp,
            config,
        }
    }
    pub fn score_and_cost<R: Relationship>(&self, rel: &R) -> (f64, u64) {
        (self.score(rel), self.cost(rel))
    }
    fn max_endpoint_ikbp<R: Relationship>(&self, rel: &R) -> f64 {
        let (a, b) = match rel.endpoints() {
            Endpoints::Vertices(v1, v2) => (self.vertex_ikbp.get(&v1), self.vertex_ikbp.get(&v2)),
            Endpoints::Sequences { host, sequence } => {
                (self.sequence_ikbp.get(&host), self.sequence_ikbp.get(&sequence))
            }
        };
        a.copied().unwrap_or(1f64).max(b.copied().unwrap_or(1f64))
    }
    /// IKBP fit of the global distribution, centered on the worse endpoint.
    fn global_ikbp_fit<R: Relationship>(&self, rel: &R) -> NormalFit {
        let global = self.dists.ikbp;
        let mut avg = global.mean().max(self.max_endpoint_ikbp(rel));
        if rel.is_embedding() {
            avg = avg.min(2f64 * global.mean());
        }
        NormalFit::new(avg, avg.max(global.variance()))
    }
    /// IKBP fit of the length-sum bucket, if it is populated enough.
    fn bucket_ikbp_fit<R: Relationship>(&self, rel: &R) -> Option<NormalFit> {
        let bucket = self.by_length_sum.get(&length_sum_key(rel))?;
        if (bucket.count() as usize) <= self.config.min_bucket_count {
            return None;
        }
        let mean = bucket.average();
        let mut avg = mean.max(self.max_endpoint_ikbp(rel));
        if rel.is_embedding() {
            avg = avg.min(2f64 * mean);
        }
        let variance = avg.max(bucket.variance()).min(avg * avg);
        Some(NormalFit::new(avg, variance))
    }
    /// `round(0.001 * overlap * weighted coverage * evidence proportion * p(IKBP))`.
    pub fn score<R: Relationship>(&self, rel: &R) -> f64 {
        let fit = self
            .bucket_ikbp_fit(rel)
            .unwrap_or_else(|| self.global_ikbp_fit(rel));
        let mut p_ikbp = fit.upper_tail(rel.indels_per_kbp());
        if self.config.alpha_ikbp < p_ikbp {
            p_ikbp = 0.5;
        }
        let score = 0.001
            * rel.overlap() as f64
            * rel.weighted_coverage_shared_kmers() as f64
            * rel.evidence_proportion()
            * p_ikbp;
        score.round()
    }
    /// Sum of five capped Phred penalties, scaled by 100.
    pub fn cost<R: Relationship>(&self, rel: &R) -> u64 {
        let sig = self.config.significance;
        let penalty = |p: f64| {
            let p = if sig < p { 0.5 } else { p };
            phred(p, self.config.phred_cap)
        };
        let dists = &self.dists;
        let p_overlap = dists.overlap.cdf(rel.overlap() as f64);
        let p_wcsk = dists
            .weighted_coverage
            .cdf(rel.weighted_coverage_shared_kmers() as f64);
        let p_evidence = dists.evidence_proportion.cdf(rel.evidence_proportion());
        let ikbp = rel.indels_per_kbp();
        let p_ikbp_global = self.global_ikbp_fit(rel).upper_tail(ikbp);
        let p_ikbp_bucket = self
            .bucket_ikbp_fit(rel)
            .map(|fit| fit.upper_tail(ikbp))
            .unwrap_or(p_ikbp_global);
        let cost: u32 = [p_overlap, p_wcsk, p_evidence, p_ikbp_global, p_ikbp_bucket]
            .iter()
            .map(|&p| penalty(p))
            .sum();
        100 * cost as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Edge, Embedding};
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoroshiro128PlusPlus;
    fn calculator() -> ScoreCostCalculator {
        let dists = EdgeDistributions {
            overlap: NormalFit::new(5_000f64, 1_000_000f64),
            coverage: NormalFit::new(2_000f64, 250_000f64),
            weighted_coverage: NormalFit::new(2_000f64, 250_000f64),
            overlap_sd: NormalFit::new(10f64, 25f64),
            evidence_proportion: NormalFit::new(0.98, 0.0009),
            ikbp: NormalFit::new(5f64, 25f64),
        };
        ScoreCostCalculator::new(
            dists,
            BTreeMap::new(),
            HashMap::new(),
            HashMap::new(),
            ScoringConfig::default(),
        )
    }
    fn edge(overlap: usize, wcsk: usize, evidence: usize, mismatches: usize) -> Edge {
        let (v1, v2) = (Vertex::new(0, false), Vertex::new(1, true));
        let mut edge = Edge::new(v1, v2, overlap, 10_000, 10_000);
        edge.weighted_coverage_shared_kmers = wcsk;
        edge.coverage_shared_kmers = wcsk;
        edge.vertex1_evidence_start = 10_000 - overlap;
        edge.vertex1_evidence_end = 10_000 - overlap + evidence;
        edge.vertex2_evidence_end = evidence;
        edge.mismatches = mismatches;
        edge
    }
    #[test]
    fn average_ikbp_of_endpoint() {
        assert_eq!(average_ikbp(vec![]), 1f64);
        // Median 5, mean of the five smallest 3.
        assert_eq!(average_ikbp(vec![1f64, 2f64, 3f64, 4f64, 5f64, 6f64, 7f64, 8f64]), 3f64);
        assert_eq!(average_ikbp(vec![4f64]), 4f64);
    }
    #[test]
    fn score_formula() {
        let calc = calculator();
        let e = edge(5_000, 2_000, 5_000, 5);
        // IKBP of 1 is not significant: p = 0.5.
        assert_eq!(calc.score(&e), (0.001f64 * 5_000f64 * 2_000f64 * 0.5).round());
        // Too many indels depress the score.
        let noisy = edge(5_000, 2_000, 5_000, 500);
        assert!(calc.score(&noisy) < calc.score(&e));
    }
    #[test]
    fn deterministic() {
        let calc = calculator();
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(42);
        for _ in 0..200 {
            let overlap = rng.gen_range(100..10_000);
            let e = edge(overlap, rng.gen_range(0..overlap), rng.gen_range(0..overlap), rng.gen_range(0..300));
            assert_eq!(calc.score_and_cost(&e), calc.score_and_cost(&e.clone()));
            assert_eq!(calc.score_and_cost(&e), calculator().score_and_cost(&e));
        }
    }
    #[test]
    fn cost_never_increases_with_evidence() {
        let calc = calculator();
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(4);
        for _ in 0..100 {
            let overlap = rng.gen_range(1_000..10_000);
            let wcsk = rng.gen_range(0..overlap);
            let mism = rng.gen_range(0..200);
            let mut last = u64::MAX;
            for evidence in (0..=overlap).step_by(overlap / 50) {
                let cost = calc.cost(&edge(overlap, wcsk, evidence, mism));
                assert!(cost <= last, "{cost} > {last} at {evidence}/{overlap}");
                last = cost;
            }
        }
    }
    #[test]
    fn good_edges_cost_less() {
        let calc = calculator();
        let good = edge(6_000, 2_500, 6_000, 5);
        let bad = edge(500, 100, 200, 100);
        assert!(calc.cost(&good) < calc.cost(&bad));
        // Neutral penalties only: five times phred(0.5).
        assert_eq!(calc.cost(&good), 100 * 5 * 3);
    }
    #[test]
    fn embeddings_use_sequence_averages() {
        let mut sequence_ikbp = HashMap::new();
        sequence_ikbp.insert(0, 40f64);
        let calc = ScoreCostCalculator {
            sequence_ikbp,
            ..calculator()
        };
        let mut e = Embedding::new(1, 2_000, false, 0, 10_000, (0, 2_000));
        e.weighted_coverage_shared_kmers = 1_000;
        e.mismatches = 80;
        // The fit is centered at min(40, 2 * 5) = 10 with variance 25: 40 IKBP is significant.
        let fit = calc.global_ikbp_fit(&e);
        assert_eq!(fit.mean(), 10f64);
        assert!(calc.score(&e) < (0.001f64 * 2_000f64 * 1_000f64 * 0.5).round());
    }
    fn bucket(values: &[f64]) -> Distribution {
        let mut dist = Distribution::new(0f64, 100f64, 1f64);
        for &x in values {
            dist.add(x);
        }
        dist
    }
    #[test]
    fn populated_bucket_replaces_global_ikbp() {
        // 20kbp of length sum, IKBP around 30.
        let mut noisy = vec![25f64; 10];
        noisy.extend(std::iter::repeat(35f64).take(10));
        noisy.push(30f64);
        let mut by_length_sum = BTreeMap::new();
        by_length_sum.insert(20, bucket(&noisy));
        let calc = ScoreCostCalculator {
            by_length_sum,
            ..calculator()
        };
        // 24 IKBP: far in the tail of the global N(5, 25), typical for the bucket.
        let e = edge(5_000, 2_000, 5_000, 120);
        let fit = calc.bucket_ikbp_fit(&e).unwrap();
        assert_eq!(fit.mean(), 30f64);
        assert_eq!(fit.variance(), 30f64);
        assert_eq!(calc.score(&e), (0.001f64 * 5_000f64 * 2_000f64 * 0.5).round());
        assert!(calc.score(&e) > calculator().score(&e));
        assert!(calc.cost(&e) < calculator().cost(&e));
        // The global term still applies; only the bucket term turns neutral.
        let global_penalty = phred(calc.global_ikbp_fit(&e).upper_tail(24f64), 100);
        let global_only = calculator().cost(&e);
        assert_eq!(global_only - calc.cost(&e), 100 * (global_penalty - 3) as u64);
        // Other buckets are untouched.
        let other = Edge::new(Vertex::new(0, false), Vertex::new(1, true), 2_000, 5_000, 5_000);
        assert!(calc.bucket_ikbp_fit(&other).is_none());
    }
    #[test]
    fn sparse_bucket_falls_back_to_global() {
        let mut by_length_sum = BTreeMap::new();
        by_length_sum.insert(20, bucket(&[30f64; 20]));
        let calc = ScoreCostCalculator {
            by_length_sum,
            ..calculator()
        };
        let e = edge(5_000, 2_000, 5_000, 120);
        assert!(calc.bucket_ikbp_fit(&e).is_none());
        assert_eq!(calc.score_and_cost(&e), calculator().score_and_cost(&e));
    }
    #[test]
    fn bucket_fit_bounds() {
        let mut by_length_sum = BTreeMap::new();
        by_length_sum.insert(20, bucket(&[30f64; 21]));
        // Mean 2, variance 80.
        let mut skewed = vec![0f64; 20];
        skewed.push(42f64);
        by_length_sum.insert(10, bucket(&skewed));
        let mut sequence_ikbp = HashMap::new();
        sequence_ikbp.insert(0, 100f64);
        let calc = ScoreCostCalculator {
            by_length_sum,
            sequence_ikbp,
            ..calculator()
        };
        // Embeddings are centered at no more than twice the bucket mean.
        let embedded = Embedding::new(1, 10_000, false, 0, 10_000, (0, 10_000));
        let fit = calc.bucket_ikbp_fit(&embedded).unwrap();
        assert_eq!(fit.mean(), 60f64);
        assert_eq!(fit.variance(), 60f64);
        // The variance is capped by the squared mean.
        let e = Edge::new(Vertex::new(0, false), Vertex::new(1, true), 2_000, 5_000, 5_000);
        let fit = calc.bucket_ikbp_fit(&e).unwrap();
        assert_eq!(fit.mean(), 2f64);
        assert_eq!(fit.variance(), 4f64);
    }
    #[test]
    fn update_scores_annotates_graph() {
        let seqs: Vec<Vec<u8>> = (0..30).map(|_| vec![b'A'; 10_000]).collect();
        let mut graph = AssemblyGraph::new(std::sync::Arc::new(definitions::ReadSet::from_seqs(&seqs)));
        let mut rng: Xoroshiro128PlusPlus = SeedableRng::seed_from_u64(7);
        for i in 0..29 {
            let overlap = rng.gen_range(4_000..6_000);
            let mut e = Edge::new(Vertex::new(i, false), Vertex::new(i + 1, true), overlap, 10_000, 10_000);
            e.vertex1_evidence_start = 10_000 - overlap;
            e.vertex1_evidence_end = 10_000;
            e.vertex2_evidence_end = overlap;
            e.weighted_coverage_shared_kmers = overlap / 2;
            e.coverage_shared_kmers = overlap / 2;
            e.mismatches = rng.gen_range(0..20);
            graph.add_edge(e);
        }
        let dists = graph.update_scores(&AssemblyConfig::default());
        assert!(4_000f64 <= dists.overlap.mean() && dists.overlap.mean() <= 6_000f64);
        for id in graph.edges() {
            let e = graph.edge(id);
            if !e.is_same_sequence() {
                assert!(0f64 < e.score, "{}", e);
                assert!(0 < e.cost);
            }
        }
        let mut again = graph.clone();
        let dists2 = again.update_scores(&AssemblyConfig::default());
        assert_eq!(dists, dists2);
        for id in graph.edges() {
            assert_eq!(graph.edge(id).cost, again.edge(id).cost);
            assert_eq!(graph.edge(id).score, again.edge(id).score);
        }
    }
}
