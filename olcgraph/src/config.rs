//! Tunable parameters of every stage.
//! The numbers here are calibration parameters: they were tuned on real long-read data sets
//! and are kept configurable rather than derived.
use serde::{Deserialize, Serialize};

pub const DEF_MIN_KMER_PCT: f64 = 5.0;
pub const DEF_MIN_PROPORTION_OVERLAP: f64 = 0.05;
pub const DEF_PLOIDY: usize = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub threads: usize,
    pub relationships: RelationshipConfig,
    pub safe_edges: SafeEdgeConfig,
    pub chimera: ChimeraConfig,
    pub scoring: ScoringConfig,
    pub layout: LayoutConfig,
    pub consensus: ConsensusConfig,
}

/// Filters applied to a k-mer hit cluster before it becomes an edge or an embedding.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipConfig {
    /// Minimum percentage of shared k-mers, relative to the self-hit normalized expectation.
    pub min_kmer_percentage: f64,
    /// Minimum predicted overlap, as a fraction of both the query and the subject length.
    pub min_proportion_overlap: f64,
    /// Minimum evidence span on each side, as a fraction of the predicted overlap.
    pub min_proportion_evidence: f64,
}

impl std::default::Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            min_kmer_percentage: DEF_MIN_KMER_PCT,
            min_proportion_overlap: DEF_MIN_PROPORTION_OVERLAP,
            min_proportion_evidence: 0.0,
        }
    }
}

impl RelationshipConfig {
    pub fn new(
        min_kmer_percentage: f64,
        min_proportion_overlap: f64,
        min_proportion_evidence: f64,
    ) -> Self {
        Self {
            min_kmer_percentage,
            min_proportion_overlap,
            min_proportion_evidence,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeEdgeConfig {
    pub min_evidence_proportion: f64,
    pub max_indels_per_kbp: f64,
    /// A vertex is repetitive if the upper cumulative of its degree exceeds this value.
    pub repetitive_cumulative: f64,
}

impl std::default::Default for SafeEdgeConfig {
    fn default() -> Self {
        Self {
            min_evidence_proportion: 0.9,
            max_indels_per_kbp: 30.0,
            repetitive_cumulative: 0.999,
        }
    }
}

/// Thresholds of the chimera and dangling-end detection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChimeraConfig {
    /// A flank is "unknown" if more than this many bases of the predicted span lack evidence.
    pub unknown_flank: i64,
    /// Maximum unevidenced bases on both sides of a relationship that crosses the junction.
    pub tight_bound: i64,
    /// Minimum extension of a crossing relationship beyond the evidence medians.
    pub crossing_margin: i64,
    /// Gap between evidenced and predicted extents on opposite flanks (d1, d2).
    pub min_opposite_gap: i64,
    /// Gap between evidenced and predicted extents on the same flank (d3, d4).
    pub min_same_gap: i64,
    /// A sequence with at least this many crossing relationships is never a chimera.
    pub max_crossing: usize,
    /// Below this many flank observations from embeddings, edges are also used.
    pub min_flank_observations: usize,
    /// An edge is a "good overlap" if its overlap exceeds this fraction of the read length.
    pub good_overlap_fraction: f64,
    pub pass_evidence_proportion: f64,
    pub pass_indels_per_kbp: f64,
    /// Minimum number of good overlaps on a flank to evaluate the dangling-end rule.
    pub min_good_overlaps: usize,
    pub pass_fraction: f64,
}

impl std::default::Default for ChimeraConfig {
    fn default() -> Self {
        Self {
            unknown_flank: 1000,
            tight_bound: 200,
            crossing_margin: 100,
            min_opposite_gap: 1000,
            min_same_gap: 2000,
            max_crossing: 2,
            min_flank_observations: 5,
            good_overlap_fraction: 0.5,
            pass_evidence_proportion: 0.9,
            pass_indels_per_kbp: 50.0,
            min_good_overlaps: 5,
            pass_fraction: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// IKBP p-values above this value do not penalize a relationship.
    pub alpha_ikbp: f64,
    /// Cost p-values above this value are replaced by the neutral 0.5.
    pub significance: f64,
    /// Below this many safe edges, the distributions are fitted over all edges.
    pub min_safe_edges: usize,
    /// Minimum number of relationships in a length-sum bucket to use its IKBP distribution.
    pub min_bucket_count: usize,
    pub phred_cap: u32,
    pub remove_high_ikbp_reads: bool,
}

impl std::default::Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha_ikbp: 0.001,
            significance: 0.05,
            min_safe_edges: 20,
            min_bucket_count: 20,
            phred_cap: 100,
            remove_high_ikbp_reads: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Affects haplotype clustering only.
    pub ploidy: usize,
    /// Minimum number of reads per path, before the ploidy adjustment.
    pub min_path_length: usize,
    pub algorithm: LayoutAlgorithm,
}

impl std::default::Default for LayoutConfig {
    fn default() -> Self {
        Self {
            ploidy: DEF_PLOIDY,
            min_path_length: 1,
            algorithm: LayoutAlgorithm::default(),
        }
    }
}

/// Order in which candidate edges are offered to the path layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutAlgorithm {
    /// Lowest cost first.
    #[default]
    Kruskal,
    /// Highest score first.
    GreedyScore,
}

impl LayoutConfig {
    /// Paths shorter than this number of reads are not reported.
    pub fn ploidy_adjusted_min_path_length(&self) -> usize {
        (self.min_path_length * self.ploidy.max(1)).max(1)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub kmer_size: usize,
    /// Minimum fraction of the read covered by unique k-mer seeds.
    pub min_seed_fraction: f64,
    pub band_width: usize,
    pub min_variant_coverage: u32,
    /// Minimum fraction of the coverage supporting the alternative allele of a homozygous call.
    pub homozygous_fraction: f64,
    /// Minimum fraction of the coverage supporting each allele of a heterozygous call.
    pub heterozygous_fraction: f64,
}

impl std::default::Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            kmer_size: 15,
            min_seed_fraction: 0.5,
            band_width: 100,
            min_variant_coverage: 3,
            homozygous_fraction: 0.7,
            heterozygous_fraction: 0.3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn ploidy_adjustment() {
        let c = LayoutConfig {
            ploidy: 2,
            min_path_length: 3,
            ..Default::default()
        };
        assert_eq!(c.ploidy_adjusted_min_path_length(), 6);
        let c = LayoutConfig {
            ploidy: 0,
            min_path_length: 0,
            ..Default::default()
        };
        assert_eq!(c.ploidy_adjusted_min_path_length(), 1);
    }
    #[test]
    fn partial_profile() {
        let c: AssemblyConfig =
            serde_json::from_str(r#"{"threads":4,"chimera":{"max_crossing":3}}"#).unwrap();
        assert_eq!(c.threads, 4);
        assert_eq!(c.chimera.max_crossing, 3);
        assert_eq!(c.chimera.min_same_gap, 2000);
        assert_eq!(c.relationships.min_kmer_percentage, DEF_MIN_KMER_PCT);
    }
}
