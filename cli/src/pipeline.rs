//! Pipelines -- from long reads to polished contigs.
//!
//! Every stage of the assembler is a function of the graph built in the previous one: the
//! relationships between reads, the optional indel correction, the sanitization, the layout,
//! and the consensus of each path.
use definitions::{Contig, ReadSet};
use log::*;
use olcgraph::config::AssemblyConfig;
use olcgraph::consensus::ConsensusBuilder;
use olcgraph::error::{AssemblyError, Result};
use olcgraph::graph::{AssemblyGraph, Edge, Embedding};
use olcgraph::haplotype_clusters::HaplotypeClusterer;
use olcgraph::hits::{DiagonalClusterer, KmerTable};
use olcgraph::indel_correction::IndelCorrector;
use olcgraph::layout;
use olcgraph::pileup::PileupVariantCaller;
use olcgraph::relationships::RelationshipBuilder;
use olcgraph::stats::Stats;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The configuration of the pipeline.
/// Every field can be given in a TOML profile; command line flags override the profile.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PipelineConfig {
    /// The path to the input FASTA/FASTQ file.
    pub input_file: PathBuf,
    /// The path to the output directory.
    pub out_dir: PathBuf,
    pub prefix: String,
    pub threads: usize,
    /// Length of the k-mers of the hit table.
    pub kmer_size: usize,
    /// K-mers occurring more often than this are not used as hits.
    pub max_kmer_occurrence: usize,
    /// Correct indel errors of the reads and rebuild the graph before the layout.
    pub correct_errors: bool,
    /// Cluster the reads of the paths into haplotypes.
    pub haplotypes: bool,
    pub assembly: AssemblyConfig,
}

impl std::default::Default for PipelineConfig {
    fn default() -> Self {
        let mut assembly = AssemblyConfig::default();
        assembly.scoring.remove_high_ikbp_reads = true;
        Self {
            input_file: PathBuf::new(),
            out_dir: PathBuf::from("./"),
            prefix: "olcgraph".to_string(),
            threads: 1,
            kmer_size: 15,
            max_kmer_occurrence: 100,
            correct_errors: false,
            haplotypes: false,
            assembly,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(profile: &str) -> Result<Self> {
        toml::from_str(profile).map_err(|e| AssemblyError::Profile(e.to_string()))
    }
    fn file_stem(&self) -> PathBuf {
        self.out_dir.join(&self.prefix)
    }
}

/// Serialized view of a graph.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GraphSummary {
    pub input_file: String,
    pub num_reads: usize,
    pub edges: Vec<Edge>,
    pub embeddings: Vec<Embedding>,
    /// Reads of every layout path, in path order.
    pub paths: Vec<Vec<usize>>,
}

impl GraphSummary {
    pub fn new(graph: &AssemblyGraph) -> Self {
        Self {
            input_file: graph.reads().input_file.clone(),
            num_reads: graph.num_sequences(),
            edges: graph.edges().into_iter().map(|id| graph.edge(id).clone()).collect(),
            embeddings: graph
                .embeddings()
                .into_iter()
                .map(|id| graph.embedding(id).clone())
                .collect(),
            paths: graph.paths().iter().map(|p| graph.path_reads(p)).collect(),
        }
    }
}

pub fn parse_input(input_file: &Path) -> std::io::Result<ReadSet> {
    debug!("Opening {:?}", input_file);
    let reader = std::fs::File::open(input_file).map(BufReader::new)?;
    let extension = input_file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let seqs: Vec<(String, Vec<u8>)> = if extension.ends_with('a') {
        bio::io::fasta::Reader::new(reader)
            .records()
            .map(|record| record.map(|r| (r.id().to_string(), r.seq().to_vec())))
            .collect::<std::io::Result<_>>()?
    } else if extension.ends_with('q') {
        bio::io::fastq::Reader::new(reader)
            .records()
            .map(|record| {
                record
                    .map(|r| (r.id().to_string(), r.seq().to_vec()))
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
            })
            .collect::<std::io::Result<_>>()?
    } else {
        let message = format!("file type:{:?} not supported", input_file);
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, message));
    };
    info!("INPUT\t{}\t{}", seqs.len(), seqs.iter().map(|x| x.1.len()).sum::<usize>());
    Ok(ReadSet::with_minimum_data(&input_file.to_string_lossy(), seqs))
}

/// Graph of the relationships between the reads.
pub fn build_graph(reads: Arc<ReadSet>, config: &PipelineConfig) -> AssemblyGraph {
    let seqs: Vec<&[u8]> = (0..reads.len()).map(|i| reads.seq(i)).collect();
    let table = KmerTable::new(&seqs, config.kmer_size, config.max_kmer_occurrence);
    let clusterer = DiagonalClusterer::new(config.kmer_size);
    let mut graph = AssemblyGraph::new(reads.clone());
    graph.set_ploidy(config.assembly.layout.ploidy);
    let builder = RelationshipBuilder::new(&table, &clusterer, config.assembly.relationships);
    builder.build(&mut graph);
    graph
}

/// Scores, chimera removal, and the choice of a single host for every embedded read.
pub fn sanitize(graph: &mut AssemblyGraph, config: &AssemblyConfig) {
    graph.update_scores(config);
    let chimeras = graph.remove_chimeric_reads(&config.chimera);
    let embedded = graph.filter_embedded();
    let pruned = graph.prune_embedded_sequences();
    graph.compact();
    info!("SANITIZE\t{}\t{}\t{}", chimeras.len(), embedded, pruned);
}

/// Build, correct (optionally), and sanitize the graph.
pub fn prepare_graph(config: &PipelineConfig) -> Result<AssemblyGraph> {
    let reads = Arc::new(parse_input(&config.input_file)?);
    let mut graph = build_graph(reads, config);
    if config.correct_errors {
        IndelCorrector::new(&config.assembly).correct(&mut graph);
        let corrected = Arc::new(graph.current_read_set());
        graph = build_graph(corrected, config);
    }
    sanitize(&mut graph, &config.assembly);
    Ok(graph)
}

pub fn run_assemble(config: &PipelineConfig) -> Result<Vec<Contig>> {
    std::fs::create_dir_all(&config.out_dir)?;
    let mut graph = prepare_graph(config)?;
    let strategy = layout::strategy(&config.assembly.layout);
    graph.build_layout(strategy.as_ref());
    let caller = PileupVariantCaller::new(&config.assembly.consensus);
    let contigs = ConsensusBuilder::new(&config.assembly.consensus, &caller).make_contigs(&graph);
    let file_stem = config.file_stem();
    let mut wtr = std::fs::File::create(file_stem.with_extension("fa")).map(BufWriter::new)?;
    for contig in contigs.iter() {
        writeln!(wtr, "{}", contig)?;
    }
    write_graph(&graph, &file_stem)?;
    if config.haplotypes {
        let haplotypes = HaplotypeClusterer::new(&config.assembly).cluster(&graph)?;
        let path = file_stem.with_extension("haplotypes.json");
        let wtr = std::fs::File::create(path).map(BufWriter::new)?;
        serde_json::ser::to_writer(wtr, &haplotypes)?;
    }
    info!("CONTIGS\t{}", contigs.len());
    Ok(contigs)
}

pub fn run_graph(config: &PipelineConfig) -> Result<AssemblyGraph> {
    std::fs::create_dir_all(&config.out_dir)?;
    let graph = prepare_graph(config)?;
    write_graph(&graph, &config.file_stem())?;
    Ok(graph)
}

/// Correct the reads and write them as FASTA.
pub fn run_correct(config: &PipelineConfig) -> Result<ReadSet> {
    std::fs::create_dir_all(&config.out_dir)?;
    let reads = Arc::new(parse_input(&config.input_file)?);
    let mut graph = build_graph(reads, config);
    IndelCorrector::new(&config.assembly).correct(&mut graph);
    let corrected = graph.current_read_set();
    let path = config.file_stem().with_extension("corrected.fa");
    let mut wtr = std::fs::File::create(path).map(BufWriter::new)?;
    for read in corrected.raw_reads.iter() {
        writeln!(wtr, ">{}\n{}", read.name, read.seq)?;
    }
    Ok(corrected)
}

fn write_graph(graph: &AssemblyGraph, file_stem: &Path) -> Result<()> {
    let wtr = std::fs::File::create(file_stem.with_extension("graph.json")).map(BufWriter::new)?;
    serde_json::ser::to_writer(wtr, &GraphSummary::new(graph))?;
    let wtr = std::fs::File::create(file_stem.with_extension("stats.txt")).map(BufWriter::new)?;
    graph.stats(wtr)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn profile_overrides_defaults() {
        let profile = r#"
input_file = "reads.fq"
threads = 4
[assembly.layout]
ploidy = 2
algorithm = "greedy_score"
"#;
        let config = PipelineConfig::from_toml(profile).unwrap();
        assert_eq!(config.input_file, PathBuf::from("reads.fq"));
        assert_eq!(config.threads, 4);
        assert_eq!(config.kmer_size, 15);
        assert_eq!(config.assembly.layout.ploidy, 2);
        assert_eq!(
            config.assembly.layout.algorithm,
            olcgraph::config::LayoutAlgorithm::GreedyScore
        );
    }
    #[test]
    fn high_ikbp_reads_are_removed_by_default() {
        let config = PipelineConfig::from_toml("input_file = \"reads.fa\"").unwrap();
        assert!(config.assembly.scoring.remove_high_ikbp_reads);
        assert_eq!(config.assembly.layout.ploidy, 1);
    }
    #[test]
    fn broken_profile() {
        assert!(matches!(
            PipelineConfig::from_toml("threads = \"many\""),
            Err(AssemblyError::Profile(_))
        ));
    }
}
