use clap::{Args, Parser, Subcommand};
use olcgraph::config::LayoutAlgorithm;
use olcgraph_cli::pipeline::{self, PipelineConfig};
use std::path::PathBuf;
#[macro_use]
extern crate log;

#[derive(Parser, Debug)]
#[clap(name = "olcgraph")]
#[clap(author, version, about = "Overlap-layout-consensus assembler for long reads", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Assemble the reads into polished contigs.
    Assemble(CommonArgs),
    /// Build and sanitize the assembly graph, then write it as JSON.
    Graph(CommonArgs),
    /// Correct indel errors of the reads.
    Correct(CommonArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Input FASTA/Q file.
    #[clap(short = 'r', long)]
    input: Option<PathBuf>,
    /// TOML profile. Flags given on the command line override it.
    #[clap(short, long)]
    profile: Option<PathBuf>,
    #[clap(short, long)]
    out_dir: Option<PathBuf>,
    /// Prefix of the output files.
    #[clap(long)]
    prefix: Option<String>,
    /// Number of threads.
    #[clap(short, long)]
    threads: Option<usize>,
    #[clap(short, long)]
    kmer_size: Option<usize>,
    #[clap(long)]
    ploidy: Option<usize>,
    /// Order in which the edges are offered to the layout.
    #[clap(long, value_enum)]
    layout: Option<LayoutChoice>,
    /// Correct indel errors before the layout.
    #[clap(long)]
    correct_errors: bool,
    /// Cluster the reads of every path into haplotypes.
    #[clap(long)]
    haplotypes: bool,
    /// Debug mode.
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutChoice {
    Kruskal,
    GreedyScore,
}

impl CommonArgs {
    fn config(&self) -> olcgraph::Result<PipelineConfig> {
        let mut config = match self.profile.as_ref() {
            Some(path) => PipelineConfig::from_toml(&std::fs::read_to_string(path)?)?,
            None => PipelineConfig::default(),
        };
        if let Some(input) = self.input.as_ref() {
            config.input_file = input.clone();
        }
        if let Some(out_dir) = self.out_dir.as_ref() {
            config.out_dir = out_dir.clone();
        }
        if let Some(prefix) = self.prefix.as_ref() {
            config.prefix = prefix.clone();
        }
        if let Some(threads) = self.threads {
            config.threads = threads;
        }
        if let Some(k) = self.kmer_size {
            config.kmer_size = k;
        }
        if let Some(ploidy) = self.ploidy {
            config.assembly.layout.ploidy = ploidy;
        }
        if let Some(layout) = self.layout {
            config.assembly.layout.algorithm = match layout {
                LayoutChoice::Kruskal => LayoutAlgorithm::Kruskal,
                LayoutChoice::GreedyScore => LayoutAlgorithm::GreedyScore,
            };
        }
        config.correct_errors |= self.correct_errors;
        config.haplotypes |= self.haplotypes;
        config.threads = config.threads.max(1);
        config.assembly.threads = config.threads;
        if config.input_file.as_os_str().is_empty() {
            let message = "no input file given".to_string();
            return Err(olcgraph::AssemblyError::Profile(message));
        }
        Ok(config)
    }
}

fn set_up(args: &CommonArgs) -> olcgraph::Result<PipelineConfig> {
    let level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    let config = args.config()?;
    if let Err(why) = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build_global()
    {
        debug!("{:?} The global thread pool is already set.", why);
    }
    Ok(config)
}

fn main() -> olcgraph::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Assemble(args) => {
            let config = set_up(&args)?;
            debug!("START\tAssemble");
            let contigs = pipeline::run_assemble(&config)?;
            info!("END\tAssemble\t{}", contigs.len());
        }
        Command::Graph(args) => {
            let config = set_up(&args)?;
            debug!("START\tGraph");
            let graph = pipeline::run_graph(&config)?;
            info!("END\tGraph\t{}", graph.num_edges());
        }
        Command::Correct(args) => {
            let config = set_up(&args)?;
            debug!("START\tCorrect");
            let reads = pipeline::run_correct(&config)?;
            info!("END\tCorrect\t{}", reads.len());
        }
    }
    Ok(())
}
