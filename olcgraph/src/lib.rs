pub mod aligner;
pub mod config;
pub mod consensus;
pub mod distribution;
pub mod error;
pub mod find_union;
pub mod graph;
pub mod haplotype_clusters;
pub mod hits;
pub mod indel_correction;
pub mod layout;
pub mod pileup;
pub mod relationships;
pub mod scores;
pub mod stats;
pub mod task_pool;
#[macro_use]
extern crate log;

pub use config::AssemblyConfig;
pub use error::{AssemblyError, Result};
pub use graph::AssemblyGraph;
