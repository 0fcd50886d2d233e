pub mod caller;
pub mod distribution;
pub mod error;
pub mod genotypes;
pub mod merging;
pub mod model;
pub mod output;
pub mod parameters;
pub mod partition;
pub mod pedigree;
pub mod segment_reader;
pub mod statistics;
pub mod types;
pub mod vcf_parser;
