use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env, Target};
use indicatif::{ProgressBar, ProgressStyle};
use pedigree_cnv::caller::PedigreeCaller;
use pedigree_cnv::parameters::PedigreeCallerParameters;
use pedigree_cnv::pedigree::{self, Kinship, PedigreeMember};
use pedigree_cnv::types::CallerMode;
use pedigree_cnv::{merging, output, segment_reader, vcf_parser};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "pedigree-cnv")]
#[command(version)]
#[command(about = "Call copy number and allele genotypes jointly across a family", long_about = None)]
struct Args {
    /// Segment TSV per sample (chrom, start, end, coverage); repeat once per sample
    #[arg(long, required = true)]
    segments: Vec<PathBuf>,

    /// VCF/BCF with AD allele depths per sample, in the same order as --segments
    #[arg(long, required = true)]
    allele_counts: Vec<PathBuf>,

    /// Sample name per input, in the same order as --segments
    #[arg(long, required = true)]
    sample_name: Vec<String>,

    /// Pedigree (.ped) file; enables pedigree-aware calling
    #[arg(long)]
    pedigree: Option<PathBuf>,

    /// Reference ploidy TSV (sample, chrom, start, end, copy_number)
    #[arg(long)]
    ploidy: Option<PathBuf>,

    /// JSON file with calling parameters; absent fields keep their defaults
    #[arg(long)]
    params: Option<PathBuf>,

    /// Joint output TSV path
    #[arg(short, long)]
    output: PathBuf,

    /// Directory for per-sample output TSVs
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Number of threads for parallel processing
    #[arg(long, default_value_t = num_cpus())]
    threads: usize,

    /// Seed for offspring genotype subsampling (overrides the parameter file)
    #[arg(long)]
    seed: Option<u64>,

    /// Suppress progress output
    #[arg(short, long)]
    quiet: bool,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

macro_rules! progress {
    ($quiet:expr) => {
        if !$quiet {
            eprintln!();
        }
    };
    ($quiet:expr, $($arg:tt)*) => {
        if !$quiet {
            eprintln!($($arg)*);
        }
    };
}

fn make_progress_bar(quiet: bool, len: u64) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("  [{elapsed_precise}/{eta_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    Ok(pb)
}

fn load_parameters(args: &Args) -> Result<PedigreeCallerParameters> {
    let mut params = match &args.params {
        Some(path) => PedigreeCallerParameters::from_json_file(path)
            .with_context(|| format!("Failed to load parameters from {}", path.display()))?,
        None => PedigreeCallerParameters::default(),
    };
    if let Some(seed) = args.seed {
        params.subsampling_seed = seed;
    }
    Ok(params)
}

fn main() -> Result<()> {
    let args = Args::parse();

    if !args.quiet {
        Builder::from_env(Env::default().default_filter_or("info"))
            .target(Target::Stderr)
            .init();
    }

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build_global()
        .context("Failed to configure thread pool")?;

    let num_samples = args.segments.len();
    if args.allele_counts.len() != num_samples || args.sample_name.len() != num_samples {
        anyhow::bail!(
            "--segments ({}), --allele-counts ({}) and --sample-name ({}) must be given once per sample",
            num_samples,
            args.allele_counts.len(),
            args.sample_name.len()
        );
    }
    let mode = if args.pedigree.is_some() {
        CallerMode::Pedigree
    } else {
        CallerMode::Independent
    };

    progress!(args.quiet, "Pedigree CNV Caller");
    progress!(args.quiet, "=========================================");
    progress!(args.quiet, "Samples: {}", args.sample_name.join(", "));
    progress!(args.quiet, "Mode: {:?}", mode);
    progress!(args.quiet, "Output TSV: {}", args.output.display());
    progress!(args.quiet, "Threads: {}", args.threads);
    progress!(args.quiet);

    // Step 1: Parameters
    progress!(args.quiet, "Step 1: Loading parameters...");
    let params = load_parameters(&args)?;
    let caller = PedigreeCaller::new(params)?;
    let params = caller.parameters();
    progress!(args.quiet, "  Copy number states: 0-{}", params.maximum_copy_number - 1);

    // Step 2: Segments and allele counts
    progress!(args.quiet);
    progress!(args.quiet, "Step 2: Loading segments and allele counts...");
    let mut inputs = Vec::with_capacity(num_samples);
    for ((segments_path, vcf_path), name) in args
        .segments
        .iter()
        .zip(&args.allele_counts)
        .zip(&args.sample_name)
    {
        let mut segments = segment_reader::load_segments(segments_path)?;
        let mean_allele_coverage = vcf_parser::load_allele_counts(vcf_path, Some(name), &mut segments)?;
        progress!(
            args.quiet,
            "  {}: {} segments, mean allele coverage {:.2}",
            name,
            segments.len(),
            mean_allele_coverage
        );
        inputs.push((segments, mean_allele_coverage));
    }

    // Step 3: Family structure
    progress!(args.quiet);
    let kinships = match &args.pedigree {
        Some(path) => {
            progress!(args.quiet, "Step 3: Reading pedigree {}...", path.display());
            let records = pedigree::read_pedigree_file(path)?;
            pedigree::assign_kinships(&records, &args.sample_name)?
        }
        None => {
            progress!(args.quiet, "Step 3: No pedigree given, calling samples independently");
            vec![Kinship::Other; num_samples]
        }
    };

    // Step 4: Reference ploidy
    let mut ploidy = match &args.ploidy {
        Some(path) => {
            progress!(args.quiet, "Step 4: Loading reference ploidy {}...", path.display());
            segment_reader::load_ploidy(path)?
        }
        None => Default::default(),
    };

    // Step 5: Models
    progress!(args.quiet);
    progress!(args.quiet, "Step 5: Building per-sample models...");
    let mut members = Vec::with_capacity(num_samples);
    for ((name, kinship), (segments, mean_allele_coverage)) in
        args.sample_name.iter().zip(kinships).zip(inputs)
    {
        let member = PedigreeMember::new(
            name.clone(),
            kinship,
            segments,
            mean_allele_coverage,
            ploidy.remove(name),
            params.maximum_copy_number,
        )?;
        progress!(
            args.quiet,
            "  {} ({}): mean coverage {:.2}, max coverage {}",
            member.name,
            member.kinship,
            member.mean_coverage,
            member.max_coverage
        );
        members.push(member);
    }

    // Step 6: Calling
    progress!(args.quiet);
    progress!(args.quiet, "Step 6: Calling copy number and genotypes...");
    let pb = make_progress_bar(args.quiet, members[0].segments.len() as u64)?;
    caller.call(&mut members, mode, Some(&pb))?;
    pb.finish_and_clear();

    // Step 7: Merging
    progress!(args.quiet, "Step 7: Merging segments...");
    let before = members[0].segments.len();
    merging::merge_segments(&mut members, params)?;
    progress!(args.quiet, "  {} segments merged into {}", before, members[0].segments.len());

    // Step 8: Output
    progress!(args.quiet);
    progress!(args.quiet, "Step 8: Writing results...");
    let de_novo_threshold = params.de_novo_quality_filter_threshold;
    output::write_joint_calls(&members, &args.output, de_novo_threshold)?;
    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        for member in &members {
            let path = sample_output_path(dir, &member.name);
            output::write_sample_calls(member, &path, de_novo_threshold)?;
            progress!(args.quiet, "  {}: {}", member.name, path.display());
        }
    }

    progress!(args.quiet);
    progress!(args.quiet, "Done! Results written to: {}", args.output.display());
    Ok(())
}

fn sample_output_path(dir: &Path, sample: &str) -> PathBuf {
    dir.join(format!("{}.cnv.tsv", sample))
}
