use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use popwin::stats::{compute_ld, compute_sfs, LdValue};
use popwin::{ErrorModel, LdKind, PileupColumn, ReadObservation, RunParams, SampleRegistry,
    SfsTables, WindowDriver};

#[derive(Parser, Debug)]
#[command(name = "popwin", about = "Sliding-window population genetics from read pileups")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Pileup file (`pos sample base base_qual map_qual strand` per line,
    /// 0-based positions).
    pileup: PathBuf,

    /// Sample-to-population assignments (`sample<TAB>population` per line).
    #[arg(long)]
    samples: PathBuf,

    /// Reference sequence (plain FASTA or raw sequence).
    #[arg(long)]
    reference: PathBuf,

    /// Chromosome name used in the output.
    #[arg(long, default_value = "chr1")]
    chrom: String,

    /// Window size in bases (0 = one window over the whole reference).
    #[arg(long, default_value_t = 0)]
    window_size: u64,

    /// Minimum read coverage per sample.
    #[arg(long, default_value_t = 3)]
    min_depth: u16,

    /// Maximum read coverage per sample.
    #[arg(long, default_value_t = 255)]
    max_depth: u16,

    /// Minimum RMS mapping quality.
    #[arg(long, default_value_t = 25)]
    min_rms: u16,

    /// Minimum SNP quality.
    #[arg(long, default_value_t = 25)]
    min_snpq: u16,

    /// Keep heterozygous calls instead of collapsing them.
    #[arg(long)]
    keep_heterozygotes: bool,

    /// Seed for the downsampling RNG.
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute a linkage disequilibrium statistic per window.
    Ld {
        #[command(flatten)]
        common: CommonArgs,

        /// Which statistic to compute.
        #[arg(long, value_enum, default_value_t = LdStat::Zns)]
        stat: LdStat,

        /// Exclude singletons from the LD calculations.
        #[arg(long)]
        exclude_singletons: bool,

        /// Minimum number of SNPs for a window to be reported.
        #[arg(long, default_value_t = 10)]
        min_snps: usize,
    },
    /// Compute Tajima's D and Fay-Wu H per window.
    Sfs {
        #[command(flatten)]
        common: CommonArgs,

        /// Sample name of the outgroup (default: reference is ancestral).
        #[arg(long)]
        outgroup: Option<String>,

        /// Minimum proportion of aligned sites in a window.
        #[arg(long, default_value_t = 0.5)]
        min_sites: f64,

        /// Minimum proportion of a population covered at a site.
        #[arg(long, default_value_t = 1.0)]
        min_pop: f64,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LdStat {
    Zns,
    OmegaMax,
    Wall,
}

impl From<LdStat> for LdKind {
    fn from(stat: LdStat) -> Self {
        match stat {
            LdStat::Zns => LdKind::Zns,
            LdStat::OmegaMax => LdKind::OmegaMax,
            LdStat::Wall => LdKind::Wall,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Commands::Ld {
            common,
            stat,
            exclude_singletons,
            min_snps,
        } => {
            let params = RunParams {
                min_freq: if exclude_singletons { 2 } else { 1 },
                min_snps,
                ..params_from(&common)
            };
            run(&common, params, Analysis::Ld(stat.into()))
        }
        Commands::Sfs {
            common,
            outgroup,
            min_sites,
            min_pop,
        } => {
            let mut params = RunParams {
                min_sites,
                min_pop,
                ..params_from(&common)
            };
            run_sfs_setup(&common, &mut params, outgroup.as_deref())
        }
    }
}

enum Analysis {
    Ld(LdKind),
    Sfs,
}

fn params_from(common: &CommonArgs) -> RunParams {
    RunParams {
        min_rms_quality: common.min_rms,
        min_depth: common.min_depth,
        max_depth: common.max_depth,
        min_snp_quality: common.min_snpq,
        keep_heterozygotes: common.keep_heterozygotes,
        seed: common.seed,
        ..RunParams::default()
    }
}

fn run_sfs_setup(common: &CommonArgs, params: &mut RunParams, outgroup: Option<&str>) -> Result<()> {
    if let Some(name) = outgroup {
        let registry = load_registry(&common.samples)?;
        params.outgroup = Some(
            registry
                .sample_index(name)
                .with_context(|| format!("outgroup {name} not found among samples"))?,
        );
    }
    run(common, params.clone(), Analysis::Sfs)
}

fn run(common: &CommonArgs, params: RunParams, analysis: Analysis) -> Result<()> {
    let registry = load_registry(&common.samples)?;
    params
        .validate(registry.num_samples())
        .context("invalid run parameters")?;

    let reference = read_sequence_file(&common.reference)
        .with_context(|| format!("failed to read reference from {}", common.reference.display()))?;
    if reference.is_empty() {
        bail!("reference sequence is empty");
    }

    let columns = read_pileup_file(&common.pileup, &registry)
        .with_context(|| format!("failed to read pileup from {}", common.pileup.display()))?;
    info!(
        samples = registry.num_samples(),
        populations = registry.num_populations(),
        columns = columns.len(),
        "inputs loaded"
    );

    let model = ErrorModel::new(params.depcorr).context("failed to build error model")?;
    let mut driver = WindowDriver::new(&model, &registry, &params);
    let tables = SfsTables::new(registry.num_samples());

    let region_end = reference.len() as u64;
    let window_size = if common.window_size == 0 {
        region_end
    } else {
        common.window_size
    };

    let mut beg = 0u64;
    while beg < region_end {
        let end = (beg + window_size).min(region_end);
        driver.start_window(beg, end);
        for (_, column) in columns.range(beg..end) {
            driver.process_column(column, reference[column.pos as usize]);
        }

        match &analysis {
            Analysis::Ld(kind) => {
                let results = compute_ld(*kind, driver.window(), &registry, &params);
                let row = format_ld_row(
                    &common.chrom,
                    driver.window().num_sites(),
                    beg,
                    end,
                    *kind,
                    &registry,
                    &results,
                );
                println!("{row}");
            }
            Analysis::Sfs => {
                let results = compute_sfs(driver.window(), &registry, &tables, &params);
                let row = format_sfs_row(&common.chrom, beg, end, &registry, &results);
                println!("{row}");
            }
        }
        beg = end;
    }

    Ok(())
}

/// One output line per window. Undefined statistics keep the same labeled
/// columns as defined ones so every row of a run has an identical layout.
fn format_ld_row(
    chrom: &str,
    num_sites: usize,
    beg: u64,
    end: u64,
    kind: LdKind,
    registry: &SampleRegistry,
    results: &[popwin::PopLd],
) -> String {
    let mut line = format!("{chrom}\t{}\t{end}\t{num_sites}", beg + 1);
    for result in results {
        let name = &registry.populations()[result.population].name;
        line.push_str(&format!("\tS[{name}]:\t{}", result.num_snps));
        match result.value {
            Some(LdValue::Zns(v)) => line.push_str(&format!("\tZns[{name}]:\t{v:.5}")),
            Some(LdValue::OmegaMax(v)) => line.push_str(&format!("\tomax[{name}]:\t{v:.5}")),
            Some(LdValue::Wall { b, q }) => {
                line.push_str(&format!("\tB[{name}]:\t{b:.5}\tQ[{name}]:\t{q:.5}"));
            }
            None => match kind {
                LdKind::Zns => line.push_str(&format!("\tZns[{name}]:\tNA")),
                LdKind::OmegaMax => line.push_str(&format!("\tomax[{name}]:\tNA")),
                LdKind::Wall => {
                    line.push_str(&format!("\tB[{name}]:\tNA\tQ[{name}]:\tNA"));
                }
            },
        }
    }
    line
}

fn format_sfs_row(
    chrom: &str,
    beg: u64,
    end: u64,
    registry: &SampleRegistry,
    results: &[popwin::PopSfs],
) -> String {
    let mut line = format!("{chrom}\t{}\t{end}", beg + 1);
    for result in results {
        let name = &registry.populations()[result.population].name;
        line.push_str(&format!("\tns[{name}]:\t{}", result.aligned_sites));
        match result.tajima_d {
            Some(d) => line.push_str(&format!("\tD[{name}]:\t{d:.5}")),
            None => line.push_str(&format!("\tD[{name}]:\tNA")),
        }
        match result.fay_wu_h {
            Some(h) => line.push_str(&format!("\tH[{name}]:\t{h:.5}")),
            None => line.push_str(&format!("\tH[{name}]:\tNA")),
        }
    }
    line
}

fn load_registry(path: &PathBuf) -> Result<SampleRegistry> {
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("failed to open samples file {}", path.display()))?,
    );

    let mut assignments = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let sample = fields
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing sample name on line {}", line_no + 1))?;
        let population = fields
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing population on line {}", line_no + 1))?;
        assignments.push((sample.to_string(), population.to_string()));
    }

    SampleRegistry::from_assignments(assignments).context("invalid sample assignments")
}

fn read_sequence_file(path: &PathBuf) -> Result<Vec<u8>> {
    let contents = std::fs::read_to_string(path)?;
    let sequence: String = contents
        .lines()
        .filter(|line| !line.starts_with('>') && !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("");
    Ok(sequence.trim().to_ascii_uppercase().into_bytes())
}

fn read_pileup_file(
    path: &PathBuf,
    registry: &SampleRegistry,
) -> Result<BTreeMap<u64, PileupColumn>> {
    let reader = BufReader::new(File::open(path)?);
    let mut columns: BTreeMap<u64, PileupColumn> = BTreeMap::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 6 {
            bail!("expected 6 fields on line {}", line_no + 1);
        }

        let pos: u64 = fields[0]
            .parse()
            .with_context(|| format!("invalid position '{}' on line {}", fields[0], line_no + 1))?;
        let sample = registry
            .sample_index(fields[1])
            .with_context(|| format!("unknown sample on line {}", line_no + 1))?;
        let base = fields[2].as_bytes()[0];
        let base_quality: u8 = fields[3]
            .parse()
            .with_context(|| format!("invalid base quality on line {}", line_no + 1))?;
        let map_quality: u8 = fields[4]
            .parse()
            .with_context(|| format!("invalid mapping quality on line {}", line_no + 1))?;
        let is_reverse = match fields[5] {
            "+" => false,
            "-" => true,
            other => bail!("invalid strand '{}' on line {}", other, line_no + 1),
        };

        // Ambiguous bases carry no signal for the biallelic caller.
        if let Some(obs) =
            ReadObservation::from_ascii(sample, base, base_quality, map_quality, is_reverse)
        {
            columns
                .entry(pos)
                .or_insert_with(|| PileupColumn::new(pos))
                .push(obs);
        }
    }

    Ok(columns)
}
