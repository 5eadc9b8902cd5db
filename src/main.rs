use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use amrsearch::report::{self, TsvRow};
use amrsearch::{run_detection, DatabaseLayout, DetectionConfig, DetectionResults, Minimap2Aligner};

fn parse_percent(s: &str) -> Result<f64, String> {
    let val: f64 = s.parse().map_err(|_| format!("Invalid number: {}", s))?;
    if !(0.0..=100.0).contains(&val) {
        Err(format!("Value must be between 0 and 100, got {}", val))
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "amrsearch")]
#[command(version)]
#[command(about = "Detect antimicrobial resistance genes and point mutations in genome assemblies")]
#[command(long_about = r#"
amrsearch - AntiMicrobial Resistance SEARCH for assembled genomes

Aligns each genome against:
  1. A ResFinder-style database of acquired resistance genes
  2. A PointFinder-style database of resistance point mutations (with --pointfinder-organism)

WORKFLOW:
  Genomes -> minimap2 -> identity/overlap thresholds -> gene and mutation calls -> summary

DATABASE LAYOUT (--database-dir):
  resfinder/              One <drug_class>.fsa per class, headers <gene>_<variant>_<accession>
  pointfinder/<organism>/ resistens-overview.txt, <gene>.fsa, RNA_genes.txt

OUTPUT FILES (--output-dir):
  results_tab.tsv               Resistance genes per genome
  results_tab.pointfinder.tsv   Point mutations per genome
  summary.tsv                   Genotype and predicted phenotype per genome

Without --output-dir the three tables are printed to stdout.

EXAMPLES:
  amrsearch -o out/ genomes/*.fasta
  amrsearch --pointfinder-organism salmonella --include-negatives -o out/ A.fasta B.fasta.gz
"#)]
struct Args {
    #[arg(value_name = "FASTA", required = true, help_heading = "Input")]
    files: Vec<PathBuf>,

    #[arg(short = 'd', long = "database-dir", value_name = "DIR", default_value = "databases", help_heading = "Database")]
    database_dir: PathBuf,

    #[arg(long = "pointfinder-organism", value_name = "ORGANISM", help_heading = "Database")]
    pointfinder_organism: Option<String>,

    #[arg(long = "pid-threshold", value_name = "PERCENT", value_parser = parse_percent,
          help = "Percent identity threshold [98.0]", help_heading = "Detection")]
    pid_threshold: Option<f64>,

    #[arg(long = "percent-length-overlap", value_name = "PERCENT", value_parser = parse_percent,
          help = "Percent length overlap threshold [60.0]", help_heading = "Detection")]
    plength_threshold: Option<f64>,

    #[arg(long = "include-negatives", help = "Include genomes without resistance in the summary",
          help_heading = "Detection")]
    include_negatives: bool,

    #[arg(long, value_name = "FILE", help = "JSON run configuration; explicit flags take precedence",
          help_heading = "Detection")]
    config: Option<PathBuf>,

    #[arg(short = 'o', long = "output-dir", value_name = "DIR", help_heading = "Output")]
    output_dir: Option<PathBuf>,

    #[arg(short = 'v', long, help_heading = "Output")]
    verbose: bool,

    #[arg(short = 't', long, value_name = "NUM", help = "Worker threads, 0 for all CPUs [1]",
          help_heading = "Runtime")]
    threads: Option<usize>,
}

impl Args {
    fn detection_config(&self) -> Result<DetectionConfig> {
        let mut config = match &self.config {
            Some(path) => DetectionConfig::from_json_file(path)?,
            None => DetectionConfig::default(),
        };

        if let Some(pid) = self.pid_threshold {
            config.pid_threshold = pid;
        }
        if let Some(plength) = self.plength_threshold {
            config.plength_threshold = plength;
        }
        if let Some(organism) = &self.pointfinder_organism {
            config.pointfinder_organism = Some(organism.clone());
        }
        if self.include_negatives {
            config.include_negatives = true;
        }
        match self.threads {
            Some(0) => config.threads = num_cpus::get(),
            Some(threads) => config.threads = threads,
            None => {}
        }
        Ok(config)
    }
}

fn write_file<R: TsvRow>(dir: &Path, name: &str, rows: &[R]) -> Result<()> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    report::write_table(&mut writer, rows).with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    info!("Wrote {}", path.display());
    Ok(())
}

fn write_results(results: &DetectionResults, output_dir: Option<&Path>) -> Result<()> {
    match output_dir {
        Some(dir) => {
            write_file(dir, report::RESFINDER_FILE, &results.resfinder)?;
            write_file(dir, report::POINTFINDER_FILE, &results.pointfinder)?;
            write_file(dir, report::SUMMARY_FILE, &results.summary)?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            report::write_table(&mut out, &results.resfinder)?;
            writeln!(out)?;
            report::write_table(&mut out, &results.pointfinder)?;
            writeln!(out)?;
            report::write_table(&mut out, &results.summary)?;
            out.flush()?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let start_time = Instant::now();

    let default_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let config = args.detection_config()?;
    config.validate()?;

    if let Some(dir) = &args.output_dir {
        if dir.exists() {
            anyhow::bail!("Output directory already exists: {}", dir.display());
        }
    }

    let aligner = Minimap2Aligner::locate()?;
    info!("Found minimap2: {}", aligner.program().display());

    let layout = DatabaseLayout::from_root(&args.database_dir);
    let results = run_detection(&layout, &args.files, &config, aligner)?;

    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    write_results(&results, args.output_dir.as_deref())?;

    info!(
        "Processed {} genome(s) in {:.1}s",
        results.samples.len(),
        start_time.elapsed().as_secs_f64()
    );
    Ok(())
}
