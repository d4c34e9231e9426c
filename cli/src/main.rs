use std::{
    fs::File,
    io::{self, BufRead, BufReader, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use cache_sim::{
    addr::Geometry,
    observer::{NoopObserver, Observer, VerboseObserver},
    sim::{SimOutput, Simulator},
    trace::TraceReader,
};
use clap::Parser;

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

/// LRU set-associative cache simulator
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of set index bits (2^s sets)
    #[arg(short = 's', value_name = "s")]
    index_bits: u32,
    /// Number of lines per set
    #[arg(short = 'E', value_name = "E")]
    lines_per_set: usize,
    /// Number of block offset bits (2^b bytes per block)
    #[arg(short = 'b', value_name = "b")]
    offset_bits: u32,
    /// File path to valgrind-style trace
    #[arg(short = 't', value_name = "tracefile")]
    trace: PathBuf,
    /// Print the outcome of every record
    #[arg(short, long)]
    verbose: bool,
    /// Print the cache contents after the run
    #[arg(long)]
    dump: bool,
    /// Print the result as JSON
    #[arg(long)]
    json: bool,
    /// Abort on malformed trace lines instead of skipping them
    #[arg(long)]
    strict: bool,
    /// Also write `hits misses evictions` to this file
    #[arg(long)]
    results: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }
    let geometry = Geometry::new(args.offset_bits, args.index_bits, args.lines_per_set)
        .context("invalid cache geometry")?;
    let file = File::open(&args.trace)
        .with_context(|| format!("failed to open trace {}", args.trace.display()))?;
    let reader = TraceReader::new(BufReader::new(file)).strict(args.strict);
    if args.verbose {
        let stdout = io::stdout();
        execute(&args, geometry, reader, VerboseObserver::new(stdout.lock()))
    } else {
        execute(&args, geometry, reader, NoopObserver::new())
    }
}

fn execute<R: BufRead, O: Observer>(
    args: &Cli,
    geometry: Geometry,
    mut reader: TraceReader<R>,
    observer: O,
) -> Result<()> {
    let output = Simulator::new(geometry, observer).try_run(reader.by_ref())?;
    if reader.malformed() > 0 {
        log::warn!("{} malformed trace lines skipped", reader.malformed());
    }
    output_stat(&output);
    report(args, &output)
}

fn report<O>(args: &Cli, output: &SimOutput<O>) -> Result<()> {
    if args.dump {
        print!("{}", output.cache.view());
    }
    let result = output.result;
    if args.json {
        println!("{}", serde_json::to_string(&result)?);
    } else {
        println!("{result}");
    }
    if let Some(path) = &args.results {
        let mut out = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writeln!(out, "{} {} {}", result.hits, result.misses, result.evictions)?;
    }
    Ok(())
}

#[cfg(not(feature = "stat"))]
fn output_stat<O>(_: &SimOutput<O>) {}

#[cfg(feature = "stat")]
fn output_stat<O>(output: &SimOutput<O>) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    log::info!("statistics:\n{}", output.collect_stat().view(max_width));
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
