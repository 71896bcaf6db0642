use std::error::Error;
use std::path::PathBuf;

use structopt::StructOpt;
use tracing_subscriber::EnvFilter;

use quadpack::input::read_points;
use quadpack::sim::{simulate, SimConfig};

#[derive(Debug, StructOpt)]
#[structopt(name = "nbody", about = "Barnes-Hut n-body over a packed quad-tree")]
struct CommandLineArgs {
    /// Initial region buffer size in bytes
    #[structopt(long = "buffer-size")]
    buffer_size: Option<usize>,

    /// Input file: one body per line, two whitespace-separated floats "x y"
    #[structopt(long = "array-input", parse(from_os_str))]
    array_input: Option<PathBuf>,

    /// Benchmark input file; accepted for compatibility, the n-body
    /// driver only reads --array-input
    #[structopt(long = "bench-input", parse(from_os_str))]
    bench_input: Option<PathBuf>,

    size: Option<i64>,

    iters: Option<i64>,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = CommandLineArgs::from_args();
    if opts.bench_input.is_some() {
        tracing::debug!("--bench-input is ignored by the n-body driver");
    }
    let path = opts
        .array_input
        .ok_or("--array-input is required for the n-body driver")?;
    let points = read_points(&path)?;

    let mut cfg = SimConfig::default();
    if let Some(bytes) = opts.buffer_size {
        cfg.buffer_size = bytes;
    }
    cfg.size = opts.size.unwrap_or(1);
    cfg.iters = opts.iters.unwrap_or(1);

    let report = simulate(&points, &cfg)?;

    println!("Elems: {}", report.elems);
    println!("ITERS: {}", report.iters);
    println!("SIZE: {}", report.size);
    println!("BATCHTIME: {:e}", report.batchtime);
    println!("SELFTIMED: {:e}", report.selftimed);
    println!("Err: {}", report.err);
    Ok(())
}
