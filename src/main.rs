use clap::{Parser, Subcommand, ValueEnum};
use primefinder::cache::CacheConfig;
use primefinder::storage::{self, FileStore};
use primefinder::{
    Algorithm, FindPrimesRequest, FinderConfig, PrimeFinder, ResultCache, SegmentSizing, memory,
    telemetry,
};
use std::io::{self, BufWriter, Write};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "primefinder")]
#[command(about = "Prime finder - enumerate all primes up to a limit", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Find all prime numbers up to one or more limits")]
    Primes(PrimesArgs),
    #[command(about = "Print the execution log")]
    Log,
}

#[derive(clap::Args)]
struct PrimesArgs {
    #[arg(required = true, help = "Upper limits to search for primes, computed in order")]
    limits: Vec<u64>,
    #[arg(
        short,
        long,
        value_enum,
        default_value_t = Algorithm::Auto,
        env = "PRIMEFINDER_ALGORITHM",
        help = "Algorithm to use"
    )]
    algorithm: Algorithm,
    #[arg(
        long,
        env = "PRIMEFINDER_USE_CACHE",
        help = "Serve limits the cache already covers from the cache"
    )]
    use_cache: bool,
    #[arg(
        long,
        env = "PRIMEFINDER_BUILD_CACHE",
        help = "Offer freshly computed primes to the cache"
    )]
    build_cache: bool,
    #[arg(long, help = "Only report the number of primes found")]
    count_only: bool,
    #[arg(long, conflicts_with = "count_only", help = "Print each prime to stdout")]
    print: bool,
    #[arg(
        long,
        conflicts_with = "count_only",
        help = "Save the primes to the data directory"
    )]
    save: bool,
    #[arg(
        short,
        long,
        requires = "save",
        help = "Save primes in binary format (8 bytes per prime, little-endian)"
    )]
    binary: bool,
    #[arg(
        short,
        long,
        env = "PRIMEFINDER_WORKERS",
        help = "Number of worker threads for the concurrent sieve"
    )]
    workers: Option<usize>,
    #[arg(
        long,
        value_enum,
        default_value_t = SegmentSizing::Dynamic,
        env = "PRIMEFINDER_SEGMENTS",
        help = "Segment sizing for the concurrent sieve"
    )]
    segments: SegmentSizing,
    #[arg(
        long,
        env = "PRIMEFINDER_AUTO_THRESHOLD",
        help = "Limit at which auto switches to the concurrent sieve"
    )]
    auto_threshold: Option<u64>,
    #[arg(
        long,
        value_enum,
        default_value_t = CacheBackend::Memory,
        env = "PRIMEFINDER_CACHE_BACKEND",
        help = "Where cached primes are kept"
    )]
    cache_backend: CacheBackend,
    #[arg(
        long,
        env = "PRIMEFINDER_CACHE_MAX_BYTES",
        help = "Byte budget for the cache instead of a share of total memory"
    )]
    cache_max_bytes: Option<u64>,
    #[arg(
        long,
        env = "PRIMEFINDER_CACHE_MAX_BOUND",
        help = "Largest limit eligible for caching"
    )]
    cache_max_bound: Option<u64>,
    #[arg(
        long,
        conflicts_with = "cache_max_bound",
        env = "PRIMEFINDER_NO_CACHE_CAP",
        help = "Allow any limit to be cached, subject only to the memory budget"
    )]
    no_cache_cap: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CacheBackend {
    Memory,
    File,
}

fn main() -> ExitCode {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Primes(args) => run_primes(args),
        Commands::Log => run_log(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn finder_config(args: &PrimesArgs) -> FinderConfig {
    let defaults = FinderConfig::default();
    let cache_defaults = CacheConfig::default();
    FinderConfig {
        workers: args.workers.unwrap_or(defaults.workers),
        auto_threshold: args.auto_threshold.unwrap_or(defaults.auto_threshold),
        concurrent_segments: args.segments,
        cache: CacheConfig {
            max_bytes: args.cache_max_bytes,
            max_cached_bound: if args.no_cache_cap {
                None
            } else {
                args.cache_max_bound.or(cache_defaults.max_cached_bound)
            },
            ..cache_defaults
        },
    }
}

fn build_finder(args: &PrimesArgs) -> primefinder::Result<PrimeFinder> {
    let config = finder_config(args);
    let probe: Arc<dyn memory::MemoryProbe> = Arc::new(memory::ProcMemoryProbe::default());
    let cache = match args.cache_backend {
        CacheBackend::Memory => ResultCache::new(config.cache, Arc::clone(&probe)),
        CacheBackend::File => {
            let store = FileStore::in_data_dir()?;
            println!("Caching primes in {}", store.path().display());
            ResultCache::with_store(Box::new(store), config.cache, Arc::clone(&probe))
        }
    };
    PrimeFinder::with_parts(config, Arc::new(cache), probe)
}

fn run_primes(args: PrimesArgs) -> primefinder::Result<()> {
    let finder = build_finder(&args)?;
    if args.algorithm == Algorithm::Auto
        || args.algorithm == Algorithm::SegmentedSieveConcurrent
    {
        println!(
            "Using {} worker threads for the concurrent sieve",
            finder.config().workers
        );
    }

    for &limit in &args.limits {
        println!("Finding primes up to {} ({})...", limit, args.algorithm);

        let request = FindPrimesRequest {
            algorithm: args.algorithm,
            use_cache: args.use_cache,
            build_cache: args.build_cache,
            with_result: !args.count_only,
            ..FindPrimesRequest::new(limit)
        };
        let response = finder.compute_request(request)?;
        let metrics = &response.metrics;

        if args.print {
            let mut writer = BufWriter::with_capacity(256 * 1024, io::stdout().lock());
            storage::write_primes_text(&mut writer, &response.primes)?;
            writer.flush()?;
        }

        if args.save {
            let dir = storage::data_dir()?;
            std::fs::create_dir_all(&dir)?;
            let file_name = if args.binary {
                storage::PRIMES_BINARY_FILE
            } else {
                storage::PRIMES_TEXT_FILE
            };
            let path = dir.join(file_name);
            if args.binary {
                storage::save_primes_binary(&path, &response.primes)?;
            } else {
                storage::save_primes_text(&path, &response.primes)?;
            }
            println!("\nSaved all primes to {}", file_name);
        }

        println!("\nTotal: {} primes found", response.count);
        println!("Algorithm: {}", metrics.algorithm_name);

        let duration_us = u128::from(metrics.duration_ns / 1_000);
        println!(
            "Execution time: {}us ({:.2}ms)",
            duration_us,
            duration_us as f64 / 1000.0
        );
        if let Some(status) = &response.cache_status {
            println!("Cache: {}", status);
        }

        let logged = storage::data_dir().and_then(|dir| {
            storage::log_execution(&dir, "primes", limit, metrics.algorithm_name, duration_us)
        });
        if let Err(e) = logged {
            eprintln!("Warning: Failed to log execution: {}", e);
        }
    }

    Ok(())
}

fn run_log() -> primefinder::Result<()> {
    let lines = storage::read_execution_log(&storage::data_dir()?)?;
    if lines.is_empty() {
        println!("No executions logged yet");
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}
