use anyhow::{Context, Result, bail};
use chess_uniques::{
    Board, DedupConfig, DepthSummary, ExpansionDriver, Hash128, HashKey, START_FEN, StopCondition,
    StoreConfig, perft,
};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Parser, Debug)]
#[command(name = "chess-uniques", author, version)]
#[command(about = "Count distinct chess positions per depth, persisting each depth to disk")]
struct Args {
    /// Seed position
    #[arg(long, default_value = START_FEN)]
    fen: String,

    /// Depth enumerated directly from the seed before streaming begins
    #[arg(long, default_value_t = 1)]
    start_depth: u32,

    /// Last depth to produce; runs until Ctrl-C when omitted
    #[arg(long)]
    max_depth: Option<u32>,

    /// Skip seeding and continue from this persisted depth
    #[arg(long)]
    resume_from: Option<u32>,

    /// Directory for uniques_<depth>.dat files
    #[arg(long, default_value = "uniques")]
    data_dir: PathBuf,

    /// log2 of the primary bucket count
    #[arg(long, default_value_t = 20)]
    bucket_bits: u32,

    /// Records per overflow arena block
    #[arg(long, default_value_t = 1 << 20)]
    arena_block: usize,

    /// Maximum number of overflow arena blocks
    #[arg(long, default_value_t = 16)]
    max_arenas: usize,

    /// Hash-space partitions per expansion pass
    #[arg(long, default_value_t = 1)]
    partitions: u32,

    /// Use 128-bit position hashes instead of 64-bit
    #[arg(long)]
    wide: bool,

    /// Check each weighted total against plain perft
    #[arg(long)]
    verify: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn main() {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, log_level),
    )
    .format(|buf, record| writeln!(buf, "[{}] {}: {}", record.level(), record.target(), record.args()))
    .init();

    if let Err(e) = run(&args) {
        log::error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    if args.bucket_bits >= usize::BITS {
        bail!("--bucket-bits {} is too large", args.bucket_bits);
    }
    let config = DedupConfig {
        data_dir: args.data_dir.clone(),
        store: StoreConfig {
            arena_block: args.arena_block,
            max_arenas: args.max_arenas,
            ..StoreConfig::with_bucket_bits(args.bucket_bits)
        },
        partitions: args.partitions,
    };
    if args.wide {
        run_with::<Hash128>(args, config)
    } else {
        run_with::<u64>(args, config)
    }
}

fn run_with<K: HashKey>(args: &Args, config: DedupConfig) -> Result<()> {
    let seed = Board::from_fen(&args.fen).with_context(|| format!("bad seed FEN {:?}", args.fen))?;
    log::info!("seed position:\n{seed}");
    log::info!("{}-bit hashes, data in {}", K::BITS, config.data_dir.display());

    let driver = ExpansionDriver::<K>::new(config).context("cannot set up the expansion run")?;
    let stop = StopCondition {
        max_depth: args.max_depth,
        ..StopCondition::default()
    };
    {
        let flag = stop.stop.clone();
        ctrlc::set_handler(move || {
            if interrupt(&flag) {
                std::process::exit(130);
            }
        })
        .context("cannot install the Ctrl-C handler")?;
    }

    let summaries = match args.resume_from {
        Some(depth) => {
            log::info!(
                "resuming from depth {depth} ({} records)",
                driver.files().record_count(depth)?
            );
            driver.resume(depth, &stop)?
        }
        None => driver.run(&seed, args.start_depth, &stop)?,
    };

    if args.verify {
        verify(&seed, &summaries)?;
    }
    Ok(())
}

// First Ctrl-C finishes the depth in progress; a second one exits at once.
// Returns true when a stop was already pending.
fn interrupt(flag: &AtomicBool) -> bool {
    let pending = flag.swap(true, Ordering::SeqCst);
    if !pending {
        log::warn!("stop requested; finishing the current depth (Ctrl-C again to abort)");
    }
    pending
}

fn verify(seed: &Board, summaries: &[DepthSummary]) -> Result<()> {
    for summary in summaries {
        let expected = perft(seed, summary.depth);
        if summary.total != u128::from(expected) {
            bail!(
                "depth {}: weighted total {} differs from perft {}",
                summary.depth,
                summary.total,
                expected
            );
        }
        log::info!("depth {}: total matches perft {expected}", summary.depth);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_uniques::run_dedup_expansion;

    #[test]
    fn first_interrupt_only_raises_the_flag() {
        let stop = StopCondition::default();
        assert!(!interrupt(&stop.stop));
        assert!(stop.stop.load(Ordering::SeqCst));
        assert!(interrupt(&stop.stop));
    }

    #[test]
    fn interrupted_run_keeps_the_seed_depth() {
        let dir = tempfile::tempdir().unwrap();
        let config = DedupConfig {
            store: StoreConfig {
                buckets: 1 << 8,
                arena_block: 1 << 8,
                max_arenas: 4,
            },
            ..DedupConfig::new(dir.path())
        };
        let driver = ExpansionDriver::<u64>::new(config.clone()).unwrap();
        let stop = StopCondition::default();
        interrupt(&stop.stop);

        let summaries = driver.run(&Board::start(), 1, &stop).unwrap();
        assert_eq!(summaries.len(), 1);
        assert!(driver.files().exists(1));
        assert!(!driver.files().exists(2));

        let (distinct, total) = run_dedup_expansion::<u64>(config, &Board::start(), 1).unwrap();
        assert_eq!((distinct, total), (20, 20));
    }

    #[test]
    fn verify_flags_a_wrong_total() {
        let seed = Board::start();
        let good = DepthSummary {
            depth: 2,
            distinct: 400,
            total: 400,
        };
        assert!(verify(&seed, &[good]).is_ok());
        let bad = DepthSummary { total: 401, ..good };
        assert!(verify(&seed, &[bad]).is_err());
    }
}
