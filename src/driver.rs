//! Depth-by-depth expansion of distinct positions.
//!
//! `Seed -> Expanding(D) -> Persisted(D) -> Expanding(D+1) -> ...`
//!
//! The seed is enumerated recursively to the start depth and saved. Every later
//! depth streams the previous depth file, expands each record one ply and
//! inserts the children with the parent's occurrence count. With more than one
//! partition the previous file is streamed once per partition and each pass
//! only keeps children whose hash falls into that partition, so memory holds
//! one partition's store at a time. Partitions are disjoint in hash space, so
//! their outputs concatenate into the next depth file without duplicates.

use crate::config::DedupConfig;
use crate::engine::{Board, Move, apply_move, gen_moves};
use crate::error::{DedupResult, StoreError};
use crate::persist::DepthFiles;
use crate::position::{AuxFlags, Position, canonicalize, to_board};
use crate::store::{InsertOutcome, RecordStore};
use crate::zobrist::{HashKey, hash_position};
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Result of one completed depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthSummary {
    pub depth: u32,
    pub distinct: u64,
    pub total: u128,
}

/// When the expansion loop stops. Checked between depths only.
#[derive(Clone, Debug, Default)]
pub struct StopCondition {
    pub max_depth: Option<u32>,
    pub stop: Arc<AtomicBool>,
}

impl StopCondition {
    pub fn at_depth(max_depth: u32) -> Self {
        StopCondition {
            max_depth: Some(max_depth),
            stop: Arc::default(),
        }
    }

    /// Raise the shared stop flag.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    fn reached(&self, completed_depth: u32) -> bool {
        self.stop.load(Ordering::SeqCst)
            || self.max_depth.is_some_and(|max| completed_depth >= max)
    }
}

/// Slice of hash space kept by one pass.
#[derive(Clone, Copy, Debug)]
struct Partition {
    index: u64,
    count: u64,
}

impl Partition {
    const WHOLE: Partition = Partition { index: 0, count: 1 };

    #[inline]
    fn owns<K: HashKey>(self, hash: K) -> bool {
        self.count == 1 || hash.partition_bits() % self.count == self.index
    }
}

pub struct ExpansionDriver<K: HashKey> {
    config: DedupConfig,
    files: DepthFiles,
    _key: PhantomData<K>,
}

impl<K: HashKey> ExpansionDriver<K> {
    pub fn new(config: DedupConfig) -> DedupResult<Self> {
        config.validate()?;
        let files = DepthFiles::new(&config.data_dir)?;
        Ok(ExpansionDriver {
            config,
            files,
            _key: PhantomData,
        })
    }

    pub fn files(&self) -> &DepthFiles {
        &self.files
    }

    fn new_store(&self) -> RecordStore<K> {
        RecordStore::new(&self.config.store)
    }

    /// Distinct positions `depth` plies from `seed`, held in memory.
    pub fn enumerate(&self, seed: &Board, depth: u32) -> DedupResult<RecordStore<K>> {
        let mut store = self.new_store();
        let mut layers = vec![Vec::with_capacity(64); depth as usize];
        enumerate_into(&mut store, seed, &mut layers)?;
        Ok(store)
    }

    /// Enumerate `seed` to `start_depth` and persist the result.
    pub fn seed(&self, seed: &Board, start_depth: u32) -> DedupResult<DepthSummary> {
        let started = Instant::now();
        let store = self.enumerate(seed, start_depth)?;
        self.persist(store, start_depth, started.elapsed())
    }

    /// Expand an in-memory store one ply into a new store.
    pub fn expand_store(&self, source: &RecordStore<K>) -> DedupResult<RecordStore<K>> {
        let mut target = self.new_store();
        let mut moves = Vec::with_capacity(64);
        for record in source.records() {
            expand_into(
                &mut target,
                &record.position,
                &record.aux,
                record.count,
                Partition::WHOLE,
                &mut moves,
            )?;
        }
        Ok(target)
    }

    /// Stream `depth` from disk and write `depth + 1`.
    pub fn expand_depth(&self, depth: u32) -> DedupResult<DepthSummary> {
        let started = Instant::now();
        let next = depth + 1;
        let count = u64::from(self.config.partitions);
        let mut writer = self.files.writer(next)?;
        let mut summary = DepthSummary {
            depth: next,
            distinct: 0,
            total: 0,
        };
        let mut moves = Vec::with_capacity(64);

        for index in 0..count {
            let partition = Partition { index, count };
            let mut store = self.new_store();
            for record in self.files.load_stream(depth)? {
                let record = record?;
                expand_into(
                    &mut store,
                    &record.position,
                    &record.aux,
                    record.count,
                    partition,
                    &mut moves,
                )?;
            }
            writer.append(&store)?;
            summary.distinct += store.distinct();
            summary.total += store.total();
            if count > 1 {
                log::debug!("depth {next} partition {}/{count}: {}", index + 1, store.summary());
            }
        }

        writer.commit()?;
        log_summary(&summary, started.elapsed());
        Ok(summary)
    }

    /// Seed, then keep expanding until `stop` says otherwise.
    pub fn run(
        &self,
        seed: &Board,
        start_depth: u32,
        stop: &StopCondition,
    ) -> DedupResult<Vec<DepthSummary>> {
        let first = self.seed(seed, start_depth)?;
        let mut summaries = vec![first];
        if first.distinct > 0 {
            summaries.extend(self.resume(start_depth, stop)?);
        }
        Ok(summaries)
    }

    /// Continue from an already persisted depth.
    pub fn resume(&self, from_depth: u32, stop: &StopCondition) -> DedupResult<Vec<DepthSummary>> {
        let mut summaries = Vec::new();
        let mut depth = from_depth;
        while !stop.reached(depth) {
            let summary = self.expand_depth(depth)?;
            summaries.push(summary);
            if summary.distinct == 0 {
                log::info!("depth {}: no positions remain", summary.depth);
                break;
            }
            depth += 1;
        }
        Ok(summaries)
    }

    fn persist(
        &self,
        store: RecordStore<K>,
        depth: u32,
        elapsed: Duration,
    ) -> DedupResult<DepthSummary> {
        log::debug!("depth {depth}: {}", store.summary());
        self.files.save(&store, depth)?;
        let summary = DepthSummary {
            depth,
            distinct: store.distinct(),
            total: store.total(),
        };
        drop(store);
        log_summary(&summary, elapsed);
        Ok(summary)
    }
}

fn log_summary(summary: &DepthSummary, elapsed: Duration) {
    log::info!(
        "Unique({}) = {}, total = {}, time: {:.3} seconds",
        summary.depth,
        summary.distinct,
        summary.total,
        elapsed.as_secs_f64()
    );
}

fn canonical_child<K: HashKey>(board: &Board) -> (K, Position, AuxFlags) {
    let (position, aux) = canonicalize(board);
    (hash_position::<K>(&position, &aux), position, aux)
}

// Children of one record, each carrying the parent's count.
fn expand_into<K: HashKey>(
    target: &mut RecordStore<K>,
    position: &Position,
    aux: &AuxFlags,
    count: u64,
    partition: Partition,
    moves: &mut Vec<Move>,
) -> Result<u64, StoreError> {
    let board = to_board(position, aux);
    gen_moves(&board, moves);
    let mut inserted = 0;
    for &m in moves.iter() {
        let (hash, child, child_aux) = canonical_child::<K>(&apply_move(&board, m));
        if !partition.owns(hash) {
            continue;
        }
        if target.insert_or_accumulate(hash, &child, &child_aux, count)? == InsertOutcome::Inserted {
            inserted += 1;
        }
    }
    Ok(inserted)
}

// Leaves of the seed tree, one move buffer per remaining ply.
fn enumerate_into<K: HashKey>(
    target: &mut RecordStore<K>,
    board: &Board,
    layers: &mut [Vec<Move>],
) -> Result<u64, StoreError> {
    let Some((moves, rest)) = layers.split_first_mut() else {
        let (hash, position, aux) = canonical_child::<K>(board);
        let outcome = target.insert_or_accumulate(hash, &position, &aux, 1)?;
        return Ok(u64::from(outcome == InsertOutcome::Inserted));
    };
    gen_moves(board, moves);
    let mut unique = 0;
    for &m in moves.iter() {
        unique += enumerate_into(target, &apply_move(board, m), rest)?;
    }
    Ok(unique)
}

/// Enumerate and persist `start_depth` from `seed`; returns the distinct and
/// weighted totals of that depth.
pub fn run_dedup_expansion<K: HashKey>(
    config: DedupConfig,
    seed: &Board,
    start_depth: u32,
) -> DedupResult<(u64, u128)> {
    let summary = ExpansionDriver::<K>::new(config)?.seed(seed, start_depth)?;
    Ok((summary.distinct, summary.total))
}
