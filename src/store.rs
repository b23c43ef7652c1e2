//! Record store for distinct positions at one depth.
//!
//! Features:
//! - Fixed primary bucket array sized at construction (`hash mod buckets`).
//! - Collision chains through overflow arenas: fixed-capacity blocks allocated
//!   on demand up to a configured maximum, addressed by 32-bit links.
//! - Insert-only. A repeated hash adds to the stored occurrence count; the
//!   stored position is never edited after insertion.
//! - Iteration order: primary buckets in bucket order, then arenas in
//!   allocation order.
//! - Stats: inserts, hits, chained records, detected aliases.
//!
//! Usage:
//! - Create one store per depth (or per partition pass) via `RecordStore::new`.
//! - Call `insert_or_accumulate` per child position.
//! - Persist with `DepthFiles::save` and drop the store.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::position::{AuxFlags, Position};
use crate::zobrist::HashKey;

/// Index into the overflow arena space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Link(u32);

impl Link {
    const NONE: Link = Link(u32::MAX);

    fn is_none(self) -> bool {
        self == Link::NONE
    }
}

/// What `insert_or_accumulate` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new distinct position was stored.
    Inserted,
    /// An existing position's count was increased.
    Found,
}

/// One stored position. A zero count marks an empty primary bucket.
#[derive(Clone, Copy, Debug)]
pub struct Record<K> {
    pub hash: K,
    pub position: Position,
    pub aux: AuxFlags,
    pub count: u64,
    next: Link,
}

impl<K: HashKey> Record<K> {
    fn empty() -> Self {
        Record {
            hash: K::default(),
            position: Position::default(),
            aux: AuxFlags::default(),
            count: 0,
            next: Link::NONE,
        }
    }

    fn new(hash: K, position: Position, aux: AuxFlags, count: u64) -> Self {
        Record {
            hash,
            position,
            aux,
            count,
            next: Link::NONE,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub inserts: u64,
    pub hits: u64,
    /// Records living in overflow arenas.
    pub chained: u64,
    /// Hash matches whose stored position differed; counts were merged anyway.
    pub aliases: u64,
}

#[derive(Clone, Copy, Debug)]
enum Cursor {
    Bucket(usize),
    Overflow(Link),
}

pub struct RecordStore<K: HashKey> {
    buckets: Vec<Record<K>>,
    arenas: Vec<Vec<Record<K>>>,
    arena_block: usize,
    max_arenas: usize,
    total: u128,
    stats: StoreStats,
}

// Overflow slot `offset` of arena `block`; `None` once the index leaves the
// 32-bit link range or would collide with the sentinel.
fn link_for(block: usize, arena_block: usize, offset: usize) -> Option<Link> {
    block
        .checked_mul(arena_block)
        .and_then(|start| start.checked_add(offset))
        .and_then(|index| u32::try_from(index).ok())
        .filter(|&index| index != Link::NONE.0)
        .map(Link)
}

impl<K: HashKey> RecordStore<K> {
    /// Allocate the primary bucket array. `config` must already be validated.
    pub fn new(config: &StoreConfig) -> Self {
        debug_assert!(config.validate().is_ok(), "unvalidated store config");
        RecordStore {
            buckets: vec![Record::empty(); config.buckets.max(1)],
            arenas: Vec::new(),
            arena_block: config.arena_block.max(1),
            max_arenas: config.max_arenas,
            total: 0,
            stats: StoreStats::default(),
        }
    }

    #[inline]
    fn bucket_of(&self, hash: K) -> usize {
        (hash.bucket_bits() % self.buckets.len() as u64) as usize
    }

    fn record_mut(&mut self, cursor: Cursor) -> &mut Record<K> {
        match cursor {
            Cursor::Bucket(idx) => &mut self.buckets[idx],
            Cursor::Overflow(Link(idx)) => {
                let idx = idx as usize;
                &mut self.arenas[idx / self.arena_block][idx % self.arena_block]
            }
        }
    }

    /// Bump-allocate an overflow record, opening a new arena block when the
    /// current one is full.
    fn allocate(&mut self, record: Record<K>) -> Result<Link, StoreError> {
        let (block, offset) = match self.arenas.last() {
            Some(arena) if arena.len() < self.arena_block => (self.arenas.len() - 1, arena.len()),
            _ => (self.arenas.len(), 0),
        };
        let exhausted = || StoreError::ArenaExhausted {
            arenas: self.max_arenas,
            block: self.arena_block,
        };
        if block == self.max_arenas {
            return Err(exhausted());
        }
        let link = link_for(block, self.arena_block, offset).ok_or_else(exhausted)?;
        if block == self.arenas.len() {
            log::debug!(
                "allocating overflow arena {} ({} records)",
                block,
                self.arena_block
            );
            self.arenas.push(Vec::with_capacity(self.arena_block));
        }
        self.arenas[block].push(record);
        self.stats.chained += 1;
        Ok(link)
    }

    /// Store `position` under `hash` with `count`, or add `count` to the record
    /// already stored under `hash`.
    ///
    /// Records are matched by hash alone. A hash match with a different position
    /// still merges (the hash is assumed collision-free at its width) and is
    /// counted in `stats().aliases`.
    pub fn insert_or_accumulate(
        &mut self,
        hash: K,
        position: &Position,
        aux: &AuxFlags,
        count: u64,
    ) -> Result<InsertOutcome, StoreError> {
        // a zero count would read back as an empty bucket
        if count == 0 {
            return Err(StoreError::ZeroCount);
        }

        let idx = self.bucket_of(hash);
        if self.buckets[idx].is_empty() {
            self.buckets[idx] = Record::new(hash, *position, *aux, count);
            self.note_insert(count);
            return Ok(InsertOutcome::Inserted);
        }

        let mut cursor = Cursor::Bucket(idx);
        loop {
            let record = self.record_mut(cursor);
            if record.hash == hash {
                let aliased = record.position != *position || record.aux != *aux;
                record.count =
                    record
                        .count
                        .checked_add(count)
                        .ok_or(StoreError::CountOverflow {
                            current: record.count,
                            added: count,
                        })?;
                if aliased {
                    self.stats.aliases += 1;
                    log::warn!("hash {hash:?} aliases two distinct positions; counts merged");
                }
                self.stats.hits += 1;
                self.total += count as u128;
                return Ok(InsertOutcome::Found);
            }

            let next = record.next;
            if next.is_none() {
                let link = self.allocate(Record::new(hash, *position, *aux, count))?;
                self.record_mut(cursor).next = link;
                self.note_insert(count);
                return Ok(InsertOutcome::Inserted);
            }
            cursor = Cursor::Overflow(next);
        }
    }

    fn note_insert(&mut self, count: u64) {
        self.stats.inserts += 1;
        self.total += count as u128;
    }

    /// Occurrence count stored under `hash`, if any.
    pub fn count_of(&self, hash: K) -> Option<u64> {
        let mut record = &self.buckets[self.bucket_of(hash)];
        if record.is_empty() {
            return None;
        }
        loop {
            if record.hash == hash {
                return Some(record.count);
            }
            if record.next.is_none() {
                return None;
            }
            let idx = record.next.0 as usize;
            record = &self.arenas[idx / self.arena_block][idx % self.arena_block];
        }
    }

    /// Every live record: primary buckets in order, then arenas in allocation order.
    pub fn records(&self) -> impl Iterator<Item = &Record<K>> + '_ {
        self.buckets
            .iter()
            .filter(|r| !r.is_empty())
            .chain(self.arenas.iter().flatten())
    }

    /// Number of distinct positions stored.
    pub fn distinct(&self) -> u64 {
        self.stats.inserts
    }

    /// Sum of all occurrence counts.
    pub fn total(&self) -> u128 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.stats.inserts == 0
    }

    pub fn arenas_allocated(&self) -> usize {
        self.arenas.len()
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    /// Return stats snapshot as a human-readable string.
    pub fn summary(&self) -> String {
        format!(
            "store: buckets={} distinct={} total={} hits={} chained={} arenas={} aliases={}",
            self.buckets.len(),
            self.stats.inserts,
            self.total,
            self.stats.hits,
            self.stats.chained,
            self.arenas.len(),
            self.stats.aliases
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Board;
    use crate::position::canonicalize;
    use crate::zobrist::{Hash128, hash_position};

    fn tiny(buckets: usize, arena_block: usize, max_arenas: usize) -> StoreConfig {
        StoreConfig {
            buckets,
            arena_block,
            max_arenas,
        }
    }

    fn sample(n: u64) -> (Position, AuxFlags) {
        let position = Position {
            white: n,
            kings: n,
            ..Position::default()
        };
        (position, AuxFlags::default())
    }

    fn accumulates_in_place<K: HashKey>() {
        let (position, aux) = canonicalize(&Board::start());
        let hash = hash_position::<K>(&position, &aux);
        let mut store = RecordStore::<K>::new(&tiny(8, 4, 1));
        assert_eq!(
            store.insert_or_accumulate(hash, &position, &aux, 3),
            Ok(InsertOutcome::Inserted)
        );
        assert_eq!(
            store.insert_or_accumulate(hash, &position, &aux, 4),
            Ok(InsertOutcome::Found)
        );
        assert_eq!(store.distinct(), 1);
        assert_eq!(store.count_of(hash), Some(7));
        assert_eq!(store.total(), 7);
        assert_eq!(store.arenas_allocated(), 0);
        assert_eq!(store.records().count(), 1);
    }

    #[test]
    fn repeat_insert_accumulates_narrow() {
        accumulates_in_place::<u64>();
    }

    #[test]
    fn repeat_insert_accumulates_wide() {
        accumulates_in_place::<Hash128>();
    }

    #[test]
    fn forced_collisions_chain_distinct_records() {
        // one bucket: every hash lands in slot 0
        let mut store = RecordStore::<u64>::new(&tiny(1, 2, 4));
        for n in 1..=5u64 {
            let (position, aux) = sample(n);
            assert_eq!(
                store.insert_or_accumulate(n, &position, &aux, n),
                Ok(InsertOutcome::Inserted)
            );
        }
        assert_eq!(store.distinct(), 5);
        assert_eq!(store.stats().chained, 4);
        assert_eq!(store.arenas_allocated(), 2);

        // each chained record increments independently
        let (position, aux) = sample(4);
        assert_eq!(
            store.insert_or_accumulate(4, &position, &aux, 10),
            Ok(InsertOutcome::Found)
        );
        assert_eq!(store.count_of(4), Some(14));
        assert_eq!(store.count_of(3), Some(3));
        assert_eq!(store.count_of(5), Some(5));
        assert_eq!(store.count_of(99), None);
        assert_eq!(store.total(), 1 + 2 + 3 + 4 + 5 + 10);
    }

    #[test]
    fn wide_collisions_share_bucket_but_not_record() {
        let mut store = RecordStore::<Hash128>::new(&tiny(4, 8, 1));
        // same low half, so same bucket; different high half
        let a = Hash128::new(7, 1);
        let b = Hash128::new(7, 2);
        let (pa, xa) = sample(1);
        let (pb, xb) = sample(2);
        store.insert_or_accumulate(a, &pa, &xa, 1).unwrap();
        store.insert_or_accumulate(b, &pb, &xb, 1).unwrap();
        store.insert_or_accumulate(b, &pb, &xb, 1).unwrap();
        assert_eq!(store.count_of(a), Some(1));
        assert_eq!(store.count_of(b), Some(2));
        assert_eq!(store.stats().chained, 1);
    }

    #[test]
    fn iteration_is_buckets_then_arenas() {
        let mut store = RecordStore::<u64>::new(&tiny(4, 4, 2));
        // 5 and 1 share bucket 1; 2 lands in bucket 2
        for n in [5u64, 2, 1] {
            let (position, aux) = sample(n);
            store.insert_or_accumulate(n, &position, &aux, 1).unwrap();
        }
        let order: Vec<u64> = store.records().map(|r| r.hash).collect();
        assert_eq!(order, vec![5, 2, 1]);
    }

    #[test]
    fn arena_exhaustion_is_fatal() {
        let mut store = RecordStore::<u64>::new(&tiny(1, 2, 1));
        for n in 1..=3u64 {
            let (position, aux) = sample(n);
            store.insert_or_accumulate(n, &position, &aux, 1).unwrap();
        }
        let (position, aux) = sample(4);
        assert_eq!(
            store.insert_or_accumulate(4, &position, &aux, 1),
            Err(StoreError::ArenaExhausted {
                arenas: 1,
                block: 2
            })
        );
        // nothing was half-inserted
        assert_eq!(store.distinct(), 3);
        assert_eq!(store.count_of(4), None);
    }

    #[test]
    fn zero_count_is_rejected_and_leaves_chains_intact() {
        let mut store = RecordStore::<u64>::new(&tiny(1, 2, 2));
        let (pa, xa) = sample(1);
        let (pb, xb) = sample(2);
        assert_eq!(
            store.insert_or_accumulate(1, &pa, &xa, 0),
            Err(StoreError::ZeroCount)
        );
        assert!(store.is_empty());

        store.insert_or_accumulate(1, &pa, &xa, 3).unwrap();
        store.insert_or_accumulate(2, &pb, &xb, 5).unwrap();
        assert_eq!(
            store.insert_or_accumulate(2, &pb, &xb, 0),
            Err(StoreError::ZeroCount)
        );
        let (pc, xc) = sample(3);
        store.insert_or_accumulate(3, &pc, &xc, 1).unwrap();

        assert_eq!(store.distinct(), 3);
        assert_eq!(store.records().count() as u64, store.distinct());
        assert_eq!(store.count_of(2), Some(5));
        assert_eq!(store.total(), 9);
    }

    #[test]
    fn links_stay_inside_the_32_bit_range() {
        assert_eq!(link_for(0, 4, 3), Some(Link(3)));
        assert_eq!(link_for(2, 4, 1), Some(Link(9)));
        // last usable slot sits just below the sentinel
        assert_eq!(link_for(1, u32::MAX as usize - 1, 0), Some(Link(u32::MAX - 1)));
        assert_eq!(link_for(1, u32::MAX as usize, 0), None);
        assert_eq!(link_for(2, 1 << 31, 0), None);
        assert_eq!(link_for(usize::MAX, 2, 0), None);
    }

    #[test]
    fn count_overflow_is_an_error() {
        let mut store = RecordStore::<u64>::new(&tiny(2, 2, 1));
        let (position, aux) = sample(1);
        store
            .insert_or_accumulate(1, &position, &aux, u64::MAX)
            .unwrap();
        assert_eq!(
            store.insert_or_accumulate(1, &position, &aux, 1),
            Err(StoreError::CountOverflow {
                current: u64::MAX,
                added: 1
            })
        );
    }

    #[test]
    fn aliased_hash_merges_and_is_reported() {
        // Two distinct positions forced onto one hash are not told apart:
        // deduplication relies on the hash width making this improbable.
        let mut store = RecordStore::<u64>::new(&tiny(4, 2, 1));
        let (pa, xa) = sample(1);
        let (pb, xb) = sample(2);
        store.insert_or_accumulate(42, &pa, &xa, 1).unwrap();
        assert_eq!(
            store.insert_or_accumulate(42, &pb, &xb, 1),
            Ok(InsertOutcome::Found)
        );
        assert_eq!(store.distinct(), 1);
        assert_eq!(store.count_of(42), Some(2));
        assert_eq!(store.stats().aliases, 1);
        // the first position is kept
        assert_eq!(store.records().next().map(|r| r.position), Some(pa));
    }
}
