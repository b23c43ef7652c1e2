//! Error types for the uniques enumerator.

use std::io;
use std::path::PathBuf;

/// FEN parsing errors
#[derive(thiserror::Error, Debug)]
pub enum FenError {
    #[error("empty FEN string")]
    Empty,

    #[error("expected 8 ranks, found {0}")]
    RankCount(usize),

    #[error("rank {0} does not describe exactly 8 files")]
    RankLength(i32),

    #[error("unknown piece character {0:?}")]
    BadPiece(char),

    #[error("side to move must be 'w' or 'b', got {0:?}")]
    BadSide(String),

    #[error("unknown castling flag {0:?}")]
    BadCastling(char),

    #[error("invalid en passant square {0:?}")]
    BadEnPassant(String),

    #[error("both kings must be on the board")]
    MissingKing,
}

/// Record store errors. All are fatal for the current depth.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// Every overflow arena is full.
    #[error("overflow arenas exhausted ({arenas} blocks of {block} records)")]
    ArenaExhausted { arenas: usize, block: usize },

    /// An occurrence count no longer fits in memory.
    #[error("occurrence count overflow: {current} + {added}")]
    CountOverflow { current: u64, added: u64 },

    /// Every stored position is reached at least once.
    #[error("occurrence count must be at least 1")]
    ZeroCount,
}

/// On-disk record encoding errors. The overflow policy is fatal: nothing saturates.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("occurrence count {0} exceeds the 55-bit record field")]
    CountOverflow(u64),

    #[error("occurrence count of zero cannot be stored")]
    ZeroCount,

    #[error("castling mask {0:#x} does not fit in 4 bits")]
    InvalidCastling(u8),

    #[error("en passant file {0} is off the board")]
    InvalidEnPassant(u8),

    #[error("corrupt record: {0}")]
    Corrupt(&'static str),
}

/// Depth file errors
#[derive(thiserror::Error, Debug)]
pub enum PersistError {
    /// The previous depth was never persisted (or was removed).
    #[error("depth {depth} file {path} cannot be opened")]
    MissingDepth {
        depth: u32,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("record {index} of depth {depth}")]
    Decode {
        depth: u32,
        index: u64,
        #[source]
        source: CodecError,
    },

    #[error(transparent)]
    Encode(#[from] CodecError),
}

/// Configuration errors
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("bucket count must be at least 1")]
    ZeroBuckets,

    #[error("arena block size and arena count must be at least 1")]
    ZeroArenas,

    #[error("overflow space of {0} records exceeds the 32-bit link range")]
    OverflowSpace(u64),

    #[error("partition count must be at least 1")]
    ZeroPartitions,
}

/// Anything that stops an expansion run
#[derive(thiserror::Error, Debug)]
pub enum DedupError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type DedupResult<T> = Result<T, DedupError>;
