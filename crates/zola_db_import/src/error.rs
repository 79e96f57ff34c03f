use std::path::PathBuf;
use thiserror::Error;

/// What to do when a single field or row fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicityPolicy {
    /// Leave the column at its type's null value and keep the row.
    SkipCol,
    /// Drop the whole row; does not count toward `imported_rows`.
    SkipRow,
    /// Abort the import: roll back the shadow partition currently being
    /// built and fail the run.
    SkipAll,
}

impl Default for AtomicityPolicy {
    fn default() -> Self {
        AtomicityPolicy::SkipCol
    }
}

/// A named point in the import's phase state machine, used both for
/// progress reporting and to tag which phase a `Failed` outcome occurred
/// in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    BoundaryCheck,
    Indexing,
    PartitionImport,
    SymbolTableMerge,
    UpdateSymbolKeys,
    BuildIndex,
    MovePartitions,
    AttachPartitions,
    Done,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Init => "INIT",
            Phase::BoundaryCheck => "BOUNDARY_CHECK",
            Phase::Indexing => "INDEXING",
            Phase::PartitionImport => "PARTITION_IMPORT",
            Phase::SymbolTableMerge => "SYMBOL_TABLE_MERGE",
            Phase::UpdateSymbolKeys => "UPDATE_SYMBOL_KEYS",
            Phase::BuildIndex => "BUILD_INDEX",
            Phase::MovePartitions => "MOVE_PARTITIONS",
            Phase::AttachPartitions => "ATTACH_PARTITIONS",
            Phase::Done => "DONE",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse error in phase {phase}: {message}")]
    Parse { phase: Phase, message: String },

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("import cancelled during phase {0}")]
    Cancelled(Phase),

    #[error("corruption detected: {0}")]
    Corruption(String),

    #[error("failed in phase {phase}: {message}")]
    Failed { phase: Phase, message: String },

    #[error("an import is already in progress for this process")]
    Busy,
}

impl ImportError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ImportError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(phase: Phase, message: impl Into<String>) -> Self {
        ImportError::Parse {
            phase,
            message: message.into(),
        }
    }

    pub fn failed(phase: Phase, message: impl Into<String>) -> Self {
        ImportError::Failed {
            phase,
            message: message.into(),
        }
    }

    /// The phase a failure occurred in, when one applies (used by the CLI
    /// and by tests asserting `FAILED(phase, ...)`).
    pub fn phase(&self) -> Option<Phase> {
        match self {
            ImportError::Parse { phase, .. } => Some(*phase),
            ImportError::Cancelled(phase) => Some(*phase),
            ImportError::Failed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

impl From<zola_db_core::ZolaError> for ImportError {
    fn from(e: zola_db_core::ZolaError) -> Self {
        match e {
            zola_db_core::ZolaError::Io { path, source } => ImportError::Io { path, source },
            other => ImportError::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
