use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("invalid database: {0} (expected refseq|genbank|ensembl|ensemblgenomes|uniprot)")]
    #[diagnostic(code(kira::invalid_database))]
    InvalidDatabase(String),

    #[error("invalid organism identifier: {0:?}")]
    InvalidOrganism(String),

    #[error("invalid release: {0}")]
    InvalidRelease(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("{message}")]
    #[diagnostic(help(
        "try again with reference = false, or use the assembly accession or NCBI Taxonomy ID"
    ))]
    OrganismNotFound { organism: String, message: String },

    #[error("no {db} genome is available for '{organism}'")]
    GenomeUnavailable { organism: String, db: String },

    #[error("organism '{organism}' does not exist in {db}; is the name misspelled?")]
    SpeciesNotFound { organism: String, db: String },

    #[error("no UniProt proteome found for '{0}'")]
    ProteomeNotFound(String),

    #[error("metadata endpoint {url} returned status {status}")]
    MetadataUnavailable { url: String, status: u16 },

    #[error("request to {url} failed: {message}")]
    #[diagnostic(help("the server may be overloaded; try again later or use another database"))]
    Transport { url: String, message: String },

    #[error("{url} returned status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("md5 mismatch for {file}: expected {expected}, computed {actual}")]
    #[diagnostic(
        code(kira::checksum_mismatch),
        help("the local copy was removed; download it again")
    )]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("checksum manifest {manifest} has no entry for {key}")]
    #[diagnostic(code(kira::checksum_missing))]
    ChecksumEntryMissing { manifest: String, key: String },

    #[error("failed to parse assembly summary: {0}")]
    IndexParse(String),

    #[error("failed to decompress {path}: {message}")]
    Decompress { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

/// Coarse classification used to decide between aborting and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CallerError,
    NotFound,
    TransportFailure,
    IntegrityFailure,
    Internal,
}

impl KiraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KiraError::InvalidDatabase(_)
            | KiraError::InvalidOrganism(_)
            | KiraError::InvalidRelease(_)
            | KiraError::ConfigRead(_)
            | KiraError::ConfigParse(_) => ErrorKind::CallerError,
            KiraError::OrganismNotFound { .. }
            | KiraError::GenomeUnavailable { .. }
            | KiraError::SpeciesNotFound { .. }
            | KiraError::ProteomeNotFound(_)
            | KiraError::MetadataUnavailable { .. } => ErrorKind::NotFound,
            KiraError::Transport { .. } | KiraError::HttpStatus { .. } => {
                ErrorKind::TransportFailure
            }
            KiraError::ChecksumMismatch { .. } | KiraError::ChecksumEntryMissing { .. } => {
                ErrorKind::IntegrityFailure
            }
            KiraError::IndexParse(_) | KiraError::Decompress { .. } | KiraError::Filesystem(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Soft errors are reported and let a batch continue; everything else aborts.
    pub fn is_soft(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::TransportFailure
        )
    }

    pub(crate) fn fs(err: impl std::fmt::Display) -> Self {
        KiraError::Filesystem(err.to_string())
    }
}
