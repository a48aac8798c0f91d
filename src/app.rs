use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{info, warn};

use crate::assembly::AssemblyIndexProvider;
use crate::config::RetrievalConfig;
use crate::domain::{
    Database, DbFamily, OrganismId, OrganismQuery, local_file_stem, normalize_label,
};
use crate::ensembl::{self, EnsemblClient};
use crate::error::{ErrorKind, KiraError};
use crate::fetch::{FetchOutcome, Transport, VerifiedFetcher};
use crate::fs_util;
use crate::location;
use crate::metadata::{self, MetadataRecord};
use crate::resolver;
use crate::store::DownloadStore;
use crate::uniprot::{self, UniprotClient};

pub const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchOptions {
    pub gunzip: bool,
    /// Download again even when the archive exists locally.
    pub update: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    Success {
        local_path: Utf8PathBuf,
        downloaded: bool,
        sidecars: Vec<Utf8PathBuf>,
        metadata: MetadataRecord,
    },
    NotAvailable {
        reason: String,
    },
    Failed {
        error: String,
    },
}

impl RetrievalOutcome {
    /// Path, `"Not available"` or `"false"`, for callers that still expect a bare string.
    pub fn legacy_value(&self) -> String {
        match self {
            RetrievalOutcome::Success { local_path, .. } => local_path.to_string(),
            RetrievalOutcome::NotAvailable { .. } => NOT_AVAILABLE.to_string(),
            RetrievalOutcome::Failed { .. } => "false".to_string(),
        }
    }

    pub fn local_path(&self) -> Option<&Utf8PathBuf> {
        match self {
            RetrievalOutcome::Success { local_path, .. } => Some(local_path),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RetrievalOutcome::Success { .. })
    }

    fn from_soft_error(err: &KiraError) -> Self {
        match err {
            KiraError::OrganismNotFound { .. }
            | KiraError::SpeciesNotFound { .. }
            | KiraError::ProteomeNotFound(_) => RetrievalOutcome::Failed {
                error: err.to_string(),
            },
            _ => RetrievalOutcome::NotAvailable {
                reason: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalItem {
    pub organism: String,
    pub db: Database,
    pub outcome: RetrievalOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub items: Vec<RetrievalItem>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn emit(sink: &dyn ProgressSink, message: impl Into<String>) {
    sink.event(ProgressEvent {
        message: message.into(),
        elapsed: None,
    });
}

pub struct App<I, T, E, U>
where
    I: AssemblyIndexProvider,
    T: Transport,
    E: EnsemblClient,
    U: UniprotClient,
{
    config: RetrievalConfig,
    index: I,
    transport: T,
    ensembl: E,
    uniprot: U,
}

impl<I, T, E, U> App<I, T, E, U>
where
    I: AssemblyIndexProvider,
    T: Transport,
    E: EnsemblClient,
    U: UniprotClient,
{
    pub fn new(config: RetrievalConfig, index: I, transport: T, ensembl: E, uniprot: U) -> Self {
        Self {
            config,
            index,
            transport,
            ensembl,
            uniprot,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Validates a raw database token before anything touches the network or disk.
    pub fn retrieve_named(
        &self,
        db: &str,
        organism: &str,
        require_reference: bool,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, KiraError> {
        let db: Database = db.parse()?;
        let query = OrganismQuery::new(organism, db).reference(require_reference);
        self.retrieve(&query, options, sink)
    }

    /// Retrieves one proteome. Soft failures come back as `NotAvailable` or
    /// `Failed`; integrity, caller and filesystem errors are returned as `Err`.
    pub fn retrieve(
        &self,
        query: &OrganismQuery,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, KiraError> {
        let result = query.organism_id().and_then(|id| match query.db.family() {
            DbFamily::Ncbi => self.retrieve_ncbi(query, &id, options, sink),
            DbFamily::Ensembl => self.retrieve_ensembl(query, &id, options, sink),
            DbFamily::Uniprot => self.retrieve_uniprot(query, &id, options, sink),
        });
        match result {
            Ok(outcome) => Ok(outcome),
            Err(err) if err.is_soft() => {
                let organism = query.identifier.as_str();
                if err.kind() == ErrorKind::TransportFailure {
                    warn!(organism, db = %query.db, error = %err, "server not reachable");
                } else {
                    warn!(organism, db = %query.db, error = %err, "no proteome retrieved");
                }
                emit(sink, format!("phase=Resolve; {err}"));
                Ok(RetrievalOutcome::from_soft_error(&err))
            }
            Err(err) => Err(err),
        }
    }

    /// Runs every query in order; a fatal error stops the batch.
    pub fn retrieve_batch(
        &self,
        queries: &[OrganismQuery],
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalResult, KiraError> {
        let mut items = Vec::with_capacity(queries.len());
        for (position, query) in queries.iter().enumerate() {
            emit(
                sink,
                format!(
                    "phase=Resolve; [{}/{}] {} ({})",
                    position + 1,
                    queries.len(),
                    query.identifier,
                    query.db
                ),
            );
            let outcome = self.retrieve(query, options, sink)?;
            items.push(RetrievalItem {
                organism: query.identifier.clone(),
                db: query.db,
                outcome,
            });
        }
        Ok(RetrievalResult { items })
    }

    fn retrieve_ncbi(
        &self,
        query: &OrganismQuery,
        id: &OrganismId,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, KiraError> {
        emit(
            sink,
            format!("phase=Resolve; loading {} assembly summary", query.db),
        );
        let index = self.index.assembly_index(query.db)?;
        if !resolver::is_genome_available(&index, id) {
            return Err(KiraError::GenomeUnavailable {
                organism: id.to_string(),
                db: query.db.to_string(),
            });
        }
        let target = resolver::resolve(&index, query)?;
        if target.candidates > 1 {
            emit(
                sink,
                format!(
                    "phase=Resolve; {} entries match '{id}'; using {} ({})",
                    target.candidates,
                    target.record.assembly_accession,
                    target.record.organism_name
                ),
            );
        }

        let location = location::build(&target.record, &self.config)?;
        let store = self.store()?;
        let file_name = target.archive_file_name();
        let archive = store.archive_path(&file_name);

        let fetcher = VerifiedFetcher::new(&self.transport);
        let outcome = self.fetch_timed(
            &fetcher,
            "ncbi",
            &location.archive_url,
            &archive,
            options,
            sink,
        )?;
        if outcome == FetchOutcome::Downloaded {
            emit(sink, "phase=Verify; checking md5 checksum");
            fetcher.verify(
                &archive,
                &location.checksum_manifest_url,
                &location.checksum_key,
            )?;
        }

        let (sidecars, doc) = document(
            &store,
            &target.normalized_organism_label,
            query.db,
            outcome,
            sink,
            || {
                metadata::ncbi_record(
                    &target,
                    &location.archive_url,
                    query.db,
                    archive.as_str(),
                    &file_name,
                    &metadata::download_date(),
                )
            },
        )?;
        self.finish(archive, outcome, sidecars, doc, options, sink)
    }

    fn retrieve_ensembl(
        &self,
        query: &OrganismQuery,
        id: &OrganismId,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, KiraError> {
        emit(
            sink,
            format!("phase=Resolve; searching {} species catalogue", query.db),
        );
        let catalogue = self.ensembl.species(query.db)?;
        let species = ensembl::resolve_species(&catalogue, id).ok_or_else(|| {
            KiraError::SpeciesNotFound {
                organism: id.to_string(),
                db: query.db.to_string(),
            }
        })?;
        info!(species = %species.name, assembly = %species.assembly, "resolved species");

        emit(sink, "phase=Verify; checking Ensembl assembly metadata");
        let assembly = self.ensembl.assembly_info(query.db, species)?;

        let fetcher = VerifiedFetcher::new(&self.transport);
        let url = ensembl::archive_url(species, query.db, query.release, &self.config);
        let store = self.store()?;
        let file_name = species.archive_file_name();
        let archive = store.archive_path(&file_name);
        let outcome = self.fetch_timed(&fetcher, "ensembl", &url, &archive, options, sink)?;

        let (sidecars, doc) = document(
            &store,
            &species.capitalized_name(),
            query.db,
            outcome,
            sink,
            || {
                metadata::ensembl_record(
                    species,
                    &assembly,
                    query.db,
                    &file_name,
                    &metadata::download_date(),
                )
            },
        )?;
        self.finish(archive, outcome, sidecars, doc, options, sink)
    }

    fn retrieve_uniprot(
        &self,
        query: &OrganismQuery,
        id: &OrganismId,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, KiraError> {
        emit(sink, format!("phase=Resolve; searching UniProt proteomes for '{id}'"));
        let candidates = self.uniprot.search_proteomes(id)?;
        let proteome = uniprot::resolve_proteome(&candidates, id, query.require_reference)
            .ok_or_else(|| KiraError::ProteomeNotFound(id.to_string()))?;

        let label = normalize_label(&id.to_string());
        let url = uniprot::stream_url(&proteome.id, &self.config);
        let store = self.store()?;
        let file_name = format!("{}.faa.gz", local_file_stem(&label, Database::Uniprot));
        let archive = store.archive_path(&file_name);

        let fetcher = VerifiedFetcher::new(&self.transport);
        let outcome = self.fetch_timed(&fetcher, "uniprot", &url, &archive, options, sink)?;

        let (sidecars, doc) = document(&store, &label, Database::Uniprot, outcome, sink, || {
            metadata::uniprot_record(
                proteome,
                &url,
                archive.as_str(),
                &file_name,
                &metadata::download_date(),
            )
        })?;
        self.finish(archive, outcome, sidecars, doc, options, sink)
    }

    fn store(&self) -> Result<DownloadStore, KiraError> {
        let store = DownloadStore::new(self.config.download_dir.clone());
        store.ensure_root()?;
        Ok(store)
    }

    fn fetch_timed(
        &self,
        fetcher: &VerifiedFetcher<'_, T>,
        source: &str,
        url: &str,
        archive: &Utf8Path,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<FetchOutcome, KiraError> {
        emit(sink, format!("phase=Fetch; {url}"));
        emit(sink, format!("{source}.request"));
        let start = Instant::now();
        let outcome = fetcher.fetch(url, archive, options.update)?;
        let latency = start.elapsed().as_millis();
        match outcome {
            FetchOutcome::Downloaded => {
                emit(sink, format!("{source}.response latency_ms={latency}"));
            }
            FetchOutcome::Skipped => {
                emit(
                    sink,
                    format!("phase=Fetch; {archive} exists already; download skipped"),
                );
            }
        }
        Ok(outcome)
    }

    fn finish(
        &self,
        archive: Utf8PathBuf,
        outcome: FetchOutcome,
        sidecars: Vec<Utf8PathBuf>,
        metadata: MetadataRecord,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RetrievalOutcome, KiraError> {
        let local_path = if options.gunzip {
            let target = fs_util::gunzip_target(&archive)?;
            let reusable = outcome == FetchOutcome::Skipped && !options.update;
            if reusable && fs_util::is_up_to_date(&target, &archive) {
                emit(sink, format!("phase=Store; reusing {target}"));
                target
            } else {
                emit(sink, format!("phase=Store; unpacking {archive}"));
                fs_util::gunzip(&archive)?
            }
        } else {
            archive
        };
        emit(sink, format!("phase=Store; proteome stored at {local_path}"));
        info!(path = %local_path, "proteome retrieval finished");
        Ok(RetrievalOutcome::Success {
            local_path,
            downloaded: outcome == FetchOutcome::Downloaded,
            sidecars,
            metadata,
        })
    }
}

/// Sidecars are written once, with the download. A skipped fetch keeps the
/// documentation already on disk and reports what it recorded.
fn document(
    store: &DownloadStore,
    label: &str,
    db: Database,
    outcome: FetchOutcome,
    sink: &dyn ProgressSink,
    record: impl FnOnce() -> MetadataRecord,
) -> Result<(Vec<Utf8PathBuf>, MetadataRecord), KiraError> {
    if outcome == FetchOutcome::Skipped
        && let Some(sidecars) = metadata::existing_sidecars(store, label, db)
        && let Some(table) = sidecars.last()
    {
        match metadata::read_tsv(table) {
            Ok(doc) => {
                emit(sink, "phase=Store; keeping existing documentation");
                return Ok((sidecars, doc));
            }
            Err(err) => warn!(path = %table, error = %err, "unreadable sidecar; rewriting it"),
        }
    }
    emit(sink, "phase=Store; writing documentation");
    let doc = record();
    let sidecars = metadata::write_sidecars(store, label, db, &doc)?;
    Ok((sidecars, doc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_values() {
        let success = RetrievalOutcome::Success {
            local_path: Utf8PathBuf::from("_ncbi_downloads/proteomes/x.faa.gz"),
            downloaded: true,
            sidecars: Vec::new(),
            metadata: MetadataRecord::default(),
        };
        assert_eq!(success.legacy_value(), "_ncbi_downloads/proteomes/x.faa.gz");
        assert_eq!(
            RetrievalOutcome::NotAvailable {
                reason: "timeout".to_string()
            }
            .legacy_value(),
            "Not available"
        );
        assert_eq!(
            RetrievalOutcome::Failed {
                error: "none".to_string()
            }
            .legacy_value(),
            "false"
        );
    }

    #[test]
    fn soft_errors_split_into_outcomes() {
        let missing = KiraError::SpeciesNotFound {
            organism: "x".to_string(),
            db: "ensembl".to_string(),
        };
        assert!(matches!(
            RetrievalOutcome::from_soft_error(&missing),
            RetrievalOutcome::Failed { .. }
        ));
        let status = KiraError::MetadataUnavailable {
            url: "u".to_string(),
            status: 503,
        };
        assert!(matches!(
            RetrievalOutcome::from_soft_error(&status),
            RetrievalOutcome::NotAvailable { .. }
        ));
    }
}
