use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::time::{Duration, SystemTime};

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::RetrievalConfig;
use crate::domain::{AssemblyRecord, Database, RefseqCategory, VersionStatus};
use crate::error::KiraError;
use crate::fetch::{Transport, VerifiedFetcher};

/// Supplies the assembly summary table of one NCBI database, in file order.
pub trait AssemblyIndexProvider {
    fn assembly_index(&self, db: Database) -> Result<Vec<AssemblyRecord>, KiraError>;
}

/// Downloads `assembly_summary_<db>.txt` and keeps it in the user cache for a while.
pub struct NcbiAssemblyIndex<T: Transport> {
    transport: T,
    base_url: String,
    cache_dir: Utf8PathBuf,
    max_age: Duration,
}

impl<T: Transport> NcbiAssemblyIndex<T> {
    pub fn new(transport: T, config: &RetrievalConfig) -> Result<Self, KiraError> {
        let cache_dir = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("kira-proteome"))
                    .ok()
            })
            .ok_or_else(|| KiraError::Filesystem("unable to resolve cache directory".to_string()))?;
        Ok(Self::with_cache_dir(transport, config, cache_dir))
    }

    pub fn with_cache_dir(transport: T, config: &RetrievalConfig, cache_dir: Utf8PathBuf) -> Self {
        Self {
            transport,
            base_url: config.ncbi_base_url.trim_end_matches('/').to_string(),
            cache_dir,
            max_age: Duration::from_secs(config.index_max_age_hours * 3600),
        }
    }

    pub fn summary_url(&self, db: Database) -> String {
        format!(
            "{}/genomes/{db}/assembly_summary_{db}.txt",
            self.base_url
        )
    }

    fn cached_path(&self, db: Database) -> Utf8PathBuf {
        self.cache_dir.join(format!("assembly_summary_{db}.txt"))
    }

    fn is_fresh(&self, path: &Utf8PathBuf) -> bool {
        fs::metadata(path.as_std_path())
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .map(|age| age < self.max_age)
            .unwrap_or(false)
    }
}

impl<T: Transport> AssemblyIndexProvider for NcbiAssemblyIndex<T> {
    fn assembly_index(&self, db: Database) -> Result<Vec<AssemblyRecord>, KiraError> {
        let path = self.cached_path(db);
        if self.is_fresh(&path) {
            debug!(path = %path, "using cached assembly summary");
        } else {
            let url = self.summary_url(db);
            info!(url, "downloading assembly summary");
            VerifiedFetcher::new(&self.transport).fetch(&url, &path, true)?;
        }
        let file = File::open(path.as_std_path()).map_err(KiraError::fs)?;
        parse_assembly_summary(BufReader::new(file))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawAssemblyRow {
    assembly_accession: String,
    bioproject: String,
    biosample: String,
    refseq_category: String,
    taxid: String,
    organism_name: String,
    infraspecific_name: String,
    version_status: String,
    release_type: String,
    genome_rep: String,
    seq_rel_date: String,
    submitter: String,
    ftp_path: String,
}

impl TryFrom<RawAssemblyRow> for AssemblyRecord {
    type Error = KiraError;

    fn try_from(row: RawAssemblyRow) -> Result<Self, Self::Error> {
        let taxonomy_id = row.taxid.trim().parse::<u64>().map_err(|_| {
            KiraError::IndexParse(format!(
                "invalid taxid {:?} for {}",
                row.taxid, row.assembly_accession
            ))
        })?;
        let ftp_path = row.ftp_path.trim();
        let remote_base_path = (!ftp_path.is_empty() && ftp_path != "na")
            .then(|| ftp_path.to_string());
        Ok(AssemblyRecord {
            organism_name: row.organism_name,
            assembly_accession: row.assembly_accession,
            taxonomy_id,
            refseq_category: RefseqCategory::from(row.refseq_category.as_str()),
            version_status: VersionStatus::from(row.version_status.as_str()),
            remote_base_path,
            bioproject: row.bioproject,
            biosample: row.biosample,
            infraspecific_name: row.infraspecific_name,
            release_type: row.release_type,
            genome_representation: row.genome_rep,
            sequence_release_date: row.seq_rel_date,
            submitter: row.submitter,
        })
    }
}

/// Parses an NCBI assembly summary. The column header is the `# assembly_accession ...`
/// comment line; other leading comment lines are skipped.
pub fn parse_assembly_summary<R: BufRead>(mut reader: R) -> Result<Vec<AssemblyRecord>, KiraError> {
    let header = loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).map_err(KiraError::fs)?;
        if read == 0 {
            return Err(KiraError::IndexParse("missing header line".to_string()));
        }
        let trimmed = line.trim_end_matches(['\n', '\r']);
        if let Some(rest) = trimmed.strip_prefix('#') {
            let rest = rest.trim_start();
            if rest.starts_with("assembly_accession") {
                break csv::StringRecord::from(rest.split('\t').collect::<Vec<_>>());
            }
            continue;
        }
        if trimmed.starts_with("assembly_accession") {
            break csv::StringRecord::from(trimmed.split('\t').collect::<Vec<_>>());
        }
        return Err(KiraError::IndexParse(
            "data row found before the header line".to_string(),
        ));
    };

    let mut rows = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(reader);

    let mut records = Vec::new();
    for (line, result) in rows.records().enumerate() {
        let record = result.map_err(|err| KiraError::IndexParse(err.to_string()))?;
        let raw: RawAssemblyRow = record
            .deserialize(Some(&header))
            .map_err(|err| KiraError::IndexParse(format!("row {}: {err}", line + 1)))?;
        records.push(AssemblyRecord::try_from(raw)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    const SUMMARY: &str = "#   See ftp://ftp.ncbi.nlm.nih.gov/genomes/README_assembly_summary.txt\n\
# assembly_accession\tbioproject\tbiosample\twgs_master\trefseq_category\ttaxid\tspecies_taxid\torganism_name\tinfraspecific_name\tisolate\tversion_status\tassembly_level\trelease_type\tgenome_rep\tseq_rel_date\tasm_name\tsubmitter\tgbrs_paired_asm\tpaired_asm_comp\tftp_path\n\
GCF_000001405.40\tPRJNA168\tna\t\treference genome\t9606\t9606\tHomo sapiens\t\t\tlatest\tChromosome\tPatch\tFull\t2022/02/03\tGRCh38.p14\tGenome Reference Consortium\tGCA_000001405.29\tidentical\thttps://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/001/405/GCF_000001405.40_GRCh38.p14\n\
GCF_000002035.6\tPRJNA13922\tSAMN06930106\t\tna\t7955\t7955\tDanio rerio\tstrain=Tuebingen\t\treplaced\tChromosome\tMajor\tFull\t2017/05/15\tGRCz11\tGenome Reference Consortium\tGCA_000002035.4\tidentical\tna\n";

    #[test]
    fn parse_summary_rows() {
        let records = parse_assembly_summary(Cursor::new(SUMMARY)).unwrap();
        assert_eq!(records.len(), 2);

        let human = &records[0];
        assert_eq!(human.organism_name, "Homo sapiens");
        assert_eq!(human.taxonomy_id, 9606);
        assert_eq!(human.refseq_category, RefseqCategory::ReferenceGenome);
        assert_eq!(human.version_status, VersionStatus::Latest);
        assert_eq!(human.submitter, "Genome Reference Consortium");
        assert!(human.remote_base_path.as_deref().unwrap().ends_with("GRCh38.p14"));

        let zebrafish = &records[1];
        assert_eq!(zebrafish.remote_base_path, None);
        assert_eq!(zebrafish.version_status, VersionStatus::Replaced);
        assert_eq!(zebrafish.infraspecific_name, "strain=Tuebingen");
    }

    #[test]
    fn missing_header_is_an_error() {
        let err = parse_assembly_summary(Cursor::new("GCF_1\tPRJ\n")).unwrap_err();
        assert!(matches!(err, KiraError::IndexParse(_)));
    }
}
