use serde::Serialize;

use crate::config::RetrievalConfig;
use crate::domain::AssemblyRecord;
use crate::error::KiraError;

const NCBI_FTP_HOST: &str = "ftp://ftp.ncbi.nlm.nih.gov/";
const NCBI_HTTPS_HOST: &str = "https://ftp.ncbi.nlm.nih.gov/";
pub const PROTEIN_SUFFIX: &str = "_protein.faa.gz";
pub const CHECKSUM_MANIFEST: &str = "md5checksums.txt";

/// Where a RefSeq/GenBank proteome and its md5 manifest live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteLocation {
    pub archive_url: String,
    pub checksum_manifest_url: String,
    /// Manifest row naming the archive, e.g. `./GCF_1_protein.faa.gz`.
    pub checksum_key: String,
}

pub fn build(
    record: &AssemblyRecord,
    config: &RetrievalConfig,
) -> Result<RemoteLocation, KiraError> {
    let base = record.remote_base_path.as_deref().ok_or_else(|| {
        KiraError::IndexParse(format!(
            "assembly {} has no ftp_path",
            record.assembly_accession
        ))
    })?;
    let trimmed = base.trim_end_matches('/');
    let base = if config.prefer_https {
        rewrite_ncbi_ftp(trimmed)
    } else {
        trimmed.to_string()
    };

    let basename = base.rsplit('/').next().unwrap_or(&base);
    let archive_name = format!("{basename}{PROTEIN_SUFFIX}");
    Ok(RemoteLocation {
        archive_url: format!("{base}/{archive_name}"),
        checksum_manifest_url: format!("{base}/{CHECKSUM_MANIFEST}"),
        checksum_key: format!("./{archive_name}"),
    })
}

fn rewrite_ncbi_ftp(base: &str) -> String {
    match base.strip_prefix(NCBI_FTP_HOST) {
        Some(rest) => format!("{NCBI_HTTPS_HOST}{rest}"),
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RefseqCategory, VersionStatus};

    fn record(path: &str) -> AssemblyRecord {
        AssemblyRecord {
            organism_name: "Homo sapiens".to_string(),
            assembly_accession: "GCF_1".to_string(),
            taxonomy_id: 9606,
            refseq_category: RefseqCategory::ReferenceGenome,
            version_status: VersionStatus::Latest,
            remote_base_path: Some(path.to_string()),
            bioproject: String::new(),
            biosample: String::new(),
            infraspecific_name: String::new(),
            release_type: String::new(),
            genome_representation: String::new(),
            sequence_release_date: String::new(),
            submitter: String::new(),
        }
    }

    #[test]
    fn build_from_base_path() {
        let location = build(&record("ftp://x/GCF_1"), &RetrievalConfig::default()).unwrap();
        assert_eq!(location.archive_url, "ftp://x/GCF_1/GCF_1_protein.faa.gz");
        assert_eq!(location.checksum_manifest_url, "ftp://x/GCF_1/md5checksums.txt");
        assert_eq!(location.checksum_key, "./GCF_1_protein.faa.gz");
    }

    #[test]
    fn ncbi_ftp_is_served_over_https() {
        let path = "ftp://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/001/405/GCF_000001405.40_GRCh38.p14/";
        let location = build(&record(path), &RetrievalConfig::default()).unwrap();
        assert_eq!(
            location.archive_url,
            "https://ftp.ncbi.nlm.nih.gov/genomes/all/GCF/000/001/405/GCF_000001405.40_GRCh38.p14/GCF_000001405.40_GRCh38.p14_protein.faa.gz"
        );

        let config = RetrievalConfig {
            prefer_https: false,
            ..RetrievalConfig::default()
        };
        let location = build(&record(path), &config).unwrap();
        assert!(location.archive_url.starts_with("ftp://"));
    }
}
