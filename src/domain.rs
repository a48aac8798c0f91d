use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Refseq,
    Genbank,
    Ensembl,
    Ensemblgenomes,
    Uniprot,
}

/// Databases that share a retrieval path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbFamily {
    Ncbi,
    Ensembl,
    Uniprot,
}

impl Database {
    pub fn as_str(&self) -> &'static str {
        match self {
            Database::Refseq => "refseq",
            Database::Genbank => "genbank",
            Database::Ensembl => "ensembl",
            Database::Ensemblgenomes => "ensemblgenomes",
            Database::Uniprot => "uniprot",
        }
    }

    pub fn family(&self) -> DbFamily {
        match self {
            Database::Refseq | Database::Genbank => DbFamily::Ncbi,
            Database::Ensembl | Database::Ensemblgenomes => DbFamily::Ensembl,
            Database::Uniprot => DbFamily::Uniprot,
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Database {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "refseq" => Ok(Database::Refseq),
            "genbank" => Ok(Database::Genbank),
            "ensembl" => Ok(Database::Ensembl),
            "ensemblgenomes" => Ok(Database::Ensemblgenomes),
            "uniprot" => Ok(Database::Uniprot),
            _ => Err(KiraError::InvalidDatabase(value.to_string())),
        }
    }
}

/// How an organism identifier is matched: all-digit tokens are NCBI taxonomy ids,
/// anything else is a name or accession.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrganismId {
    Taxid(u64),
    Text(String),
}

impl OrganismId {
    pub fn parse(value: &str) -> Result<Self, KiraError> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(KiraError::InvalidOrganism(value.to_string()));
        }
        if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            // Out of range for any taxonomy id, so nothing can match it.
            let id = trimmed
                .parse::<u64>()
                .map_err(|_| KiraError::OrganismNotFound {
                    organism: trimmed.to_string(),
                    message: format!("'{trimmed}' is not a valid NCBI Taxonomy ID"),
                })?;
            return Ok(OrganismId::Taxid(id));
        }
        Ok(OrganismId::Text(strip_parentheses(trimmed)))
    }

    pub fn is_taxid(&self) -> bool {
        matches!(self, OrganismId::Taxid(_))
    }
}

impl fmt::Display for OrganismId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrganismId::Taxid(id) => write!(f, "{id}"),
            OrganismId::Text(text) => write!(f, "{text}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganismQuery {
    pub identifier: String,
    pub db: Database,
    pub require_reference: bool,
    pub release: Option<u32>,
}

impl OrganismQuery {
    pub fn new(identifier: impl Into<String>, db: Database) -> Self {
        Self {
            identifier: identifier.into(),
            db,
            require_reference: false,
            release: None,
        }
    }

    pub fn reference(mut self, require_reference: bool) -> Self {
        self.require_reference = require_reference;
        self
    }

    pub fn release(mut self, release: Option<u32>) -> Self {
        self.release = release;
        self
    }

    pub fn organism_id(&self) -> Result<OrganismId, KiraError> {
        OrganismId::parse(&self.identifier)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RefseqCategory {
    ReferenceGenome,
    RepresentativeGenome,
    Na,
    Other(String),
}

impl RefseqCategory {
    pub fn is_reference_or_representative(&self) -> bool {
        matches!(
            self,
            RefseqCategory::ReferenceGenome | RefseqCategory::RepresentativeGenome
        )
    }

    pub fn as_str(&self) -> &str {
        match self {
            RefseqCategory::ReferenceGenome => "reference genome",
            RefseqCategory::RepresentativeGenome => "representative genome",
            RefseqCategory::Na => "na",
            RefseqCategory::Other(value) => value,
        }
    }
}

impl From<&str> for RefseqCategory {
    fn from(value: &str) -> Self {
        match value.trim() {
            "reference genome" => RefseqCategory::ReferenceGenome,
            "representative genome" => RefseqCategory::RepresentativeGenome,
            "na" | "" => RefseqCategory::Na,
            other => RefseqCategory::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VersionStatus {
    Latest,
    Replaced,
    Suppressed,
    Other(String),
}

impl VersionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            VersionStatus::Latest => "latest",
            VersionStatus::Replaced => "replaced",
            VersionStatus::Suppressed => "suppressed",
            VersionStatus::Other(value) => value,
        }
    }
}

impl From<&str> for VersionStatus {
    fn from(value: &str) -> Self {
        match value.trim() {
            "latest" => VersionStatus::Latest,
            "replaced" => VersionStatus::Replaced,
            "suppressed" => VersionStatus::Suppressed,
            other => VersionStatus::Other(other.to_string()),
        }
    }
}

/// One row of an NCBI assembly summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyRecord {
    pub organism_name: String,
    pub assembly_accession: String,
    pub taxonomy_id: u64,
    pub refseq_category: RefseqCategory,
    pub version_status: VersionStatus,
    pub remote_base_path: Option<String>,
    pub bioproject: String,
    pub biosample: String,
    pub infraspecific_name: String,
    pub release_type: String,
    pub genome_representation: String,
    pub sequence_release_date: String,
    pub submitter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub record: AssemblyRecord,
    pub normalized_organism_label: String,
    pub local_file_stem: String,
    /// Number of index rows that satisfied the query before narrowing to one.
    pub candidates: usize,
}

impl ResolvedTarget {
    pub fn archive_file_name(&self) -> String {
        format!("{}.faa.gz", self.local_file_stem)
    }
}

/// Label used in local file names: parentheses dropped, spaces and slashes to underscores.
pub fn normalize_label(value: &str) -> String {
    strip_parentheses(value.trim())
        .replace(' ', "_")
        .replace('/', "_")
}

pub fn local_file_stem(label: &str, db: Database) -> String {
    format!("{label}_protein_{db}")
}

pub(crate) fn strip_parentheses(value: &str) -> String {
    value.chars().filter(|ch| !matches!(ch, '(' | ')')).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_database_tokens() {
        assert_eq!("refseq".parse::<Database>().unwrap(), Database::Refseq);
        assert_eq!(
            "ensemblgenomes".parse::<Database>().unwrap(),
            Database::Ensemblgenomes
        );
        let err = "pdb".parse::<Database>().unwrap_err();
        assert_matches!(err, KiraError::InvalidDatabase(_));
    }

    #[test]
    fn database_is_case_sensitive() {
        assert_matches!(
            "RefSeq".parse::<Database>(),
            Err(KiraError::InvalidDatabase(_))
        );
    }

    #[test]
    fn classify_taxid() {
        assert_eq!(OrganismId::parse("9606").unwrap(), OrganismId::Taxid(9606));
        assert_eq!(
            OrganismId::parse("Homo sapiens").unwrap(),
            OrganismId::Text("Homo sapiens".to_string())
        );
        assert_eq!(
            OrganismId::parse("9606a").unwrap(),
            OrganismId::Text("9606a".to_string())
        );
    }

    #[test]
    fn oversized_taxid_is_not_found() {
        let err = OrganismId::parse("99999999999999999999999").unwrap_err();
        assert_matches!(err, KiraError::OrganismNotFound { .. });
        assert!(err.is_soft());
    }

    #[test]
    fn classify_rejects_empty() {
        assert_matches!(OrganismId::parse("  "), Err(KiraError::InvalidOrganism(_)));
    }

    #[test]
    fn normalize_organism_label() {
        assert_eq!(
            normalize_label("Escherichia coli (strain K-12/MG1655)"),
            "Escherichia_coli_strain_K-12_MG1655"
        );
        assert_eq!(
            local_file_stem("Homo_sapiens", Database::Genbank),
            "Homo_sapiens_protein_genbank"
        );
    }

    #[test]
    fn category_mapping() {
        assert!(RefseqCategory::from("reference genome").is_reference_or_representative());
        assert!(!RefseqCategory::from("na").is_reference_or_representative());
        assert_eq!(VersionStatus::from("latest"), VersionStatus::Latest);
    }
}
