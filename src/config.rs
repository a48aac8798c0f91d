use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{Database, OrganismQuery};
use crate::error::KiraError;

pub const DEFAULT_CONFIG_FILE: &str = "kira-proteome.json";

/// Endpoints and knobs shared by every retrieval. Passed explicitly to each component.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub ncbi_base_url: String,
    pub ensembl_rest_url: String,
    pub ensemblgenomes_rest_url: String,
    pub ensembl_ftp_url: String,
    pub ensemblgenomes_ftp_url: String,
    pub uniprot_rest_url: String,
    pub ensemblgenomes_divisions: Vec<String>,
    pub timeout_secs: u64,
    pub index_max_age_hours: u64,
    pub prefer_https: bool,
    pub download_dir: Utf8PathBuf,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            ncbi_base_url: "https://ftp.ncbi.nlm.nih.gov".to_string(),
            ensembl_rest_url: "https://rest.ensembl.org".to_string(),
            ensemblgenomes_rest_url: "https://rest.ensembl.org".to_string(),
            ensembl_ftp_url: "https://ftp.ensembl.org/pub".to_string(),
            ensemblgenomes_ftp_url: "https://ftp.ensemblgenomes.ebi.ac.uk/pub".to_string(),
            uniprot_rest_url: "https://rest.uniprot.org".to_string(),
            ensemblgenomes_divisions: vec![
                "EnsemblPlants".to_string(),
                "EnsemblFungi".to_string(),
                "EnsemblProtists".to_string(),
                "EnsemblMetazoa".to_string(),
            ],
            timeout_secs: 300,
            index_max_age_hours: 24,
            prefer_https: true,
            download_dir: Utf8PathBuf::from("_ncbi_downloads/proteomes"),
        }
    }
}

impl RetrievalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn with_download_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub retrieval: Option<RetrievalConfig>,
    #[serde(default)]
    pub organisms: Vec<OrganismEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OrganismEntry {
    Shorthand(String),
    Detailed(OrganismEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct OrganismEntryObject {
    pub organism: String,
    #[serde(default)]
    pub db: Option<String>,
    #[serde(default)]
    pub reference: Option<bool>,
    #[serde(default)]
    pub release: Option<ReleaseValue>,
}

/// Releases appear both as numbers and as strings in hand-written configs.
#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ReleaseValue {
    Number(u32),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub retrieval: RetrievalConfig,
    pub organisms: Vec<OrganismQuery>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `kira-proteome.json` when present; built-in defaults otherwise.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let organisms = config
            .organisms
            .into_iter()
            .map(|entry| match entry {
                OrganismEntry::Shorthand(value) => {
                    OrganismQuery::new(value, Database::Refseq).validated()
                }
                OrganismEntry::Detailed(obj) => {
                    let db = match obj.db {
                        Some(value) => value.parse()?,
                        None => Database::Refseq,
                    };
                    let release = obj.release.map(parse_release).transpose()?;
                    OrganismQuery::new(obj.organism, db)
                        .reference(obj.reference.unwrap_or(false))
                        .release(release)
                        .validated()
                }
            })
            .collect::<Result<Vec<_>, KiraError>>()?;

        Ok(ResolvedConfig {
            schema_version,
            retrieval: config.retrieval.unwrap_or_default(),
            organisms,
        })
    }
}

impl OrganismQuery {
    /// Malformed identifiers are rejected; ones that merely cannot match are
    /// left for the retrieval to report.
    fn validated(self) -> Result<Self, KiraError> {
        match self.organism_id() {
            Err(err) if !err.is_soft() => Err(err),
            _ => Ok(self),
        }
    }
}

fn parse_release(value: ReleaseValue) -> Result<u32, KiraError> {
    match value {
        ReleaseValue::Number(number) => Ok(number),
        ReleaseValue::Text(text) => text
            .trim()
            .parse::<u32>()
            .map_err(|_| KiraError::InvalidRelease(text)),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_config_shorthand_and_detailed() {
        let raw = r#"{
            "organisms": [
                "Homo sapiens",
                {"organism": "Arabidopsis thaliana", "db": "ensemblgenomes", "release": "57"},
                {"organism": "9606", "db": "genbank", "reference": true}
            ]
        }"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();

        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.organisms.len(), 3);
        assert_eq!(resolved.organisms[0].db, Database::Refseq);
        assert!(!resolved.organisms[0].require_reference);
        assert_eq!(resolved.organisms[1].release, Some(57));
        assert!(resolved.organisms[2].require_reference);
        assert_eq!(resolved.retrieval.ncbi_base_url, "https://ftp.ncbi.nlm.nih.gov");
    }

    #[test]
    fn unknown_db_in_config_is_rejected() {
        let raw = r#"{"organisms": [{"organism": "Homo sapiens", "db": "pdb"}]}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        let err = ConfigLoader::resolve_config(config).unwrap_err();
        assert_matches!(err, KiraError::InvalidDatabase(_));
    }

    #[test]
    fn partial_retrieval_section_keeps_defaults() {
        let raw = r#"{"retrieval": {"timeout_secs": 10}}"#;
        let config: Config = serde_json::from_str(raw).unwrap();
        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.retrieval.timeout_secs, 10);
        assert!(resolved.retrieval.prefer_https);
    }
}
