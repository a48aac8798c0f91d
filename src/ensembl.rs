use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RetrievalConfig;
use crate::domain::{Database, OrganismId};
use crate::error::KiraError;
use crate::fetch::{default_headers, transport_error};

/// One entry of the Ensembl species catalogue (`/info/species`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsemblSpecies {
    /// Lower-case production name, e.g. `homo_sapiens`.
    pub name: String,
    pub display_name: String,
    pub taxon_id: Option<u64>,
    pub accession: Option<String>,
    pub assembly: String,
    pub division: String,
}

impl EnsemblSpecies {
    /// `homo_sapiens` -> `Homo_sapiens`, the spelling used in file names and REST paths.
    pub fn capitalized_name(&self) -> String {
        let mut chars = self.name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn archive_file_name(&self) -> String {
        format!(
            "{}.{}.pep.all.fa.gz",
            self.capitalized_name(),
            self.assembly.replace(' ', "_")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AssemblyInfo {
    pub assembly_name: Option<String>,
    pub assembly_date: Option<String>,
    pub assembly_accession: Option<String>,
    pub genebuild_last_geneset_update: Option<String>,
    pub genebuild_initial_release_date: Option<String>,
}

pub trait EnsemblClient: Send + Sync {
    fn species(&self, db: Database) -> Result<Vec<EnsemblSpecies>, KiraError>;
    /// Anything but a 200 from `/info/assembly` is `MetadataUnavailable`.
    fn assembly_info(
        &self,
        db: Database,
        species: &EnsemblSpecies,
    ) -> Result<AssemblyInfo, KiraError>;
}

pub fn rest_url(db: Database, config: &RetrievalConfig) -> &str {
    match db {
        Database::Ensemblgenomes => config.ensemblgenomes_rest_url.trim_end_matches('/'),
        _ => config.ensembl_rest_url.trim_end_matches('/'),
    }
}

pub fn assembly_info_url(
    db: Database,
    species: &EnsemblSpecies,
    config: &RetrievalConfig,
) -> String {
    format!(
        "{}/info/assembly/{}?content-type=application/json",
        rest_url(db, config),
        species.capitalized_name()
    )
}

/// Remote peptide archive (`pep`, `all`) of a species for a release, or the current one.
pub fn archive_url(
    species: &EnsemblSpecies,
    db: Database,
    release: Option<u32>,
    config: &RetrievalConfig,
) -> String {
    let file = species.archive_file_name();
    match db {
        Database::Ensemblgenomes => {
            let base = config.ensemblgenomes_ftp_url.trim_end_matches('/');
            let division = division_dir(&species.division);
            let release_dir = match release {
                Some(release) => format!("release-{release}"),
                None => "current".to_string(),
            };
            format!(
                "{base}/{division}/{release_dir}/fasta/{}/pep/{file}",
                species.name
            )
        }
        _ => {
            let base = config.ensembl_ftp_url.trim_end_matches('/');
            let release_dir = match release {
                Some(release) => format!("release-{release}/fasta"),
                None => "current_fasta".to_string(),
            };
            format!("{base}/{release_dir}/{}/pep/{file}", species.name)
        }
    }
}

/// `EnsemblPlants` -> `plants`.
fn division_dir(division: &str) -> String {
    division
        .strip_prefix("Ensembl")
        .unwrap_or(division)
        .to_lowercase()
}

/// First catalogue entry matching the organism, in catalogue order.
pub fn resolve_species<'a>(
    catalogue: &'a [EnsemblSpecies],
    id: &OrganismId,
) -> Option<&'a EnsemblSpecies> {
    match id {
        OrganismId::Taxid(taxid) => catalogue
            .iter()
            .find(|species| species.taxon_id == Some(*taxid)),
        OrganismId::Text(text) => {
            let production_name = text.trim().to_lowercase().replace(' ', "_");
            catalogue.iter().find(|species| {
                species.name == production_name
                    || species.display_name == *text
                    || species.accession.as_deref() == Some(text.as_str())
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct SpeciesResponse {
    #[serde(default)]
    species: Vec<RawSpecies>,
}

#[derive(Debug, Deserialize)]
struct RawSpecies {
    name: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    taxon_id: Value,
    #[serde(default)]
    accession: Option<String>,
    #[serde(default)]
    assembly: Option<String>,
    #[serde(default)]
    division: Option<String>,
}

impl From<RawSpecies> for EnsemblSpecies {
    fn from(raw: RawSpecies) -> Self {
        let taxon_id = match &raw.taxon_id {
            Value::Number(number) => number.as_u64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        };
        Self {
            display_name: raw.display_name.unwrap_or_else(|| raw.name.clone()),
            name: raw.name,
            taxon_id,
            accession: raw.accession,
            assembly: raw.assembly.unwrap_or_default(),
            division: raw.division.unwrap_or_default(),
        }
    }
}

pub fn parse_species_catalogue(raw: &Value) -> Result<Vec<EnsemblSpecies>, KiraError> {
    let response: SpeciesResponse = serde_json::from_value(raw.clone())
        .map_err(|err| KiraError::IndexParse(format!("species catalogue: {err}")))?;
    Ok(response.species.into_iter().map(EnsemblSpecies::from).collect())
}

#[derive(Clone)]
pub struct EnsemblHttpClient {
    client: Client,
    config: RetrievalConfig,
}

impl EnsemblHttpClient {
    pub fn new(config: &RetrievalConfig) -> Result<Self, KiraError> {
        let client = Client::builder()
            .default_headers(default_headers()?)
            .timeout(config.timeout())
            .build()
            .map_err(|err| transport_error("ensembl", err))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn get_json(&self, url: &str) -> Result<Value, KiraError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| transport_error(url, err))?;
        if !response.status().is_success() {
            return Err(KiraError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }
        response.json().map_err(|err| transport_error(url, err))
    }

    fn divisions(&self, db: Database) -> Vec<String> {
        match db {
            Database::Ensemblgenomes => self.config.ensemblgenomes_divisions.clone(),
            _ => vec!["EnsemblVertebrates".to_string()],
        }
    }
}

impl EnsemblClient for EnsemblHttpClient {
    fn species(&self, db: Database) -> Result<Vec<EnsemblSpecies>, KiraError> {
        let mut catalogue = Vec::new();
        for division in self.divisions(db) {
            let url = format!(
                "{}/info/species?content-type=application/json&division={division}",
                rest_url(db, &self.config)
            );
            let raw = self.get_json(&url)?;
            catalogue.extend(parse_species_catalogue(&raw)?);
        }
        Ok(catalogue)
    }

    fn assembly_info(
        &self,
        db: Database,
        species: &EnsemblSpecies,
    ) -> Result<AssemblyInfo, KiraError> {
        let url = assembly_info_url(db, species, &self.config);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|err| transport_error(&url, err))?;
        let status = response.status().as_u16();
        if status != 200 {
            return Err(KiraError::MetadataUnavailable { url, status });
        }
        let raw: Value = response.json().map_err(|err| transport_error(&url, err))?;
        Ok(parse_assembly_info(&raw))
    }
}

/// Picks the documented keys; anything else in the response is ignored.
pub fn parse_assembly_info(raw: &Value) -> AssemblyInfo {
    let field = |key: &str| {
        raw.get(key).and_then(|value| match value {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
    };
    AssemblyInfo {
        assembly_name: field("assembly_name"),
        assembly_date: field("assembly_date"),
        assembly_accession: field("assembly_accession"),
        genebuild_last_geneset_update: field("genebuild_last_geneset_update"),
        genebuild_initial_release_date: field("genebuild_initial_release_date"),
    }
}
