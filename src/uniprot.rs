use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;

use crate::config::RetrievalConfig;
use crate::domain::OrganismId;
use crate::error::KiraError;
use crate::fetch::{default_headers, transport_error};

const SEARCH_PAGE_SIZE: usize = 25;

/// One UniProt proteome (`UPxxxxxxxxx`) as listed by `/proteomes/search`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proteome {
    pub id: String,
    pub scientific_name: String,
    pub taxon_id: Option<u64>,
    pub proteome_type: String,
    pub protein_count: Option<u64>,
    pub strain: Option<String>,
}

impl Proteome {
    pub fn is_reference_or_representative(&self) -> bool {
        self.proteome_type.contains("Reference") || self.proteome_type.contains("representative")
    }
}

pub trait UniprotClient: Send + Sync {
    fn search_proteomes(&self, id: &OrganismId) -> Result<Vec<Proteome>, KiraError>;
}

/// Compressed FASTA of every entry of a proteome.
pub fn stream_url(proteome_id: &str, config: &RetrievalConfig) -> String {
    format!(
        "{}/uniprotkb/stream?compressed=true&format=fasta&query=proteome:{proteome_id}",
        config.uniprot_rest_url.trim_end_matches('/')
    )
}

pub fn search_query(id: &OrganismId) -> String {
    match id {
        OrganismId::Taxid(taxid) => format!("organism_id:{taxid}"),
        OrganismId::Text(text) if is_proteome_id(text) => format!("upid:{text}"),
        OrganismId::Text(text) => format!("organism_name:\"{text}\""),
    }
}

fn is_proteome_id(text: &str) -> bool {
    text.strip_prefix("UP")
        .map(|digits| !digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit()))
        .unwrap_or(false)
}

/// First proteome matching the organism; with `require_reference`, only
/// reference or representative proteomes qualify.
pub fn resolve_proteome<'a>(
    candidates: &'a [Proteome],
    id: &OrganismId,
    require_reference: bool,
) -> Option<&'a Proteome> {
    candidates
        .iter()
        .filter(|proteome| match id {
            OrganismId::Taxid(taxid) => proteome.taxon_id == Some(*taxid),
            OrganismId::Text(text) => {
                proteome.id == *text || proteome.scientific_name.contains(text.as_str())
            }
        })
        .find(|proteome| !require_reference || proteome.is_reference_or_representative())
}

pub fn parse_proteome_search(raw: &Value) -> Vec<Proteome> {
    raw.get("results")
        .and_then(|v| v.as_array())
        .map(|results| results.iter().filter_map(parse_proteome).collect())
        .unwrap_or_default()
}

fn parse_proteome(item: &Value) -> Option<Proteome> {
    let id = item.get("id").and_then(|v| v.as_str())?.to_string();
    let taxonomy = item.get("taxonomy");
    Some(Proteome {
        id,
        scientific_name: taxonomy
            .and_then(|v| v.get("scientificName"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        taxon_id: taxonomy
            .and_then(|v| v.get("taxonId"))
            .and_then(|v| v.as_u64()),
        proteome_type: item
            .get("proteomeType")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        protein_count: item.get("proteinCount").and_then(|v| v.as_u64()),
        strain: item
            .get("strain")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string()),
    })
}

#[derive(Clone)]
pub struct UniprotHttpClient {
    client: Client,
    rest_url: String,
}

impl UniprotHttpClient {
    pub fn new(config: &RetrievalConfig) -> Result<Self, KiraError> {
        let client = Client::builder()
            .default_headers(default_headers()?)
            .timeout(config.timeout())
            .build()
            .map_err(|err| transport_error("uniprot", err))?;
        Ok(Self {
            client,
            rest_url: config.uniprot_rest_url.trim_end_matches('/').to_string(),
        })
    }

    fn search_url(&self) -> String {
        format!("{}/proteomes/search", self.rest_url)
    }
}

impl UniprotClient for UniprotHttpClient {
    fn search_proteomes(&self, id: &OrganismId) -> Result<Vec<Proteome>, KiraError> {
        let url = self.search_url();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("query", search_query(id)),
                ("format", "json".to_string()),
                ("size", SEARCH_PAGE_SIZE.to_string()),
            ])
            .send()
            .map_err(|err| transport_error(&url, err))?;
        if !response.status().is_success() {
            return Err(KiraError::HttpStatus {
                url,
                status: response.status().as_u16(),
            });
        }
        let raw: Value = response.json().map_err(|err| transport_error(&url, err))?;
        Ok(parse_proteome_search(&raw))
    }
}
