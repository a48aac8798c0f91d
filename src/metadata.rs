use camino::{Utf8Path, Utf8PathBuf};
use serde::{Serialize, Serializer};

use crate::domain::{Database, ResolvedTarget};
use crate::ensembl::{AssemblyInfo, EnsemblSpecies};
use crate::error::KiraError;
use crate::store::DownloadStore;
use crate::uniprot::Proteome;

const MISSING: &str = "none";

/// Ordered key/value documentation of one downloaded proteome.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    fields: Vec<(String, String)>,
}

impl MetadataRecord {
    pub fn push(&mut self, key: &str, value: impl Into<String>) {
        self.fields.push((key.to_string(), value.into()));
    }

    fn push_opt(&mut self, key: &str, value: Option<&str>) {
        self.push(key, value.unwrap_or(MISSING));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

impl Serialize for MetadataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.fields.iter().map(|(key, value)| (key, value)))
    }
}

pub fn download_date() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub fn ncbi_record(
    target: &ResolvedTarget,
    url: &str,
    db: Database,
    local_path: &str,
    file_name: &str,
    download_date: &str,
) -> MetadataRecord {
    let record = &target.record;
    let mut doc = MetadataRecord::default();
    doc.push("file_name", file_name);
    doc.push("organism", target.normalized_organism_label.as_str());
    doc.push("url", url);
    doc.push("database", db.as_str());
    doc.push("path", local_path);
    doc.push("refseq_category", record.refseq_category.as_str());
    doc.push("assembly_accession", record.assembly_accession.as_str());
    doc.push("bioproject", record.bioproject.as_str());
    doc.push("biosample", record.biosample.as_str());
    doc.push("taxid", record.taxonomy_id.to_string());
    doc.push("infraspecific_name", record.infraspecific_name.as_str());
    doc.push("version_status", record.version_status.as_str());
    doc.push("release_type", record.release_type.as_str());
    doc.push("genome_rep", record.genome_representation.as_str());
    doc.push("seq_rel_date", record.sequence_release_date.as_str());
    doc.push("submitter", record.submitter.as_str());
    doc.push("download_date", download_date);
    doc
}

pub fn ensembl_record(
    species: &EnsemblSpecies,
    info: &AssemblyInfo,
    db: Database,
    file_name: &str,
    download_date: &str,
) -> MetadataRecord {
    let mut doc = MetadataRecord::default();
    doc.push("File Name", file_name);
    doc.push("Organism Name", species.name.as_str());
    doc.push("Database", db.as_str());
    doc.push("Download_Date", download_date);
    doc.push_opt("assembly_name", info.assembly_name.as_deref());
    doc.push_opt("assembly_date", info.assembly_date.as_deref());
    doc.push_opt("assembly_accession", info.assembly_accession.as_deref());
    doc.push_opt(
        "genebuild_last_geneset_update",
        info.genebuild_last_geneset_update.as_deref(),
    );
    doc.push_opt(
        "genebuild_initial_release_date",
        info.genebuild_initial_release_date.as_deref(),
    );
    doc
}

pub fn uniprot_record(
    proteome: &Proteome,
    url: &str,
    local_path: &str,
    file_name: &str,
    download_date: &str,
) -> MetadataRecord {
    let mut doc = MetadataRecord::default();
    doc.push("file_name", file_name);
    doc.push("organism", proteome.scientific_name.as_str());
    doc.push("url", url);
    doc.push("database", Database::Uniprot.as_str());
    doc.push("path", local_path);
    doc.push("proteome_id", proteome.id.as_str());
    doc.push(
        "taxid",
        proteome
            .taxon_id
            .map(|taxid| taxid.to_string())
            .unwrap_or_else(|| MISSING.to_string()),
    );
    doc.push("proteome_type", proteome.proteome_type.as_str());
    doc.push(
        "protein_count",
        proteome
            .protein_count
            .map(|count| count.to_string())
            .unwrap_or_else(|| MISSING.to_string()),
    );
    doc.push_opt("strain", proteome.strain.as_deref());
    doc.push("download_date", download_date);
    doc
}

/// One header row and one value row, tab separated.
pub fn render_tsv(doc: &MetadataRecord) -> Result<Vec<u8>, KiraError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer
        .write_record(doc.fields.iter().map(|(key, _)| key))
        .map_err(KiraError::fs)?;
    writer
        .write_record(doc.fields.iter().map(|(_, value)| value))
        .map_err(KiraError::fs)?;
    writer.into_inner().map_err(KiraError::fs)
}

pub fn render_report(doc: &MetadataRecord) -> String {
    let mut out = String::new();
    for (key, value) in &doc.fields {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Reads back a sidecar table written by [`render_tsv`].
pub fn read_tsv(path: &Utf8Path) -> Result<MetadataRecord, KiraError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(path.as_std_path())
        .map_err(KiraError::fs)?;
    let header = reader.headers().map_err(KiraError::fs)?.clone();
    let values = reader
        .records()
        .next()
        .transpose()
        .map_err(KiraError::fs)?
        .ok_or_else(|| KiraError::Filesystem(format!("{path} has no value row")))?;
    let mut doc = MetadataRecord::default();
    for (key, value) in header.iter().zip(values.iter()) {
        doc.push(key, value);
    }
    Ok(doc)
}

fn sidecar_paths(store: &DownloadStore, label: &str, db: Database) -> Vec<Utf8PathBuf> {
    let mut paths = Vec::new();
    if matches!(db, Database::Ensembl | Database::Ensemblgenomes) {
        paths.push(store.doc_path(label, db, "txt"));
    }
    paths.push(store.doc_path(label, db, "tsv"));
    paths
}

/// Sidecars already on disk for this label, when the full set is present.
pub fn existing_sidecars(
    store: &DownloadStore,
    label: &str,
    db: Database,
) -> Option<Vec<Utf8PathBuf>> {
    let paths = sidecar_paths(store, label, db);
    paths
        .iter()
        .all(|path| DownloadStore::exists(path))
        .then_some(paths)
}

/// Writes `doc_<label>_db_<db>.tsv`, plus the `.txt` report for Ensembl databases.
pub fn write_sidecars(
    store: &DownloadStore,
    label: &str,
    db: Database,
    doc: &MetadataRecord,
) -> Result<Vec<Utf8PathBuf>, KiraError> {
    let paths = sidecar_paths(store, label, db);
    for path in &paths {
        let content = match path.extension() {
            Some("txt") => render_report(doc).into_bytes(),
            _ => render_tsv(doc)?,
        };
        DownloadStore::write_bytes_atomic(path, &content)?;
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn species() -> EnsemblSpecies {
        EnsemblSpecies {
            name: "homo_sapiens".to_string(),
            display_name: "Human".to_string(),
            taxon_id: Some(9606),
            accession: None,
            assembly: "GRCh38".to_string(),
            division: "EnsemblVertebrates".to_string(),
        }
    }

    #[test]
    fn missing_assembly_fields_render_as_none() {
        let info = AssemblyInfo {
            assembly_name: Some("GRCh38.p14".to_string()),
            ..AssemblyInfo::default()
        };
        let doc = ensembl_record(
            &species(),
            &info,
            Database::Ensembl,
            "Homo_sapiens.GRCh38.pep.all.fa.gz",
            "2024-01-01T00:00:00+00:00",
        );
        let report = render_report(&doc);
        assert!(report.starts_with("File Name: Homo_sapiens.GRCh38.pep.all.fa.gz\n"));
        assert!(report.contains("assembly_name: GRCh38.p14\n"));
        assert!(report.contains("genebuild_initial_release_date: none\n"));
    }

    #[test]
    fn tsv_has_header_and_values() {
        let mut doc = MetadataRecord::default();
        doc.push("file_name", "x.faa.gz");
        doc.push("taxid", "9606");
        let text = String::from_utf8(render_tsv(&doc).unwrap()).unwrap();
        assert_eq!(text, "file_name\ttaxid\nx.faa.gz\t9606\n");
    }

    #[test]
    fn ensembl_gets_report_and_table() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = DownloadStore::new(dir.clone());
        let doc = ensembl_record(
            &species(),
            &AssemblyInfo::default(),
            Database::Ensembl,
            "f",
            "d",
        );
        let written = write_sidecars(&store, "Homo_sapiens", Database::Ensembl, &doc).unwrap();
        assert_eq!(
            written,
            vec![
                dir.join("doc_Homo_sapiens_db_ensembl.txt"),
                dir.join("doc_Homo_sapiens_db_ensembl.tsv"),
            ]
        );
    }

    #[test]
    fn table_reads_back_in_order() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let store = DownloadStore::new(dir.clone());
        let mut doc = MetadataRecord::default();
        doc.push("file_name", "9606_protein_refseq.faa.gz");
        doc.push("organism", "Homo sapiens (human)");
        doc.push("download_date", "2024-01-01T00:00:00+00:00");

        assert!(existing_sidecars(&store, "9606", Database::Refseq).is_none());
        write_sidecars(&store, "9606", Database::Refseq, &doc).unwrap();

        let paths = existing_sidecars(&store, "9606", Database::Refseq).unwrap();
        assert_eq!(paths, vec![dir.join("doc_9606_db_refseq.tsv")]);
        assert_eq!(read_tsv(&paths[0]).unwrap(), doc);
    }

    #[test]
    fn serializes_as_ordered_map() {
        let mut doc = MetadataRecord::default();
        doc.push("b", "1");
        doc.push("a", "2");
        assert_eq!(serde_json::to_string(&doc).unwrap(), r#"{"b":"1","a":"2"}"#);
    }
}
