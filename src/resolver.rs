use tracing::warn;

use crate::domain::{
    AssemblyRecord, OrganismId, OrganismQuery, ResolvedTarget, VersionStatus, local_file_stem,
    normalize_label, strip_parentheses,
};
use crate::error::KiraError;

type Predicate<'a> = Box<dyn Fn(&AssemblyRecord) -> bool + 'a>;

/// Identifier match: taxonomy id equality, or a case-sensitive substring of the
/// organism name, or an exact accession. Parentheses are ignored on both sides.
pub fn identifier_predicate(id: &OrganismId) -> Predicate<'_> {
    match id {
        OrganismId::Taxid(taxid) => {
            Box::new(move |record: &AssemblyRecord| record.taxonomy_id == *taxid)
        }
        OrganismId::Text(token) => Box::new(move |record: &AssemblyRecord| {
            record.assembly_accession == *token
                || strip_parentheses(&record.organism_name).contains(token.as_str())
        }),
    }
}

pub fn is_latest_with_path(record: &AssemblyRecord) -> bool {
    record.version_status == VersionStatus::Latest && record.remote_base_path.is_some()
}

pub fn is_reference(record: &AssemblyRecord) -> bool {
    record.refseq_category.is_reference_or_representative()
}

fn compose<'a>(predicates: Vec<Predicate<'a>>) -> Predicate<'a> {
    Box::new(move |record: &AssemblyRecord| {
        predicates.iter().all(|predicate| predicate(record))
    })
}

/// Picks the single record a query refers to: first match in index order.
pub fn resolve(
    index: &[AssemblyRecord],
    query: &OrganismQuery,
) -> Result<ResolvedTarget, KiraError> {
    let id = query.organism_id()?;

    let mut predicates: Vec<Predicate<'_>> =
        vec![identifier_predicate(&id), Box::new(is_latest_with_path)];
    if query.require_reference {
        predicates.push(Box::new(is_reference));
    }
    let matches = compose(predicates);

    let mut found = index.iter().filter(|record| matches(*record));
    let Some(first) = found.next() else {
        return Err(not_found(&id, query.require_reference));
    };
    let candidates = 1 + found.count();
    if candidates > 1 {
        warn!(
            organism = %id,
            candidates,
            selected = %first.organism_name,
            accession = %first.assembly_accession,
            "more than one entry found; only the first one will be retrieved"
        );
    }

    let label = normalize_label(&id.to_string());
    Ok(ResolvedTarget {
        record: first.clone(),
        local_file_stem: local_file_stem(&label, query.db),
        normalized_organism_label: label,
        candidates,
    })
}

/// True when any assembly of the organism is listed, regardless of status or category.
pub fn is_genome_available(index: &[AssemblyRecord], id: &OrganismId) -> bool {
    let matches = identifier_predicate(id);
    index.iter().any(|record| matches(record))
}

fn not_found(id: &OrganismId, require_reference: bool) -> KiraError {
    let kind = if require_reference {
        "reference or representative proteome"
    } else {
        "proteome"
    };
    KiraError::OrganismNotFound {
        organism: id.to_string(),
        message: format!(
            "no {kind} was found for '{id}', so its download has been omitted"
        ),
    }
}
