use std::fs::{self, File};
use std::io::{self, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;

use crate::error::KiraError;

/// `x.faa.gz` -> `x.faa`; paths without a `.gz` suffix are rejected.
pub fn gunzip_target(path: &Utf8Path) -> Result<Utf8PathBuf, KiraError> {
    path.as_str()
        .strip_suffix(".gz")
        .map(Utf8PathBuf::from)
        .ok_or_else(|| KiraError::Decompress {
            path: path.to_string(),
            message: "expected a .gz file".to_string(),
        })
}

/// True when `target` exists and was written no earlier than `source`.
pub fn is_up_to_date(target: &Utf8Path, source: &Utf8Path) -> bool {
    let modified =
        |path: &Utf8Path| fs::metadata(path.as_std_path()).and_then(|meta| meta.modified());
    match (modified(target), modified(source)) {
        (Ok(target), Ok(source)) => target >= source,
        _ => false,
    }
}

/// Decompresses `path` into its sibling without the `.gz` suffix, keeping the archive.
pub fn gunzip(path: &Utf8Path) -> Result<Utf8PathBuf, KiraError> {
    let target = gunzip_target(path)?;
    let decompress_err = |err: io::Error| KiraError::Decompress {
        path: path.to_string(),
        message: err.to_string(),
    };

    let parent = target
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    let input = File::open(path.as_std_path()).map_err(decompress_err)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut temp = tempfile::Builder::new()
        .prefix(".kira-proteome")
        .suffix(".part")
        .tempfile_in(parent.as_std_path())
        .map_err(KiraError::fs)?;
    io::copy(&mut decoder, temp.as_file_mut()).map_err(decompress_err)?;

    if target.as_std_path().exists() {
        fs::remove_file(target.as_std_path()).map_err(KiraError::fs)?;
    }
    temp.persist(target.as_std_path()).map_err(KiraError::fs)?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::{Duration, SystemTime};

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn gunzip_writes_sibling() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let archive = dir.join("x_protein_refseq.faa.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b">p1\nMKV\n").unwrap();
        fs::write(&archive, encoder.finish().unwrap()).unwrap();

        let out = gunzip(&archive).unwrap();
        assert_eq!(out, dir.join("x_protein_refseq.faa"));
        assert_eq!(fs::read_to_string(&out).unwrap(), ">p1\nMKV\n");
        assert!(archive.exists());
    }

    #[test]
    fn gunzip_reads_every_member() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let archive = dir.join("UP1_protein_uniprot.faa.gz");
        let mut bytes = Vec::new();
        for chunk in [&b">p1\nMKV\n"[..], &b">p2\nMAL\n"[..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(chunk).unwrap();
            bytes.extend(encoder.finish().unwrap());
        }
        fs::write(&archive, bytes).unwrap();

        let out = gunzip(&archive).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap(), ">p1\nMKV\n>p2\nMAL\n");
    }

    #[test]
    fn older_sibling_is_not_up_to_date() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let archive = dir.join("x.faa.gz");
        let plain = dir.join("x.faa");
        assert!(!is_up_to_date(&plain, &archive));

        fs::write(&plain, b"old").unwrap();
        fs::write(&archive, b"new").unwrap();
        let earlier = SystemTime::now() - Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&plain)
            .unwrap()
            .set_modified(earlier)
            .unwrap();
        assert!(!is_up_to_date(&plain, &archive));

        fs::write(&plain, b"fresh").unwrap();
        assert!(is_up_to_date(&plain, &archive));
    }

    #[test]
    fn gunzip_rejects_plain_files() {
        assert!(gunzip_target(Utf8Path::new("x.faa")).is_err());
    }

    #[test]
    fn corrupt_archive_is_a_decompress_error() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let archive = dir.join("broken.faa.gz");
        fs::write(&archive, b"not gzip").unwrap();
        assert!(matches!(gunzip(&archive), Err(KiraError::Decompress { .. })));
        assert!(!dir.join("broken.faa").exists());
    }
}
