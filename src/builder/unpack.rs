//! Source archive extraction

use flate2::read::GzDecoder;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

/// Unpack a gzipped tarball into `dest`, dropping the single top-level
/// directory repository archives are wrapped in.
///
/// Only regular files and directories are written; links and pax headers are
/// skipped. Any entry path that is absolute or climbs with `..` fails the
/// whole unpack. Returns the number of files written.
pub fn unpack_tar_gz(archive: &[u8], dest: &Path) -> io::Result<usize> {
    let mut archive = Archive::new(GzDecoder::new(archive));
    let mut files = 0;

    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if !kind.is_file() && !kind.is_dir() {
            continue;
        }

        let path = entry.path()?.into_owned();
        let Some(stripped) = strip_top_level(&path)? else {
            continue;
        };

        let target = dest.join(&stripped);
        if kind.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        entry.unpack(&target)?;
        files += 1;
    }

    Ok(files)
}

/// Path below the top-level directory, `None` for the top level itself
fn strip_top_level(path: &Path) -> io::Result<Option<PathBuf>> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unsafe path in archive: {}", path.display()),
                ))
            }
        }
    }

    let stripped: PathBuf = parts.into_iter().skip(1).collect();
    Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
}

/// Gzipped tarball holding `files` as `(path, contents)`
#[cfg(test)]
pub(crate) fn gzip_tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::TempDir;

    #[test]
    fn strips_top_level_directory() {
        let dest = TempDir::new().unwrap();
        let archive = gzip_tarball(&[
            ("tj-triage-abc123/go.mod", b"module github.com/tj/triage\n"),
            ("tj-triage-abc123/cmd/triage/main.go", b"package main\n"),
        ]);

        let files = unpack_tar_gz(&archive, dest.path()).unwrap();

        assert_eq!(files, 2);
        assert_eq!(
            std::fs::read_to_string(dest.path().join("go.mod")).unwrap(),
            "module github.com/tj/triage\n"
        );
        assert!(dest.path().join("cmd/triage/main.go").is_file());
        assert!(!dest.path().join("tj-triage-abc123").exists());
    }

    #[test]
    fn rejects_parent_traversal() {
        let root = TempDir::new().unwrap();
        let dest = root.path().join("src");
        std::fs::create_dir(&dest).unwrap();

        // append_data refuses `..`, so write the name field directly
        let mut header = tar::Header::new_old();
        let name = b"repo/../../escaped";
        header.as_old_mut().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        builder.append(&header, &b"evil"[..]).unwrap();
        let archive = builder.into_inner().unwrap().finish().unwrap();

        let err = unpack_tar_gz(&archive, &dest).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(!root.path().join("escaped").exists());
    }

    #[test]
    fn corrupt_archive_fails() {
        let dest = TempDir::new().unwrap();
        assert!(unpack_tar_gz(b"not a tarball", dest.path()).is_err());
    }
}
