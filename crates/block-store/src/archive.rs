//! Zip extraction with a path-traversal guard

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::{Component, Path, PathBuf};
use zip::{write::SimpleFileOptions, ZipArchive, ZipWriter};

/// Extract an in-memory archive into `dest`
///
/// Every entry name is checked before anything is written: names that are
/// absolute or climb out of `dest` abort the whole extraction.
pub fn extract(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive.by_index(i)?;
        let relative = enclosed_path(file.name()).ok_or_else(|| Error::Security {
            path: file.name().to_string(),
        })?;
        entries.push((relative, file.is_dir()));
    }

    for (i, (relative, is_dir)) in entries.iter().enumerate() {
        let path = dest.join(relative);
        if *is_dir {
            std::fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&path)?;
        let mut file = archive.by_index(i)?;
        std::io::copy(&mut file, &mut out)?;
    }

    Ok(entries.len())
}

fn enclosed_path(name: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if out.as_os_str().is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Pack named files into a zip archive, in the layout the authority serves
pub fn write_archive(files: &[(&str, &[u8])]) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    write_entries(&mut buf, files)?;
    Ok(buf.into_inner())
}

fn write_entries<W: Write + Seek>(writer: W, files: &[(&str, &[u8])]) -> Result<()> {
    let mut zip = ZipWriter::new(writer);
    for (name, contents) in files {
        zip.start_file(*name, SimpleFileOptions::default())?;
        zip.write_all(contents)?;
    }
    zip.finish()?;
    Ok(())
}
