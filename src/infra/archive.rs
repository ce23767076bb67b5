//! Tar plumbing for the engine: build contexts going in, copied artifacts coming out.

use crate::domain::ShellScript;
use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::{debug, warn};

/// Ensures pip exists before the injected script runs
const PIP_BOOTSTRAP: &str = "RUN python -m ensurepip --upgrade";

/// Packs a Dockerfile and its context files into an in-memory tar.
///
/// Returns the archive bytes and the Dockerfile name inside the archive.
/// When `injected` is set, the script is appended to the Dockerfile as an
/// extra `RUN` layer so its output is baked into the image.
pub fn build_context(
    dockerfile: &Path,
    context_files: &[PathBuf],
    injected: Option<&ShellScript>,
) -> Result<(Vec<u8>, String)> {
    let dockerfile_name = dockerfile
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Dockerfile path {:?} has no file name", dockerfile))?;

    let mut content = fs::read_to_string(dockerfile)
        .with_context(|| format!("reading Dockerfile {:?}", dockerfile))?;

    if let Some(script) = injected {
        if !content.is_empty() && !content.ends_with('\n') {
            content.push('\n');
        }
        content.push_str(PIP_BOOTSTRAP);
        content.push('\n');
        content.push_str(&format!("RUN {}\n", script.render()));
    }

    let mut builder = Builder::new(Vec::new());

    for file in context_files {
        let name = archive_name(file)?;
        if name == Path::new(&dockerfile_name) {
            bail!("Context file {:?} clashes with the Dockerfile name", file);
        }
        debug!("Adding {:?} to build context", file);
        builder
            .append_path_with_name(file, &name)
            .with_context(|| format!("adding {:?} to build context", file))?;
    }

    let mut header = Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, &dockerfile_name, content.as_bytes())
        .context("adding Dockerfile to build context")?;

    let bytes = builder.into_inner().context("finishing build context")?;
    Ok((bytes, dockerfile_name))
}

fn archive_name(file: &Path) -> Result<PathBuf> {
    let mut name = PathBuf::new();
    for component in file.components() {
        match component {
            Component::Normal(part) => name.push(part),
            Component::CurDir => {}
            _ => bail!(
                "Context file {:?} must be a relative path inside the build directory",
                file
            ),
        }
    }

    if name.as_os_str().is_empty() {
        bail!("Context file path is empty");
    }

    Ok(name)
}

/// Unpacks a tar stream produced by the engine's copy call into `dest`.
///
/// Only regular files and directories are written. Entries that would land
/// outside `dest` are skipped. Returns the files written, in archive order.
pub fn unpack(data: &[u8], dest: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dest).with_context(|| format!("creating {:?}", dest))?;

    let mut archive = Archive::new(data);
    archive.set_preserve_permissions(false);
    archive.set_overwrite(true);

    let mut written = Vec::new();

    for entry in archive.entries().context("reading copied archive")? {
        let mut entry = entry.context("reading archive entry")?;
        let path = entry.path().context("decoding entry path")?.into_owned();
        let entry_type = entry.header().entry_type();

        match entry_type {
            EntryType::Regular | EntryType::Continuous | EntryType::Directory => {}
            other => {
                debug!("Skipping {:?} ({:?})", path, other);
                continue;
            }
        }

        let unpacked = entry
            .unpack_in(dest)
            .with_context(|| format!("extracting {:?}", path))?;

        if !unpacked {
            warn!("Skipping {:?}: path escapes {:?}", path, dest);
            continue;
        }

        if entry_type != EntryType::Directory {
            written.push(dest.join(&path));
        }
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Separator;
    use std::io::Read;

    fn read_entries(bytes: &[u8]) -> Vec<(String, String)> {
        let mut archive = Archive::new(bytes);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let mut e = e.unwrap();
                let name = e.path().unwrap().to_string_lossy().into_owned();
                let mut body = String::new();
                e.read_to_string(&mut body).unwrap();
                (name, body)
            })
            .collect()
    }

    #[test]
    fn build_context_injects_script() {
        let dir = tempfile::tempdir().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM python:3.10").unwrap();

        let script = ShellScript::new(["pip3 freeze > r.txt", "echo done"], Separator::Sequence)
            .unwrap();
        let (bytes, name) = build_context(&dockerfile, &[], Some(&script)).unwrap();

        assert_eq!(name, "Dockerfile");
        let entries = read_entries(&bytes);
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].1,
            "FROM python:3.10\nRUN python -m ensurepip --upgrade\nRUN pip3 freeze > r.txt; echo done\n"
        );
    }

    #[test]
    fn build_context_keeps_dockerfile_untouched_without_script() {
        let dir = tempfile::tempdir().unwrap();
        let dockerfile = dir.path().join("app.dockerfile");
        fs::write(&dockerfile, "FROM alpine\n").unwrap();

        let (bytes, name) = build_context(&dockerfile, &[], None).unwrap();

        assert_eq!(name, "app.dockerfile");
        assert_eq!(read_entries(&bytes)[0].1, "FROM alpine\n");
    }

    #[test]
    fn build_context_rejects_escaping_files() {
        let dir = tempfile::tempdir().unwrap();
        let dockerfile = dir.path().join("Dockerfile");
        fs::write(&dockerfile, "FROM alpine\n").unwrap();

        let result = build_context(&dockerfile, &[PathBuf::from("../secret")], None);
        assert!(result.is_err());

        let result = build_context(&dockerfile, &[PathBuf::from("/etc/passwd")], None);
        assert!(result.is_err());
    }

    #[test]
    fn archive_names_drop_current_dir() {
        assert_eq!(
            archive_name(Path::new("./src/main.py")).unwrap(),
            PathBuf::from("src/main.py")
        );
        assert!(archive_name(Path::new(".")).is_err());
    }

    fn tar_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = Builder::new(Vec::new());
        for (name, body) in entries {
            let mut header = Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *body).unwrap();
        }
        builder.into_inner().unwrap()
    }

    #[test]
    fn unpack_writes_files_under_dest() {
        let dir = tempfile::tempdir().unwrap();
        let data = tar_of(&[("tmp/sbom.json", b"{\"bom\":1}"), ("tmp/cve.json", b"[]")]);

        let written = unpack(&data, dir.path()).unwrap();

        assert_eq!(
            written,
            vec![dir.path().join("tmp/sbom.json"), dir.path().join("tmp/cve.json")]
        );
        assert_eq!(
            fs::read_to_string(dir.path().join("tmp/sbom.json")).unwrap(),
            "{\"bom\":1}"
        );
    }

    #[test]
    fn unpack_skips_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mode(0o777);
        builder
            .append_link(&mut header, "tmp/link", "/etc/passwd")
            .unwrap();
        let data = builder.into_inner().unwrap();

        let written = unpack(&data, dir.path()).unwrap();

        assert!(written.is_empty());
        assert!(fs::symlink_metadata(dir.path().join("tmp/link")).is_err());
    }

    #[test]
    fn unpack_skips_path_traversal() {
        let outer = tempfile::tempdir().unwrap();
        let dest = outer.path().join("dest");

        let mut header = Header::new_gnu();
        let name = b"../evil.txt";
        header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name);
        header.set_size(4);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        header.set_cksum();
        let mut builder = Builder::new(Vec::new());
        builder.append(&header, &b"evil"[..]).unwrap();
        let data = builder.into_inner().unwrap();

        let written = unpack(&data, &dest).unwrap();

        assert!(written.is_empty());
        assert!(!outer.path().join("evil.txt").exists());
    }

    #[test]
    fn unpack_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = vec![0x42u8; 1024];
        assert!(unpack(&garbage, dir.path()).is_err());
    }
}
