//! Collision-safe output directory.

use anyhow::{Context, Result, bail};
use getrandom::fill;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Random stem length in bytes (hex-encoded to twice as many chars).
const TOKEN_LEN: usize = 8;
const MAX_RANDOM_ATTEMPTS: usize = 32;
const MAX_SUFFIX: usize = 100_000;

/// How to pick the stem of an output file name.
#[derive(Debug, Clone)]
pub enum Naming {
    /// `<base>`, then `<base>-1`, `<base>-2`, ... until one is free.
    Sequential(String),
    /// A fresh random token per attempt.
    Random,
}

/// Directory that descriptors and keystores are written into.
///
/// Files are only ever created with exclusive-create, so an existing file is
/// never overwritten, including by a concurrent writer racing for the same
/// name.
#[derive(Clone, Debug)]
pub struct OutputDir {
    path: PathBuf,
}

impl OutputDir {
    /// Creates the directory and its parents if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create output directory {}", path.display()))?;
        Ok(Self { path })
    }

    /// Returns the directory path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reserves `<stem>.<ext>` for every extension under one stem.
    ///
    /// A stem is taken only if none of its files exist; if any is already
    /// present the partial reservation is undone and the next candidate is
    /// probed.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failures other than "already exists", or when
    /// no free stem is found.
    pub fn claim(&self, naming: &Naming, extensions: &[&str]) -> Result<Claim> {
        let attempts = match naming {
            Naming::Sequential(_) => MAX_SUFFIX,
            Naming::Random => MAX_RANDOM_ATTEMPTS,
        };

        for attempt in 0..attempts {
            let stem = match naming {
                Naming::Sequential(base) if attempt == 0 => base.clone(),
                Naming::Sequential(base) => format!("{base}-{attempt}"),
                Naming::Random => random_token()?,
            };

            if let Some(claim) = self.try_claim(&stem, extensions)? {
                return Ok(claim);
            }
            debug!(stem = %stem, "output name taken, probing next");
        }

        bail!("no free output name after {attempts} attempts")
    }

    fn try_claim(&self, stem: &str, extensions: &[&str]) -> Result<Option<Claim>> {
        let mut claim = Claim {
            stem: stem.to_owned(),
            files: Vec::with_capacity(extensions.len()),
            dir: self.path.clone(),
            committed: false,
        };

        for ext in extensions {
            let path = self.path.join(format!("{stem}.{ext}"));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => claim.files.push((path, file)),
                // dropping the partial claim removes what was created so far
                Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(None),
                Err(e) => {
                    return Err(e).with_context(|| format!("failed to create {}", path.display()));
                }
            }
        }

        Ok(Some(claim))
    }
}

/// Files reserved by [`OutputDir::claim`], empty until committed.
///
/// Dropping an uncommitted claim deletes the reserved files.
pub struct Claim {
    stem: String,
    files: Vec<(PathBuf, File)>,
    dir: PathBuf,
    committed: bool,
}

impl Claim {
    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Paths in the order the extensions were given.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.iter().map(|(p, _)| p.clone()).collect()
    }

    /// Writes `contents[i]` into the i-th reserved file and syncs everything
    /// to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of contents does not match or a write
    /// fails; the reserved files are removed in that case.
    pub fn commit(mut self, contents: &[&[u8]]) -> Result<Vec<PathBuf>> {
        if contents.len() != self.files.len() {
            bail!(
                "expected {} file contents, got {}",
                self.files.len(),
                contents.len()
            );
        }

        for ((path, file), data) in self.files.iter_mut().zip(contents) {
            file.write_all(data)
                .and_then(|_| file.sync_all())
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        File::open(&self.dir)
            .and_then(|dir| dir.sync_all())
            .with_context(|| format!("failed to sync {}", self.dir.display()))?;

        self.committed = true;
        Ok(self.paths())
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for (path, _) in &self.files {
            let _ = fs::remove_file(path);
        }
    }
}

/// 64 bits of OS randomness as lowercase hex.
fn random_token() -> Result<String> {
    let mut buf = [0u8; TOKEN_LEN];
    fill(&mut buf).context("OS random generator unavailable")?;
    Ok(hex::encode(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn names(dir: &Path) -> HashSet<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    // --------------------------------------------------
    // CREATE
    // --------------------------------------------------

    #[test]
    fn nested_directory_is_created() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b").join("keys");

        let out = OutputDir::create(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(out.path(), nested);
    }

    // --------------------------------------------------
    // SEQUENTIAL NAMING
    // --------------------------------------------------

    #[test]
    fn sequential_claim_uses_base_name_first() {
        let dir = tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();

        let claim = out
            .claim(&Naming::Sequential("abcdef0".into()), &["yaml"])
            .unwrap();
        assert_eq!(claim.stem(), "abcdef0");

        let paths = claim.commit(&[&b"first"[..]]).unwrap();
        assert_eq!(paths, vec![dir.path().join("abcdef0.yaml")]);
    }

    #[test]
    fn collision_lands_on_smallest_free_suffix() {
        let dir = tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        fs::write(dir.path().join("abc.yaml"), "existing").unwrap();
        fs::write(dir.path().join("abc-2.yaml"), "existing").unwrap();

        let naming = Naming::Sequential("abc".into());
        out.claim(&naming, &["yaml"]).unwrap().commit(&[&b"one"[..]]).unwrap();
        out.claim(&naming, &["yaml"]).unwrap().commit(&[&b"two"[..]]).unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("abc.yaml")).unwrap(), "existing");
        assert_eq!(fs::read_to_string(dir.path().join("abc-1.yaml")).unwrap(), "one");
        assert_eq!(fs::read_to_string(dir.path().join("abc-2.yaml")).unwrap(), "existing");
        assert_eq!(fs::read_to_string(dir.path().join("abc-3.yaml")).unwrap(), "two");
    }

    // --------------------------------------------------
    // RANDOM NAMING
    // --------------------------------------------------

    #[test]
    fn random_claim_reserves_all_extensions_under_one_stem() {
        let dir = tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();

        let claim = out.claim(&Naming::Random, &["json", "password", "yaml"]).unwrap();
        let stem = claim.stem().to_owned();
        assert_eq!(stem.len(), TOKEN_LEN * 2);

        claim.commit(&[&b"{}"[..], &b"pw"[..], &b"type: x"[..]]).unwrap();
        assert_eq!(
            names(dir.path()),
            HashSet::from([
                format!("{stem}.json"),
                format!("{stem}.password"),
                format!("{stem}.yaml"),
            ])
        );
    }

    #[test]
    fn random_tokens_are_unique() {
        let a = random_token().unwrap();
        let b = random_token().unwrap();
        assert_ne!(a, b);
    }

    // --------------------------------------------------
    // ROLLBACK
    // --------------------------------------------------

    #[test]
    fn partial_collision_rolls_back_and_reprobes() {
        let dir = tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();
        fs::write(dir.path().join("k.yaml"), "existing").unwrap();

        let claim = out
            .claim(&Naming::Sequential("k".into()), &["json", "yaml"])
            .unwrap();
        assert_eq!(claim.stem(), "k-1");
        assert!(!dir.path().join("k.json").exists());
    }

    #[test]
    fn dropped_claim_removes_reserved_files() {
        let dir = tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();

        let claim = out.claim(&Naming::Random, &["json", "yaml"]).unwrap();
        assert_eq!(names(dir.path()).len(), 2);
        drop(claim);
        assert!(names(dir.path()).is_empty());
    }

    #[test]
    fn commit_with_wrong_content_count_fails_and_cleans_up() {
        let dir = tempdir().unwrap();
        let out = OutputDir::create(dir.path()).unwrap();

        let claim = out.claim(&Naming::Random, &["json", "yaml"]).unwrap();
        assert!(claim.commit(&[&b"only one"[..]]).is_err());
        assert!(names(dir.path()).is_empty());
    }

    // --------------------------------------------------
    // CONCURRENCY
    // --------------------------------------------------

    #[test]
    fn concurrent_writers_never_share_a_name() {
        let dir = tempdir().unwrap();
        let out = Arc::new(OutputDir::create(dir.path()).unwrap());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let out = Arc::clone(&out);
                std::thread::spawn(move || {
                    let body = format!("writer {i}");
                    out.claim(&Naming::Sequential("same".into()), &["yaml"])
                        .unwrap()
                        .commit(&[body.as_bytes()])
                        .unwrap()
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let found = names(dir.path());
        assert_eq!(found.len(), 16);
        assert!(found.contains("same.yaml"));
        for n in 1..16 {
            assert!(found.contains(&format!("same-{n}.yaml")));
        }

        let bodies: HashSet<_> = found
            .iter()
            .map(|n| fs::read_to_string(dir.path().join(n)).unwrap())
            .collect();
        assert_eq!(bodies.len(), 16);
    }
}
