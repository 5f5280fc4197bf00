//! Exclusive per-entity run lease.
//!
//! A lease is a file `<dir>/<entity>.lease` created with `create_new`, so
//! two runs sharing the lease directory cannot target the same entity at
//! once. The file is removed when the lease is dropped. A crashed run
//! leaves its file behind; the holder line tells the operator whose it is.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{ReinitError, Result};

/// Held for the duration of a run; dropping it releases the entity.
#[derive(Debug)]
pub struct RunLease {
    path: PathBuf,
}

impl RunLease {
    /// Takes the lease for `entity`, or fails with [`ReinitError::LeaseHeld`].
    pub fn acquire(dir: &Path, entity: &str) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.lease", sanitize(entity)));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                writeln!(file, "pid={} started={}", std::process::id(), Utc::now().to_rfc3339())?;
                info!(entity, path = %path.display(), "run lease acquired");
                Ok(Self { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(&path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_else(|_| "unknown holder".to_string());
                Err(ReinitError::LeaseHeld {
                    entity: entity.to_string(),
                    holder,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the lease file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release run lease");
        }
    }
}

fn sanitize(entity: &str) -> String {
    entity
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
