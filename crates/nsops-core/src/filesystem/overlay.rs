//! FUSE overlay marks.
//!
//! The workspace overlay is assembled by an external `fuse-overlayfs`
//! helper shipped next to the lower layer. The helper is run once with the
//! layer directories and optional ID mappings; its combined output is kept
//! for the error report when it fails.

use std::path::{Component, Path, PathBuf};

use nsops_common::error::Result;

use crate::exec::{CommandLine, CommandRunner};

/// Optional UID/GID mapping strings passed through to the helper.
///
/// The content is opaque here; only presence matters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdMapping {
    /// `uidmapping=` value.
    pub uid: Option<String>,
    /// `gidmapping=` value.
    pub gid: Option<String>,
}

/// Layer directories of a FUSE overlay mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuseOverlayRequest {
    /// Read-only lower layer; also where the helper binary lives.
    pub lower: PathBuf,
    /// Writable upper layer.
    pub upper: PathBuf,
    /// Work directory.
    pub work: PathBuf,
    /// Mount point of the merged view.
    pub merged: PathBuf,
    /// Optional ID remapping.
    pub id_mapping: IdMapping,
}

impl FuseOverlayRequest {
    /// Returns a copy with every directory lexically normalised.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            lower: clean_path(&self.lower),
            upper: clean_path(&self.upper),
            work: clean_path(&self.work),
            merged: clean_path(&self.merged),
            id_mapping: self.id_mapping.clone(),
        }
    }

    /// Builds the `-o` option string.
    ///
    /// Mapping options are appended only when non-empty, `uidmapping`
    /// before `gidmapping`.
    pub fn options(&self) -> String {
        let mut opts = vec![format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower.display(),
            self.upper.display(),
            self.work.display()
        )];
        if let Some(uid) = self.id_mapping.uid.as_deref().filter(|m| !m.is_empty()) {
            opts.push(format!("uidmapping={uid}"));
        }
        if let Some(gid) = self.id_mapping.gid.as_deref().filter(|m| !m.is_empty()) {
            opts.push(format!("gidmapping={gid}"));
        }
        opts.join(",")
    }

    /// Builds the helper invocation.
    ///
    /// The helper is resolved at `<lower>/<helper_rel>` and runs with the
    /// lower directory as its working directory.
    pub fn command(&self, helper_rel: &Path) -> CommandLine {
        CommandLine::new(self.lower.join(helper_rel))
            .args(["-o".to_owned(), self.options(), "none".to_owned()])
            .arg(self.merged.display().to_string())
            .current_dir(&self.lower)
    }
}

/// Mounts a FUSE overlay by running the helper.
///
/// # Errors
///
/// Returns [`nsops_common::error::NsopsError::Command`] with the helper's
/// argument vector and combined output if it cannot be run or exits non-zero.
pub fn mount_fusefs_mark(
    runner: &dyn CommandRunner,
    helper_rel: &Path,
    request: &FuseOverlayRequest,
) -> Result<()> {
    let request = request.normalized();
    let command = request.command(helper_rel);
    let _ = runner.run_step("fuse-overlayfs", &command)?;
    tracing::info!(
        lower = %request.lower.display(),
        merged = %request.merged.display(),
        id_mapped = request.id_mapping != IdMapping::default(),
        "fuse overlay mounted"
    );
    Ok(())
}

/// Lexically normalises a path: drops `.` and duplicate separators and
/// folds `..` into its parent. Never touches the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    let _ = out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}
