//! Schema emission.
//!
//! Each namespace of a [`Program`] becomes one schema file. Emission is
//! split from writing: [`emit_program`] renders every file in memory, and
//! only then [`write_files`] touches the file system, so a failure while
//! rendering never leaves partial output behind.

pub mod flatbuffers;
pub mod proto;

pub use self::flatbuffers::FlatbuffersEmitter;
pub use self::proto::{
    verify_descriptor_set, write_descriptor_set, ProtoConfig, ProtoEmitter, ProtoSyntax,
};

use crate::error::{Error, Result};
use crate::ir::Program;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// File name used for the namespace without a name
pub const DEFAULT_NAMESPACE_FILE: &str = "default";

/// Renders one namespace of a program as schema source
pub trait SchemaEmitter {
    /// File extension without the dot
    fn extension(&self) -> &'static str;

    /// Renders the namespace at `index`
    fn emit_namespace(&self, program: &Program, index: usize) -> Result<String>;
}

/// A rendered schema file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    /// Path relative to the output directory
    pub path: PathBuf,
    /// File contents
    pub contents: String,
}

/// Relative output path of a namespace: lowercased, one directory per
/// dotted segment
pub fn namespace_path(full_name: &str, extension: &str) -> PathBuf {
    let lower = full_name.to_lowercase();
    let mut segments: Vec<&str> = lower.split('.').filter(|s| !s.is_empty()).collect();
    let file = segments.pop().unwrap_or(DEFAULT_NAMESPACE_FILE);

    let mut path: PathBuf = segments.iter().collect();
    path.push(format!("{}.{}", file, extension));
    path
}

/// Same as [`namespace_path`] with `/` separators, as used by schema imports
pub fn import_path(full_name: &str, extension: &str) -> String {
    let lower = full_name.to_lowercase();
    let segments: Vec<&str> = lower.split('.').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        format!("{}.{}", DEFAULT_NAMESPACE_FILE, extension)
    } else {
        format!("{}.{}", segments.join("/"), extension)
    }
}

/// Renders every namespace of the program
pub fn emit_program(program: &Program, emitter: &dyn SchemaEmitter) -> Result<Vec<EmittedFile>> {
    let mut files = Vec::with_capacity(program.namespaces.len());
    for (index, ns) in program.namespaces.iter().enumerate() {
        let path = namespace_path(&ns.full_name, emitter.extension());
        debug!("Rendering {} as {}", ns.full_name, path.display());
        files.push(EmittedFile {
            path,
            contents: emitter.emit_namespace(program, index)?,
        });
    }
    Ok(files)
}

/// Rejects absolute paths and paths leaving the directory they are joined to
fn check_relative(path: &Path) -> Result<()> {
    let contained = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained || path.as_os_str().is_empty() {
        return Err(Error::path_traversal(path));
    }
    Ok(())
}

/// Writes rendered files below `out_dir`, returning the written paths.
///
/// All paths are checked before the first write. Existing files are only
/// replaced when `force` is set.
pub fn write_files(out_dir: &Path, files: &[EmittedFile], force: bool) -> Result<Vec<PathBuf>> {
    let mut targets = Vec::with_capacity(files.len());
    for file in files {
        check_relative(&file.path)?;
        let target = out_dir.join(&file.path);
        if target.exists() && !force {
            return Err(Error::OutputExists { path: target });
        }
        targets.push(target);
    }

    for (file, target) in files.iter().zip(&targets) {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::directory_create(parent, e))?;
        }
        fs::write(target, &file.contents).map_err(|e| Error::file_write(target, e))?;
        debug!("Wrote {}", target.display());
    }

    info!("Wrote {} schema files to {}", targets.len(), out_dir.display());
    Ok(targets)
}
