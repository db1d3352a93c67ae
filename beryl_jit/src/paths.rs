//! Temp-directory and header/PCH path resolution.
//!
//! The backend writes generated sources and the precompiled header into
//! a scratch directory resolved once at init: `$TMPDIR`, then `$TMP`,
//! then the platform default, with `/tmp` as the last resort. A
//! candidate directory is rejected unless it exists, is a directory,
//! is writable, and is either owner-only writable or sticky.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Header file shipped under the interpreter's installation prefix.
pub const HEADER_NAME: &str = "include/beryl_jit_min_header.h";
/// Environment override pointing header resolution at a build tree
/// instead of the installation prefix. In-tree test runs only.
pub const BUILD_DIR_ENV: &str = "BERYL_JIT_SEARCH_BUILD_DIR";
/// Filename prefix for the precompiled header in the temp dir.
pub const PCH_PREFIX: &str = "_beryl_h";

// =============================================================================
// Errors
// =============================================================================

/// Path resolution failures that disable the subsystem.
#[derive(Debug)]
pub enum PathError {
    /// The minimal header is missing or unreadable.
    HeaderMissing(PathBuf),
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathError::HeaderMissing(path) => {
                write!(f, "cannot access JIT header file: {}", path.display())
            }
        }
    }
}

impl std::error::Error for PathError {}

// =============================================================================
// JitPaths
// =============================================================================

/// Resolved filesystem locations the backend compiles against.
#[derive(Debug, Clone)]
pub struct JitPaths {
    /// Scratch directory for generated sources and objects.
    pub tmp_dir: PathBuf,
    /// The minimal header included by every generated source.
    pub header_file: PathBuf,
    /// Where the precompiled header is written.
    pub pch_file: PathBuf,
}

impl JitPaths {
    /// Resolve all paths. Probes the header read-only; a missing header
    /// is a hard failure (the caller disables the subsystem).
    pub fn resolve(prefix_path: &Path) -> Result<JitPaths, PathError> {
        let tmp_dir = system_tmpdir();

        let basedir = match std::env::var_os(BUILD_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => prefix_path.to_path_buf(),
        };
        let header_file = basedir.join(HEADER_NAME);
        if File::open(&header_file).is_err() {
            return Err(PathError::HeaderMissing(header_file));
        }

        let pch_file = unique_filename(&tmp_dir, 0, PCH_PREFIX, ".h.gch");
        Ok(JitPaths {
            tmp_dir,
            header_file,
            pch_file,
        })
    }
}

// =============================================================================
// Temp directory
// =============================================================================

/// Resolve the scratch directory.
pub fn system_tmpdir() -> PathBuf {
    for name in ["TMPDIR", "TMP"] {
        if let Some(dir) = std::env::var_os(name) {
            let dir = PathBuf::from(dir);
            if check_tmpdir(&dir) {
                return dir;
            }
        }
    }
    let default = std::env::temp_dir();
    if check_tmpdir(&default) {
        return default;
    }
    PathBuf::from("/tmp")
}

/// Validate a scratch-directory candidate.
#[cfg(unix)]
fn check_tmpdir(dir: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::fs::MetadataExt;

    let meta = match std::fs::metadata(dir) {
        Ok(meta) => meta,
        Err(_) => return false,
    };
    if !meta.is_dir() {
        return false;
    }
    let mode = meta.mode();
    // World-writable scratch dirs are only acceptable with the sticky
    // bit, otherwise any user could swap files out from under us.
    if mode & libc::S_IWOTH as u32 != 0 && mode & libc::S_ISVTX as u32 == 0 {
        return false;
    }
    let Ok(cpath) = CString::new(dir.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: cpath is a valid NUL-terminated path for the access(2) probe.
    unsafe { libc::access(cpath.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn check_tmpdir(dir: &Path) -> bool {
    dir.is_dir()
}

// =============================================================================
// Unique filenames
// =============================================================================

/// Build a unique file name in `dir` from a prefix, a numeric id and a
/// suffix. An id of `0` substitutes the process id, so distinct
/// interpreter processes sharing a temp dir cannot collide.
pub fn unique_filename(dir: &Path, id: u64, prefix: &str, suffix: &str) -> PathBuf {
    let id = if id == 0 {
        u64::from(std::process::id())
    } else {
        id
    };
    dir.join(format!("{prefix}{id}{suffix}"))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_filename_uses_id() {
        let name = unique_filename(Path::new("/scratch"), 42, "_beryl_u", ".c");
        assert_eq!(name, PathBuf::from("/scratch/_beryl_u42.c"));
    }

    #[test]
    fn test_unique_filename_substitutes_pid_for_zero() {
        let name = unique_filename(Path::new("/scratch"), 0, "_beryl_h", ".h.gch");
        let expected = format!("_beryl_h{}.h.gch", std::process::id());
        assert_eq!(name.file_name().unwrap().to_str().unwrap(), expected);
    }

    #[test]
    fn test_system_tmpdir_is_usable() {
        let dir = system_tmpdir();
        assert!(dir.is_dir());
    }

    #[test]
    fn test_resolve_fails_without_header() {
        let missing = std::env::temp_dir().join("beryl-no-such-prefix");
        match JitPaths::resolve(&missing) {
            Err(PathError::HeaderMissing(path)) => {
                assert!(path.ends_with(HEADER_NAME));
            }
            other => panic!("expected HeaderMissing, got {other:?}"),
        }
    }

    #[test]
    fn test_resolve_finds_header_under_prefix() {
        let prefix = std::env::temp_dir().join(format!("beryl-prefix-{}", std::process::id()));
        let header = prefix.join(HEADER_NAME);
        std::fs::create_dir_all(header.parent().unwrap()).unwrap();
        std::fs::write(&header, "/* beryl jit minimal header */\n").unwrap();

        let paths = JitPaths::resolve(&prefix).unwrap();
        assert_eq!(paths.header_file, header);
        assert!(paths.pch_file.to_str().unwrap().ends_with(".h.gch"));

        std::fs::remove_dir_all(&prefix).ok();
    }
}
