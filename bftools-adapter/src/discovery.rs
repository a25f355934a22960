//! Locates the Bio-Formats and ImageMagick binaries on the host system.

use crate::error::ToolError;
use crate::types::{ToolKind, ToolPathOverrides, ToolPaths};
use std::path::PathBuf;
use which::which;

/// Locates the executable for `kind`.
///
/// Resolution order:
/// 1. `explicit_path` if provided and the file exists.
/// 2. The path in the tool's environment variable (see [`ToolKind::env_var`]).
/// 3. The binary name resolved via `$PATH`.
/// 4. Common install location fallbacks (platform-specific).
/// 5. Helpful error with install instructions.
///
/// # Errors
///
/// Returns `ToolError::ExecutableNotFound` when no valid executable can be
/// located.
pub fn discover_tool(kind: ToolKind, explicit_path: Option<PathBuf>) -> Result<PathBuf, ToolError> {
    // 1. Explicit path
    if let Some(path) = explicit_path {
        if path.exists() {
            return Ok(path);
        }
        return Err(ToolError::ExecutableNotFound {
            tool: kind,
            message: format!("Explicit path does not exist: {}", path.display()),
        });
    }

    // 2. Environment variable
    if let Ok(path_str) = std::env::var(kind.env_var()) {
        let path = PathBuf::from(path_str);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(
            tool = %kind,
            path = %path.display(),
            "{} points at a missing file, ignoring",
            kind.env_var()
        );
    }

    // 3. PATH lookup
    if let Ok(path) = which(kind.binary_name()) {
        return Ok(path);
    }

    // 4. Common install locations
    for location in fallback_locations(kind) {
        if location.exists() {
            return Ok(location);
        }
    }

    // 5. Helpful error
    Err(ToolError::ExecutableNotFound {
        tool: kind,
        message: format!(
            "{kind} not found. {}\nSearched: {}, PATH, common install locations.",
            kind.install_hint(),
            kind.env_var()
        ),
    })
}

/// Resolves all three binaries, honouring explicit overrides.
///
/// # Errors
///
/// Returns the first `ToolError::ExecutableNotFound` encountered.
pub fn discover_all(overrides: &ToolPathOverrides) -> Result<ToolPaths, ToolError> {
    Ok(ToolPaths {
        showinf: discover_tool(ToolKind::Showinf, overrides.get(ToolKind::Showinf))?,
        bfconvert: discover_tool(ToolKind::Bfconvert, overrides.get(ToolKind::Bfconvert))?,
        convert: discover_tool(ToolKind::Convert, overrides.get(ToolKind::Convert))?,
    })
}

#[cfg(unix)]
fn fallback_locations(kind: ToolKind) -> Vec<PathBuf> {
    let name = kind.binary_name();
    let mut locations = Vec::new();
    match kind {
        ToolKind::Showinf | ToolKind::Bfconvert => {
            if let Some(home) = dirs::home_dir() {
                locations.push(home.join("bftools").join(name));
            }
            locations.push(PathBuf::from("/usr/local/bftools").join(name));
            locations.push(PathBuf::from("/opt/bftools").join(name));
        }
        ToolKind::Convert => {
            locations.push(PathBuf::from("/usr/local/bin").join(name));
            locations.push(PathBuf::from("/usr/bin").join(name));
            locations.push(PathBuf::from("/opt/homebrew/bin").join(name));
        }
    }
    locations
}

#[cfg(windows)]
fn fallback_locations(kind: ToolKind) -> Vec<PathBuf> {
    let mut locations = Vec::new();
    match kind {
        ToolKind::Showinf | ToolKind::Bfconvert => {
            let script = format!("{}.bat", kind.binary_name());
            if let Some(home) = dirs::home_dir() {
                locations.push(home.join("bftools").join(&script));
            }
            locations.push(PathBuf::from(r"C:\bftools").join(&script));
        }
        ToolKind::Convert => {
            locations.push(PathBuf::from(r"C:\Program Files\ImageMagick\convert.exe"));
        }
    }
    locations
}
