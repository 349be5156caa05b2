/// Detection of the kind of export file handed to us.
///
/// Strategy:
///   1. Check file extension for strong hints
///   2. Peek at the first bytes of the file content
///   3. Fall back to CLI override (handled by caller)
use std::path::Path;

use crate::error::VitalisError;

/// Supported input kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// A bare `export.xml` document.
    Xml,
    /// The ZIP archive produced by the Health app's "Export All Health Data".
    Zip,
}

impl InputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputKind::Xml => "xml",
            InputKind::Zip => "zip",
        }
    }
}

impl std::str::FromStr for InputKind {
    type Err = VitalisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xml" => Ok(InputKind::Xml),
            "zip" => Ok(InputKind::Zip),
            _ => Err(VitalisError::Parse(format!(
                "Unknown input kind: '{}'. Supported: xml, zip",
                s
            ))),
        }
    }
}

impl std::fmt::Display for InputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Detect the input kind from filename and the leading bytes of the file.
pub fn detect_input(path: &Path, head: &[u8]) -> Option<InputKind> {
    if let Some(kind) = detect_by_extension(path) {
        return Some(kind);
    }
    detect_by_content(head)
}

fn detect_by_extension(path: &Path) -> Option<InputKind> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "zip" => Some(InputKind::Zip),
        "xml" => Some(InputKind::Xml),
        _ => None,
    }
}

fn detect_by_content(head: &[u8]) -> Option<InputKind> {
    if head.starts_with(ZIP_MAGIC) {
        return Some(InputKind::Zip);
    }

    let head_len = head.len().min(4096);
    let text = String::from_utf8_lossy(&head[..head_len]);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start();
    if trimmed.starts_with("<?xml") || trimmed.starts_with('<') {
        return Some(InputKind::Xml);
    }

    None
}
