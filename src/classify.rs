//! Text/binary classification.
//!
//! Every tree walk asks [`is_text`] once per file before touching its
//! content. The decision is layered: a fixed list of binary extensions wins
//! outright, then a bounded content sample is sniffed, and finally the MIME
//! type guessed from the extension breaks ties.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::constants::{BINARY_EXTENSIONS, NON_TEXT_RATIO, SAMPLE_SIZE, TEXT_EXTENSIONS};

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase())
}

fn is_text_extension(ext: Option<&str>) -> bool {
    ext.is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
}

/// Returns true if `sample` looks like binary content.
///
/// Any NUL byte is conclusive. Otherwise the sample is binary when more than
/// 30% of its bytes fall outside printable ASCII and common whitespace. Bytes
/// of multi-byte UTF-8 sequences count as non-printable here, so mostly
/// non-ASCII text files need a text extension to be recognised.
pub fn looks_binary(sample: &[u8]) -> bool {
    if sample.is_empty() {
        return false;
    }
    if sample.contains(&0) {
        return true;
    }
    let non_text = sample
        .iter()
        .filter(|&&b| !(32..127).contains(&b) && !matches!(b, b'\n' | b'\r' | b'\t' | 0x0c | 0x08))
        .count();
    non_text as f64 / sample.len() as f64 > NON_TEXT_RATIO
}

fn mime_is_textual(mime: &mime_guess::Mime) -> bool {
    if mime.type_() == mime_guess::mime::TEXT {
        return true;
    }
    let subtype = mime.subtype().as_str();
    let suffix = mime.suffix().map(|s| s.as_str());
    matches!(subtype, "json" | "xml" | "javascript" | "x-sh" | "toml" | "yaml" | "x-yaml")
        || matches!(suffix, Some("json") | Some("xml"))
}

/// Decides whether the file at `path` may be treated as text.
///
/// Unreadable files are reported as binary so that callers leave them alone.
pub fn is_text<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    let ext = extension(path);
    if ext.as_deref().is_some_and(|ext| BINARY_EXTENSIONS.contains(&ext)) {
        return false;
    }

    let mut sample = Vec::with_capacity(SAMPLE_SIZE);
    match File::open(path) {
        Ok(file) => {
            if file.take(SAMPLE_SIZE as u64).read_to_end(&mut sample).is_err() {
                return false;
            }
        }
        Err(_) => return false,
    }
    if looks_binary(&sample) {
        return false;
    }

    if let Some(mime) = mime_guess::from_path(path).first() {
        if !mime_is_textual(&mime) && !is_text_extension(ext.as_deref()) {
            return false;
        }
    }

    true
}
