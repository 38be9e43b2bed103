//! Content hashing for snapshots and comparisons

use sha2::{Digest, Sha256};

/// SHA-256 of the raw content, as `sha256:<hex>`.
pub fn file_hash(content: &str) -> String {
    sha256_prefixed(content.as_bytes())
}

/// SHA-256 of the content with its volatile header lines removed.
///
/// UCD files open with a comment block naming the file, its generation
/// date and a copyright line. Regenerating a file changes those lines only,
/// so they are dropped before hashing.
pub fn content_hash(content: &str) -> String {
    sha256_prefixed(strip_volatile_header(content).as_bytes())
}

fn sha256_prefixed(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

fn is_volatile_header_line(line: &str) -> bool {
    let body = line.trim_start_matches('#').trim();
    body.starts_with("Date:")
        || body.starts_with("Copyright")
        || body.starts_with('©')
        || body.starts_with("(c)")
}

/// Drop `Date:`/copyright lines from the leading `#` comment block.
pub fn strip_volatile_header(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_header = true;
    for line in content.split_inclusive('\n') {
        if in_header && !line.starts_with('#') {
            in_header = false;
        }
        if in_header && is_volatile_header_line(line) {
            continue;
        }
        out.push_str(line);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "# Blocks-16.0.0.txt\n# Date: 2024-02-02\n# © 2024 Unicode®, Inc.\n#\n0000..007F; Basic Latin\n";
    const B: &str = "# Blocks-16.0.0.txt\n# Date: 2024-05-10\n# © 2024 Unicode®, Inc.\n#\n0000..007F; Basic Latin\n";

    #[test]
    fn test_file_hash_format() {
        let hash = file_hash("abc");
        assert_eq!(
            hash,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_content_hash_ignores_regeneration_date() {
        assert_ne!(file_hash(A), file_hash(B));
        assert_eq!(content_hash(A), content_hash(B));
    }

    #[test]
    fn test_content_hash_sees_data_changes() {
        let changed = A.replace("Basic Latin", "Basic Latin Extended");
        assert_ne!(content_hash(A), content_hash(&changed));
    }

    #[test]
    fn test_only_leading_header_is_stripped() {
        let content = "0000; X\n# Date: kept\n";
        assert_eq!(strip_volatile_header(content), content);
    }
}
