//! Storage key to file-name mapping
//!
//! Durable backends keep one file per storage key, so keys such as
//! `pagestate:app` or `blog/theme` must map to stable, portable file stems.
//! Distinct keys always get distinct stems.

use sha2::{Digest, Sha256};

const READABLE_MAX: usize = 48;
const DIGEST_HEX_LEN: usize = 16;

/// Map a storage key to a file stem: `<readable>-<digest>`.
///
/// The readable part is lowercase, keeps `[a-z0-9._-]`, turns `/`, `\` and
/// `:` into `-` and anything else into `_`, drops leading dots and is at most
/// 48 chars (`default` when nothing is left). The digest is the first 16 hex
/// chars of the SHA-256 of the exact key, so keys that differ only in case or
/// punctuation never share a file.
pub fn storage_file_stem(key: &str) -> String {
    let normalized = key.trim().to_lowercase().replace(['\\', '/', ':'], "-");

    let mut readable: String = normalized
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    readable = readable.trim_start_matches('.').to_string();
    readable.truncate(READABLE_MAX);
    if readable.is_empty() {
        readable.push_str("default");
    }

    let digest = hex::encode(Sha256::digest(key.as_bytes()));
    format!("{readable}-{}", &digest[..DIGEST_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(stem: &str) -> &str {
        &stem[..stem.len() - DIGEST_HEX_LEN - 1]
    }

    #[test]
    fn separators_become_dashes() {
        assert_eq!(readable(&storage_file_stem("pagestate:app")), "pagestate-app");
        assert_eq!(readable(&storage_file_stem("blog/Theme")), "blog-theme");
    }

    #[test]
    fn special_chars_and_hidden_prefix() {
        assert_eq!(readable(&storage_file_stem("..secret key!")), "secret_key_");
        assert_eq!(readable(&storage_file_stem("")), "default");
    }

    #[test]
    fn long_keys_are_truncated() {
        let key = "k".repeat(100);
        assert_eq!(storage_file_stem(&key).len(), READABLE_MAX + 1 + DIGEST_HEX_LEN);
    }

    #[test]
    fn keys_with_the_same_readable_part_stay_distinct() {
        let stems = [
            storage_file_stem("blog:theme"),
            storage_file_stem("blog/theme"),
            storage_file_stem("Blog-Theme"),
            storage_file_stem("blog-theme"),
        ];
        for (i, a) in stems.iter().enumerate() {
            assert_eq!(readable(a), "blog-theme");
            for b in &stems[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(storage_file_stem("blog:theme"), stems[0]);
    }

    #[test]
    fn long_keys_differing_past_the_cut_stay_distinct() {
        let a = format!("{}a", "k".repeat(60));
        let b = format!("{}b", "k".repeat(60));
        assert_ne!(storage_file_stem(&a), storage_file_stem(&b));
    }
}
