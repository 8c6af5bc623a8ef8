//! Stable content hashing for cache keys
//!
//! FNV-1a is used everywhere a content hash appears so that cache keys stay
//! stable across processes and platforms.

// FNV-1a constants for 64-bit hash
const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Compute a stable FNV-1a hash of a string
pub fn fnv1a_hash(data: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in data.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Hex-encoded content hash
pub fn content_hash(data: &str) -> String {
    format!("{:016x}", fnv1a_hash(data))
}

/// Cache key for an embedding of the given text
pub fn embedding_cache_key(text: &str) -> String {
    format!("emb:{}", content_hash(text))
}

/// Cache key tying a file path to a specific content version
pub fn file_cache_key(path: &str, content: &str) -> String {
    format!("{}:{}", path, content_hash(content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_deterministic() {
        assert_eq!(fnv1a_hash("hello"), fnv1a_hash("hello"));
        assert_eq!(content_hash("hello").len(), 16);
    }

    #[test]
    fn test_hash_differs_on_content() {
        assert_ne!(content_hash("a"), content_hash("b"));
        assert_ne!(
            file_cache_key("src/a.ts", "one"),
            file_cache_key("src/a.ts", "two")
        );
    }

    #[test]
    fn test_key_shapes() {
        assert!(embedding_cache_key("text").starts_with("emb:"));
        assert!(file_cache_key("src/a.ts", "x").starts_with("src/a.ts:"));
    }
}
