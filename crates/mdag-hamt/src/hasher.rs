use mdag_types::ContentHasher;

/// Hash function that turns a semantic key into the bits that select trie
/// slots. Must be stable: an index written with one hasher can only be read
/// with the same hasher.
pub trait KeyHasher: Send + Sync {
    fn hash_key(&self, key: &[u8]) -> [u8; 32];
}

/// Domain-separated BLAKE3 key hasher (the default).
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3KeyHasher;

impl KeyHasher for Blake3KeyHasher {
    fn hash_key(&self, key: &[u8]) -> [u8; 32] {
        ContentHasher::HAMT_KEY.hash(key)
    }
}
