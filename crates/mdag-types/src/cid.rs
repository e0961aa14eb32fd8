use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TypeError;
use crate::hasher::ContentHasher;

/// Length of the embedded digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Number of text characters (after the version prefix) used as the shard
/// selector. Two lowercase hex characters give 256 shards.
pub const SHARD_PREFIX_LEN: usize = 2;

/// CID format version, carried by the first character of the text form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CidVersion {
    /// BLAKE3-256 digest, lowercase hex body.
    V1,
}

impl CidVersion {
    /// The structural prefix character for this version.
    pub const fn prefix(self) -> char {
        match self {
            Self::V1 => 'f',
        }
    }

    /// Look up a version by its prefix character.
    pub fn from_prefix(c: char) -> Option<Self> {
        match c {
            'f' => Some(Self::V1),
            _ => None,
        }
    }

    /// Numeric version tag.
    pub const fn number(self) -> u8 {
        match self {
            Self::V1 => 1,
        }
    }
}

/// Content identifier: a version tag plus the BLAKE3 digest of a block.
///
/// The text form is `<version prefix><64 lowercase hex chars>`, for example
/// `f3a9c…`. It is safe in file names and URLs on case-insensitive
/// filesystems. Identical bytes always produce the same `Cid`; a `Cid` is
/// never chosen by a caller.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    version: CidVersion,
    digest: [u8; DIGEST_LEN],
}

/// The structural parts of a CID, as returned by [`parse_cid`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParsedCid {
    pub version: CidVersion,
    pub digest: [u8; DIGEST_LEN],
}

/// A CID split for on-disk placement: `prefix` selects the shard directory,
/// `suffix` is the leaf name inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardPath {
    pub version: CidVersion,
    pub prefix: String,
    pub suffix: String,
}

impl ShardPath {
    /// Join the parts back into the CID text they were split from.
    pub fn reconstruct(&self) -> String {
        let mut s = String::with_capacity(1 + self.prefix.len() + self.suffix.len());
        s.push(self.version.prefix());
        s.push_str(&self.prefix);
        s.push_str(&self.suffix);
        s
    }
}

impl Cid {
    /// Derive the CID of a byte payload.
    pub fn from_content(data: &[u8]) -> Self {
        Self::from_digest(ContentHasher::BLOCK.hash(data))
    }

    /// Wrap a pre-computed digest as a current-version CID.
    pub fn from_digest(digest: [u8; DIGEST_LEN]) -> Self {
        Self {
            version: CidVersion::V1,
            digest,
        }
    }

    /// Parse a CID from its text form. Structural only: the digest is not
    /// checked against any content.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let mut chars = s.chars();
        let first = chars
            .next()
            .ok_or_else(|| TypeError::malformed(s, "empty string"))?;
        let version = CidVersion::from_prefix(first)
            .ok_or_else(|| TypeError::malformed(s, format!("unknown version prefix {first:?}")))?;

        let body = chars.as_str();
        if !body.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(TypeError::malformed(s, "body is not lowercase hex"));
        }
        if body.len() != DIGEST_LEN * 2 {
            return Err(TypeError::malformed(
                s,
                format!(
                    "wrong digest length: expected {DIGEST_LEN} bytes, got {}",
                    body.len() / 2
                ),
            ));
        }

        let bytes = hex::decode(body).map_err(|e| TypeError::malformed(s, e.to_string()))?;
        let mut digest = [0u8; DIGEST_LEN];
        digest.copy_from_slice(&bytes);
        Ok(Self { version, digest })
    }

    /// Returns `true` if `s` parses as a CID. Never panics.
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// The format version.
    pub fn version(&self) -> CidVersion {
        self.version
    }

    /// The raw digest.
    pub fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// Returns `true` if `data` hashes to this CID.
    pub fn matches(&self, data: &[u8]) -> bool {
        ContentHasher::BLOCK.verify(data, &self.digest)
    }

    /// Split into shard prefix and leaf suffix.
    pub fn shard(&self) -> ShardPath {
        let body = hex::encode(self.digest);
        let (prefix, suffix) = body.split_at(SHARD_PREFIX_LEN);
        ShardPath {
            version: self.version,
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        }
    }

    /// Rebuild a CID from the shard directory and leaf names it was stored
    /// under.
    pub fn from_shard(prefix: &str, suffix: &str) -> Result<Self, TypeError> {
        let mut s = String::with_capacity(1 + prefix.len() + suffix.len());
        s.push(CidVersion::V1.prefix());
        s.push_str(prefix);
        s.push_str(suffix);
        Self::parse(&s)
    }

    /// Abbreviated form for logs (prefix char plus 7 hex characters).
    pub fn short(&self) -> String {
        let mut s = String::with_capacity(8);
        s.push(self.version.prefix());
        s.push_str(&hex::encode(&self.digest[..4])[..7]);
        s
    }
}

/// Derive the CID of a byte payload.
pub fn create_cid(data: &[u8]) -> Cid {
    Cid::from_content(data)
}

/// Parse CID text into its version and digest.
pub fn parse_cid(s: &str) -> Result<ParsedCid, TypeError> {
    let cid = Cid::parse(s)?;
    Ok(ParsedCid {
        version: cid.version,
        digest: cid.digest,
    })
}

/// Returns `true` if `s` is a well-formed CID.
pub fn is_valid_cid(s: &str) -> bool {
    Cid::is_valid(s)
}

/// Split CID text into shard prefix and suffix.
pub fn shard_cid(s: &str) -> Result<ShardPath, TypeError> {
    Ok(Cid::parse(s)?.shard())
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.version.prefix(), hex::encode(self.digest))
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.short())
    }
}

impl FromStr for Cid {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
