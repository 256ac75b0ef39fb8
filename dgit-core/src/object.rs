//! Core object model for dgit
//!
//! Content-addressable identifiers and the immutable Commit object.
//! Blobs are stored as raw bytes, so only their identifier lives here.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Tracked filename → blob digest. Sorted so the commit hash is stable.
pub type FileMap = BTreeMap<String, ObjectId>;

/// Unique identifier for any stored object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// Create a new ObjectId from raw bytes
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Compute ObjectId from data
    pub fn from_data(data: &[u8]) -> Self {
        let hash = Sha256::digest(data);
        Self(hash.into())
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(hex_str: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(hex_str)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Abbreviated hex form, as shown in merge lines of the log
    pub fn short(&self, len: usize) -> String {
        let mut hex = self.to_hex();
        hex.truncate(len.clamp(1, 64));
        hex
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

// Hex on the wire keeps state.json readable and doubles as the on-disk filename.
impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Fields that feed the commit digest, in their fixed serialization order.
#[derive(Serialize)]
struct CommitHeader<'a> {
    timestamp: i64,
    message: &'a str,
    parents: &'a [ObjectId],
    files: &'a FileMap,
}

impl CommitHeader<'_> {
    fn id(&self) -> ObjectId {
        ObjectId::from_data(&bincode::serialize(self).expect("commit header is always serializable"))
    }
}

/// Immutable snapshot of the tracked files plus history metadata.
///
/// The digest is computed once in [`Commit::new`] and stored alongside the
/// fields; none of the fields can be changed afterwards. Parents are held as
/// digests only and resolved through the commit graph on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    id: ObjectId,
    message: String,
    /// Commit timestamp (Unix seconds)
    timestamp: i64,
    /// Empty for the initial commit, two entries for a merge
    parents: Vec<ObjectId>,
    files: FileMap,
}

impl Commit {
    /// Create a new commit
    pub fn new(message: String, timestamp: i64, parents: Vec<ObjectId>, files: FileMap) -> Self {
        let id = CommitHeader {
            timestamp,
            message: &message,
            parents: &parents,
            files: &files,
        }
        .id();
        Self {
            id,
            message,
            timestamp,
            parents,
            files,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn first_parent(&self) -> Option<ObjectId> {
        self.parents.first().copied()
    }

    pub fn files(&self) -> &FileMap {
        &self.files
    }

    /// Blob digest tracked for `name`, if any
    pub fn blob(&self, name: &str) -> Option<ObjectId> {
        self.files.get(name).copied()
    }

    pub fn tracks(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Check if this is an initial commit (no parents)
    pub fn is_initial(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Recompute the digest from the fields and compare with the stored one
    pub fn verify(&self) -> bool {
        let expected = CommitHeader {
            timestamp: self.timestamp,
            message: &self.message,
            parents: &self.parents,
            files: &self.files,
        }
        .id();
        expected == self.id
    }

    /// Serialize to binary format
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary format
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}
