//! Capability primitives of the destination network: API keys with caveats,
//! encryption access and the serialized scope that bundles them.
//!
//! Every serialized form is URL-safe base64 (no padding) of the JSON encoding.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("{0} is empty")]
    Empty(&'static str),
    #[error("invalid {what}: {reason}")]
    Invalid { what: &'static str, reason: String },
    #[error("scope is already restricted")]
    AlreadyRestricted,
}

pub type AccessResult<T> = Result<T, AccessError>;

fn encode<T: Serialize>(what: &'static str, value: &T) -> AccessResult<String> {
    let json = serde_json::to_vec(value).map_err(|e| AccessError::Invalid {
        what,
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode<T: DeserializeOwned>(what: &'static str, s: &str) -> AccessResult<T> {
    let s = s.trim();
    if s.is_empty() {
        return Err(AccessError::Empty(what));
    }
    let raw = URL_SAFE_NO_PAD
        .decode(s)
        .map_err(|e| AccessError::Invalid {
            what,
            reason: e.to_string(),
        })?;
    serde_json::from_slice(&raw).map_err(|e| AccessError::Invalid {
        what,
        reason: e.to_string(),
    })
}

/// A bucket plus key prefix an API key or encryption access is limited to.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EncryptionRestriction {
    pub bucket: String,
    pub path_prefix: String,
}

impl EncryptionRestriction {
    pub fn matches(&self, bucket: &str, key: &str) -> bool {
        self.bucket == bucket && key.starts_with(&self.path_prefix)
    }
}

/// A restriction attached to an API key. An unset flag removes nothing.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Caveat {
    pub disallow_reads: bool,
    pub disallow_writes: bool,
    pub disallow_lists: bool,
    pub disallow_deletes: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_paths: Vec<EncryptionRestriction>,
}

/// What a key may still do once all of its caveats are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub list: bool,
    pub delete: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ApiKey {
    head: String,
    #[serde(default)]
    caveats: Vec<Caveat>,
}

impl ApiKey {
    /// Parse an API key as issued by a satellite.
    ///
    /// A key that is not in serialized form is taken as an opaque root key
    /// without caveats.
    pub fn parse(s: &str) -> AccessResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AccessError::Empty("api key"));
        }
        if let Ok(key) = decode::<ApiKey>("api key", s) {
            if key.head.is_empty() {
                return Err(AccessError::Empty("api key head"));
            }
            return Ok(key);
        }
        if s.chars().any(char::is_whitespace) {
            return Err(AccessError::Invalid {
                what: "api key",
                reason: "contains whitespace".into(),
            });
        }
        Ok(Self {
            head: s.to_string(),
            caveats: Vec::new(),
        })
    }

    pub fn serialize(&self) -> AccessResult<String> {
        encode("api key", self)
    }

    /// Derive a narrower key carrying one more caveat.
    pub fn restrict(&self, caveat: Caveat) -> AccessResult<ApiKey> {
        let mut key = self.clone();
        key.caveats.push(caveat);
        Ok(key)
    }

    /// The identity of the root key, shared by all keys derived from it.
    pub fn head(&self) -> &str {
        &self.head
    }

    pub fn caveats(&self) -> &[Caveat] {
        &self.caveats
    }

    pub fn permissions(&self) -> Permissions {
        self.caveats.iter().fold(
            Permissions {
                read: true,
                write: true,
                list: true,
                delete: true,
            },
            |p, c| Permissions {
                read: p.read && !c.disallow_reads,
                write: p.write && !c.disallow_writes,
                list: p.list && !c.disallow_lists,
                delete: p.delete && !c.disallow_deletes,
            },
        )
    }

    /// True when every caveat with path limits admits `bucket`/`key`.
    pub fn allows_path(&self, bucket: &str, key: &str) -> bool {
        self.caveats
            .iter()
            .filter(|c| !c.allowed_paths.is_empty())
            .all(|c| c.allowed_paths.iter().any(|p| p.matches(bucket, key)))
    }
}

/// A 32-byte symmetric key, serialized as hex.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncryptionKey(#[serde(with = "hex_bytes")] [u8; 32]);

impl EncryptionKey {
    /// `SHA-256(salt || passphrase)`.
    pub fn derive(passphrase: &str, salt: &[u8]) -> AccessResult<Self> {
        if passphrase.is_empty() {
            return Err(AccessError::Empty("encryption passphrase"));
        }
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(passphrase.as_bytes());
        Ok(Self(hasher.finalize().into()))
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let raw = hex::decode(&s).map_err(D::Error::custom)?;
        raw.try_into()
            .map_err(|_| D::Error::custom("encryption key must be 32 bytes"))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct EncryptionAccess {
    default_key: EncryptionKey,
    #[serde(default)]
    restrictions: Vec<EncryptionRestriction>,
}

impl EncryptionAccess {
    pub fn with_default_key(key: EncryptionKey) -> Self {
        Self {
            default_key: key,
            restrictions: Vec::new(),
        }
    }

    pub fn parse(s: &str) -> AccessResult<Self> {
        decode("encryption access", s)
    }

    pub fn serialize(&self) -> AccessResult<String> {
        encode("encryption access", self)
    }

    pub fn restrictions(&self) -> &[EncryptionRestriction] {
        &self.restrictions
    }

    /// Limit both `api_key` and this access to the given bucket/prefix pairs.
    pub fn restrict(
        &self,
        api_key: &ApiKey,
        restrictions: &[EncryptionRestriction],
    ) -> AccessResult<(ApiKey, EncryptionAccess)> {
        if restrictions.is_empty() {
            return Err(AccessError::Invalid {
                what: "encryption restriction",
                reason: "at least one bucket or prefix is required".into(),
            });
        }
        if let Some(r) = restrictions.iter().find(|r| r.bucket.is_empty()) {
            return Err(AccessError::Invalid {
                what: "encryption restriction",
                reason: format!("empty bucket for prefix `{}`", r.path_prefix),
            });
        }
        let key = api_key.restrict(Caveat {
            allowed_paths: restrictions.to_vec(),
            ..Caveat::default()
        })?;
        let mut access = self.clone();
        access.restrictions.extend_from_slice(restrictions);
        Ok((key, access))
    }

    pub fn allows_path(&self, bucket: &str, key: &str) -> bool {
        self.restrictions.is_empty() || self.restrictions.iter().any(|r| r.matches(bucket, key))
    }
}

/// Satellite address, API key and encryption access in one bundle.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Scope {
    pub satellite_addr: String,
    pub api_key: ApiKey,
    pub encryption_access: EncryptionAccess,
}

impl Scope {
    pub fn parse(s: &str) -> AccessResult<Self> {
        let scope: Scope = decode("scope", s)?;
        if scope.satellite_addr.is_empty() {
            return Err(AccessError::Empty("scope satellite address"));
        }
        Ok(scope)
    }

    pub fn serialize(&self) -> AccessResult<String> {
        encode("scope", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> EncryptionKey {
        EncryptionKey::derive("secret", b"salt").unwrap()
    }

    #[test]
    fn raw_api_key_parses_as_root_key() {
        let k = ApiKey::parse("13Yqe3oHi5dcnGhMu2ru3cmePC9iEYv6nDrYMbLRh4wre").unwrap();
        assert!(k.caveats().is_empty());
        assert_eq!(
            k.permissions(),
            Permissions {
                read: true,
                write: true,
                list: true,
                delete: true
            }
        );
        assert!(ApiKey::parse("").is_err());
        assert!(ApiKey::parse("has space").is_err());
    }

    #[test]
    fn serialized_api_key_keeps_caveats() {
        let k = ApiKey::parse("root")
            .unwrap()
            .restrict(Caveat {
                disallow_deletes: true,
                ..Caveat::default()
            })
            .unwrap();
        let back = ApiKey::parse(&k.serialize().unwrap()).unwrap();
        assert_eq!(back, k);
        assert!(!back.permissions().delete);
        assert!(back.permissions().write);
    }

    #[test]
    fn key_derivation_depends_on_salt_and_passphrase() {
        let a = EncryptionKey::derive("pass", b"one").unwrap();
        let b = EncryptionKey::derive("pass", b"two").unwrap();
        let c = EncryptionKey::derive("other", b"one").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, EncryptionKey::derive("pass", b"one").unwrap());
        assert!(EncryptionKey::derive("", b"one").is_err());
    }

    #[test]
    fn encryption_access_survives_serialization() {
        let access = EncryptionAccess::with_default_key(key());
        let parsed = EncryptionAccess::parse(&access.serialize().unwrap()).unwrap();
        assert_eq!(parsed, access);
    }

    #[test]
    fn restriction_limits_paths_on_key_and_access() {
        let root = ApiKey::parse("root").unwrap();
        let access = EncryptionAccess::with_default_key(key());
        let (k, a) = access
            .restrict(
                &root,
                &[EncryptionRestriction {
                    bucket: "backup".into(),
                    path_prefix: "zenko/".into(),
                }],
            )
            .unwrap();
        assert!(k.allows_path("backup", "zenko/docs_t/a/0.txt"));
        assert!(!k.allows_path("backup", "other/a"));
        assert!(!k.allows_path("elsewhere", "zenko/a"));
        assert!(a.allows_path("backup", "zenko/x"));
        assert!(!a.allows_path("backup", "x"));
        assert!(root.allows_path("anything", "anywhere"));
    }

    #[test]
    fn scope_requires_satellite() {
        let scope = Scope {
            satellite_addr: String::new(),
            api_key: ApiKey::parse("root").unwrap(),
            encryption_access: EncryptionAccess::with_default_key(key()),
        };
        assert!(matches!(
            Scope::parse(&scope.serialize().unwrap()),
            Err(AccessError::Empty(_))
        ));
        assert!(Scope::parse("not base64 !!").is_err());
    }
}
