//! src/services/access_service.rs
//!
//! AccessScopeManager: obtains the destination capability scope for a run
//! (freshly derived from API key + passphrase, or loaded from its serialized
//! form), optionally narrows it, and opens the working bucket, creating the
//! bucket first when it does not exist yet.

use crate::{
    config::{AccessOptions, DestinationConfig},
    destination::{
        AccessError, ApiKey, Caveat, DestinationNetwork, DestinationProject, EncryptionAccess,
        EncryptionRestriction, NetworkError, Scope,
    },
    errors::{ErrorContext, TransferError, TransferResult},
    services::uploader::normalize_upload_path,
};
use tracing::{debug, info, warn};

/// A capability scope together with its serialized form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessScope {
    scope: Scope,
    serialized: String,
    restricted: bool,
}

impl AccessScope {
    fn new(scope: Scope, restricted: bool) -> TransferResult<Self> {
        let serialized = scope
            .serialize()
            .map_err(|e| TransferError::scope(ErrorContext::new("serialize scope"), e))?;
        Ok(Self {
            scope,
            serialized,
            restricted,
        })
    }

    /// Load a scope from its serialized form.
    pub fn parse(serialized: &str) -> TransferResult<Self> {
        let scope = Scope::parse(serialized)
            .map_err(|e| TransferError::scope(ErrorContext::new("parse serialized scope"), e))?;
        let restricted = !scope.api_key.caveats().is_empty()
            || !scope.encryption_access.restrictions().is_empty();
        Ok(Self {
            scope,
            serialized: serialized.trim().to_string(),
            restricted,
        })
    }

    pub fn satellite_addr(&self) -> &str {
        &self.scope.satellite_addr
    }

    pub fn api_key(&self) -> &ApiKey {
        &self.scope.api_key
    }

    pub fn encryption_access(&self) -> &EncryptionAccess {
        &self.scope.encryption_access
    }

    pub fn serialized(&self) -> &str {
        &self.serialized
    }

    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Derive a narrower scope: `caveat` on the API key, then a bucket/prefix
    /// restriction on the encryption access. Only an unrestricted scope can
    /// be narrowed; satellite address is carried over unchanged.
    pub fn restrict(&self, caveat: Caveat, restriction: EncryptionRestriction) -> TransferResult<Self> {
        let ctx = || ErrorContext::with_key("restrict scope", restriction.bucket.clone());
        if self.restricted {
            return Err(TransferError::scope(ctx(), AccessError::AlreadyRestricted));
        }
        let key = self
            .scope
            .api_key
            .restrict(caveat)
            .map_err(|e| TransferError::scope(ctx(), e))?;
        let (key, access) = self
            .scope
            .encryption_access
            .restrict(&key, std::slice::from_ref(&restriction))
            .map_err(|e| TransferError::scope(ctx(), e))?;
        AccessScope::new(
            Scope {
                satellite_addr: self.scope.satellite_addr.clone(),
                api_key: key,
                encryption_access: access,
            },
            true,
        )
    }
}

/// Everything a run needs from the destination side.
pub struct AcquiredBucket<N: DestinationNetwork> {
    pub project: N::Project,
    pub bucket: <N::Project as DestinationProject>::Bucket,
    /// The scope the project and bucket were opened with.
    pub scope: AccessScope,
    /// The narrower scope, when one was requested.
    pub restricted: Option<AccessScope>,
    /// True when the bucket had to be created during this run.
    pub bucket_created: bool,
}

impl<N: DestinationNetwork> AcquiredBucket<N> {
    /// The scope to show or hand out: the restricted one when it exists.
    pub fn exported_scope(&self) -> &AccessScope {
        self.restricted.as_ref().unwrap_or(&self.scope)
    }
}

pub struct AccessScopeManager<'a, N: DestinationNetwork> {
    network: &'a N,
    config: &'a DestinationConfig,
    options: AccessOptions,
}

impl<'a, N: DestinationNetwork> AccessScopeManager<'a, N> {
    pub fn new(network: &'a N, config: &'a DestinationConfig, options: AccessOptions) -> Self {
        Self {
            network,
            config,
            options,
        }
    }

    /// Derive the unrestricted scope from the configured API key and passphrase.
    pub async fn derive(&self) -> TransferResult<AccessScope> {
        info!("Parsing the API key...");
        let key = ApiKey::parse(&self.config.api_key)
            .map_err(|e| TransferError::scope(ErrorContext::new("parse api key"), e))?;
        if self.options.debug {
            debug!("API key \t :{}", self.config.api_key);
            debug!("Serialized API key :{}", key.serialize().unwrap_or_default());
        }

        info!("Opening Project...");
        let project = self
            .network
            .open_project(&self.config.satellite, &key)
            .await
            .map_err(|e| {
                TransferError::connection(
                    ErrorContext::with_key("open project", self.config.satellite.clone()),
                    e,
                )
            })?;

        debug!("Getting encryption key from pass phrase...");
        let encryption_key = project
            .salted_key_from_passphrase(&self.config.encryption_passphrase)
            .await
            .map_err(|e| TransferError::scope(ErrorContext::new("derive encryption key"), e))?;
        let access = EncryptionAccess::with_default_key(encryption_key);

        // Round-trip the access once to make sure its serialization is usable.
        let serialized_access = access
            .serialize()
            .map_err(|e| TransferError::scope(ErrorContext::new("serialize encryption access"), e))?;
        if self.options.debug {
            debug!("Serialized access key\t:{}", serialized_access);
        }
        let reparsed = EncryptionAccess::parse(&serialized_access)
            .map_err(|e| TransferError::scope(ErrorContext::new("parse encryption access"), e))?;
        if reparsed != access {
            return Err(TransferError::scope(
                ErrorContext::new("parse encryption access"),
                "serialized access does not round-trip",
            ));
        }
        drop(project);

        AccessScope::new(
            Scope {
                satellite_addr: self.config.satellite.clone(),
                api_key: key,
                encryption_access: access,
            },
            false,
        )
    }

    /// Run the whole acquisition: obtain the scope(s), open a project under
    /// the working scope and open (or create, then open) the bucket.
    pub async fn acquire(&self) -> TransferResult<AcquiredBucket<N>> {
        let (scope, restricted) = if self.options.derive_fresh {
            let scope = self.derive().await?;
            let restricted = if self.options.restrict {
                let restriction = EncryptionRestriction {
                    bucket: self.config.bucket.clone(),
                    path_prefix: normalize_upload_path(&self.config.upload_path),
                };
                Some(scope.restrict(self.config.caveat(), restriction)?)
            } else {
                None
            };
            (scope, restricted)
        } else {
            if self.options.restrict {
                warn!("`restrict` only applies together with `key`; ignoring it");
            }
            (AccessScope::parse(&self.config.serialized_scope)?, None)
        };

        // Reopen from the serialized form, exactly as a later run would.
        let working = AccessScope::parse(scope.serialized())?;
        let project = self
            .network
            .open_project(working.satellite_addr(), working.api_key())
            .await
            .map_err(|e| {
                TransferError::connection(
                    ErrorContext::with_key("open project", working.satellite_addr().to_string()),
                    e,
                )
            })?;

        let name = self.config.bucket.as_str();
        info!("Opening Bucket\t\t: {}", name);
        let (bucket, bucket_created) = match project
            .open_bucket(name, working.encryption_access())
            .await
        {
            Ok(bucket) => (bucket, false),
            Err(NetworkError::BucketNotFound(_)) => {
                info!("Could not open bucket {}; trying to create new bucket....", name);
                project.create_bucket(name).await.map_err(|e| {
                    TransferError::connection(ErrorContext::with_key("create bucket", name), e)
                })?;
                info!("Created Bucket {}", name);
                info!("Opening created Bucket: {}", name);
                let bucket = project
                    .open_bucket(name, working.encryption_access())
                    .await
                    .map_err(|e| {
                        TransferError::connection(ErrorContext::with_key("open bucket", name), e)
                    })?;
                (bucket, true)
            }
            Err(e) => {
                return Err(TransferError::connection(
                    ErrorContext::with_key("open bucket", name),
                    e,
                ));
            }
        };

        Ok(AcquiredBucket {
            project,
            bucket,
            scope,
            restricted,
            bucket_created,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::LocalNetwork;
    use tempfile::TempDir;

    fn config() -> DestinationConfig {
        DestinationConfig {
            api_key: "13Yqe3oHi5dcnGhMu2ru3cmePC9iEYv6nDrYMbLRh4wre".into(),
            satellite: "us1.storj.io:7777".into(),
            bucket: "backup".into(),
            upload_path: "zenko/".into(),
            encryption_passphrase: "correct horse".into(),
            disallow_reads: "false".into(),
            disallow_writes: "false".into(),
            disallow_deletes: "false".into(),
            ..DestinationConfig::default()
        }
    }

    fn fresh(restrict: bool) -> AccessOptions {
        AccessOptions {
            derive_fresh: true,
            restrict,
            debug: false,
        }
    }

    #[tokio::test]
    async fn derived_scope_round_trips_through_serialization() {
        let dir = TempDir::new().unwrap();
        let network = LocalNetwork::new(dir.path());
        let cfg = config();
        let scope = AccessScopeManager::new(&network, &cfg, fresh(false))
            .derive()
            .await
            .unwrap();
        assert!(!scope.is_restricted());
        assert_eq!(AccessScope::parse(scope.serialized()).unwrap(), scope);
        assert_eq!(scope.satellite_addr(), "us1.storj.io:7777");
    }

    #[tokio::test]
    async fn restricted_scope_keeps_satellite_and_bucket() {
        let dir = TempDir::new().unwrap();
        let network = LocalNetwork::new(dir.path());
        let cfg = config();
        let acquired = AccessScopeManager::new(&network, &cfg, fresh(true))
            .acquire()
            .await
            .unwrap();

        let restricted = acquired.restricted.as_ref().unwrap();
        assert!(restricted.is_restricted());
        assert!(!acquired.scope.is_restricted());
        assert_eq!(restricted.satellite_addr(), acquired.scope.satellite_addr());
        assert_eq!(
            restricted.encryption_access().restrictions()[0].bucket,
            cfg.bucket
        );
        assert_eq!(restricted.api_key().head(), acquired.scope.api_key().head());
        assert_eq!(acquired.exported_scope(), restricted);
        assert!(restricted.restrict(Caveat::default(), EncryptionRestriction {
            bucket: "backup".into(),
            path_prefix: String::new(),
        })
        .is_err());
    }

    #[tokio::test]
    async fn caveats_from_config_narrow_the_restricted_key() {
        let dir = TempDir::new().unwrap();
        let network = LocalNetwork::new(dir.path());
        let mut cfg = config();
        cfg.disallow_deletes = "true".into();
        let acquired = AccessScopeManager::new(&network, &cfg, fresh(true))
            .acquire()
            .await
            .unwrap();
        let perms = acquired.restricted.unwrap().api_key().permissions();
        assert!(!perms.delete);
        assert!(perms.read && perms.write);
        assert!(acquired.scope.api_key().permissions().delete);
    }

    #[tokio::test]
    async fn loaded_scope_opens_bucket_without_deriving() {
        let dir = TempDir::new().unwrap();
        let network = LocalNetwork::new(dir.path());
        let cfg = config();
        let first = AccessScopeManager::new(&network, &cfg, fresh(false))
            .acquire()
            .await
            .unwrap();

        let mut loaded_cfg = cfg.clone();
        loaded_cfg.api_key = String::new();
        loaded_cfg.encryption_passphrase = String::new();
        loaded_cfg.serialized_scope = first.scope.serialized().to_string();
        let loaded = AccessScopeManager::new(&network, &loaded_cfg, AccessOptions::default())
            .acquire()
            .await
            .unwrap();
        assert_eq!(loaded.scope, first.scope);
        assert!(loaded.restricted.is_none());
        assert!(!loaded.bucket_created);
    }

    #[tokio::test]
    async fn bad_inputs_are_scope_errors() {
        let dir = TempDir::new().unwrap();
        let network = LocalNetwork::new(dir.path());

        let mut cfg = config();
        cfg.api_key = String::new();
        let err = AccessScopeManager::new(&network, &cfg, fresh(false))
            .acquire()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransferError::Scope { .. }));

        let cfg = DestinationConfig {
            serialized_scope: "garbage".into(),
            ..config()
        };
        let err = AccessScopeManager::new(&network, &cfg, AccessOptions::default())
            .acquire()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransferError::Scope { .. }));
    }

    #[tokio::test]
    async fn invalid_bucket_name_is_a_connection_error() {
        let dir = TempDir::new().unwrap();
        let network = LocalNetwork::new(dir.path());
        let cfg = DestinationConfig {
            bucket: "Bad_Name".into(),
            ..config()
        };
        let err = AccessScopeManager::new(&network, &cfg, fresh(false))
            .acquire()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransferError::Connection { .. }));
    }
}
