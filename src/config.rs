use crate::{
    destination::Caveat,
    errors::{ErrorContext, TransferError, TransferResult},
    services::chunk_reader::DEFAULT_WINDOW_SIZE,
    source::S3SourceConfig,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, de::DeserializeOwned};
use std::{
    env, fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const ZENKO_CONFIG_FILE: &str = "./config/zenko_property.json";
pub const STORJ_CONFIG_FILE: &str = "./config/storj_config.json";

const DEFAULT_REGION: &str = "us-east-1";
const DEBUG_WORD: &str = "debug";
const KEY_WORD: &str = "key";
const RESTRICT_WORD: &str = "restrict";

/// Command-line interface. Each command takes free-form words: config file
/// paths in order, plus the literal words `key`, `restrict` and `debug`.
#[derive(Parser, Debug)]
#[command(
    name = "zenko-storj",
    author,
    version,
    about = "Backup your files from Zenko Orbit to the decentralized Storj network"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List all Zenko buckets and the objects inside them: parse [zenkoConfig] [debug]
    #[command(visible_alias = "p")]
    Parse { words: Vec<String> },

    /// Upload sample data to validate the Storj setup: test [storjConfig] [key] [restrict] [debug]
    #[command(visible_alias = "t")]
    Test { words: Vec<String> },

    /// Transfer every Zenko object to Storj: store [zenkoConfig] [storjConfig] [key] [restrict] [debug]
    #[command(visible_alias = "s")]
    Store { words: Vec<String> },
}

/// How the destination scope is obtained for a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessOptions {
    /// Derive a fresh scope from API key + passphrase instead of loading one.
    pub derive_fresh: bool,
    /// Also derive the restricted scope (only with `derive_fresh`).
    pub restrict: bool,
    pub debug: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseArgs {
    pub zenko_config: PathBuf,
    pub debug: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TestArgs {
    pub storj_config: PathBuf,
    pub access: AccessOptions,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreArgs {
    pub zenko_config: PathBuf,
    pub storj_config: PathBuf,
    pub access: AccessOptions,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Invocation {
    Parse(ParseArgs),
    Test(TestArgs),
    Store(StoreArgs),
}

impl Command {
    pub fn debug(&self) -> bool {
        let (Command::Parse { words } | Command::Test { words } | Command::Store { words }) = self;
        words.iter().any(|w| w == DEBUG_WORD)
    }

    /// Interpret the positional words. `debug` may appear anywhere; the
    /// remaining words fill the command's slots in order.
    pub fn invocation(&self) -> Invocation {
        let debug = self.debug();
        match self {
            Command::Parse { words } => {
                // Every non-debug word replaces the file name; the last one wins.
                let zenko_config = positional(words)
                    .last()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(ZENKO_CONFIG_FILE));
                Invocation::Parse(ParseArgs {
                    zenko_config,
                    debug,
                })
            }
            Command::Test { words } => {
                let mut slots = positional(words);
                let storj_config = slots.next().unwrap_or(STORJ_CONFIG_FILE);
                let key = slots.next();
                let restrict = slots.last();
                Invocation::Test(TestArgs {
                    storj_config: PathBuf::from(storj_config),
                    access: access_options(key, restrict, debug),
                })
            }
            Command::Store { words } => {
                let mut slots = positional(words);
                let zenko_config = slots.next().unwrap_or(ZENKO_CONFIG_FILE);
                let storj_config = slots.next().unwrap_or(STORJ_CONFIG_FILE);
                let key = slots.next();
                let restrict = slots.last();
                Invocation::Store(StoreArgs {
                    zenko_config: PathBuf::from(zenko_config),
                    storj_config: PathBuf::from(storj_config),
                    access: access_options(key, restrict, debug),
                })
            }
        }
    }
}

fn positional(words: &[String]) -> impl Iterator<Item = &str> {
    words
        .iter()
        .map(String::as_str)
        .filter(|w| *w != DEBUG_WORD)
}

fn access_options(key: Option<&str>, restrict: Option<&str>, debug: bool) -> AccessOptions {
    let derive_fresh = key == Some(KEY_WORD);
    AccessOptions {
        derive_fresh,
        restrict: restrict == Some(RESTRICT_WORD),
        debug,
    }
}

/// Zenko (source store) connection properties.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SourceConfig {
    #[serde(rename = "zenkoEndpoint", alias = "endpoint")]
    pub endpoint: String,
    #[serde(rename = "accessKeyID")]
    pub access_key_id: String,
    #[serde(rename = "secretAccessKey")]
    pub secret_access_key: String,
    pub region: String,
}

impl SourceConfig {
    pub fn s3(&self) -> S3SourceConfig {
        S3SourceConfig {
            endpoint: self.endpoint.clone(),
            region: if self.region.is_empty() {
                DEFAULT_REGION.to_string()
            } else {
                self.region.clone()
            },
            access_key_id: self.access_key_id.clone(),
            secret_access_key: self.secret_access_key.clone(),
        }
    }
}

/// Storj (destination network) configuration.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DestinationConfig {
    pub api_key: String,
    #[serde(rename = "satelliteURL")]
    pub satellite: String,
    #[serde(rename = "bucketName")]
    pub bucket: String,
    pub upload_path: String,
    pub encryption_passphrase: String,
    pub serialized_scope: String,
    pub disallow_reads: String,
    pub disallow_writes: String,
    pub disallow_deletes: String,
}

impl DestinationConfig {
    /// The permission caveat described by the `disallow*` fields.
    pub fn caveat(&self) -> Caveat {
        Caveat {
            disallow_reads: parse_flag(&self.disallow_reads),
            disallow_writes: parse_flag(&self.disallow_writes),
            disallow_deletes: parse_flag(&self.disallow_deletes),
            ..Caveat::default()
        }
    }
}

/// Permissive boolean parsing; anything unrecognised is `false`.
pub fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "t" | "T" | "TRUE" | "true" | "True")
}

/// Read a JSON config file. A missing or unreadable file is an error;
/// malformed content is logged and replaced by the empty default.
pub fn load_json<T: DeserializeOwned + Default>(path: &Path) -> TransferResult<T> {
    let ctx = || ErrorContext::with_key("load config", path.display().to_string());
    let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
        ErrorKind::NotFound => TransferError::config(ctx(), "file not found"),
        _ => TransferError::config(ctx(), err),
    })?;
    match serde_json::from_str(&raw) {
        Ok(cfg) => Ok(cfg),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "malformed config, using empty values");
            Ok(T::default())
        }
    }
}

pub fn load_source_config(path: &Path) -> TransferResult<SourceConfig> {
    let cfg: SourceConfig = load_json(path)?;
    info!("Read Zenko configuration from the {} file", path.display());
    info!("Zenko End Point\t: {}", cfg.endpoint);
    Ok(cfg)
}

pub fn load_destination_config(path: &Path) -> TransferResult<DestinationConfig> {
    let cfg: DestinationConfig = load_json(path)?;
    info!("Reading Storj configuration from file: {}", path.display());
    info!("Satellite\t\t: {}", cfg.satellite);
    info!("Bucket\t\t\t: {}", cfg.bucket);
    info!("Upload Path\t\t: {}", cfg.upload_path);
    tracing::debug!("API Key\t\t\t: {}", cfg.api_key);
    tracing::debug!("Serialized Scope Key\t: {}", cfg.serialized_scope);
    Ok(cfg)
}

/// Process-level settings taken from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Root directory of the local destination network.
    pub network_root: PathBuf,
    /// Chunk window in bytes.
    pub window: u64,
    /// Where the verification pass reconstitutes objects.
    pub debug_dir: PathBuf,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let network_root = env::var("ZENKO_STORJ_NETWORK_ROOT")
            .unwrap_or_else(|_| "./storj_network".into());
        let window = match env::var("ZENKO_STORJ_CHUNK_SIZE") {
            Ok(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing ZENKO_STORJ_CHUNK_SIZE value `{}`", value))?,
            Err(env::VarError::NotPresent) => DEFAULT_WINDOW_SIZE,
            Err(err) => return Err(err).context("reading ZENKO_STORJ_CHUNK_SIZE"),
        };
        if window == 0 {
            anyhow::bail!("ZENKO_STORJ_CHUNK_SIZE must be greater than zero");
        }
        let debug_dir = env::var("ZENKO_STORJ_DEBUG_DIR").unwrap_or_else(|_| "debug".into());

        Ok(Self {
            network_root: network_root.into(),
            window,
            debug_dir: debug_dir.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn store_words_fill_slots_in_order() {
        let cmd = Command::Store {
            words: words(&["z.json", "debug", "s.json", "key", "restrict"]),
        };
        assert_eq!(
            cmd.invocation(),
            Invocation::Store(StoreArgs {
                zenko_config: "z.json".into(),
                storj_config: "s.json".into(),
                access: AccessOptions {
                    derive_fresh: true,
                    restrict: true,
                    debug: true,
                },
            })
        );
    }

    #[test]
    fn store_defaults_without_words() {
        let cmd = Command::Store { words: Vec::new() };
        let Invocation::Store(args) = cmd.invocation() else {
            panic!("expected store");
        };
        assert_eq!(args.zenko_config, PathBuf::from(ZENKO_CONFIG_FILE));
        assert_eq!(args.storj_config, PathBuf::from(STORJ_CONFIG_FILE));
        assert_eq!(args.access, AccessOptions::default());
    }

    #[test]
    fn key_and_restrict_must_be_literal() {
        let cmd = Command::Test {
            words: words(&["s.json", "nokey", "restrict"]),
        };
        let Invocation::Test(args) = cmd.invocation() else {
            panic!("expected test");
        };
        assert!(!args.access.derive_fresh);
        assert!(args.access.restrict);
    }

    #[test]
    fn parse_takes_last_file_name() {
        let cmd = Command::Parse {
            words: words(&["a.json", "b.json", "debug"]),
        };
        assert_eq!(
            cmd.invocation(),
            Invocation::Parse(ParseArgs {
                zenko_config: "b.json".into(),
                debug: true,
            })
        );
    }

    #[test]
    fn cli_accepts_aliases() {
        let cli = Cli::try_parse_from(["zenko-storj", "s", "z.json", "debug"]).unwrap();
        assert!(cli.command.debug());
        assert!(matches!(cli.command, Command::Store { .. }));
    }

    #[test]
    fn flags_parse_permissively() {
        for v in ["1", "t", "T", "TRUE", "true", "True"] {
            assert!(parse_flag(v), "{v}");
        }
        for v in ["0", "f", "false", "", "yes", "tRuE"] {
            assert!(!parse_flag(v), "{v}");
        }
    }

    #[test]
    fn destination_config_reads_camel_case_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"apiKey":"k","satelliteURL":"sat:7777","bucketName":"backup",
                "uploadPath":"zenko","encryptionPassphrase":"p","serializedScope":"",
                "disallowReads":"false","disallowWrites":"true","disallowDeletes":"junk"}}"#
        )
        .unwrap();
        let cfg = load_destination_config(file.path()).unwrap();
        assert_eq!(cfg.satellite, "sat:7777");
        assert_eq!(cfg.bucket, "backup");
        let caveat = cfg.caveat();
        assert!(!caveat.disallow_reads);
        assert!(caveat.disallow_writes);
        assert!(!caveat.disallow_deletes);
    }

    #[test]
    fn source_config_accepts_both_endpoint_spellings() {
        let a: SourceConfig = serde_json::from_str(r#"{"zenkoEndpoint":"z:8000"}"#).unwrap();
        let b: SourceConfig = serde_json::from_str(r#"{"endpoint":"z:8000"}"#).unwrap();
        assert_eq!(a.endpoint, "z:8000");
        assert_eq!(a, b);
        assert_eq!(a.s3().region, DEFAULT_REGION);
    }

    #[test]
    fn missing_file_is_fatal_but_malformed_is_tolerated() {
        let missing = load_json::<SourceConfig>(Path::new("/nonexistent/zenko.json"));
        assert!(matches!(missing, Err(TransferError::Config { .. })));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let cfg = load_json::<SourceConfig>(file.path()).unwrap();
        assert_eq!(cfg, SourceConfig::default());
    }
}
