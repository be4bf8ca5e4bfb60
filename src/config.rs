use crate::{
    connector::{ModelDefinition, options::StorageOptions},
    services::{
        client_factory::{BuiltinProvider, ClientOptions, DEFAULT_PROVIDER, DEFAULT_ROOT},
        transfer::NameConflict,
    },
};
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::{env, fmt, str::FromStr};

const ENV_PREFIX: &str = "STORAGE_CONNECTOR_";

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Mount point of the model routes.
    pub model_path: String,
    pub model_name: String,
    pub id_name: String,
    pub provider: String,
    pub root: String,
    pub container: String,
    pub acl: Option<String>,
    pub allowed_content_types: Option<Vec<String>>,
    pub max_file_size: Option<u64>,
    pub max_fields_size: Option<u64>,
    pub name_conflict: Option<NameConflict>,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub s3_access_key_id: Option<String>,
    pub s3_secret_access_key: Option<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("model_path", &self.model_path)
            .field("model_name", &self.model_name)
            .field("id_name", &self.id_name)
            .field("provider", &self.provider)
            .field("root", &self.root)
            .field("container", &self.container)
            .field("acl", &self.acl)
            .field("allowed_content_types", &self.allowed_content_types)
            .field("max_file_size", &self.max_file_size)
            .field("max_fields_size", &self.max_fields_size)
            .field("name_conflict", &self.name_conflict)
            .field("s3_bucket", &self.s3_bucket)
            .field("s3_region", &self.s3_region)
            .field("s3_endpoint", &self.s3_endpoint)
            .field("s3_access_key_id", &self.s3_access_key_id)
            .field(
                "s3_secret_access_key",
                &self.s3_secret_access_key.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

/// Command-line + environment configuration.
///
/// Every flag falls back to `STORAGE_CONNECTOR_<FLAG>` (e.g. `--max-file-size`
/// reads `STORAGE_CONNECTOR_MAX_FILE_SIZE`).
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "File storage exposed as a read-only model")]
pub struct Args {
    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(long)]
    pub port: Option<u16>,

    /// Path the model is mounted at
    #[arg(long)]
    pub model_path: Option<String>,

    /// Model name reported by the data source
    #[arg(long)]
    pub model_name: Option<String>,

    /// Id property of the model
    #[arg(long)]
    pub id_name: Option<String>,

    /// Storage provider: filesystem, memory or s3
    #[arg(long)]
    pub provider: Option<String>,

    /// Provider root (directory or key prefix)
    #[arg(long)]
    pub root: Option<String>,

    /// Container files are stored in
    #[arg(long)]
    pub container: Option<String>,

    /// ACL attached to uploads
    #[arg(long)]
    pub acl: Option<String>,

    /// Comma-separated list of accepted content types
    #[arg(long)]
    pub allowed_content_types: Option<String>,

    /// Maximum bytes per uploaded file
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Maximum bytes of non-file form fields
    #[arg(long)]
    pub max_fields_size: Option<u64>,

    /// What to do when an upload name is taken: makeUnique or overwrite
    #[arg(long)]
    pub name_conflict: Option<String>,

    #[arg(long)]
    pub s3_bucket: Option<String>,

    #[arg(long)]
    pub s3_region: Option<String>,

    #[arg(long)]
    pub s3_endpoint: Option<String>,

    #[arg(long)]
    pub s3_access_key_id: Option<String>,

    #[arg(long)]
    pub s3_secret_access_key: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::merge(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge parsed args over values found through `lookup`.
    pub fn merge(args: Args, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let text = |arg: Option<String>, key: &str| {
            arg.or_else(|| lookup(&format!("{}{}", ENV_PREFIX, key)))
                .filter(|value| !value.trim().is_empty())
        };
        let parsed = |arg: Option<String>, key: &str| -> Result<Option<u64>> {
            text(arg, key).map(|raw| parse_value(&raw, key)).transpose()
        };

        let port = match args.port {
            Some(port) => port,
            None => parsed(None, "PORT")?
                .map(u16::try_from)
                .transpose()
                .context("STORAGE_CONNECTOR_PORT out of range")?
                .unwrap_or(3000),
        };

        let name_conflict = text(args.name_conflict, "NAME_CONFLICT")
            .map(|raw| NameConflict::from_str(&raw).map_err(|err| anyhow!(err)))
            .transpose()?;

        Ok(Self {
            host: text(args.host, "HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            model_path: text(args.model_path, "MODEL_PATH")
                .unwrap_or_else(|| "/attachments".into()),
            model_name: text(args.model_name, "MODEL_NAME").unwrap_or_else(|| "Attachment".into()),
            id_name: text(args.id_name, "ID_NAME").unwrap_or_else(|| "id".into()),
            provider: text(args.provider, "PROVIDER").unwrap_or_else(|| DEFAULT_PROVIDER.into()),
            root: text(args.root, "ROOT").unwrap_or_else(|| DEFAULT_ROOT.into()),
            container: text(args.container, "CONTAINER").unwrap_or_else(|| "attachments".into()),
            acl: text(args.acl, "ACL"),
            allowed_content_types: text(args.allowed_content_types, "ALLOWED_CONTENT_TYPES")
                .map(|raw| split_list(&raw)),
            max_file_size: match args.max_file_size {
                Some(size) => Some(size),
                None => parsed(None, "MAX_FILE_SIZE")?,
            },
            max_fields_size: match args.max_fields_size {
                Some(size) => Some(size),
                None => parsed(None, "MAX_FIELDS_SIZE")?,
            },
            name_conflict,
            s3_bucket: text(args.s3_bucket, "S3_BUCKET"),
            s3_region: text(args.s3_region, "S3_REGION"),
            s3_endpoint: text(args.s3_endpoint, "S3_ENDPOINT"),
            s3_access_key_id: text(args.s3_access_key_id, "S3_ACCESS_KEY_ID"),
            s3_secret_access_key: text(args.s3_secret_access_key, "S3_SECRET_ACCESS_KEY"),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the client will end up on the local filesystem, including the
    /// fallback taken for unknown provider names.
    pub fn is_filesystem(&self) -> bool {
        BuiltinProvider::from_name(&self.provider).unwrap_or(BuiltinProvider::Filesystem)
            == BuiltinProvider::Filesystem
    }

    pub fn model(&self) -> ModelDefinition {
        ModelDefinition::new(self.model_name.clone()).with_id_name(self.id_name.clone())
    }

    pub fn to_storage_options(&self) -> StorageOptions {
        let client = ClientOptions {
            provider: Some(self.provider.clone()),
            root: Some(self.root.clone()),
            bucket: self.s3_bucket.clone(),
            region: self.s3_region.clone(),
            endpoint: self.s3_endpoint.clone(),
            access_key_id: self.s3_access_key_id.clone(),
            secret_access_key: self.s3_secret_access_key.clone(),
        };
        let mut options = StorageOptions::new(client, self.container.clone());
        options.acl = self.acl.clone();
        options.allowed_content_types = self.allowed_content_types.clone();
        options.max_file_size = self.max_file_size;
        options.max_fields_size = self.max_fields_size;
        options.name_conflict = self.name_conflict;
        options
    }
}

fn parse_value(raw: &str, key: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("parsing {}{} value `{}`", ENV_PREFIX, key, raw))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
