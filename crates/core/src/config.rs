//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Per-request deadline in seconds. In-flight store I/O is dropped when it expires.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, restrict this endpoint at the network level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// Get the request deadline as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Bootstrap administrator account.
///
/// On startup the user is created if missing. If the configured hash differs
/// from the stored one, the stored hash is replaced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Username of the bootstrap account.
    pub username: String,
    /// Argon2id password hash in PHC string format.
    /// Generate with `custody_core::password::hash_password`.
    pub password_hash: String,
}

/// Where evidence blobs are kept.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// One directory per case under `path`.
    Filesystem { path: PathBuf },
    /// One key prefix per case inside an S3-compatible bucket.
    S3(S3StorageConfig),
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/evidence"),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("storage.path must not be empty".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
            StorageConfig::S3(s3) => s3.validate(),
        }
    }
}

/// S3-compatible bucket settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct S3StorageConfig {
    pub bucket: String,
    /// Custom endpoint such as `minio:9000`. Bare `host:port` means plain HTTP.
    pub endpoint: Option<String>,
    /// Defaults to `us-east-1`.
    pub region: Option<String>,
    /// Key prefix shared by every case in the bucket.
    pub prefix: Option<String>,
    /// Static credentials. Both or neither; without them the ambient AWS
    /// credential chain is used.
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Address objects as `endpoint/bucket/key`. MinIO needs this.
    #[serde(default)]
    pub force_path_style: bool,
}

impl S3StorageConfig {
    pub const DEFAULT_REGION: &'static str = "us-east-1";

    pub fn region(&self) -> &str {
        self.region.as_deref().unwrap_or(Self::DEFAULT_REGION)
    }

    /// The configured key/secret pair, if any.
    pub fn static_credentials(&self) -> Result<Option<(&str, &str)>, String> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Ok(Some((id, secret))),
            (None, None) => Ok(None),
            _ => Err(
                "s3 config requires both access_key_id and secret_access_key when either is set"
                    .to_string(),
            ),
        }
    }

    /// Prefix without surrounding slashes, or `None` when blank.
    pub fn normalized_prefix(&self) -> Option<String> {
        self.prefix
            .as_deref()
            .map(|p| p.trim_matches('/'))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.bucket.is_empty() {
            return Err("storage.bucket must not be empty".to_string());
        }
        self.static_credentials().map(|_| ())
    }
}

/// TLS policy for PostgreSQL connections.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Where case, evidence and account records are kept.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// Single-file SQLite database.
    Sqlite {
        path: PathBuf,
        /// Queries slower than this are logged. They are not cancelled.
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
    Postgres(PostgresConfig),
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(60)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres(pg) => pg.target().map(|_| ()),
        }
    }
}

/// PostgreSQL connection settings.
///
/// Either `url`, or `host` plus `database`. The individual fields let the
/// password come from `CUSTODY_METADATA__PASSWORD` instead of a URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    #[serde(default = "default_pg_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    #[serde(default)]
    pub ssl_mode: PgSslMode,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Server-side `statement_timeout`. PostgreSQL cancels queries past it.
    #[serde(default = "default_statement_timeout_ms")]
    pub statement_timeout_ms: Option<u64>,
}

fn default_pg_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    10
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

/// The database a [`PostgresConfig`] points at.
#[derive(Debug, PartialEq, Eq)]
pub enum PostgresTarget<'a> {
    Url(&'a str),
    Host { host: &'a str, database: &'a str },
}

impl PostgresConfig {
    /// Settings for a connection URL, with default pool and timeout.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            host: None,
            port: default_pg_port(),
            username: None,
            password: None,
            database: None,
            ssl_mode: PgSslMode::default(),
            max_connections: default_max_connections(),
            statement_timeout_ms: default_statement_timeout_ms(),
        }
    }

    /// Resolve the target. A URL wins over individual fields.
    pub fn target(&self) -> Result<PostgresTarget<'_>, String> {
        match (&self.url, &self.host, &self.database) {
            (Some(url), _, _) => Ok(PostgresTarget::Url(url)),
            (None, Some(host), Some(database)) => Ok(PostgresTarget::Host { host, database }),
            (None, Some(_), None) => Err(
                "postgres config requires 'database' when using individual fields".to_string(),
            ),
            (None, None, _) => {
                Err("postgres config requires either 'url' or 'host' + 'database'".to_string())
            }
        }
    }
}

/// Token issuance and verification settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authorization scheme expected before the token, matched exactly.
    #[serde(default = "default_auth_scheme")]
    pub scheme: String,
    /// Lifetime of issued tokens in seconds.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Source of the token signing key.
    #[serde(default)]
    pub signing_key: KeyConfig,
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

fn default_token_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            scheme: default_auth_scheme(),
            token_ttl_secs: default_token_ttl_secs(),
            signing_key: KeyConfig::default(),
        }
    }
}

impl AuthConfig {
    /// Get the token lifetime as a Duration.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scheme.is_empty() || self.scheme.contains(char::is_whitespace) {
            return Err("auth.scheme must be a single non-empty word".to_string());
        }
        if self.token_ttl_secs == 0 {
            return Err("auth.token_ttl_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Signing key source configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KeyConfig {
    /// Key stored in a file.
    File {
        /// Path to the key file.
        path: PathBuf,
    },
    /// Key stored in environment variable.
    Env {
        /// Environment variable name.
        var: String,
    },
    /// Key provided directly as a value (NOT recommended for production).
    Value {
        /// Base64-encoded key.
        key: String,
    },
    /// Generate an ephemeral key at startup. Tokens do not survive restarts.
    #[default]
    Generate,
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Token configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Bootstrap administrator (optional).
    pub admin: Option<AdminConfig>,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses filesystem storage, SQLite metadata
    /// and an ephemeral signing key.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            auth: AuthConfig::default(),
            admin: None,
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.storage.validate()?;
        self.metadata.validate()?;
        self.auth.validate()?;
        if self.server.request_timeout_secs == 0 {
            return Err("server.request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}
