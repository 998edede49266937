use anyhow::{Context, Result, anyhow};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Which message bus backend to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusKind {
    /// In-process transport; every role must live in this process.
    Memory,
    /// External NATS server.
    Nats,
}

/// Which responders (and servers) this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Role {
    All,
    Gateway,
    Catalog,
    Auth,
    Users,
}

impl Role {
    pub fn runs_gateway(self) -> bool {
        matches!(self, Role::All | Role::Gateway)
    }

    pub fn runs_catalog(self) -> bool {
        matches!(self, Role::All | Role::Catalog)
    }

    pub fn runs_auth(self) -> bool {
        matches!(self, Role::All | Role::Auth)
    }

    pub fn runs_users(self) -> bool {
        matches!(self, Role::All | Role::Users)
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub bus: BusKind,
    pub nats_url: String,
    pub role: Role,
    pub request_timeout: Duration,
    pub store_timeout: Duration,
    pub max_message_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Song catalog and blob streaming service")]
pub struct Args {
    /// Host to bind to (overrides SONGBIRD_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides SONGBIRD_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where blob chunks are stored (overrides SONGBIRD_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides SONGBIRD_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Message bus backend (overrides SONGBIRD_BUS)
    #[arg(long, value_enum)]
    pub bus: Option<BusKind>,

    /// NATS server URL (overrides SONGBIRD_NATS_URL)
    #[arg(long)]
    pub nats_url: Option<String>,

    /// Role this process runs (overrides SONGBIRD_ROLE)
    #[arg(long, value_enum)]
    pub role: Option<Role>,

    /// Bus request timeout in seconds (overrides SONGBIRD_REQUEST_TIMEOUT_SECS)
    #[arg(long)]
    pub request_timeout_secs: Option<u64>,

    /// Store operation timeout in seconds (overrides SONGBIRD_STORE_TIMEOUT_SECS)
    #[arg(long)]
    pub store_timeout_secs: Option<u64>,

    /// Maximum request/response size in bytes (overrides SONGBIRD_MAX_MESSAGE_BYTES)
    #[arg(long)]
    pub max_message_bytes: Option<usize>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: DEFAULT_PORT,
            storage_dir: "./data/blobs".into(),
            database_url: "sqlite://./data/meta/songbird.db".into(),
            bus: BusKind::Memory,
            nats_url: "nats://127.0.0.1:4222".into(),
            role: Role::All,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            store_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let defaults = Self::default();

        // --- Environment fallback ---
        let env_host = env::var("SONGBIRD_HOST").unwrap_or(defaults.host);
        let env_port = env_parse("SONGBIRD_PORT")?.unwrap_or(defaults.port);
        let env_storage = env::var("SONGBIRD_STORAGE_DIR").unwrap_or(defaults.storage_dir);
        let env_db = env::var("SONGBIRD_DATABASE_URL").unwrap_or(defaults.database_url);
        let env_bus = env_value_enum::<BusKind>("SONGBIRD_BUS")?.unwrap_or(defaults.bus);
        let env_nats = env::var("SONGBIRD_NATS_URL").unwrap_or(defaults.nats_url);
        let env_role = env_value_enum::<Role>("SONGBIRD_ROLE")?.unwrap_or(defaults.role);
        let env_request_timeout = env_parse("SONGBIRD_REQUEST_TIMEOUT_SECS")?
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
        let env_store_timeout =
            env_parse("SONGBIRD_STORE_TIMEOUT_SECS")?.unwrap_or(DEFAULT_STORE_TIMEOUT_SECS);
        let env_max_bytes =
            env_parse("SONGBIRD_MAX_MESSAGE_BYTES")?.unwrap_or(defaults.max_message_bytes);

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            bus: args.bus.unwrap_or(env_bus),
            nats_url: args.nats_url.unwrap_or(env_nats),
            role: args.role.unwrap_or(env_role),
            request_timeout: Duration::from_secs(
                args.request_timeout_secs.unwrap_or(env_request_timeout),
            ),
            store_timeout: Duration::from_secs(
                args.store_timeout_secs.unwrap_or(env_store_timeout),
            ),
            max_message_bytes: args.max_message_bytes.unwrap_or(env_max_bytes),
        };

        cfg.validate()?;
        Ok((cfg, args.migrate))
    }

    /// Reject combinations that cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        if self.bus == BusKind::Memory && self.role != Role::All {
            return Err(anyhow!(
                "role `{:?}` needs a shared bus; the in-memory bus only supports `all`",
                self.role
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(anyhow!("max message size must be greater than zero"));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}

fn env_value_enum<T: ValueEnum>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(value) => T::from_str(&value, true)
            .map(Some)
            .map_err(|err| anyhow!("parsing {} value `{}`: {}", key, value, err)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
