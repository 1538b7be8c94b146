use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    /// `memory://` runs against the in-process store.
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Auth {
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    pub csrf_secret: String,
    #[serde(default = "default_argon2_memory_kib")]
    pub argon2_memory_kib: u32,
    #[serde(default = "default_argon2_iterations")]
    pub argon2_iterations: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Mail {
    /// Transactional mail relay; mail is only logged when unset.
    pub relay_url: Option<String>,
    pub api_key: Option<String>,
    pub sender: String,
    pub developer_email: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Frontend {
    pub link: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Tokens {
    #[serde(default = "default_verification_ttl")]
    pub verification_ttl_minutes: i64,
    #[serde(default = "default_reset_ttl")]
    pub reset_ttl_minutes: i64,
}

impl Default for Tokens {
    fn default() -> Self {
        Tokens {
            verification_ttl_minutes: default_verification_ttl(),
            reset_ttl_minutes: default_reset_ttl(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Accounts {
    pub demo_balance: Decimal,
}

impl Default for Accounts {
    fn default() -> Self {
        Accounts {
            demo_balance: Decimal::from(10_000),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Prices {
    pub enabled: bool,
    pub provider_url: String,
    pub interval_secs: u64,
}

impl Default for Prices {
    fn default() -> Self {
        Prices {
            enabled: false,
            provider_url: "https://api.coingecko.com".to_string(),
            interval_secs: 300,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    pub database: Database,
    pub auth: Auth,
    pub mail: Mail,
    pub frontend: Frontend,
    #[serde(default)]
    pub tokens: Tokens,
    #[serde(default)]
    pub accounts: Accounts,
    #[serde(default)]
    pub prices: Prices,
}

impl Settings {
    /// Reads the TOML file, then lets `COINVEST__SECTION__KEY` variables override it.
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("COINVEST").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_token_ttl_hours() -> i64 {
    24
}

fn default_argon2_memory_kib() -> u32 {
    19_456
}

fn default_argon2_iterations() -> u32 {
    2
}

fn default_verification_ttl() -> i64 {
    60
}

fn default_reset_ttl() -> i64 {
    30
}
