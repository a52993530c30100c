//! Issuer platform settings: source repository, database, cache and API.

use serde::{Deserialize, Serialize};

/// Source repository the platform is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Remote clone URL.
    pub url: String,

    /// Pinned branch.
    pub branch: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: "https://github.com/0xPolygonID/issuer-node.git".to_string(),
            branch: "main".to_string(),
        }
    }
}

/// PostgreSQL settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Server host.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Database name.
    pub name: String,

    /// Dedicated role owning the database.
    pub user: String,

    /// Password of the dedicated role.
    pub password: String,

    /// OS account allowed to run administrative statements.
    pub admin_user: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "platformid".to_string(),
            user: "polygonid".to_string(),
            password: "strongpasswordapp".to_string(),
            admin_user: "postgres".to_string(),
        }
    }
}

impl DatabaseConfig {
    /// Returns the connection string handed to the platform binaries.
    pub fn dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode=disable",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

/// Redis settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Server host.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Logical database index.
    pub db: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 1,
        }
    }
}

impl CacheConfig {
    /// Returns the cache connection string.
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

/// Issuer platform API and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Public URL of the API server.
    pub server_url: String,

    /// Listen port of the API server.
    pub server_port: u16,

    /// Basic-auth user for the API.
    pub api_user: String,

    /// Basic-auth password for the API.
    pub api_password: String,

    /// IPFS gateway used for schema fetches.
    pub ipfs_gateway: String,

    /// Platform log level (slog numeric levels).
    pub log_level: i32,

    /// Platform log mode (1 = text, 2 = json).
    pub log_mode: u8,

    /// RPC endpoint of the Polygon Amoy network.
    pub amoy_rpc_url: String,

    /// RPC endpoint of the Privado main network.
    pub privado_rpc_url: String,

    /// Payload used by `create-identity`.
    pub identity: IdentityDefaults,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:3001".to_string(),
            server_port: 3001,
            api_user: "user-issuer".to_string(),
            api_password: "password-issuer".to_string(),
            ipfs_gateway: "https://ipfs.io".to_string(),
            log_level: -4,
            log_mode: 2,
            amoy_rpc_url: "https://rpc-amoy.polygon.technology".to_string(),
            privado_rpc_url: "https://rpc-mainnet.privado.id".to_string(),
            identity: IdentityDefaults::default(),
        }
    }
}

/// DID metadata sent when creating an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityDefaults {
    /// DID method.
    pub method: String,

    /// Blockchain name.
    pub blockchain: String,

    /// Network name.
    pub network: String,

    /// Key type.
    #[serde(rename = "type")]
    pub key_type: String,
}

impl Default for IdentityDefaults {
    fn default() -> Self {
        Self {
            method: "iden3".to_string(),
            blockchain: "privado".to_string(),
            network: "main".to_string(),
            key_type: "BJJ".to_string(),
        }
    }
}
