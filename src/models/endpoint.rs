//! Connection endpoint model.
//!
//! An endpoint is parsed from a PostgreSQL URL with the `url` crate, so
//! credentials containing `:` or `@` survive as long as they are percent-encoded.

use crate::error::{SyncError, SyncResult};
use serde::Serialize;
use url::Url;

/// Default PostgreSQL port when the URL omits one.
pub const DEFAULT_PG_PORT: u16 = 5432;

/// Host assumed when the URL names neither a host nor a socket directory.
pub const DEFAULT_PG_HOST: &str = "localhost";

/// Which side of the sync an endpoint is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointRole {
    Source,
    Target,
}

impl std::fmt::Display for EndpointRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Target => write!(f, "target"),
        }
    }
}

/// A resolved database location.
#[derive(Clone)]
pub struct ConnectionEndpoint {
    pub role: EndpointRole,
    /// Full connection URL. Contains credentials - never log.
    connection_string: String,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub username: Option<String>,
}

impl ConnectionEndpoint {
    /// Parse an endpoint from a `postgres://` or `postgresql://` URL.
    pub fn parse(role: EndpointRole, connection_string: &str) -> SyncResult<Self> {
        let trimmed = connection_string.trim();
        if trimmed.is_empty() {
            return Err(SyncError::configuration(format!(
                "{} database URL is empty",
                role
            )));
        }

        let url = Url::parse(trimmed)
            .map_err(|e| SyncError::configuration(format!("Invalid {} URL: {}", role, e)))?;

        match url.scheme() {
            "postgres" | "postgresql" => {}
            other => {
                return Err(SyncError::configuration(format!(
                    "Unsupported {} URL scheme '{}': expected postgres:// or postgresql://",
                    role, other
                )));
            }
        }

        // An empty authority means a Unix socket, named by the `host` query parameter
        let host = match url.host_str().filter(|h| !h.is_empty()) {
            Some(host) => host.to_string(),
            None => url
                .query_pairs()
                .find(|(key, _)| key == "host")
                .map(|(_, value)| value.into_owned())
                .filter(|h| !h.is_empty())
                .unwrap_or_else(|| DEFAULT_PG_HOST.to_string()),
        };

        let database = url
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .map(String::from);

        let username = Some(url.username())
            .filter(|u| !u.is_empty())
            .map(String::from);

        Ok(Self {
            role,
            connection_string: trimmed.to_string(),
            host,
            port: url.port().unwrap_or(DEFAULT_PG_PORT),
            database,
            username,
        })
    }

    /// The raw connection string, for the driver only.
    pub fn connection_string(&self) -> &str {
        &self.connection_string
    }

    /// Whether both endpoints address the same database on the same server,
    /// however the URLs spell it.
    pub fn same_database(&self, other: &ConnectionEndpoint) -> bool {
        self.host.eq_ignore_ascii_case(&other.host)
            && self.port == other.port
            && self.database == other.database
    }

    /// Get a display-safe version of the connection string (password masked).
    pub fn masked(&self) -> String {
        match Url::parse(&self.connection_string) {
            Ok(mut url) => {
                if url.password().is_some() {
                    // Only fails for cannot-be-a-base URLs, which parse() already rejected.
                    let _ = url.set_password(Some("****"));
                }
                url.to_string()
            }
            Err(_) => format!("{}://****", self.role),
        }
    }
}

impl std::fmt::Debug for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEndpoint")
            .field("role", &self.role)
            .field("url", &self.masked())
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

impl std::fmt::Display for ConnectionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.role, self.masked())
    }
}
