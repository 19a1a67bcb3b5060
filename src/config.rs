use std::{env, str::FromStr};

use deck_server::DEFAULT_PORT;

use crate::DeckError;

pub const PORT_VAR: &str = "DECK_SERVER_PORT";
pub const DATABASE_URL_VAR: &str = "DECK_DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "DECK_DATABASE_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Settings of the deck process, read from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeckConfig {
    pub port: u16,
    /// Without a database url, everything is kept in memory
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl DeckConfig {
    pub fn from_env() -> Result<Self, DeckError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    fn from_vars<F>(var: F) -> Result<Self, DeckError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            port: parse(PORT_VAR, var(PORT_VAR), DEFAULT_PORT)?,
            database_url: var(DATABASE_URL_VAR).filter(|url| !url.is_empty()),
            max_connections: parse(
                MAX_CONNECTIONS_VAR,
                var(MAX_CONNECTIONS_VAR),
                DEFAULT_MAX_CONNECTIONS,
            )?,
        })
    }
}

fn parse<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, DeckError>
where
    T: FromStr,
{
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| DeckError::Config { name, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<DeckConfig, DeckError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        DeckConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();

        assert_eq!(config.port, 9050);
        assert_eq!(config.database_url, None);
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            (PORT_VAR, "8080"),
            (DATABASE_URL_VAR, "postgres://localhost/deck"),
            (MAX_CONNECTIONS_VAR, "12"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/deck")
        );
        assert_eq!(config.max_connections, 12);
    }

    #[test]
    fn test_invalid_port() {
        let error = config(&[(PORT_VAR, "lots")]).unwrap_err();
        assert!(matches!(error, DeckError::Config { name: PORT_VAR, .. }));
    }
}
