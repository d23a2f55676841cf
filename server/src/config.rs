use std::env;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_hours", &self.token_ttl_hours)
            .finish()
    }
}

/// Longest accepted token lifetime: one year.
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .unwrap_or_else(|| default.to_string())
        .parse()
        .map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

impl Config {
    /// Reads `HANGAR_*` variables, loading a `.env` file first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("HANGAR_JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("HANGAR_JWT_SECRET"))?;

        let token_ttl_hours: i64 = parse(&lookup, "HANGAR_TOKEN_TTL_HOURS", "24")?;
        if !(1..=MAX_TOKEN_TTL_HOURS).contains(&token_ttl_hours) {
            return Err(ConfigError::Invalid {
                name: "HANGAR_TOKEN_TTL_HOURS",
                reason: format!("must be between 1 and {}", MAX_TOKEN_TTL_HOURS),
            });
        }

        Ok(Self {
            host: lookup("HANGAR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse(&lookup, "HANGAR_PORT", "3000")?,
            db_path: lookup("HANGAR_DB_PATH").unwrap_or_else(|| "hangar.db".into()),
            jwt_secret,
            token_ttl_hours,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("HANGAR_JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert_eq!(config.db_path, "hangar.db");
        assert_eq!(config.token_ttl_hours, 24);
    }

    #[test]
    fn test_secret_is_required() {
        assert!(matches!(
            load(&[]),
            Err(ConfigError::Missing("HANGAR_JWT_SECRET"))
        ));
        assert!(matches!(
            load(&[("HANGAR_JWT_SECRET", "   ")]),
            Err(ConfigError::Missing("HANGAR_JWT_SECRET"))
        ));
    }

    #[test]
    fn test_token_ttl_bounds() {
        for ttl in ["0", "-5", "8761", "1000000000000"] {
            let result = load(&[("HANGAR_JWT_SECRET", "s3cret"), ("HANGAR_TOKEN_TTL_HOURS", ttl)]);
            assert!(
                matches!(result, Err(ConfigError::Invalid { name: "HANGAR_TOKEN_TTL_HOURS", .. })),
                "ttl {} should be rejected",
                ttl
            );
        }

        let config = load(&[("HANGAR_JWT_SECRET", "s3cret"), ("HANGAR_TOKEN_TTL_HOURS", "8760")]).unwrap();
        assert_eq!(config.token_ttl_hours, MAX_TOKEN_TTL_HOURS);
    }

    #[test]
    fn test_invalid_port() {
        let result = load(&[("HANGAR_JWT_SECRET", "s3cret"), ("HANGAR_PORT", "70000")]);
        assert!(matches!(result, Err(ConfigError::Invalid { name: "HANGAR_PORT", .. })));
    }
}
