use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug)]
pub struct Config {
    pub jwt_secret: String,
    pub message_key: [u8; 32],
    pub db_path: PathBuf,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("COURIER_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("COURIER_JWT_SECRET is unset or still a placeholder");
        }

        let message_key = get("COURIER_MESSAGE_KEY")
            .context("COURIER_MESSAGE_KEY is unset (base64, 32 bytes)")
            .and_then(|k| courier_crypto::keys::key_from_base64(&k).context("COURIER_MESSAGE_KEY"))?;

        let db_path = get("COURIER_DB_PATH").unwrap_or_else(|| "courier.db".into()).into();
        let host = get("COURIER_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("COURIER_PORT")
            .unwrap_or_else(|| "3001".into())
            .parse()
            .context("COURIER_PORT")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("bad listen address {}:{}", host, port))?;

        Ok(Self { jwt_secret, message_key, db_path, addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    fn key() -> String {
        courier_crypto::keys::key_to_base64(&[7u8; 32])
    }

    #[test]
    fn defaults_apply() {
        let k = key();
        let cfg = Config::from_lookup(lookup(&[
            ("COURIER_JWT_SECRET", "s3cret"),
            ("COURIER_MESSAGE_KEY", k.as_str()),
        ]))
        .unwrap();
        assert_eq!(cfg.addr.port(), 3001);
        assert_eq!(cfg.db_path, PathBuf::from("courier.db"));
        assert_eq!(cfg.message_key, [7u8; 32]);
    }

    #[test]
    fn placeholder_secret_refused() {
        let k = key();
        let res = Config::from_lookup(lookup(&[
            ("COURIER_JWT_SECRET", "dev-secret-change-me"),
            ("COURIER_MESSAGE_KEY", k.as_str()),
        ]));
        assert!(res.is_err());
    }

    #[test]
    fn missing_or_bad_key_refused() {
        assert!(Config::from_lookup(lookup(&[("COURIER_JWT_SECRET", "s3cret")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[
                ("COURIER_JWT_SECRET", "s3cret"),
                ("COURIER_MESSAGE_KEY", "c2hvcnQ="),
            ]))
            .is_err()
        );
    }
}
