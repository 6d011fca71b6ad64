use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, anyhow};
use jsonwebtoken::Algorithm;
use tracing::{info, warn};

/// Layers `config/common.env`, the profile file and `.secrets.env` onto the
/// process environment. Later files win.
pub fn load_environment() -> anyhow::Result<()> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> anyhow::Result<()> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)
        .with_context(|| format!("failed to load environment file {}", path))?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub token_ttl_hours: i64,
    pub activity_log_path: PathBuf,
}

impl AppConfig {
    pub const DEFAULT_DATABASE_URL: &'static str = "sqlite://quiz.db?mode=rwc";
    pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 8;
    pub const DEFAULT_ACTIVITY_LOG_PATH: &'static str = "log.ndjson";

    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = dotenvy::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_DATABASE_URL.to_string());

        let jwt_secret = dotenvy::var("JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or_else(|| anyhow!("JWT_SECRET must be set to a non-empty value"))?;

        let jwt_algorithm = match dotenvy::var("JWT_ALGORITHM") {
            Ok(name) => parse_algorithm(&name)?,
            Err(_) => Algorithm::HS256,
        };

        let token_ttl_hours = match dotenvy::var("TOKEN_TTL_HOURS") {
            Ok(raw) => {
                let hours: i64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("TOKEN_TTL_HOURS is not an integer: {}", raw))?;
                if hours <= 0 {
                    return Err(anyhow!("TOKEN_TTL_HOURS must be positive, got {}", hours));
                }
                hours
            }
            Err(_) => Self::DEFAULT_TOKEN_TTL_HOURS,
        };

        let activity_log_path = dotenvy::var("ACTIVITY_LOG_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .unwrap_or_else(|| Self::DEFAULT_ACTIVITY_LOG_PATH.to_string())
            .into();

        Ok(Self {
            database_url,
            jwt_secret,
            jwt_algorithm,
            token_ttl_hours,
            activity_log_path,
        })
    }
}

fn parse_algorithm(name: &str) -> anyhow::Result<Algorithm> {
    let algorithm = Algorithm::from_str(name.trim())
        .map_err(|_| anyhow!("JWT_ALGORITHM is not a known algorithm: {}", name))?;

    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(anyhow!(
            "JWT_ALGORITHM must be an HMAC algorithm (HS256, HS384, HS512), got {}",
            name
        )),
    }
}

