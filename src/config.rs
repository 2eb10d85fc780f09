use std::env;
use std::path::PathBuf;

use crate::error::{AppError, Result};

const DEFAULT_BIND: &str = "127.0.0.1:1227";
const DEFAULT_SESSION_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Appwrite,
    Memory,
}

/// Connection details for the hosted document database and bucket.
#[derive(Debug, Clone)]
pub struct AppwriteConfig {
    pub endpoint: String,
    pub project_id: String,
    pub database_id: String,
    pub students_collection_id: String,
    pub workshops_collection_id: String,
    pub bucket_id: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub backend: BackendKind,
    pub appwrite: Option<AppwriteConfig>,
    pub admin_email: String,
    pub admin_password_hash: String,
    pub fonts_dir: Option<PathBuf>,
    pub session_hours: i64,
}

impl AppConfig {
    /// Reads `.env` (if present) and then the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenv::dotenv() {
            tracing::debug!("No .env file loaded: {}", e);
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{} is not set", key)))
        };

        let backend = match lookup("CERTGEN_BACKEND").as_deref() {
            None | Some("appwrite") => BackendKind::Appwrite,
            Some("memory") => BackendKind::Memory,
            Some(other) => {
                return Err(AppError::Config(format!("Unknown CERTGEN_BACKEND '{}'", other)))
            }
        };

        let appwrite = match backend {
            BackendKind::Appwrite => Some(AppwriteConfig {
                endpoint: require("APPWRITE_ENDPOINT")?.trim_end_matches('/').to_string(),
                project_id: require("APPWRITE_PROJECT_ID")?,
                database_id: require("APPWRITE_DATABASE_ID")?,
                students_collection_id: require("APPWRITE_STUDENTS_COLLECTION_ID")?,
                workshops_collection_id: require("APPWRITE_WORKSHOPS_COLLECTION_ID")?,
                bucket_id: require("APPWRITE_BUCKET_ID")?,
                api_key: require("APPWRITE_API_KEY")?,
            }),
            BackendKind::Memory => None,
        };

        let session_hours = match lookup("CERTGEN_SESSION_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .ok_or_else(|| AppError::Config(format!("Invalid CERTGEN_SESSION_HOURS '{}'", raw)))?,
            None => DEFAULT_SESSION_HOURS,
        };

        Ok(Self {
            bind: lookup("CERTGEN_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            backend,
            appwrite,
            admin_email: require("CERTGEN_ADMIN_EMAIL")?,
            admin_password_hash: require("CERTGEN_ADMIN_PASSWORD_HASH")?,
            fonts_dir: lookup("CERTGEN_FONTS_DIR").map(PathBuf::from),
            session_hours,
        })
    }
}
