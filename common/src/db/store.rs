// INI-backed store of connection parameters, one section per database

use crate::db::params::DEFAULT_PORT;
use crate::errors::DatabaseError;
use config::{Config, File, FileFormat, Map, Source, Value};
use ini::Ini;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Section read when no section matches the requested database name
pub const FALLBACK_SECTION: &str = "database";

/// Connection fields read back from the store
#[derive(Clone, PartialEq, Eq)]
pub struct StoredConnection {
    /// Section the fields were read from
    pub section: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for StoredConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredConnection")
            .field("section", &self.section)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Create or update section `[name]` with host/port/user/password.
///
/// Other keys in the section and all other sections are kept as they are.
pub fn save_connection(
    path: &Path,
    name: &str,
    host: &str,
    port: u16,
    user: &str,
    password: &str,
) -> Result<(), DatabaseError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConfigPersistFailed(format!(
                    "Failed to create {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let mut ini = if path.exists() {
        Ini::load_from_file(path).map_err(|e| {
            DatabaseError::ConfigPersistFailed(format!("Failed to read {}: {}", path.display(), e))
        })?
    } else {
        Ini::new()
    };

    ini.with_section(Some(name))
        .set("host", host)
        .set("port", port.to_string())
        .set("user", user)
        .set("password", password);

    ini.write_to_file(path).map_err(|e| {
        DatabaseError::ConfigPersistFailed(format!("Failed to write {}: {}", path.display(), e))
    })?;

    info!(section = name, path = %path.display(), "Saved database config");
    Ok(())
}

/// Read the connection fields for `name`.
///
/// Looks for `[name]` first (exact, then case-insensitive), then falls back
/// to `[database]`. Port defaults to 3306.
pub fn load_connection(path: &Path, name: &str) -> Result<StoredConnection, DatabaseError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        DatabaseError::ConfigurationMissing(format!(
            "Cannot read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let root = Config::builder()
        .add_source(File::from_str(&contents, FileFormat::Ini))
        .build()
        .map_err(|e| {
            DatabaseError::InvalidConfiguration(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))
        })?
        .collect()?;

    let (section, fields) = find_section(&root, name).ok_or_else(|| {
        DatabaseError::ConfigurationMissing(format!(
            "No config section for [{}] or [{}] in {}",
            name,
            FALLBACK_SECTION,
            path.display()
        ))
    })?;
    debug!(section = %section, requested = name, "Resolved configuration section");

    let host = string_field(&fields, "host")?;
    let user = string_field(&fields, "user")?;
    let password = string_field(&fields, "password")?;

    let (host, user, password) = match (host, user, password) {
        (Some(host), Some(user), Some(password)) => (host, user, password),
        (None, None, None) => {
            return Err(DatabaseError::ConfigurationMissing(format!(
                "Section [{}] has no host/user/password",
                section
            )))
        }
        (host, user, password) => {
            let missing: Vec<&str> = [
                ("host", host.is_none()),
                ("user", user.is_none()),
                ("password", password.is_none()),
            ]
            .iter()
            .filter(|(_, absent)| *absent)
            .map(|(key, _)| *key)
            .collect();
            return Err(DatabaseError::InvalidConfiguration(format!(
                "Section [{}] is missing {}",
                section,
                missing.join(", ")
            )));
        }
    };

    let port = match fields.get("port") {
        None => DEFAULT_PORT,
        Some(value) => {
            let raw = value.clone().into_int().map_err(|e| {
                DatabaseError::InvalidConfiguration(format!(
                    "Section [{}] has an invalid port: {}",
                    section, e
                ))
            })?;
            u16::try_from(raw).map_err(|_| {
                DatabaseError::InvalidConfiguration(format!(
                    "Section [{}] port {} is out of range",
                    section, raw
                ))
            })?
        }
    };

    Ok(StoredConnection {
        section,
        host,
        port,
        user,
        password,
    })
}

fn find_section(root: &Map<String, Value>, name: &str) -> Option<(String, Map<String, Value>)> {
    let as_section = |key: &String, value: &Value| {
        value
            .clone()
            .into_table()
            .ok()
            .map(|table| (key.clone(), table))
    };

    root.get_key_value(name)
        .and_then(|(k, v)| as_section(k, v))
        .or_else(|| {
            root.iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(name))
                .find_map(|(k, v)| as_section(k, v))
        })
        .or_else(|| {
            root.iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case(FALLBACK_SECTION))
                .find_map(|(k, v)| as_section(k, v))
        })
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Result<Option<String>, DatabaseError> {
    fields
        .get(key)
        .map(|value| {
            value.clone().into_string().map_err(|e| {
                DatabaseError::InvalidConfiguration(format!("Field '{}': {}", key, e))
            })
        })
        .transpose()
}
