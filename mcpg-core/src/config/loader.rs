//! Configuration loading and validation.
//!
//! # Sources
//!
//! - `--config <file>`: TOML (`[servers.<name>]` tables), or JSON when the
//!   file name ends in `.json`
//! - `--config-stdin`: a JSON document with `mcpServers` and `gateway`
//!
//! Both go through the same validation in [`build`].

use regex::Regex;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use super::error::ConfigError;
use super::schema::{
    BackendDefinition, GatewayConfig, GatewaySettings, HttpSpec, RawDocument, RawGateway,
    RawServer, StdioSpec, TransportSpec,
};

/// Environment passed to every containerized backend so that tools emit
/// plain, unbuffered output on a pipe.
const CONTAINER_BASE_ENV: [&str; 3] = ["NO_COLOR=1", "TERM=dumb", "PYTHONUNBUFFERED=1"];

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
// The pattern is known-valid and tested by test_patterns_compile().
static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
        .expect("BUG: ENV_VAR_PATTERN regex is invalid")
});

// SAFETY: see ENV_VAR_PATTERN.
static SERVER_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("BUG: SERVER_NAME_PATTERN regex is invalid")
});

/// Load a configuration file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, does not parse, or
/// fails validation.
pub fn load_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        parse_json(&content)
    } else {
        parse_toml(&content)
    }
}

/// Read a JSON configuration document from a reader (normally stdin).
pub fn load_from_reader<R: Read>(mut reader: R) -> Result<GatewayConfig, ConfigError> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .map_err(ConfigError::Stdin)?;
    parse_json(&content)
}

/// Parse and validate a JSON configuration document.
pub fn parse_json(content: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawDocument = serde_json::from_str(content)?;
    build(raw)
}

/// Parse and validate a TOML configuration document.
pub fn parse_toml(content: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawDocument = toml::from_str(content)?;
    build(raw)
}

/// Substitute `${VAR}` and `${VAR:-default}` references from the process environment.
///
/// `path` names the configuration field being expanded and is reported when
/// a required variable is missing.
pub fn substitute_env_vars(content: &str, path: &str) -> Result<String, ConfigError> {
    let mut missing = None;
    let expanded = ENV_VAR_PATTERN.replace_all(content, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => match caps.get(2) {
                Some(default) => default.as_str().to_string(),
                None => {
                    missing.get_or_insert_with(|| name.to_string());
                    String::new()
                }
            },
        }
    });

    match missing {
        Some(var) => Err(ConfigError::UndefinedEnvVar {
            var,
            path: path.to_string(),
        }),
        None => Ok(expanded.into_owned()),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn build(raw: RawDocument) -> Result<GatewayConfig, ConfigError> {
    if raw.mcp_servers.is_empty() {
        return Err(ConfigError::NoServers);
    }

    let servers = raw
        .mcp_servers
        .into_iter()
        .map(|(name, server)| build_server(name, server))
        .collect::<Result<Vec<_>, _>>()?;

    let gateway = build_gateway(raw.gateway.unwrap_or_default())?;

    tracing::debug!(servers = servers.len(), "configuration validated");
    Ok(GatewayConfig { servers, gateway })
}

fn validate_name(name: &str) -> Result<(), ConfigError> {
    if !crate::registry::is_namespace_safe(name) {
        return Err(ConfigError::ReservedSeparator {
            name: name.to_string(),
        });
    }
    if !SERVER_NAME_PATTERN.is_match(name) {
        return Err(ConfigError::InvalidServerName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn build_server(name: String, raw: RawServer) -> Result<BackendDefinition, ConfigError> {
    validate_name(&name)?;

    // "local" is kept as an alias for "stdio"; an absent type means stdio.
    let kind = raw.kind.clone().unwrap_or_default();
    let transport = match kind.as_str() {
        "" | "stdio" | "local" => TransportSpec::Stdio(build_stdio(&name, raw)?),
        "http" => TransportSpec::Http(build_http(&name, raw)?),
        other => {
            return Err(ConfigError::UnsupportedType {
                kind: other.to_string(),
                name,
            });
        }
    };

    Ok(BackendDefinition { name, transport })
}

fn expand_env_map(
    name: &str,
    section: &str,
    map: BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, ConfigError> {
    map.into_iter()
        .map(|(key, value)| {
            let path = format!("mcpServers.{name}.{section}.{key}");
            substitute_env_vars(&value, &path).map(|v| (key, v))
        })
        .collect()
}

fn build_stdio(name: &str, raw: RawServer) -> Result<StdioSpec, ConfigError> {
    let env = expand_env_map(name, "env", raw.env)?;

    match (raw.command, raw.container) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingFields {
            name: name.to_string(),
            first: "command",
            second: "container",
        }),
        (Some(command), None) if !command.trim().is_empty() => Ok(StdioSpec {
            command,
            args: raw.args,
            env,
            working_directory: raw.working_directory,
        }),
        (None, Some(image)) if !image.trim().is_empty() => {
            for mount in &raw.mounts {
                validate_mount(name, mount)?;
            }
            let args = container_args(
                &image,
                raw.entrypoint.as_deref(),
                &raw.mounts,
                &env,
                &raw.entrypoint_args,
            );
            Ok(StdioSpec {
                command: "docker".to_string(),
                args,
                // Container env travels as `-e` flags, not on the docker process.
                env: BTreeMap::new(),
                working_directory: raw.working_directory,
            })
        }
        _ => Err(ConfigError::MissingField {
            name: name.to_string(),
            field: "container",
        }),
    }
}

/// Build the `docker run` argument list for a containerized backend.
///
/// An empty env value becomes `-e KEY`, passing the gateway's own value through.
fn container_args(
    image: &str,
    entrypoint: Option<&str>,
    mounts: &[String],
    env: &BTreeMap<String, String>,
    entrypoint_args: &[String],
) -> Vec<String> {
    let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string()];
    for base in CONTAINER_BASE_ENV {
        args.push("-e".to_string());
        args.push(base.to_string());
    }
    if let Some(entrypoint) = entrypoint.filter(|e| !e.is_empty()) {
        args.push("--entrypoint".to_string());
        args.push(entrypoint.to_string());
    }
    for mount in mounts {
        args.push("-v".to_string());
        args.push(mount.clone());
    }
    for (key, value) in env {
        args.push("-e".to_string());
        if value.is_empty() {
            args.push(key.clone());
        } else {
            args.push(format!("{key}={value}"));
        }
    }
    args.push(image.to_string());
    args.extend(entrypoint_args.iter().cloned());
    args
}

fn validate_mount(name: &str, mount: &str) -> Result<(), ConfigError> {
    let parts: Vec<&str> = mount.split(':').collect();
    let valid = matches!(
        parts.as_slice(),
        [source, dest, "ro" | "rw"] if !source.is_empty() && !dest.is_empty()
    );
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidMount {
            name: name.to_string(),
            mount: mount.to_string(),
        })
    }
}

fn build_http(name: &str, raw: RawServer) -> Result<HttpSpec, ConfigError> {
    let url = raw
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingField {
            name: name.to_string(),
            field: "url",
        })?;
    let url = substitute_env_vars(&url, &format!("mcpServers.{name}.url"))?;

    let parsed = reqwest::Url::parse(&url).map_err(|e| ConfigError::InvalidUrl {
        name: name.to_string(),
        url: url.clone(),
        message: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            name: name.to_string(),
            url,
            message: "scheme must be http or https".to_string(),
        });
    }

    let headers = expand_env_map(name, "headers", raw.headers)?;
    Ok(HttpSpec { url, headers })
}

fn build_gateway(raw: RawGateway) -> Result<GatewaySettings, ConfigError> {
    let defaults = GatewaySettings::default();

    let port = match raw.port {
        Some(p) if (1..=65535).contains(&p) => Some(p as u16),
        Some(p) => return Err(ConfigError::InvalidPort { port: p }),
        None => None,
    };

    let startup_timeout = match raw.startup_timeout {
        Some(0) => {
            return Err(ConfigError::InvalidTimeout {
                field: "startupTimeout",
            });
        }
        Some(secs) => Duration::from_secs(secs),
        None => defaults.startup_timeout,
    };
    let tool_timeout = match raw.tool_timeout {
        Some(0) => {
            return Err(ConfigError::InvalidTimeout {
                field: "toolTimeout",
            });
        }
        Some(secs) => Duration::from_secs(secs),
        None => defaults.tool_timeout,
    };

    let api_key = raw
        .api_key
        .map(|k| substitute_env_vars(&k, "gateway.apiKey"))
        .transpose()?
        .filter(|k| !k.is_empty());

    Ok(GatewaySettings {
        port,
        api_key,
        domain: raw.domain.filter(|d| !d.is_empty()),
        startup_timeout,
        tool_timeout,
    })
}
