//! `.env` loading for `--env`.
//!
//! One `KEY=VALUE` per line. Blank lines, `#` comments and lines without
//! `=` are skipped. `$VAR` and `${VAR}` in values expand from the current
//! environment; unset variables expand to nothing.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use crate::error::CliError;

// SAFETY: .expect() on LazyLock with a compile-time literal regex pattern.
static VAR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_][A-Za-z0-9_]*)\}|([A-Za-z_][A-Za-z0-9_]*))")
        .expect("BUG: VAR_REFERENCE regex is invalid")
});

/// Parse one line into a key and an expanded value.
pub fn parse_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), expand(value.trim())))
}

fn expand(value: &str) -> String {
    VAR_REFERENCE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            std::env::var(name).unwrap_or_default()
        })
        .into_owned()
}

/// Load `path` into the process environment. Returns how many variables were set.
///
/// Must run before the async runtime starts: it mutates the process
/// environment, which is only sound while a single thread is running.
pub fn load_env_file(path: &Path) -> Result<usize, CliError> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;

    let mut loaded = 0;
    for (key, value) in content.lines().filter_map(parse_line) {
        // SAFETY: called from `main` before any other thread exists.
        unsafe { std::env::set_var(&key, &value) };
        loaded += 1;
    }
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_skips_comments_and_garbage() {
        assert_eq!(parse_line("# comment"), None);
        assert_eq!(parse_line("   "), None);
        assert_eq!(parse_line("NO_EQUALS"), None);
        assert_eq!(parse_line("=value"), None);
        assert_eq!(
            parse_line("  KEY = some value  "),
            Some(("KEY".to_string(), "some value".to_string()))
        );
        assert_eq!(
            parse_line("URL=http://host/?a=b"),
            Some(("URL".to_string(), "http://host/?a=b".to_string()))
        );
    }

    #[test]
    #[serial]
    fn test_load_expands_references() {
        unsafe {
            std::env::set_var("MCPG_ENV_TEST_BASE", "/opt/base");
            std::env::remove_var("MCPG_ENV_TEST_UNSET");
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# tokens").unwrap();
        writeln!(file, "MCPG_ENV_TEST_A=${{MCPG_ENV_TEST_BASE}}/bin").unwrap();
        writeln!(file, "MCPG_ENV_TEST_B=$MCPG_ENV_TEST_BASE:$MCPG_ENV_TEST_UNSET").unwrap();
        writeln!(file).unwrap();

        let loaded = load_env_file(file.path()).unwrap();
        assert_eq!(loaded, 2);
        assert_eq!(std::env::var("MCPG_ENV_TEST_A").unwrap(), "/opt/base/bin");
        assert_eq!(std::env::var("MCPG_ENV_TEST_B").unwrap(), "/opt/base:");

        unsafe {
            std::env::remove_var("MCPG_ENV_TEST_A");
            std::env::remove_var("MCPG_ENV_TEST_B");
            std::env::remove_var("MCPG_ENV_TEST_BASE");
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_env_file(Path::new("/nonexistent/.env")).unwrap_err();
        assert!(matches!(err, CliError::EnvFile { .. }));
    }
}
