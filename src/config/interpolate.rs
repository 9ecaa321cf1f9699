//! configparser-style lookup of section values.
//!
//! Keys are case-insensitive, a section falls back to `[DEFAULT]`, and values
//! go through basic interpolation: `%%` is a literal `%`, `%(name)s` expands
//! another option of the same section, and `here` is the ini file's directory.

use ini::Ini;
use std::collections::HashMap;
use std::path::Path;

use super::error::{ConfigError, ConfigResult};

const DEFAULT_SECTION_NAME: &str = "DEFAULT";
const MAX_DEPTH: usize = 10;

/// Raw options of one section merged over `[DEFAULT]` and `here`.
#[derive(Debug, Clone)]
pub struct SectionValues {
    raw: HashMap<String, String>,
}

impl SectionValues {
    /// `None` if the file has no section called `section`.
    pub fn from_ini(ini: &Ini, section: &str, ini_path: &Path) -> Option<Self> {
        let props = ini.section(Some(section))?;
        let mut raw = HashMap::new();

        raw.insert("here".to_string(), here(ini_path));
        if let Some(defaults) = ini.section(Some(DEFAULT_SECTION_NAME)) {
            for (key, value) in defaults.iter() {
                raw.insert(key.to_lowercase(), value.to_string());
            }
        }
        for (key, value) in props.iter() {
            raw.insert(key.to_lowercase(), value.to_string());
        }

        Some(Self { raw })
    }

    /// The interpolated value of `key`, if present.
    pub fn get(&self, key: &str) -> ConfigResult<Option<String>> {
        let key = key.to_lowercase();
        match self.raw.get(&key) {
            Some(value) => self.interpolate(&key, value, 1).map(Some),
            None => Ok(None),
        }
    }

    fn interpolate(&self, key: &str, value: &str, depth: usize) -> ConfigResult<String> {
        if depth > MAX_DEPTH {
            return Err(interpolation(key, "recursion limit exceeded"));
        }

        let mut out = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(pos) = rest.find('%') {
            out.push_str(&rest[..pos]);
            rest = &rest[pos..];

            if let Some(after) = rest.strip_prefix("%%") {
                out.push('%');
                rest = after;
            } else if let Some(after) = rest.strip_prefix("%(") {
                let (name, tail) = after
                    .split_once(')')
                    .ok_or_else(|| interpolation(key, "unterminated %(name)s reference"))?;
                let tail = tail
                    .strip_prefix('s')
                    .ok_or_else(|| interpolation(key, "expected %(name)s"))?;
                let name = name.to_lowercase();
                let referenced = self
                    .raw
                    .get(&name)
                    .ok_or_else(|| interpolation(key, &format!("unknown option `{name}`")))?;
                out.push_str(&self.interpolate(&name, referenced, depth + 1)?);
                rest = tail;
            } else {
                return Err(interpolation(key, "'%' must be followed by '%' or '('"));
            }
        }

        out.push_str(rest);
        Ok(out)
    }
}

fn here(ini_path: &Path) -> String {
    let dir = match ini_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::path::absolute(dir)
        .unwrap_or_else(|_| dir.to_path_buf())
        .display()
        .to_string()
}

fn interpolation(key: &str, reason: &str) -> ConfigError {
    ConfigError::Interpolation {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
