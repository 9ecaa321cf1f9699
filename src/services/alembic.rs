//! Drives the `alembic` command line tool.
//!
//! Alembic reads the database URL from `sqlalchemy.url` in its ini file, so
//! every invocation gets a temporary copy of the project's ini with that key
//! pointed at the container. The copy lives next to the project's ini so that
//! `%(here)s` interpolation still resolves to the project directory.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::ConfigError;
use crate::errors::{DblessError, DblessResult};

pub const DEFAULT_ALEMBIC_BIN: &str = "alembic";
const ALEMBIC_SECTION: &str = "alembic";
const URL_KEY: &str = "sqlalchemy.url";

/// The migration framework, seen as three commands.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MigrationTool: Send + Sync {
    /// Revision the database is currently at, if any.
    async fn current(&self, engine_url: &str) -> DblessResult<Option<String>>;

    async fn upgrade_to_head(&self, engine_url: &str) -> DblessResult<()>;

    /// Autogenerate a revision; returns the path of the written file.
    async fn autogenerate(&self, engine_url: &str, message: &str) -> DblessResult<PathBuf>;
}

#[derive(Debug, Clone)]
pub struct AlembicCli {
    program: PathBuf,
    ini_path: PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Apply,
    Generate,
}

impl AlembicCli {
    pub fn new(program: impl Into<PathBuf>, ini_path: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ini_path: ini_path.into(),
        }
    }

    /// Write a copy of the ini with `sqlalchemy.url` set to `engine_url`.
    fn config_for(&self, engine_url: &str) -> Result<NamedTempFile, ConfigError> {
        let source = std::fs::read_to_string(&self.ini_path)?;

        let dir = match self.ini_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut file = tempfile::Builder::new()
            .prefix(".dbless-")
            .suffix(".ini")
            .tempfile_in(dir)?;
        file.write_all(with_engine_url(&source, engine_url).as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    async fn run(&self, step: Step, engine_url: &str, args: &[&str]) -> DblessResult<Output> {
        let config = self.config_for(engine_url)?;
        debug!(program = %self.program.display(), ?args, "Running alembic");

        let output = Command::new(&self.program)
            .arg("-c")
            .arg(config.path())
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DblessError::ToolSpawn {
                program: self.program.clone(),
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stderr).lines() {
            debug!(target: "alembic", "{}", line);
        }

        if !output.status.success() {
            let detail = format!(
                "`alembic {}` exited with {}: {}",
                args.join(" "),
                output.status,
                last_lines(&output.stderr, 5)
            );
            return Err(match step {
                Step::Apply => DblessError::migration_apply(detail),
                Step::Generate => DblessError::migration_generate(detail),
            });
        }

        Ok(output)
    }
}

#[async_trait]
impl MigrationTool for AlembicCli {
    async fn current(&self, engine_url: &str) -> DblessResult<Option<String>> {
        let output = self.run(Step::Apply, engine_url, &["current"]).await?;
        Ok(parse_current(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn upgrade_to_head(&self, engine_url: &str) -> DblessResult<()> {
        info!("Running migrations");
        self.run(Step::Apply, engine_url, &["upgrade", "head"]).await?;
        Ok(())
    }

    async fn autogenerate(&self, engine_url: &str, message: &str) -> DblessResult<PathBuf> {
        info!("Creating migration");
        let output = self
            .run(
                Step::Generate,
                engine_url,
                &["revision", "--autogenerate", "-m", message],
            )
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        parse_generated_path(&stdout)
            .or_else(|| parse_generated_path(&stderr))
            .ok_or_else(|| {
                DblessError::migration_generate("alembic did not report a generated file")
            })
    }
}

/// Copy of `source` with the `[alembic]` `sqlalchemy.url` option replaced.
///
/// Every other line is kept byte for byte, so `%%` escapes and continuation
/// lines reach configparser exactly as the project wrote them.
fn with_engine_url(source: &str, engine_url: &str) -> String {
    // configparser interpolation treats a lone % as syntax.
    let url_line = format!("{URL_KEY} = {}", engine_url.replace('%', "%%"));
    let mut out = String::with_capacity(source.len() + url_line.len() + 16);
    let mut in_alembic = false;
    let mut inserted = false;
    let mut skipping = false;

    for line in source.lines() {
        let continues = line.starts_with(char::is_whitespace) && !line.trim().is_empty();
        if skipping && continues {
            continue;
        }
        skipping = false;

        let trimmed = line.trim();
        if let Some(name) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .map(|(name, _)| name)
        {
            in_alembic = name == ALEMBIC_SECTION;
            out.push_str(line);
            out.push('\n');
            if in_alembic && !inserted {
                out.push_str(&url_line);
                out.push('\n');
                inserted = true;
            }
            continue;
        }

        if in_alembic && !continues && option_name(trimmed).as_deref() == Some(URL_KEY) {
            skipping = true;
            continue;
        }

        out.push_str(line);
        out.push('\n');
    }

    if !inserted {
        out.push_str(&format!("\n[{ALEMBIC_SECTION}]\n{url_line}\n"));
    }
    out
}

/// Lowercased option name of an `name = value` or `name: value` line.
fn option_name(line: &str) -> Option<String> {
    if line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    let end = line.find(['=', ':'])?;
    Some(line[..end].trim().to_lowercase())
}

/// First revision line printed by `alembic current`, skipping log records.
fn parse_current(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .find(|line| {
            !["INFO", "WARN", "DEBUG", "ERROR"]
                .iter()
                .any(|level| line.starts_with(level))
        })
        .map(str::to_string)
}

/// Extract the path from alembic's `Generating <path> ...  done` line.
fn parse_generated_path(output: &str) -> Option<PathBuf> {
    output.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Generating ")?;
        let path = rest.rsplit_once(" ...").map_or(rest, |(path, _)| path);
        Some(PathBuf::from(path.trim()))
    })
}

fn last_lines(bytes: &[u8], n: usize) -> String {
    let text = String::from_utf8_lossy(bytes);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// True if both `upgrade()` and `downgrade()` contain nothing but `pass`
/// and comments, i.e. autogenerate found no differences.
pub fn is_empty_revision(source: &str) -> bool {
    function_is_empty(source, "upgrade") && function_is_empty(source, "downgrade")
}

fn function_is_empty(source: &str, name: &str) -> bool {
    let header = format!("def {name}(");
    let mut lines = source.lines().skip_while(|line| !line.starts_with(&header));
    if lines.next().is_none() {
        return false;
    }

    lines
        .take_while(|line| line.trim().is_empty() || line.starts_with(char::is_whitespace))
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with('#') || line == "pass")
}

/// Delete `path` if it holds an empty revision. Returns whether it was removed.
pub async fn discard_if_empty(path: &Path) -> std::io::Result<bool> {
    let source = tokio::fs::read_to_string(path).await?;
    if !is_empty_revision(&source) {
        return Ok(false);
    }
    tokio::fs::remove_file(path).await?;
    Ok(true)
}
