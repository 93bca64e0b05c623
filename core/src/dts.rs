use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use regex::bytes::{NoExpand, Regex};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::catalog::validate_name;

/// A whitespace-free token closing the quoted value, e.g. `/xapian";`.
/// Matched byte-wise so includes that are not valid UTF-8 still patch.
static SELECTOR_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(?-u:\S)*";"#).expect("static regex"));

/// Splits `text` into `(content, terminator)` pairs, terminator being `\n`,
/// `\r\n` or empty for an unterminated last line.
fn split_lines(text: &[u8]) -> Vec<(&[u8], &[u8])> {
    text.split_inclusive(|b| *b == b'\n')
        .map(|line| {
            let content_len = line
                .strip_suffix(b"\r\n")
                .or_else(|| line.strip_suffix(b"\n"))
                .map_or(line.len(), <[u8]>::len);
            line.split_at(content_len)
        })
        .collect()
}

fn line_index(line: usize, total: usize) -> Result<usize> {
    if line == 0 {
        bail!("device-tree line numbers start at 1");
    }
    if line > total {
        bail!("line {} is past the end of the file ({} lines)", line, total);
    }
    Ok(line - 1)
}

/// Swaps the content of the 1-based `line` for `content`, keeping its terminator.
fn replace_line(text: &[u8], line: usize, content: &[u8]) -> Result<Vec<u8>> {
    let lines = split_lines(text);
    let idx = line_index(line, lines.len())?;
    let mut out = Vec::with_capacity(text.len() + content.len());
    for (i, (current, term)) in lines.iter().enumerate() {
        out.extend_from_slice(if i == idx { content } else { current });
        out.extend_from_slice(term);
    }
    Ok(out)
}

/// Replaces the first `<token>";` on the 1-based `line` of `text` with
/// `<name>";`, leaving every other byte untouched.
pub fn patch_line(text: &[u8], line: usize, name: &str) -> Result<Vec<u8>> {
    validate_name(name)?;
    let content = line_of(text, line)?;
    if !SELECTOR_TOKEN.is_match(content) {
        bail!(
            "line {} has no `\";` token to replace: {:?}",
            line,
            String::from_utf8_lossy(content)
        );
    }
    let replacement = format!("{name}\";");
    let patched = SELECTOR_TOKEN.replace(content, NoExpand(replacement.as_bytes()));
    replace_line(text, line, &patched)
}

/// Returns the content of the 1-based `line` of `text`, without terminator.
pub fn line_of(text: &[u8], line: usize) -> Result<&[u8]> {
    let lines = split_lines(text);
    let idx = line_index(line, lines.len())?;
    Ok(lines[idx].0)
}

/// The device-tree include whose selector line picks the benchmark.
#[derive(Debug, Clone)]
pub struct DtsFile {
    path: PathBuf,
    line: usize,
}

impl DtsFile {
    pub fn new(path: impl Into<PathBuf>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self) -> usize {
        self.line
    }

    fn read(&self) -> Result<Vec<u8>> {
        fs::read(&self.path)
            .with_context(|| format!("Failed to read device-tree file {}", self.path.display()))
    }

    /// Raw bytes of the selector line, without terminator.
    pub fn current_line(&self) -> Result<Vec<u8>> {
        let text = self.read()?;
        line_of(&text, self.line)
            .map(<[u8]>::to_vec)
            .with_context(|| format!("in {}", self.path.display()))
    }

    /// Points the selector line at `name`.
    pub fn select(&self, name: &str) -> Result<()> {
        let text = self.read()?;
        let patched = patch_line(&text, self.line, name).with_context(|| {
            format!(
                "Failed to select '{}' in {}:{}",
                name,
                self.path.display(),
                self.line
            )
        })?;
        debug!(path = %self.path.display(), line = self.line, benchmark = name, "patched selector line");
        self.write_atomic(&patched)
    }

    /// Writes back a line captured earlier with [`DtsFile::current_line`].
    pub fn restore(&self, original_line: &[u8]) -> Result<()> {
        let text = self.read()?;
        let restored = replace_line(&text, self.line, original_line)
            .with_context(|| format!("Failed to restore {}:{}", self.path.display(), self.line))?;
        self.write_atomic(&restored)
    }

    fn write_atomic(&self, contents: &[u8]) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {}", dir.display()))?;
        tmp.write_all(contents)
            .context("write patched device-tree contents")?;
        let meta = fs::metadata(&self.path)
            .with_context(|| format!("Failed to stat {}", self.path.display()))?;
        fs::set_permissions(tmp.path(), meta.permissions()).with_context(|| {
            format!("Failed to carry permissions of {} over to the rewrite", self.path.display())
        })?;
        tmp.persist(&self.path)
            .map_err(|e| anyhow!("Failed to replace {}: {}", self.path.display(), e.error))?;
        Ok(())
    }
}
