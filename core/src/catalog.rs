use std::collections::HashSet;

use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};

/// Benchmarks built when no catalog is configured, in build order.
pub const BUILTIN_BENCHMARKS: [&str; 4] = ["xapian", "img-dnn", "moses", "specjbb"];

/// One workload the bootloader image can be built for.
///
/// `files[0]`, when present, is the benchmark binary. Neither list affects the
/// build; both are recorded in the run manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Benchmark {
    pub name: String,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Benchmark {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            args: Vec::new(),
        }
    }

    /// The benchmark binary, if a file list was given.
    pub fn binary(&self) -> Option<&str> {
        self.files.first().map(String::as_str)
    }
}

/// Checks that `name` can sit between the quote and `";` of the device-tree
/// line and still be used as a file stem.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("benchmark name must not be empty");
    }
    if let Some(bad) = name.chars().find(|c| c.is_whitespace() || matches!(c, '"' | ';' | '/')) {
        bail!("benchmark name '{}' contains forbidden character {:?}", name, bad);
    }
    // The image lands at `<name>.bin`, so the name must already be a valid,
    // collision-free file stem.
    if sanitize_filename::sanitize(name) != name {
        bail!("benchmark name '{}' is not usable as a file name", name);
    }
    Ok(())
}

/// Ordered set of benchmarks with unique names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<Benchmark>,
}

impl Catalog {
    pub fn new(entries: Vec<Benchmark>) -> Result<Self> {
        let mut seen = HashSet::new();
        for bench in &entries {
            validate_name(&bench.name)?;
            if !seen.insert(bench.name.as_str()) {
                bail!("duplicate benchmark '{}' in catalog", bench.name);
            }
        }
        Ok(Self { entries })
    }

    pub fn builtin() -> Self {
        Self {
            entries: BUILTIN_BENCHMARKS.iter().map(|name| Benchmark::new(*name)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Benchmark> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|b| b.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&Benchmark> {
        self.entries.iter().find(|b| b.name == name)
    }

    /// Narrows the catalog to `names`, keeping catalog order rather than the
    /// order the names were given in.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Catalog> {
        for name in names {
            let name = name.as_ref();
            if self.get(name).is_none() {
                return Err(anyhow!(
                    "unknown benchmark '{}' (known: {})",
                    name,
                    self.names().collect::<Vec<_>>().join(", ")
                ));
            }
        }
        let entries = self
            .entries
            .iter()
            .filter(|b| names.iter().any(|n| n.as_ref() == b.name))
            .cloned()
            .collect();
        Ok(Catalog { entries })
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a Benchmark;
    type IntoIter = std::slice::Iter<'a, Benchmark>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
