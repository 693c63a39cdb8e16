//! AIS metadata catalog
//!
//! Maps each metadata kind to the file it occupies under a volume's data root
//! and builds the removal command used by the deletion run.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A category of AIS state file kept on proxy/target volumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    Smap,
    Conf,
    Bmd,
    Rmd,
    Override,
    All,
}

impl MetadataKind {
    pub const ALL_KINDS: [MetadataKind; 6] = [
        MetadataKind::Smap,
        MetadataKind::Conf,
        MetadataKind::Bmd,
        MetadataKind::Rmd,
        MetadataKind::Override,
        MetadataKind::All,
    ];

    /// Name accepted on the command line
    pub fn name(self) -> &'static str {
        match self {
            MetadataKind::Smap => "smap",
            MetadataKind::Conf => "conf",
            MetadataKind::Bmd => "bmd",
            MetadataKind::Rmd => "rmd",
            MetadataKind::Override => "override",
            MetadataKind::All => "all",
        }
    }

    /// File name (or glob) relative to the data root
    pub fn path_fragment(self) -> &'static str {
        match self {
            MetadataKind::Smap => ".ais.smap",
            MetadataKind::Conf => ".ais.conf",
            MetadataKind::Bmd => ".ais.bmd",
            MetadataKind::Rmd => ".ais.rmd",
            MetadataKind::Override => ".ais.override_config",
            MetadataKind::All => ".ais.*",
        }
    }

    /// Whether this metadata only ever exists on proxy volumes
    pub fn is_proxy_only(self) -> bool {
        matches!(self, MetadataKind::Rmd)
    }

    /// Comma-separated list of every accepted name
    pub fn options() -> String {
        Self::ALL_KINDS
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetadataKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_lowercase();
        Self::ALL_KINDS
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| {
                Error::config(format!(
                    "Invalid metadata option '{}': must be one of: {}",
                    s.trim(),
                    Self::options()
                ))
            })
    }
}

/// Parse a comma-separated selection such as `smap,conf`.
///
/// A selection that names `all` anywhere collapses to `[All]`.
pub fn parse_selection(input: &str) -> Result<Vec<MetadataKind>> {
    let kinds = input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(MetadataKind::from_str)
        .collect::<Result<Vec<_>>>()?;

    if kinds.is_empty() {
        return Err(Error::config(format!(
            "At least one metadata kind must be specified ({})",
            MetadataKind::options()
        )));
    }

    if kinds.contains(&MetadataKind::All) {
        return Ok(vec![MetadataKind::All]);
    }
    Ok(kinds)
}

/// True iff every requested kind lives only on proxy volumes
pub fn is_proxy_only(kinds: &[MetadataKind]) -> bool {
    !kinds.is_empty() && kinds.iter().all(|k| k.is_proxy_only())
}

/// Build a single `rm` covering every requested kind, in input order.
///
/// `-f` keeps the command successful on a volume that is already clean.
pub fn deletion_command(kinds: &[MetadataKind], data_root: &str) -> String {
    let root = data_root.trim_end_matches('/');
    let targets = kinds
        .iter()
        .map(|k| format!("{}/{}", root, k.path_fragment()))
        .collect::<Vec<_>>()
        .join(" ");
    format!("rm -f {}", targets)
}
