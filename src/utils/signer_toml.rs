//! Load `.signer.toml` (CLI only). Lib callers pass [`PipelineOpts`](crate::PipelineOpts) directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::Opts;
use crate::utils::config::{PackagePaths, QueueCap};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SignerToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    timeout_secs: Option<u64>,
    channel_cap: Option<usize>,
    separator: Option<String>,
    workers: Option<usize>,
    verbose: Option<bool>,
}

/// Load `.signer.toml` from `dir` if present. A missing file is `Ok(None)`; an unreadable or malformed one is an error.
pub(crate) fn load_signer_toml(dir: &Path) -> Result<Option<SignerToml>> {
    let path = dir.join(PackagePaths::get().config_filename());
    if !path.is_file() {
        return Ok(None);
    }
    load_signer_toml_from(&path).map(Some)
}

/// Load an explicitly requested settings file.
pub(crate) fn load_signer_toml_from(path: &Path) -> Result<SignerToml> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    toml::from_str(&s).with_context(|| format!("parse config file {}", path.display()))
}

/// Overwrite opts field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $opts.$field = v;
        }
    };
}

/// Apply file config to opts (only fields present in the file). Call before applying CLI flags.
pub(crate) fn apply_file_to_opts(file: &SignerToml, opts: &mut Opts) {
    let s = &file.settings;
    if let Some(secs) = s.timeout_secs {
        opts.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    if let Some(cap) = s.channel_cap {
        opts.channel_cap = QueueCap::clamp(cap);
    }
    if let Some(workers) = s.workers {
        opts.workers = Some(workers);
    }
    apply_file_opt!(s, opts, separator);
    apply_file_opt!(s, opts, verbose);
}

#[cfg(test)]
pub(crate) fn parse_signer_toml(s: &str) -> Result<SignerToml> {
    Ok(toml::from_str(s)?)
}
