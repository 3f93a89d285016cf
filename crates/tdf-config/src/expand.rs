//! Host name expansion.
//!
//! Host settings may reference environment variables as `${VAR}` or
//! `${VAR:-default}`. After expansion a host is trimmed, loses a trailing
//! dot and is lowercased, matching how request hosts are compared.

use std::collections::BTreeMap;

use crate::ConfigError;

/// Expand and normalize one host setting.
fn expand_host(raw: &str, field: &str) -> Result<String, ConfigError> {
    let expanded = if raw.contains("${") {
        shellexpand::env_with_context(raw, |var| std::env::var(var).map(Some))
            .map_err(|e| ConfigError::EnvVar {
                field: field.to_owned(),
                message: format!("${{{}}}: {}", e.var_name, e.cause),
            })?
            .into_owned()
    } else {
        raw.to_owned()
    };
    Ok(expanded.trim().trim_end_matches('.').to_ascii_lowercase())
}

/// Expand every host in a list, in place.
pub(crate) fn expand_hosts(hosts: &mut [String], field: &str) -> Result<(), ConfigError> {
    for host in hosts {
        *host = expand_host(host, field)?;
    }
    Ok(())
}

/// Expand the host keys of a per-host table.
///
/// Keys that normalize to the same host collapse into one entry; the last
/// one in key order wins.
pub(crate) fn expand_host_keys<V>(
    table: BTreeMap<String, V>,
    field: &str,
) -> Result<BTreeMap<String, V>, ConfigError> {
    table
        .into_iter()
        .map(|(host, value)| Ok((expand_host(&host, field)?, value)))
        .collect()
}
