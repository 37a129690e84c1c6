use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use serde_json::Value;
use tracing::{debug, warn};

/// Manifest file looked for inside uploaded archives, matched
/// case-insensitively against entry basenames.
pub const MANIFEST_FILENAME: &str = "package.json";

// Decompression ceiling for the manifest itself; archives are size-capped
// upstream but a manifest entry can still claim an absurd length.
const MAX_MANIFEST_BYTES: u64 = 1024 * 1024;

/// Best-effort extraction of the dependency map from an uploaded tar.gz
/// archive. A missing manifest, an unreadable archive, or a malformed
/// dependency list all yield an empty map; extraction never fails an upload.
#[must_use]
pub fn extract_manifest(bytes: &[u8]) -> BTreeMap<String, String> {
    match try_extract(bytes) {
        Ok(dependencies) => dependencies,
        Err(e) => {
            debug!("manifest extraction failed: {e}");
            BTreeMap::new()
        }
    }
}

fn try_extract(bytes: &[u8]) -> std::io::Result<BTreeMap<String, String>> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));

    for entry in archive.entries()? {
        let mut entry = entry?;
        let file_name = {
            let path = entry.path()?;
            path.file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
        };
        if !file_name.is_some_and(|name| name.eq_ignore_ascii_case(MANIFEST_FILENAME)) {
            continue;
        }

        // First match wins.
        let mut contents = String::new();
        entry
            .by_ref()
            .take(MAX_MANIFEST_BYTES)
            .read_to_string(&mut contents)?;
        return Ok(parse_dependencies(&contents));
    }

    Ok(BTreeMap::new())
}

fn parse_dependencies(raw: &str) -> BTreeMap<String, String> {
    let mut dependencies = BTreeMap::new();

    let manifest: Value = match serde_json::from_str(raw) {
        Ok(manifest) => manifest,
        Err(e) => {
            debug!("manifest is not valid JSON: {e}");
            return dependencies;
        }
    };

    let Some(list) = manifest.get("dependencies") else {
        return dependencies;
    };
    let Some(entries) = list.as_array() else {
        warn!("manifest 'dependencies' is not a list, ignoring");
        return dependencies;
    };

    for entry in entries {
        match parse_dependency(entry) {
            Some((name, constraint)) => {
                dependencies.insert(name, constraint);
            }
            None => warn!("skipping unrecognized dependency entry: {entry}"),
        }
    }

    dependencies
}

/// Two accepted encodings: a `"<constraint>:<name>"` string (split at the
/// first colon) or a `{name, version}` object.
fn parse_dependency(entry: &Value) -> Option<(String, String)> {
    match entry {
        Value::String(s) => {
            let (constraint, name) = s.split_once(':')?;
            if constraint.is_empty() || name.is_empty() {
                return None;
            }
            Some((name.to_string(), constraint.to_string()))
        }
        Value::Object(fields) => {
            let name = fields.get("name")?.as_str()?;
            let version = fields.get("version")?.as_str()?;
            Some((name.to_string(), version.to_string()))
        }
        _ => None,
    }
}
