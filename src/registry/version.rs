/// Numeric `(major, minor, patch)` prefix of a version string. Ordering
/// compares only these three components; pre-release and build suffixes are
/// ignored, so `1.2.0-beta` sorts exactly like `1.2.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    /// Extracts the triple from a version string, cutting the suffix at the
    /// first `-` (pre-release) or `+` (build metadata).
    #[must_use]
    pub fn parse(version: &str) -> Option<Self> {
        let core = version
            .split_once(['-', '+'])
            .map_or(version, |(core, _)| core);

        let mut parts = core.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }

        Some(Self {
            major,
            minor,
            patch,
        })
    }
}

/// Checks that a version string carries a numeric three-component core and
/// nothing but ASCII version characters.
pub fn validate_version(version: &str) -> Result<(), String> {
    if version.is_empty() {
        return Err("version cannot be empty".to_string());
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+'))
    {
        return Err(format!("version '{version}' contains invalid characters"));
    }
    if VersionTriple::parse(version).is_none() {
        return Err(format!(
            "version '{version}' is not of the form MAJOR.MINOR.PATCH"
        ));
    }
    Ok(())
}
