//! Terraform version parsing and the minimum supported version.

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{IacError, IacResult};

static BANNER_PATTERN: OnceLock<Regex> = OnceLock::new();
static VERSION_PATTERN: OnceLock<Regex> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> IacResult<&'static Regex> {
    if let Some(regex) = cell.get() {
        return Ok(regex);
    }
    let regex = Regex::new(pattern).map_err(|e| IacError::Version(e.to_string()))?;
    Ok(cell.get_or_init(|| regex))
}

/// Oldest Terraform release whose JSON UI and plan format are understood.
pub const MINIMUM_TERRAFORM_VERSION: EngineVersion = EngineVersion {
    major: 1,
    minor: 1,
    patch: 0,
    pre: None,
};

/// A semantic engine version such as `1.3.7` or `1.4.0-beta2`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Option<String>,
}

impl EngineVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: None,
        }
    }

    /// Parse the output of `terraform version -json`, falling back to the
    /// plain-text banner printed by releases without `-json`.
    pub fn from_version_output(output: &str) -> IacResult<Self> {
        #[derive(Deserialize)]
        struct VersionOutput {
            terraform_version: String,
        }

        if let Ok(parsed) = serde_json::from_str::<VersionOutput>(output.trim()) {
            return parsed.terraform_version.parse();
        }

        let banner = compiled(&BANNER_PATTERN, r"Terraform v(\S+)")?;
        match banner.captures(output) {
            Some(caps) => caps[1].parse(),
            None => Err(IacError::Version(format!(
                "unrecognized version output {:?}",
                output.lines().next().unwrap_or_default()
            ))),
        }
    }

    pub fn is_at_least(&self, minimum: &EngineVersion) -> bool {
        self >= minimum
    }
}

impl FromStr for EngineVersion {
    type Err = IacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pattern = compiled(
            &VERSION_PATTERN,
            r"^v?(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z.-]+))?(?:\+[0-9A-Za-z.-]+)?$",
        )?;
        let caps = pattern
            .captures(s.trim())
            .ok_or_else(|| IacError::Version(format!("invalid version {:?}", s)))?;

        let number = |i: usize| -> IacResult<u64> {
            caps[i]
                .parse()
                .map_err(|_| IacError::Version(format!("invalid version {:?}", s)))
        };

        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            pre: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }
}

impl Ord for EngineVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.pre, &other.pre) {
                (None, None) => Ordering::Equal,
                // A pre-release sorts before its release.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_pre_release(a, b),
            })
    }
}

/// Semver precedence: numeric identifiers compare numerically and sort
/// before alphanumeric ones; a shorter prefix sorts first.
fn compare_pre_release(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        let ordering = match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match (x.parse::<u64>(), y.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => x.cmp(y),
            },
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
}

impl PartialOrd for EngineVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(pre) = &self.pre {
            write!(f, "-{}", pre)?;
        }
        Ok(())
    }
}
