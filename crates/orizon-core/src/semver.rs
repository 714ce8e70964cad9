//! Semantic Versioning 2.0.0 parsing, comparison and constraint evaluation.
//!
//! Implements:
//! - `Version` parsing with pre-release and build metadata, ordered per
//!   semver 2.0.0 (numeric identifiers before alphanumeric, shorter
//!   pre-release sequence before longer when all leading identifiers tie).
//! - `Constraint` parsing and matching: exact, caret, tilde, `>`/`>=`/`<`/
//!   `<=`, ranges, wildcards, and comma-separated conjunctions.
//! - Constraint intersection, re-derived as a textual conjunction so that
//!   repeated intersection stays associative and commutative.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A semantic version.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<PrereleaseIdentifier>,
    pub build: Vec<String>,
}

/// A single dot-separated pre-release identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrereleaseIdentifier {
    Numeric(u64),
    Alpha(String),
}

impl PrereleaseIdentifier {
    fn parse(s: &str) -> Result<Self, SemverError> {
        if s.is_empty() {
            return Err(SemverError::InvalidIdentifier(s.to_string()));
        }
        if s.chars().all(|c| c.is_ascii_digit()) {
            if s.len() > 1 && s.starts_with('0') {
                return Err(SemverError::LeadingZero(s.to_string()));
            }
            s.parse::<u64>()
                .map(PrereleaseIdentifier::Numeric)
                .map_err(|_| SemverError::InvalidIdentifier(s.to_string()))
        } else {
            if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                return Err(SemverError::InvalidIdentifier(s.to_string()));
            }
            Ok(PrereleaseIdentifier::Alpha(s.to_string()))
        }
    }
}

impl fmt::Display for PrereleaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrereleaseIdentifier::Numeric(n) => write!(f, "{}", n),
            PrereleaseIdentifier::Alpha(s) => write!(f, "{}", s),
        }
    }
}

impl Ord for PrereleaseIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Numeric identifiers always sort before alphanumeric ones.
        match (self, other) {
            (PrereleaseIdentifier::Numeric(a), PrereleaseIdentifier::Numeric(b)) => a.cmp(b),
            (PrereleaseIdentifier::Numeric(_), PrereleaseIdentifier::Alpha(_)) => Ordering::Less,
            (PrereleaseIdentifier::Alpha(_), PrereleaseIdentifier::Numeric(_)) => Ordering::Greater,
            (PrereleaseIdentifier::Alpha(a), PrereleaseIdentifier::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for PrereleaseIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    pub fn with_pre(mut self, pre: Vec<PrereleaseIdentifier>) -> Self {
        self.pre = pre;
        self
    }

    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }

    pub fn base(&self) -> Self {
        Self {
            major: self.major,
            minor: self.minor,
            patch: self.patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    pub fn satisfies(&self, constraint: &Constraint) -> bool {
        constraint.matches(self)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-")?;
            for (i, id) in self.pre.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{}", id)?;
            }
        }
        if !self.build.is_empty() {
            write!(f, "+")?;
            for (i, b) in self.build.iter().enumerate() {
                if i > 0 {
                    write!(f, ".")?;
                }
                write!(f, "{}", b)?;
            }
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = SemverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (version_str, build) = if let Some(plus_pos) = s.find('+') {
            let build_str = &s[plus_pos + 1..];
            let build: Vec<String> = build_str.split('.').map(|s| s.to_string()).collect();
            for b in &build {
                if b.is_empty() || !b.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
                    return Err(SemverError::InvalidBuildMetadata(b.clone()));
                }
            }
            (&s[..plus_pos], build)
        } else {
            (s, Vec::new())
        };

        let (core_str, pre) = if let Some(dash_pos) = version_str.find('-') {
            let pre_str = &version_str[dash_pos + 1..];
            let pre: Result<Vec<_>, _> = pre_str.split('.').map(PrereleaseIdentifier::parse).collect();
            (&version_str[..dash_pos], pre?)
        } else {
            (version_str, Vec::new())
        };

        let parts: Vec<&str> = core_str.split('.').collect();
        if parts.len() != 3 {
            return Err(SemverError::InvalidVersion(format!(
                "expected major.minor.patch, got '{}'",
                core_str
            )));
        }
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(SemverError::InvalidVersion(format!(
                    "invalid {} component: '{}'",
                    ["major", "minor", "patch"][i],
                    part
                )));
            }
            if part.len() > 1 && part.starts_with('0') {
                return Err(SemverError::LeadingZero(format!(
                    "{}.{}",
                    ["major", "minor", "patch"][i],
                    part
                )));
            }
        }

        let major = parts[0]
            .parse::<u64>()
            .map_err(|_| SemverError::InvalidVersion(format!("invalid major: {}", parts[0])))?;
        let minor = parts[1]
            .parse::<u64>()
            .map_err(|_| SemverError::InvalidVersion(format!("invalid minor: {}", parts[1])))?;
        let patch = parts[2]
            .parse::<u64>()
            .map_err(|_| SemverError::InvalidVersion(format!("invalid patch: {}", parts[2])))?;

        Ok(Version {
            major,
            minor,
            patch,
            pre,
            build,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.minor.cmp(&other.minor) {
            Ordering::Equal => {}
            ord => return ord,
        }
        match self.patch.cmp(&other.patch) {
            Ordering::Equal => {}
            ord => return ord,
        }

        // Build metadata never affects precedence. A release has higher
        // precedence than any of its pre-releases.
        match (self.pre.is_empty(), other.pre.is_empty()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                for (a, b) in self.pre.iter().zip(other.pre.iter()) {
                    match a.cmp(b) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                self.pre.len().cmp(&other.pre.len())
            }
        }
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed version constraint. The empty string parses to `Any`
/// (equivalent to `>= 0.0.0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    Exact(Version),
    Caret(Version),
    Tilde(Version),
    GreaterThan(Version, bool),
    LessThan(Version, bool),
    Range {
        min: Version,
        max: Version,
        min_inclusive: bool,
        max_inclusive: bool,
    },
    Wildcard {
        major: Option<u64>,
        minor: Option<u64>,
    },
    /// Comma-separated conjunction: every branch must match.
    And(Vec<Constraint>),
    Any,
}

impl Constraint {
    pub fn matches(&self, version: &Version) -> bool {
        match self {
            Constraint::Exact(v) => version == v,

            Constraint::Caret(v) => {
                if version.is_prerelease() && !v.is_prerelease() {
                    return false;
                }
                if v.major > 0 {
                    version.major == v.major && version >= v
                } else if v.minor > 0 {
                    version.major == 0 && version.minor == v.minor && version.patch >= v.patch
                } else {
                    version.major == 0 && version.minor == 0 && version.patch == v.patch
                }
            }

            Constraint::Tilde(v) => {
                if version.is_prerelease() && !v.is_prerelease() {
                    return version.base() == v.base() && version >= v;
                }
                version.major == v.major && version.minor == v.minor && version.patch >= v.patch
            }

            Constraint::GreaterThan(v, inclusive) => {
                if version.is_prerelease() && !v.is_prerelease() {
                    return false;
                }
                if *inclusive {
                    version >= v
                } else {
                    version > v
                }
            }

            Constraint::LessThan(v, inclusive) => {
                if version.is_prerelease() && !v.is_prerelease() {
                    return false;
                }
                if *inclusive {
                    version <= v
                } else {
                    version < v
                }
            }

            Constraint::Range {
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => {
                if version.is_prerelease() && !min.is_prerelease() && !max.is_prerelease() {
                    return false;
                }
                let min_ok = if *min_inclusive { version >= min } else { version > min };
                let max_ok = if *max_inclusive { version <= max } else { version < max };
                min_ok && max_ok
            }

            Constraint::Wildcard { major, minor } => match (major, minor) {
                (None, None) => true,
                (Some(maj), None) => !version.is_prerelease() && version.major == *maj,
                (Some(maj), Some(min)) => {
                    !version.is_prerelease() && version.major == *maj && version.minor == *min
                }
                (None, Some(_)) => unreachable!("wildcard cannot specify minor without major"),
            },

            Constraint::And(constraints) => constraints.iter().all(|c| c.matches(version)),

            Constraint::Any => true,
        }
    }

    /// Intersect two constraints by re-parsing a deterministic textual
    /// conjunction of both sides (design note: keeps repeated intersection
    /// associative and commutative without a dedicated interval-algebra
    /// combinator).
    pub fn intersect(&self, other: &Constraint) -> Result<Constraint, SemverError> {
        match (self, other) {
            (Constraint::Any, c) | (c, Constraint::Any) => Ok(c.clone()),
            _ => {
                let text = format!("{},{}", self, other);
                Constraint::parse(&text)
            }
        }
    }

    /// Parse a constraint from its textual form. Branches separated by `,`
    /// are ANDed together; an empty string is `Any`.
    pub fn parse(s: &str) -> Result<Self, SemverError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Constraint::Any);
        }

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() > 1 {
            let constraints: Result<Vec<_>, _> = parts.iter().map(|p| parse_single(p)).collect();
            return Ok(flatten_and(constraints?));
        }

        parse_single(s)
    }

    pub fn filter<'a, I>(&self, versions: I) -> Vec<Version>
    where
        I: IntoIterator<Item = &'a Version>,
    {
        versions.into_iter().filter(|v| self.matches(v)).cloned().collect()
    }
}

fn flatten_and(constraints: Vec<Constraint>) -> Constraint {
    if constraints.len() == 1 {
        return constraints.into_iter().next().unwrap();
    }
    let mut flat = Vec::with_capacity(constraints.len());
    for c in constraints {
        match c {
            Constraint::And(inner) => flat.extend(inner),
            Constraint::Any => {}
            other => flat.push(other),
        }
    }
    if flat.is_empty() {
        Constraint::Any
    } else if flat.len() == 1 {
        flat.into_iter().next().unwrap()
    } else {
        Constraint::And(flat)
    }
}

fn parse_single(s: &str) -> Result<Constraint, SemverError> {
    let s = s.trim();
    if s.is_empty() || s == "*" {
        return Ok(Constraint::Any);
    }

    if let Some(rest) = s.strip_prefix(">=") {
        return Ok(Constraint::GreaterThan(Version::from_str(rest.trim())?, true));
    }
    if let Some(rest) = s.strip_prefix('>') {
        return Ok(Constraint::GreaterThan(Version::from_str(rest.trim())?, false));
    }
    if let Some(rest) = s.strip_prefix("<=") {
        return Ok(Constraint::LessThan(Version::from_str(rest.trim())?, true));
    }
    if let Some(rest) = s.strip_prefix('<') {
        return Ok(Constraint::LessThan(Version::from_str(rest.trim())?, false));
    }
    if let Some(rest) = s.strip_prefix('=') {
        return Ok(Constraint::Exact(Version::from_str(rest.trim())?));
    }
    if let Some(rest) = s.strip_prefix('^') {
        return Ok(Constraint::Caret(Version::from_str(rest.trim())?));
    }
    if let Some(rest) = s.strip_prefix('~') {
        return Ok(Constraint::Tilde(Version::from_str(rest.trim())?));
    }

    if s.contains('x') || s.contains('X') || s.ends_with(".*") {
        return parse_wildcard(s);
    }

    // Bare version string behaves like an exact pin.
    Ok(Constraint::Exact(Version::from_str(s)?))
}

fn parse_wildcard(s: &str) -> Result<Constraint, SemverError> {
    let normalized = s.replace('X', "x");
    let parts: Vec<&str> = normalized.split('.').collect();
    match parts.as_slice() {
        ["*"] => Ok(Constraint::Wildcard { major: None, minor: None }),
        [maj, "x"] | [maj, "*"] => Ok(Constraint::Wildcard {
            major: Some(parse_component(maj)?),
            minor: None,
        }),
        [maj, min, "x"] | [maj, min, "*"] => Ok(Constraint::Wildcard {
            major: Some(parse_component(maj)?),
            minor: Some(parse_component(min)?),
        }),
        _ => Err(SemverError::InvalidConstraint(s.to_string())),
    }
}

fn parse_component(s: &str) -> Result<u64, SemverError> {
    s.parse::<u64>()
        .map_err(|_| SemverError::InvalidConstraint(format!("invalid wildcard component: {}", s)))
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Exact(v) => write!(f, "={}", v),
            Constraint::Caret(v) => write!(f, "^{}", v),
            Constraint::Tilde(v) => write!(f, "~{}", v),
            Constraint::GreaterThan(v, true) => write!(f, ">={}", v),
            Constraint::GreaterThan(v, false) => write!(f, ">{}", v),
            Constraint::LessThan(v, true) => write!(f, "<={}", v),
            Constraint::LessThan(v, false) => write!(f, "<{}", v),
            Constraint::Range {
                min,
                max,
                min_inclusive,
                max_inclusive,
            } => {
                let min_op = if *min_inclusive { ">=" } else { ">" };
                let max_op = if *max_inclusive { "<=" } else { "<" };
                write!(f, "{}{},{}{}", min_op, min, max_op, max)
            }
            Constraint::Wildcard { major, minor } => match (major, minor) {
                (None, None) => write!(f, "*"),
                (Some(m), None) => write!(f, "{}.x", m),
                (Some(m), Some(mi)) => write!(f, "{}.{}.x", m, mi),
                (None, Some(_)) => write!(f, "*"),
            },
            Constraint::And(constraints) => {
                let parts: Vec<String> = constraints.iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            Constraint::Any => write!(f, "*"),
        }
    }
}

impl FromStr for Constraint {
    type Err = SemverError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SemverError {
    #[error("invalid version: {0}")]
    InvalidVersion(String),
    #[error("leading zero not allowed: {0}")]
    LeadingZero(String),
    #[error("invalid pre-release identifier: {0}")]
    InvalidIdentifier(String),
    #[error("invalid build metadata: {0}")]
    InvalidBuildMetadata(String),
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_version() {
        let v = Version::from_str("1.2.3").unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
        assert_eq!(v.to_string(), "1.2.3");
    }

    #[test]
    fn rejects_leading_zeros() {
        assert!(matches!(
            Version::from_str("01.2.3"),
            Err(SemverError::LeadingZero(_))
        ));
    }

    #[test]
    fn prerelease_orders_below_release() {
        let pre = Version::from_str("1.0.0-alpha").unwrap();
        let rel = Version::from_str("1.0.0").unwrap();
        assert!(pre < rel);
    }

    #[test]
    fn prerelease_numeric_before_alpha() {
        let a = Version::from_str("1.0.0-1").unwrap();
        let b = Version::from_str("1.0.0-alpha").unwrap();
        assert!(a < b);
    }

    #[test]
    fn caret_excludes_next_major() {
        let c = Constraint::parse("^1.2.3").unwrap();
        assert!(c.matches(&Version::from_str("1.2.3").unwrap()));
        assert!(c.matches(&Version::from_str("1.9.0").unwrap()));
        assert!(!c.matches(&Version::from_str("2.0.0").unwrap()));
        assert!(!c.matches(&Version::from_str("1.2.2").unwrap()));
    }

    #[test]
    fn caret_zero_major_pins_minor() {
        let c = Constraint::parse("^0.2.3").unwrap();
        assert!(c.matches(&Version::from_str("0.2.9").unwrap()));
        assert!(!c.matches(&Version::from_str("0.3.0").unwrap()));
    }

    #[test]
    fn tilde_pins_minor() {
        let c = Constraint::parse("~1.2.3").unwrap();
        assert!(c.matches(&Version::from_str("1.2.9").unwrap()));
        assert!(!c.matches(&Version::from_str("1.3.0").unwrap()));
    }

    #[test]
    fn comma_conjunction_is_and() {
        let c = Constraint::parse(">=1.1.0,<2.0.0").unwrap();
        assert!(c.matches(&Version::from_str("1.5.0").unwrap()));
        assert!(!c.matches(&Version::from_str("2.0.0").unwrap()));
        assert!(!c.matches(&Version::from_str("1.0.0").unwrap()));
    }

    #[test]
    fn empty_constraint_is_any() {
        let c = Constraint::parse("").unwrap();
        assert_eq!(c, Constraint::Any);
        assert!(c.matches(&Version::from_str("0.0.0").unwrap()));
    }

    #[test]
    fn prerelease_excluded_unless_constraint_mentions_one() {
        let c = Constraint::parse(">=1.0.0").unwrap();
        assert!(!c.matches(&Version::from_str("1.1.0-alpha").unwrap()));

        let c2 = Constraint::parse(">=1.1.0-alpha").unwrap();
        assert!(c2.matches(&Version::from_str("1.1.0-alpha").unwrap()));
    }

    #[test]
    fn intersection_is_commutative_text() {
        let a = Constraint::parse(">=1.0.0").unwrap();
        let b = Constraint::parse("<2.0.0").unwrap();
        let ab = a.intersect(&b).unwrap();
        let ba = b.intersect(&a).unwrap();
        let v = Version::from_str("1.5.0").unwrap();
        assert_eq!(ab.matches(&v), ba.matches(&v));
    }

    #[test]
    fn wildcard_matches_major() {
        let c = Constraint::parse("1.x").unwrap();
        assert!(c.matches(&Version::from_str("1.9.9").unwrap()));
        assert!(!c.matches(&Version::from_str("2.0.0").unwrap()));
    }
}
