//! Depth-first backtracking dependency resolver (spec component C4).
//!
//! Determinism first: sorted root worklist, a total candidate order, and a
//! textual-conjunction constraint intersection, so the same index and the
//! same roots always produce the same pins.

use orizon_core::{Constraint, PackageId, PackageManifest, Version};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// `Resolution`: the pinned version for every package reached from the
/// roots.
pub type Resolution = BTreeMap<PackageId, Version>;

/// View over the package universe the resolver searches: every known
/// manifest for a given name, in any order (the resolver sorts its own
/// candidate lists).
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    manifests: HashMap<PackageId, Vec<PackageManifest>>,
}

impl PackageIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, manifest: PackageManifest) {
        self.manifests.entry(manifest.name.clone()).or_default().push(manifest);
    }

    pub fn candidates(&self, name: &PackageId) -> &[PackageManifest] {
        self.manifests.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &PackageId) -> bool {
        self.manifests.contains_key(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("dependency conflict on {package}: {reason}")]
    Conflict {
        package: PackageId,
        reason: String,
        tried_versions: Vec<Version>,
    },
    #[error("dependency cycle: {}", .chain.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(" -> "))]
    Cycle { chain: Vec<PackageId> },
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),
}

impl From<ResolutionError> for orizon_core::OrizonError {
    fn from(e: ResolutionError) -> Self {
        match e {
            ResolutionError::Conflict { package, reason, tried_versions } => orizon_core::OrizonError::Conflict {
                package: package.to_string(),
                reason,
                tried_versions: tried_versions.iter().map(|v| v.to_string()).collect(),
            },
            ResolutionError::Cycle { chain } => {
                orizon_core::OrizonError::Cycle { chain: chain.iter().map(|p| p.to_string()).collect() }
            }
            ResolutionError::InvalidConstraint(s) => orizon_core::OrizonError::InvalidConstraint(s),
        }
    }
}

/// Depth-first backtracking resolver over a fixed [`PackageIndex`].
pub struct Resolver<'a> {
    index: &'a PackageIndex,
    prefer_higher: bool,
    max_depth: Option<usize>,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a PackageIndex, prefer_higher: bool) -> Self {
        Self {
            index,
            prefer_higher,
            max_depth: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Resolve `roots` (root requirements, possibly naming the same
    /// package more than once — constraints are intersected first).
    ///
    /// Every root requirement is seeded into `root_constraints` before any
    /// package is visited, so a transitive dependency on a package that
    /// also has its own root requirement is filtered against both from the
    /// first candidate attempt — not discovered as a conflict only once
    /// that root is visited in turn.
    pub fn resolve(&self, roots: &[(PackageId, Constraint)]) -> Result<Resolution, ResolutionError> {
        let normalized = normalize_roots(roots)?;
        let mut names: Vec<&PackageId> = normalized.keys().collect();
        names.sort();

        let mut pins: HashMap<PackageId, Version> = HashMap::new();
        let mut visiting: HashSet<PackageId> = HashSet::new();

        for name in names {
            let constraint = normalized.get(name).unwrap();
            self.resolve_one(name, constraint, &normalized, &mut pins, &mut visiting, 0)?;
        }

        Ok(pins.into_iter().collect())
    }

    fn resolve_one(
        &self,
        name: &PackageId,
        constraint: &Constraint,
        root_constraints: &HashMap<PackageId, Constraint>,
        pins: &mut HashMap<PackageId, Version>,
        visiting: &mut HashSet<PackageId>,
        depth: usize,
    ) -> Result<(), ResolutionError> {
        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return Err(ResolutionError::Conflict {
                    package: name.clone(),
                    reason: "max depth exceeded".to_string(),
                    tried_versions: Vec::new(),
                });
            }
        }

        if visiting.contains(name) {
            let mut chain: Vec<PackageId> = visiting.iter().cloned().collect();
            chain.sort();
            chain.push(name.clone());
            return Err(ResolutionError::Cycle { chain });
        }

        // A package named by a root requirement is always filtered by that
        // requirement too, even when reached here as someone else's
        // dependency, so a root constraint on `name` rules out candidates
        // before any are tentatively pinned — not after, as a committed-pin
        // conflict that can no longer backtrack into the caller's choice.
        let effective_constraint = match root_constraints.get(name) {
            Some(root_constraint) => constraint
                .intersect(root_constraint)
                .map_err(|e| ResolutionError::InvalidConstraint(e.to_string()))?,
            None => constraint.clone(),
        };

        if let Some(existing) = pins.get(name) {
            if effective_constraint.matches(existing) {
                return Ok(());
            }
            return Err(ResolutionError::Conflict {
                package: name.clone(),
                reason: format!("pinned version {} does not satisfy {}", existing, effective_constraint),
                tried_versions: vec![existing.clone()],
            });
        }

        let mut candidates: Vec<&PackageManifest> = self
            .index
            .candidates(name)
            .iter()
            .filter(|m| effective_constraint.matches(&m.version))
            .collect();
        candidates.sort_by(|a, b| a.version.cmp(&b.version));
        if self.prefer_higher {
            candidates.reverse();
        }

        let mut tried = Vec::new();
        visiting.insert(name.clone());

        for candidate in candidates {
            tried.push(candidate.version.clone());

            // Snapshot before this attempt so that any pin introduced while
            // exploring `candidate` — including pins committed by already-
            // resolved sibling subtrees this attempt recurses back into —
            // can be undone as a unit if the attempt ultimately fails.
            let snapshot: HashSet<PackageId> = pins.keys().cloned().collect();
            pins.insert(name.clone(), candidate.version.clone());

            let deps = candidate.parsed_dependencies().map_err(|e| ResolutionError::InvalidConstraint(e.to_string()))?;
            let mut failed = false;
            for (dep_name, dep_constraint) in &deps {
                if let Err(_e) = self.resolve_one(dep_name, dep_constraint, root_constraints, pins, visiting, depth + 1) {
                    failed = true;
                    break;
                }
            }

            if !failed {
                visiting.remove(name);
                return Ok(());
            }

            pins.retain(|k, _| snapshot.contains(k));
        }

        visiting.remove(name);
        Err(ResolutionError::Conflict {
            package: name.clone(),
            reason: format!("no candidate satisfies {}", effective_constraint),
            tried_versions: tried,
        })
    }
}

/// Intersect constraints declared against the same package name across
/// the root requirement list.
fn normalize_roots(roots: &[(PackageId, Constraint)]) -> Result<HashMap<PackageId, Constraint>, ResolutionError> {
    let mut merged: HashMap<PackageId, Constraint> = HashMap::new();
    for (name, constraint) in roots {
        match merged.get(name) {
            Some(existing) => {
                let combined = existing
                    .intersect(constraint)
                    .map_err(|e| ResolutionError::InvalidConstraint(e.to_string()))?;
                merged.insert(name.clone(), combined);
            }
            None => {
                merged.insert(name.clone(), constraint.clone());
            }
        }
    }
    Ok(merged)
}

/// Convenience wrapper for one-shot resolution without constructing a
/// [`Resolver`] directly.
pub fn resolve(
    index: &PackageIndex,
    roots: &[(PackageId, Constraint)],
    prefer_higher: bool,
) -> Result<Resolution, ResolutionError> {
    Resolver::new(index, prefer_higher).resolve(roots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn pkg(name: &str) -> PackageId {
        PackageId::new(name).unwrap()
    }

    fn manifest(name: &str, version: &str, deps: &[(&str, &str)]) -> PackageManifest {
        let mut m = PackageManifest::new(pkg(name), Version::from_str(version).unwrap());
        for (dep_name, dep_constraint) in deps {
            m.dependencies.push((pkg(dep_name), dep_constraint.to_string()));
        }
        m
    }

    fn idx(manifests: Vec<PackageManifest>) -> PackageIndex {
        let mut index = PackageIndex::new();
        for m in manifests {
            index.insert(m);
        }
        index
    }

    #[test]
    fn resolves_simple_transitive_chain() {
        let index = idx(vec![
            manifest("a", "1.0.0", &[("b", ">=1.0.0")]),
            manifest("b", "1.0.0", &[]),
            manifest("b", "2.0.0", &[]),
        ]);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let resolution = resolve(&index, &roots, true).unwrap();
        assert_eq!(resolution.get(&pkg("a")).unwrap().to_string(), "1.0.0");
        assert_eq!(resolution.get(&pkg("b")).unwrap().to_string(), "2.0.0");
    }

    #[test]
    fn backtracks_to_next_candidate_on_transitive_failure() {
        // a@2.0.0 depends on a package with no candidates at all, so the
        // whole subtree under a@2.0.0 fails; the resolver must unwind that
        // attempt (discarding any pins it made) and retry with a@1.0.0.
        let index = idx(vec![
            manifest("a", "1.0.0", &[]),
            manifest("a", "2.0.0", &[("missing", ">=1.0.0")]),
        ]);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let resolution = resolve(&index, &roots, true).unwrap();
        assert_eq!(resolution.get(&pkg("a")).unwrap().to_string(), "1.0.0");
    }

    #[test]
    fn sibling_conflict_on_a_committed_pin_is_a_hard_conflict() {
        // a depends on both b and c; b is resolved first and commits to its
        // highest version, then c's constraint on the already-pinned b
        // cannot be satisfied. The resolver does not re-explore b's
        // candidates from c's position — that failure surfaces as a's own
        // (sole) candidate failing, which is reported as a conflict.
        let index = idx(vec![
            manifest("a", "1.0.0", &[("b", ">=1.0.0"), ("c", ">=1.0.0")]),
            manifest("c", "1.0.0", &[("b", "<2.0.0")]),
            manifest("b", "1.0.0", &[]),
            manifest("b", "2.0.0", &[]),
        ]);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let err = resolve(&index, &roots, true).unwrap_err();
        assert!(matches!(err, ResolutionError::Conflict { .. }));
    }

    #[test]
    fn reports_conflict_when_no_candidate_fits() {
        let index = idx(vec![manifest("a", "1.0.0", &[])]);
        let roots = vec![(pkg("a"), Constraint::parse(">=2.0.0").unwrap())];
        let err = resolve(&index, &roots, true).unwrap_err();
        assert!(matches!(err, ResolutionError::Conflict { .. }));
    }

    #[test]
    fn detects_cycles() {
        let index = idx(vec![
            manifest("a", "1.0.0", &[("b", ">=1.0.0")]),
            manifest("b", "1.0.0", &[("a", ">=1.0.0")]),
        ]);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let err = resolve(&index, &roots, true).unwrap_err();
        assert!(matches!(err, ResolutionError::Cycle { .. }));
    }

    #[test]
    fn root_constraints_on_same_package_are_intersected() {
        let index = idx(vec![
            manifest("a", "1.0.0", &[]),
            manifest("a", "2.0.0", &[]),
        ]);
        let roots = vec![
            (pkg("a"), Constraint::parse(">=1.0.0").unwrap()),
            (pkg("a"), Constraint::parse("<2.0.0").unwrap()),
        ];
        let resolution = resolve(&index, &roots, true).unwrap();
        assert_eq!(resolution.get(&pkg("a")).unwrap().to_string(), "1.0.0");
    }

    #[test]
    fn backtracks_across_roots_when_a_later_root_conflicts() {
        // A@1.1.0 depends on B~1.2.0 but the root also requires B~1.0.0;
        // A's higher candidate must be rejected in favor of A@1.0.0, whose
        // own dependency on B agrees with the root.
        let index = idx(vec![
            manifest("a", "1.0.0", &[("b", "~1.0.0")]),
            manifest("a", "1.1.0", &[("b", "~1.2.0")]),
            manifest("b", "1.0.5", &[]),
            manifest("b", "1.2.3", &[]),
        ]);
        let roots = vec![
            (pkg("a"), Constraint::parse(">=1.0.0").unwrap()),
            (pkg("b"), Constraint::parse("~1.0.0").unwrap()),
        ];
        let resolution = resolve(&index, &roots, true).unwrap();
        assert_eq!(resolution.get(&pkg("a")).unwrap().to_string(), "1.0.0");
        assert_eq!(resolution.get(&pkg("b")).unwrap().to_string(), "1.0.5");
    }

    #[test]
    fn already_pinned_non_recursive_reuse_is_not_a_cycle() {
        let index = idx(vec![
            manifest("a", "1.0.0", &[("shared", ">=1.0.0"), ("b", ">=1.0.0")]),
            manifest("b", "1.0.0", &[("shared", ">=1.0.0")]),
            manifest("shared", "1.0.0", &[]),
        ]);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let resolution = resolve(&index, &roots, true).unwrap();
        assert_eq!(resolution.get(&pkg("shared")).unwrap().to_string(), "1.0.0");
    }

    #[test]
    fn max_depth_guard_aborts() {
        let index = idx(vec![
            manifest("a", "1.0.0", &[("b", ">=1.0.0")]),
            manifest("b", "1.0.0", &[("c", ">=1.0.0")]),
            manifest("c", "1.0.0", &[]),
        ]);
        let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
        let err = Resolver::new(&index, true)
            .with_max_depth(1)
            .resolve(&roots)
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Conflict { reason, .. } if reason == "max depth exceeded"));
    }
}
