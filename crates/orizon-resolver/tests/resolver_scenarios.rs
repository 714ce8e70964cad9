//! The resolver's named end-to-end scenarios, run against the public
//! `resolve` entry point rather than `Resolver`'s internals.

use orizon_core::{Constraint, PackageId, PackageManifest, Version};
use orizon_resolver::{resolve, PackageIndex, ResolutionError};
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

fn index(manifests: Vec<PackageManifest>) -> PackageIndex {
    let mut index = PackageIndex::new();
    for m in manifests {
        index.insert(m);
    }
    index
}

#[test]
fn scenario_1_simple_transitive_resolve() {
    let idx = index(vec![
        manifest("a", "1.0.0", &[("b", ">=1.1.0,<2.0.0")]),
        manifest("b", "1.0.0", &[]),
        manifest("b", "1.2.0", &[]),
    ]);
    let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
    let resolution = resolve(&idx, &roots, true).unwrap();
    assert_eq!(resolution.get(&pkg("a")).unwrap().to_string(), "1.0.0");
    assert_eq!(resolution.get(&pkg("b")).unwrap().to_string(), "1.2.0");
}

#[test]
fn scenario_2_backtrack_rejects_the_higher_candidate() {
    let idx = index(vec![
        manifest("a", "1.0.0", &[("b", "~1.0.0")]),
        manifest("a", "1.1.0", &[("b", "~1.2.0")]),
        manifest("b", "1.0.5", &[]),
        manifest("b", "1.2.3", &[]),
    ]);
    let roots = vec![
        (pkg("a"), Constraint::parse(">=1.0.0").unwrap()),
        (pkg("b"), Constraint::parse("~1.0.0").unwrap()),
    ];
    let resolution = resolve(&idx, &roots, true).unwrap();
    assert_eq!(resolution.get(&pkg("a")).unwrap().to_string(), "1.0.0");
    assert_eq!(resolution.get(&pkg("b")).unwrap().to_string(), "1.0.5");
}

#[test]
fn scenario_3_conflict_reports_the_unsatisfiable_package() {
    let idx = index(vec![manifest("a", "1.0.0", &[("b", "~1.0.0")]), manifest("b", "2.0.0", &[])]);
    let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
    let err = resolve(&idx, &roots, true).unwrap_err();
    match err {
        ResolutionError::Conflict { package, .. } => assert_eq!(package.as_str(), "b"),
        other => panic!("expected a conflict, got {:?}", other),
    }
}

#[test]
fn scenario_8_cycle_detection_lists_both_names() {
    let idx = index(vec![
        manifest("a", "1.0.0", &[("b", ">=1.0.0")]),
        manifest("b", "1.0.0", &[("a", ">=1.0.0")]),
    ]);
    let roots = vec![(pkg("a"), Constraint::parse(">=1.0.0").unwrap())];
    let err = resolve(&idx, &roots, true).unwrap_err();
    match err {
        ResolutionError::Cycle { chain } => {
            assert!(chain.iter().any(|p| p.as_str() == "a"));
            assert!(chain.iter().any(|p| p.as_str() == "b"));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
}
