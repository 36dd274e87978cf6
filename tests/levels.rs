// tests/levels.rs

//! Integration tests for build leveling and level dispatch.

mod common;

use arbor::{BuildLevels, Error, Solver, SolverOptions, SpecCompiler};
use common::{catalog, pkg, sel, spec};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Dependencies are space separated
fn graph(edges: &[(&str, &str)]) -> BTreeMap<String, BTreeSet<String>> {
    edges
        .iter()
        .map(|(node, deps)| {
            (
                node.to_string(),
                deps.split_whitespace().map(String::from).collect(),
            )
        })
        .collect()
}

#[test]
fn test_fan_out_from_single_root() {
    let levels = BuildLevels::from_graph(&graph(&[
        ("x", ""),
        ("y", "x"),
        ("z", "x"),
    ]))
    .unwrap();

    assert_eq!(levels.all_levels(), vec![0, 1]);
    assert_eq!(levels.all_in_level(0), vec!["x"]);
    let second: BTreeSet<String> = levels.all_in_level(1).into_iter().collect();
    assert_eq!(second, BTreeSet::from(["y".to_string(), "z".to_string()]));
}

#[test]
fn test_levels_from_spec_compiler() {
    let definitions = catalog(vec![
        pkg("x", "1", &[]),
        pkg("y", "1", &["x"]),
        pkg("z", "1", &["x"]),
    ]);
    let mut compiler = SpecCompiler::new(SolverOptions::default());
    compiler.add(spec("x", "1", &[]));
    compiler.add(spec("y", "1", &["x"]));
    compiler.add(spec("z", "1", &["x"]));

    let levels = BuildLevels::from_graph(&compiler.build_graph(&definitions).unwrap()).unwrap();
    let exported: Vec<Vec<String>> = levels.export().into_iter().map(|g| g.packages).collect();
    assert_eq!(exported, vec![vec!["x@1"], vec!["y@1", "z@1"]]);
}

#[test]
fn test_levels_from_solution() {
    let definitions = catalog(vec![
        pkg("app", "1", &["lib", "tool"]),
        pkg("lib", "1", &["base"]),
        pkg("tool", "1", &[]),
        pkg("base", "1", &[]),
    ]);
    let installed = catalog(vec![]);
    let assertions = Solver::new(&definitions, &installed)
        .install(&[sel("app")])
        .unwrap();

    let levels = BuildLevels::from_assertions(&assertions).unwrap();
    assert_eq!(levels.level_of("base@1"), Some(0));
    assert_eq!(levels.level_of("tool@1"), Some(0));
    assert_eq!(levels.level_of("lib@1"), Some(1));
    assert_eq!(levels.level_of("app@1"), Some(2));
    assert_eq!(levels.len(), 4);
}

#[test]
fn test_cycle_is_reported() {
    let err = BuildLevels::from_graph(&graph(&[
        ("a", "b"),
        ("b", "c"),
        ("c", "a"),
        ("d", ""),
    ]))
    .unwrap_err();

    match err {
        Error::CircularDependency(cycle) => {
            assert_eq!(cycle.first(), cycle.last());
            let members: BTreeSet<&str> = cycle.iter().map(String::as_str).collect();
            assert_eq!(members, BTreeSet::from(["a", "b", "c"]));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_dispatch_runs_levels_in_order() {
    let levels = BuildLevels::from_graph(&graph(&[
        ("x", ""),
        ("y", "x"),
        ("z", "x"),
        ("w", "y z"),
    ]))
    .unwrap();

    let built = Mutex::new(Vec::new());
    levels
        .dispatch(2, |fp| {
            built.lock().unwrap().push(fp.to_string());
            Ok(())
        })
        .unwrap();

    let built = built.into_inner().unwrap();
    assert_eq!(built.len(), 4);
    assert_eq!(built[0], "x");
    assert_eq!(built[3], "w");
    let order: Vec<usize> = built.iter().map(|fp| levels.level_of(fp).unwrap()).collect();
    assert!(order.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn test_dispatch_stops_after_failing_level() {
    let levels = BuildLevels::from_graph(&graph(&[
        ("x", ""),
        ("y", "x"),
        ("w", "y"),
    ]))
    .unwrap();

    let built = Mutex::new(Vec::new());
    let err = levels
        .dispatch(1, |fp| {
            if fp == "y" {
                return Err(Error::InvariantViolation("build of y failed".to_string()));
            }
            built.lock().unwrap().push(fp.to_string());
            Ok(())
        })
        .unwrap_err();

    assert!(matches!(err, Error::InvariantViolation(_)));
    assert_eq!(built.into_inner().unwrap(), vec!["x"]);
}
