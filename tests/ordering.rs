// tests/ordering.rs

//! Integration tests for assertion ordering and hashing.

mod common;

use arbor::{Error, PackageAssert, PackagesAssertions, Salts, Solver};
use common::{catalog, chain_catalogs, fingerprints, pkg, sel};

fn chain_solution() -> (arbor::InMemoryCatalog, PackagesAssertions) {
    let (definitions, installed) = chain_catalogs();
    let assertions = Solver::new(&definitions, &installed)
        .install(&[sel("a")])
        .unwrap();
    (definitions, assertions)
}

#[test]
fn test_order_puts_dependencies_first() {
    let (definitions, assertions) = chain_solution();
    let ordered = assertions.order(&definitions, "a@1").unwrap();

    let fps = fingerprints(&ordered);
    assert_eq!(&fps[..4], &["g@1", "h@1", "d@1", "b@1"]);
    assert_eq!(fps, vec!["g@1", "h@1", "d@1", "b@1", "a@1", "c@1"]);
}

#[test]
fn test_order_is_idempotent() {
    let (definitions, assertions) = chain_solution();
    let once = assertions.order(&definitions, "a@1").unwrap();
    let twice = once.order(&definitions, "a@1").unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_order_appends_rejected_assertions() {
    let definitions = catalog(vec![
        pkg("a", "1", &["lib"]),
        pkg("lib", "1", &[]),
        pkg("lib", "2", &[]),
    ]);
    let installed = catalog(vec![pkg("lib", "1", &[])]);
    let assertions = Solver::new(&definitions, &installed)
        .install(&[sel("a")])
        .unwrap();

    let ordered = assertions.order(&definitions, "a@1").unwrap();
    assert_eq!(fingerprints(&ordered), vec!["lib@1", "a@1", "lib@2"]);
    assert!(!ordered.as_slice()[2].value);
}

#[test]
fn test_order_errors() {
    let definitions = catalog(vec![]);
    let cyclic = PackagesAssertions::new(vec![
        PackageAssert::new(pkg("x", "1", &["y"]), true),
        PackageAssert::new(pkg("y", "1", &["x"]), true),
    ]);
    assert!(matches!(
        cyclic.order(&definitions, "x@1"),
        Err(Error::CircularDependency(_))
    ));

    let dangling = PackagesAssertions::new(vec![PackageAssert::new(pkg("a", "1", &["ghost"]), true)]);
    assert!(matches!(
        dangling.order(&definitions, "a@1"),
        Err(Error::Lookup(_))
    ));

    let rejected_root = PackagesAssertions::new(vec![PackageAssert::new(pkg("a", "1", &[]), false)]);
    assert!(matches!(
        rejected_root.order(&definitions, "a@1"),
        Err(Error::Lookup(_))
    ));
}

#[test]
fn test_assertion_hash_ignores_permutation() {
    let (_, assertions) = chain_solution();
    let mut reversed = assertions.clone().into_inner();
    reversed.reverse();
    let reversed = PackagesAssertions::new(reversed);
    assert_eq!(assertions.assertion_hash(), reversed.assertion_hash());

    let mut flipped = assertions.clone().into_inner();
    flipped[0].value = false;
    let flipped = PackagesAssertions::new(flipped);
    assert_ne!(assertions.assertion_hash(), flipped.assertion_hash());

    let smaller = assertions.drop_package("c@1");
    assert_ne!(assertions.assertion_hash(), smaller.assertion_hash());
}

#[test]
fn test_cut_keeps_only_the_subtree() {
    let (_, assertions) = chain_solution();
    let mut cut = fingerprints(&assertions.cut("d@1"));
    cut.sort();
    assert_eq!(cut, vec!["d@1", "g@1", "h@1"]);
    assert!(assertions.cut("missing@1").is_empty());
}

#[test]
fn test_hash_equivalence_of_shared_subtrees() {
    let definitions = catalog(vec![
        pkg("r1", "1", &["s"]),
        pkg("r2", "1", &["s"]),
        pkg("s", "1", &["t"]),
        pkg("t", "1", &[]),
    ]);
    let installed = catalog(vec![]);
    let solver = Solver::new(&definitions, &installed);

    let first = solver.install(&[sel("r1")]).unwrap();
    let second = solver.install(&[sel("r2")]).unwrap();

    let first_subtree = first.cut("r1@1").drop_package("r1@1");
    let second_subtree = second.cut("r2@1").drop_package("r2@1");
    assert_eq!(
        first_subtree.hash_from("s@1").unwrap(),
        second_subtree.hash_from("s@1").unwrap()
    );
    assert_ne!(
        first.hash_from("r1@1").unwrap(),
        second.hash_from("r2@1").unwrap()
    );

    let salts_one: Salts = [("s@1".to_string(), "one".to_string())].into_iter().collect();
    let salts_two: Salts = [("s@1".to_string(), "two".to_string())].into_iter().collect();
    assert_ne!(
        first_subtree.salted_hash_from("s@1", &salts_one).unwrap(),
        second_subtree.salted_hash_from("s@1", &salts_two).unwrap()
    );

    // a salt on a dependency reaches its dependents
    let deep: Salts = [("t@1".to_string(), "patched".to_string())].into_iter().collect();
    assert_ne!(
        first_subtree.hash_from("s@1").unwrap(),
        first_subtree.salted_hash_from("s@1", &deep).unwrap()
    );
    assert_ne!(
        first_subtree.build_hash_from("s@1", &Salts::new()).unwrap(),
        first_subtree.build_hash_from("s@1", &deep).unwrap()
    );
}

#[test]
fn test_with_hashes_matches_subtree_hashes() {
    let (_, assertions) = chain_solution();
    let hashed = assertions.with_hashes(&Salts::new()).unwrap();
    for fp in ["a@1", "d@1", "g@1"] {
        assert_eq!(
            hashed.search(fp).unwrap().hash.package_hash,
            assertions.hash_from(fp).unwrap()
        );
    }
    assert!(matches!(
        assertions.hash_from("missing@1"),
        Err(Error::Lookup(_))
    ));
}
