// src/compiler/levels.rs

//! Build levels for parallel dispatch
//!
//! A build-time dependency graph (package → packages it needs to build) is
//! partitioned into levels. A package's level is the length of the longest
//! dependency chain below it, so every package sits strictly above all of
//! its dependencies and packages sharing a level never depend on each other.
//!
//! ```text
//! level 0: x            (no dependencies)
//! level 1: y, z         (both need x)
//! ```
//!
//! Levels are computed Kahn-style from the leaves up. Packages left over
//! when no leaf remains form a cycle, which is reported instead of looping.

use crate::assertions::PackagesAssertions;
use crate::error::{Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info};

/// One exported level
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGroup {
    pub packages: Vec<String>,
}

/// Level assignment of a build graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildLevels {
    levels: BTreeMap<String, usize>,
}

impl BuildLevels {
    /// Level every node of `graph`
    ///
    /// Dependencies that are not keys of the graph are leaves.
    pub fn from_graph(graph: &BTreeMap<String, BTreeSet<String>>) -> Result<Self> {
        let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for (node, deps) in graph {
            remaining.insert(node.as_str(), deps.len());
            for dep in deps {
                remaining.entry(dep.as_str()).or_insert(0);
                dependents.entry(dep.as_str()).or_default().push(node.as_str());
            }
        }

        let mut levels: BTreeMap<String, usize> = BTreeMap::new();
        let mut queue: VecDeque<&str> = remaining
            .iter()
            .filter(|&(_, &count)| count == 0)
            .map(|(&node, _)| node)
            .collect();
        for node in &queue {
            levels.insert(node.to_string(), 0);
        }

        while let Some(node) = queue.pop_front() {
            let level = levels.get(node).copied().unwrap_or(0);
            for &dependent in dependents.get(node).into_iter().flatten() {
                let entry = levels.entry(dependent.to_string()).or_insert(0);
                *entry = (*entry).max(level + 1);
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        let stuck: BTreeSet<&str> = remaining
            .iter()
            .filter(|&(_, &count)| count > 0)
            .map(|(&node, _)| node)
            .collect();
        if !stuck.is_empty() {
            return Err(Error::CircularDependency(find_cycle(graph, &stuck)));
        }

        debug!("Leveled {} packages", levels.len());
        Ok(Self { levels })
    }

    /// Level the dependency edges among the selected packages of a solution
    pub fn from_assertions(assertions: &PackagesAssertions) -> Result<Self> {
        Self::from_graph(&assertions.dependency_edges())
    }

    pub fn level_of(&self, fingerprint: &str) -> Option<usize> {
        self.levels.get(fingerprint).copied()
    }

    /// Distinct levels in ascending order
    pub fn all_levels(&self) -> Vec<usize> {
        let set: BTreeSet<usize> = self.levels.values().copied().collect();
        set.into_iter().collect()
    }

    /// Packages at `level`, sorted
    pub fn all_in_level(&self, level: usize) -> Vec<String> {
        self.levels
            .iter()
            .filter(|&(_, &l)| l == level)
            .map(|(fp, _)| fp.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// One group per level, ascending
    pub fn export(&self) -> Vec<LevelGroup> {
        self.all_levels()
            .into_iter()
            .map(|level| LevelGroup {
                packages: self.all_in_level(level),
            })
            .collect()
    }

    /// The export as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    /// Run `build` for every package, one level at a time
    ///
    /// Packages of a level run in parallel on a pool of `concurrency`
    /// threads. The next level starts only after the whole level succeeded;
    /// the first failure stops the dispatch and is returned.
    pub fn dispatch<F>(&self, concurrency: usize, build: F) -> Result<()>
    where
        F: Fn(&str) -> Result<()> + Send + Sync,
    {
        if concurrency == 0 {
            return Err(Error::Config("concurrency must be at least 1".to_string()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .build()
            .map_err(|e| Error::Config(format!("failed to build thread pool: {}", e)))?;

        for level in self.all_levels() {
            let packages = self.all_in_level(level);
            info!("Dispatching level {} ({} packages)", level, packages.len());
            pool.install(|| packages.par_iter().try_for_each(|fp| build(fp)))?;
        }
        Ok(())
    }
}

/// Follow unfinished dependencies until a node repeats
fn find_cycle(graph: &BTreeMap<String, BTreeSet<String>>, stuck: &BTreeSet<&str>) -> Vec<String> {
    let Some(&start) = stuck.iter().next() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = vec![start];
    let mut current = start;
    loop {
        let next = graph
            .get(current)
            .and_then(|deps| deps.iter().find(|d| stuck.contains(d.as_str())));
        let Some(next) = next else {
            return path.into_iter().map(String::from).collect();
        };
        if let Some(pos) = path.iter().position(|p| *p == next.as_str()) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|p| p.to_string()).collect();
            cycle.push(next.clone());
            return cycle;
        }
        path.push(next.as_str());
        current = next.as_str();
    }
}
