// src/commands.rs
//! Command handlers for the arbor CLI
//!
//! Handlers load nothing themselves: `main` reads the catalog and
//! configuration into a [`Workspace`] and every handler returns the JSON
//! document to print.

use anyhow::{Context, Result};
use arbor::{
    BuildLevels, CompilationSpec, Compiler, Config, ImageHashTree, InMemoryCatalog, Package,
    PackageCatalog, PackageSelector, PackagesAssertions, Solver, SpecCompiler,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tracing::debug;

/// On-disk catalog layout
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogFile {
    /// Package definitions
    pub package: Vec<Package>,
    /// Installed packages
    pub installed: Vec<Package>,
    /// Compilation specs
    pub spec: Vec<CompilationSpec>,
}

/// Everything a command needs
pub struct Workspace {
    pub definitions: InMemoryCatalog,
    pub installed: InMemoryCatalog,
    pub compiler: SpecCompiler,
    pub config: Config,
}

impl Workspace {
    pub fn new(file: CatalogFile, config: Config) -> Self {
        let mut definitions = InMemoryCatalog::from_packages(file.package);
        let mut compiler = SpecCompiler::new(config.solver.clone());
        for spec in file.spec {
            if !definitions.contains(&spec.fingerprint()) {
                definitions.add(spec.package.clone());
            }
            compiler.add(spec);
        }

        Self {
            definitions,
            installed: InMemoryCatalog::from_packages(file.installed),
            compiler,
            config,
        }
    }

    fn solver(&self) -> Solver<'_> {
        Solver::with_options(&self.definitions, &self.installed, self.config.solver.clone())
    }
}

/// Read the configuration file, or the defaults when none is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    Config::from_toml_str(&content)
        .with_context(|| format!("Invalid config file {}", path.display()))
}

/// Read a catalog file
pub fn load_catalog(path: &Path) -> Result<CatalogFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let file: CatalogFile = toml::from_str(&content)
        .with_context(|| format!("Invalid catalog {}", path.display()))?;
    debug!(
        "Loaded {} definitions, {} installed packages and {} specs",
        file.package.len(),
        file.installed.len(),
        file.spec.len()
    );
    Ok(file)
}

fn parse_selectors(selectors: &[String]) -> Result<Vec<PackageSelector>> {
    selectors
        .iter()
        .map(|s| PackageSelector::parse(s).with_context(|| format!("Invalid selector '{}'", s)))
        .collect()
}

fn fingerprints(packages: &[Package]) -> Vec<String> {
    packages.iter().map(|p| p.fingerprint()).collect()
}

fn assertions_json(assertions: &PackagesAssertions) -> Value {
    Value::Array(
        assertions
            .iter()
            .map(|a| json!({ "package": a.fingerprint(), "install": a.value }))
            .collect(),
    )
}

pub fn cmd_install(workspace: &Workspace, packages: &[String]) -> Result<Value> {
    let selectors = parse_selectors(packages)?;
    let assertions = workspace.solver().install(&selectors)?;
    Ok(assertions_json(&assertions))
}

pub fn cmd_uninstall(
    workspace: &Workspace,
    packages: &[String],
    check: bool,
    full: bool,
) -> Result<Value> {
    let selectors = parse_selectors(packages)?;
    let removed = workspace.solver().uninstall(check, full, &selectors)?;
    Ok(json!({ "removed": fingerprints(&removed) }))
}

pub fn cmd_upgrade(
    workspace: &Workspace,
    check: bool,
    full: bool,
    universe: bool,
    drop_removed: bool,
) -> Result<Value> {
    let solver = workspace.solver();
    let (removed, assertions) = if universe {
        solver.upgrade_universe(drop_removed)?
    } else {
        solver.upgrade(check, full)?
    };
    Ok(json!({
        "removed": fingerprints(&removed),
        "assertions": assertions_json(&assertions),
    }))
}

pub fn cmd_order(workspace: &Workspace, package: &str) -> Result<Value> {
    let selector = PackageSelector::parse(package)?;
    let root = workspace
        .definitions
        .find_package_candidate(&selector)
        .or_else(|| workspace.installed.find_package_candidate(&selector))
        .with_context(|| format!("No package matches '{}'", package))?
        .fingerprint();

    let assertions = workspace.solver().install(&[selector])?;
    let ordered = assertions.order(&workspace.definitions, &root)?;
    Ok(json!({
        "root": root,
        "assertion_hash": ordered.assertion_hash(),
        "order": assertions_json(&ordered),
    }))
}

pub fn cmd_levels(workspace: &Workspace) -> Result<Value> {
    let graph = workspace.compiler.build_graph(&workspace.definitions)?;
    let levels = BuildLevels::from_graph(&graph)?;
    Ok(serde_json::to_value(levels.export())?)
}

pub fn cmd_hash_tree(workspace: &Workspace, package: &str) -> Result<Value> {
    let selector = PackageSelector::parse(package)?;
    let target = workspace
        .definitions
        .find_package_candidate(&selector)
        .with_context(|| format!("No package matches '{}'", package))?;
    let spec = workspace.compiler.from_package(target)?;

    let tree = ImageHashTree::new(&workspace.definitions)
        .with_options(workspace.config.solver.clone())
        .query(&workspace.compiler, &spec)?;

    let mut images = serde_json::Map::new();
    for dependency in tree.dependencies() {
        let image = tree.dependency_build_image(&dependency.package)?;
        images.insert(dependency.fingerprint(), Value::String(image));
    }

    Ok(json!({
        "target": tree.target().fingerprint(),
        "build_hash": tree.target().hash.build_hash,
        "package_hash": tree.target().hash.package_hash,
        "builder_image": tree.builder_image_hash(),
        "source_hash": tree.source_hash(),
        "dependencies": images,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const CATALOG: &str = r#"
[[package]]
name = "a"
category = "app"
version = "1.0"
requires = ["lib/b"]

[[package]]
name = "b"
category = "lib"
version = "1.0"

[[package]]
name = "b"
category = "lib"
version = "2.0"

[[installed]]
name = "b"
category = "lib"
version = "1.0"

[[spec]]
steps = ["make"]

[spec.package]
name = "tool"
category = "dev"
version = "0.1"
requires = ["lib/b"]
"#;

    fn workspace() -> Workspace {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();
        let catalog = load_catalog(file.path()).unwrap();
        Workspace::new(catalog, Config::default())
    }

    #[test]
    fn test_load_catalog_registers_spec_packages() {
        let ws = workspace();
        assert!(ws.definitions.contains("dev/tool@0.1"));
        assert_eq!(ws.definitions.len(), 4);
        assert_eq!(ws.installed.len(), 1);
        assert_eq!(ws.compiler.len(), 1);
    }

    #[test]
    fn test_load_catalog_rejects_unknown_tables() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[[packages]]\nname = \"a\"\nversion = \"1\"\n").unwrap();
        assert!(load_catalog(file.path()).is_err());
    }

    #[test]
    fn test_load_config_defaults_without_path() {
        assert_eq!(load_config(None).unwrap(), Config::default());

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[solver]\nconcurrency = 0\n").unwrap();
        assert!(load_config(Some(file.path())).is_err());
    }

    #[test]
    fn test_install_keeps_installed_version() {
        let value = cmd_install(&workspace(), &["app/a".to_string()]).unwrap();
        let mut selected: Vec<&str> = value
            .as_array()
            .unwrap()
            .iter()
            .filter(|a| a["install"] == true)
            .map(|a| a["package"].as_str().unwrap())
            .collect();
        selected.sort();
        assert_eq!(selected, vec!["app/a@1.0", "lib/b@1.0"]);
    }

    #[test]
    fn test_order_puts_dependency_first() {
        let value = cmd_order(&workspace(), "app/a").unwrap();
        assert_eq!(value["root"], "app/a@1.0");
        assert_eq!(value["order"][0]["package"], "lib/b@1.0");
        assert_eq!(value["order"][1]["package"], "app/a@1.0");
    }

    #[test]
    fn test_upgrade_replaces_old_version() {
        let value = cmd_upgrade(&workspace(), false, false, false, false).unwrap();
        assert_eq!(value["removed"], json!(["lib/b@1.0"]));
    }

    #[test]
    fn test_levels_and_hash_tree() {
        let ws = workspace();
        let levels = cmd_levels(&ws).unwrap();
        assert_eq!(
            levels,
            json!([{"packages": ["lib/b@2.0"]}, {"packages": ["dev/tool@0.1"]}])
        );

        let tree = cmd_hash_tree(&ws, "dev/tool").unwrap();
        assert_eq!(tree["target"], "dev/tool@0.1");
        assert!(tree["dependencies"]["lib/b@2.0"]
            .as_str()
            .unwrap()
            .starts_with("builder-"));
    }
}
