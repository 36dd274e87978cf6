// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: catalog file
fn catalog_arg() -> Arg {
    Arg::new("catalog")
        .short('c')
        .long("catalog")
        .value_name("PATH")
        .default_value("arbor.toml")
        .help("Path to the catalog file")
}

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_name("PATH")
        .help("Path to the configuration file")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name).long(name).action(ArgAction::SetTrue).help(help)
}

fn build_cli() -> Command {
    Command::new("arbor")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Arbor Contributors")
        .about("Dependency solving and reproducible build planning for package trees")
        .subcommand_required(true)
        .arg(catalog_arg())
        .arg(config_arg())
        .subcommand(
            Command::new("install")
                .about("Resolve packages on top of the installed set")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Package selectors, e.g. \"app/a\" or \"lib/b >= 2.0\""),
                ),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Compute the packages removed by an uninstall")
                .arg(
                    Arg::new("packages")
                        .required(true)
                        .num_args(1..)
                        .help("Installed package selectors"),
                )
                .arg(flag("check", "Fail if a package that stays installed still needs a candidate"))
                .arg(flag("full", "Also remove dependencies nothing else needs")),
        )
        .subcommand(
            Command::new("upgrade")
                .about("Upgrade installed packages to their newest definitions")
                .arg(flag("check", "Keep the remaining installed packages asserted"))
                .arg(flag("full", "Also remove dependencies of upgraded packages nothing else needs"))
                .arg(flag("universe", "Recompute the whole installed universe in one pass"))
                .arg(flag("drop-removed", "With --universe, remove packages that vanished from the catalog")),
        )
        .subcommand(
            Command::new("order")
                .about("Resolve a package and print its solution in install order")
                .arg(Arg::new("package").required(true).help("Package selector")),
        )
        .subcommand(Command::new("levels").about("Print the build levels of every spec in the catalog"))
        .subcommand(
            Command::new("hash-tree")
                .about("Print the image hash tree of a spec")
                .arg(
                    Arg::new("package")
                        .required(true)
                        .help("Package selector of the target spec"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("arbor.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
