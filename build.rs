// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn dependency_args(cmd: Command, what: &'static str) -> Command {
    cmd.arg(Arg::new("name").required(true).help(what))
        .arg(Arg::new("op").help("Comparison operator (<, <=, =, >=, >)"))
        .arg(Arg::new("evr").help("[epoch:]version[-release]"))
}

fn package_arg() -> Arg {
    Arg::new("package")
        .required(true)
        .help("Package name or pattern matching exactly one package")
}

fn build_cli() -> Command {
    Command::new("pkgsack")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Pkgsack Contributors")
        .about("Query and check the installed package set")
        .subcommand_required(true)
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .global(true)
                .default_value("/")
                .help("Installation root"),
        )
        .arg(
            Arg::new("db_path")
                .short('d')
                .long("db-path")
                .global(true)
                .value_name("PATH")
                .help("Package database path, relative to the root"),
        )
        .arg(
            Arg::new("cachedir")
                .long("cachedir")
                .global(true)
                .value_name("DIR")
                .help("Cache directory, relative to the root"),
        )
        .arg(
            Arg::new("no_cache")
                .long("no-cache")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Ignore and never write the on-disk caches"),
        )
        .arg(
            Arg::new("auto_close")
                .long("auto-close")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Close the database after every operation"),
        )
        .subcommand(Command::new("init").about("Initialize the package database"))
        .subcommand(
            Command::new("import")
                .about("Record RPM files as installed")
                .arg(
                    Arg::new("package_paths")
                        .required(true)
                        .num_args(1..)
                        .help("Paths to the package files"),
                )
                .arg(Arg::new("repo").long("repo").help("Repository the packages came from"))
                .arg(
                    Arg::new("reason")
                        .long("reason")
                        .default_value("user")
                        .help("Why the packages were installed"),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove installed packages matching a pattern")
                .arg(Arg::new("pattern").required(true).help("Package name or pattern")),
        )
        .subcommand(
            Command::new("list")
                .about("List installed packages")
                .arg(
                    Arg::new("patterns")
                        .num_args(0..)
                        .help("Shell-style patterns (all packages if omitted)"),
                )
                .arg(
                    Arg::new("ignore_case")
                        .short('i')
                        .long("ignore-case")
                        .action(ArgAction::SetTrue)
                        .help("Match patterns case-insensitively"),
                ),
        )
        .subcommand(
            Command::new("info")
                .about("Show details of installed packages")
                .arg(Arg::new("pattern").required(true).help("Package name or pattern")),
        )
        .subcommand(dependency_args(
            Command::new("provides").about("Show which packages provide a capability"),
            "Capability name or file path",
        ))
        .subcommand(dependency_args(
            Command::new("whatrequires").about("Show which packages require a capability"),
            "Capability name",
        ))
        .subcommand(
            Command::new("check")
                .about("Check installed packages for dependency problems and duplicates")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print problems as JSON"),
                )
                .arg(
                    Arg::new("ignore")
                        .long("ignore")
                        .action(ArgAction::Append)
                        .help("Package names to skip in the duplicate check"),
                ),
        )
        .subcommand(
            Command::new("version")
                .about("Print the installed-set version digest")
                .arg(
                    Arg::new("all")
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .help("Also break it down by origin repository"),
                ),
        )
        .subcommand(
            Command::new("attr")
                .about("Read or write per-package attributes")
                .subcommand_required(true)
                .subcommand(
                    Command::new("get")
                        .about("Print one attribute")
                        .arg(package_arg())
                        .arg(Arg::new("attr").required(true)),
                )
                .subcommand(
                    Command::new("set")
                        .about("Set one attribute")
                        .arg(package_arg())
                        .arg(Arg::new("attr").required(true))
                        .arg(Arg::new("value").required(true)),
                )
                .subcommand(
                    Command::new("del")
                        .about("Delete one attribute")
                        .arg(package_arg())
                        .arg(Arg::new("attr").required(true)),
                )
                .subcommand(
                    Command::new("list")
                        .about("List attribute names")
                        .arg(package_arg()),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory
    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    // Generate main man page
    let cmd = build_cli();
    let man = Man::new(cmd);
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("pkgsack.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
