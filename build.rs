// build.rs

use clap::{Arg, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("hapinstall")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Hapinstall Contributors")
        .about("On-device HAP package installer with rollback")
        .subcommand_required(false)
        .arg(
            Arg::new("root")
                .short('r')
                .long("root")
                .value_name("DIR")
                .default_value("/")
                .global(true)
                .help("Root directory all installer paths live under"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("JSON config file (overrides --root)"),
        )
        .arg(
            Arg::new("platform")
                .short('p')
                .long("platform")
                .value_parser(["lite", "linux"])
                .global(true)
                .help("Platform variant"),
        )
        .subcommand(
            Command::new("install")
                .about("Install or upgrade a HAP package")
                .arg(Arg::new("package_path").required(true).help("Path to the package file")),
        )
        .subcommand(
            Command::new("uninstall")
                .about("Uninstall a bundle")
                .arg(Arg::new("bundle_name").required(true).help("Bundle name to remove")),
        )
        .subcommand(
            Command::new("query")
                .about("Show an installed bundle")
                .arg(Arg::new("bundle_name").required(true).help("Bundle name")),
        )
        .subcommand(Command::new("list").about("List installed bundles"))
        .subcommand(
            Command::new("scan").about("Reload records and install missing pre-installed apps"),
        )
        .subcommand(
            Command::new("peek")
                .about("Print the bundle name declared by a package header")
                .arg(Arg::new("package_path").required(true).help("Path to the package file")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
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
    man.render(&mut buffer)
        .expect("Failed to render man page");

    let man_path = man_dir.join("hapinstall.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
