use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use pregen_adapter::{
    DirectoryArchive, InstanceFieldPatcher, MemoryArchive, ModuleArchive, SelectionPolicy,
    StructuralPatcher,
};
use pregen_driver::{DriverConfig, TargetSetup};
use pregen_symbol::{CatalogOrder, ReleaseId};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("pregen")
        .version(pregen_driver::VERSION)
        .about("Pre-generates world chunks on a dedicated game server")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("check")
                .about("Check that a release is supported by its mapping and the release catalog")
                .arg(
                    Arg::new("mapping")
                        .long("mapping")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Mapping document of the release"),
                )
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Release manifest JSON"),
                )
                .arg(
                    Arg::new("archive")
                        .long("archive")
                        .value_parser(value_parser!(PathBuf))
                        .help("Extracted server archive; its version.json names the release"),
                )
                .arg(
                    Arg::new("release")
                        .long("release")
                        .required_unless_present("archive")
                        .help("Release identifier, e.g. 1.16.1"),
                )
                .arg(
                    Arg::new("newest-first")
                        .long("newest-first")
                        .action(ArgAction::SetTrue)
                        .help("Manifest lists the newest release first"),
                )
                .arg(
                    Arg::new("best-effort")
                        .long("best-effort")
                        .action(ArgAction::SetTrue)
                        .help("Use the oldest variant for releases older than every variant"),
                ),
        )
        .subcommand(
            Command::new("run")
                .about("Check the configured release and generate the configured region")
                .arg(
                    Arg::new("config")
                        .long("config")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration naming the mapping and manifest"),
                )
                .arg(
                    Arg::new("archive")
                        .long("archive")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Extracted server archive"),
                )
                .arg(
                    Arg::new("release")
                        .long("release")
                        .help("Release identifier, if the archive has no version.json"),
                )
                .arg(
                    Arg::new("server-args")
                        .num_args(0..)
                        .last(true)
                        .help("Arguments passed to the server's entry point"),
                ),
        )
        .subcommand(
            Command::new("patch")
                .about("Add the static instance field to a class file")
                .arg(
                    Arg::new("input")
                        .long("input")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Class file to patch"),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Where to write the patched class"),
                )
                .arg(
                    Arg::new("class")
                        .long("class")
                        .required(true)
                        .help("Binary name of the class, e.g. dg"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Validate a driver configuration file")
                .arg(
                    Arg::new("path")
                        .long("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML configuration"),
                ),
        )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    match matches.subcommand() {
        Some(("check", args)) => check(args),
        Some(("run", args)) => run(args),
        Some(("patch", args)) => patch(args),
        Some(("config", args)) => config(args),
        _ => unreachable!("subcommand is required"),
    }
}

fn path_arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a PathBuf> {
    args.get_one::<PathBuf>(name)
        .with_context(|| format!("missing --{name}"))
}

fn release_arg(args: &ArgMatches) -> Option<ReleaseId> {
    args.get_one::<String>("release").map(|id| ReleaseId::new(id.as_str()))
}

fn archive_arg(args: &ArgMatches) -> Arc<dyn ModuleArchive> {
    match args.get_one::<PathBuf>("archive") {
        Some(root) => Arc::new(DirectoryArchive::new(root)),
        None => Arc::new(MemoryArchive::new()),
    }
}

fn check(args: &ArgMatches) -> Result<()> {
    let mapping = path_arg(args, "mapping")?;
    let manifest = path_arg(args, "manifest")?;
    let order = if args.get_flag("newest-first") {
        CatalogOrder::NewestFirst
    } else {
        CatalogOrder::Chronological
    };
    let policy = SelectionPolicy {
        best_effort: args.get_flag("best-effort"),
    };

    let setup = TargetSetup::load(mapping, manifest, order, archive_arg(args), release_arg(args), policy)
        .context("loading mapping")?;
    let release = setup.release().clone();
    let report = setup
        .check()
        .with_context(|| format!("release {release} is not supported"))?;

    print!("{report}");
    Ok(())
}

fn run(args: &ArgMatches) -> Result<()> {
    let path = path_arg(args, "config")?;
    let config = DriverConfig::load(path)?;
    let setup = TargetSetup::from_config(&config, archive_arg(args), release_arg(args))
        .context("loading mapping")?;
    let release = setup.release().clone();
    let report = setup
        .check()
        .with_context(|| format!("release {release} is not supported"))?;
    tracing::info!(
        release = %release,
        server_type = %report.server_type,
        region = %config.region,
        "release is supported"
    );

    let server_args: Vec<String> = args
        .get_many::<String>("server-args")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    bail!(
        "cannot launch release {release} with {server_args:?}: no managed runtime is available \
         in this build; embed pregen-driver and pass a ForeignRuntime to TargetSetup::prepare"
    )
}

fn patch(args: &ArgMatches) -> Result<()> {
    let input = path_arg(args, "input")?;
    let output = path_arg(args, "output")?;
    let class = args.get_one::<String>("class").context("missing --class")?;

    let image = std::fs::read(input).with_context(|| format!("reading {}", input.display()))?;
    let patched = InstanceFieldPatcher::default()
        .patch(class, &image)
        .with_context(|| format!("patching {class}"))?;
    std::fs::write(output, &patched).with_context(|| format!("writing {}", output.display()))?;

    tracing::info!(class = %class, before = image.len(), after = patched.len(), output = %output.display(), "patched class");
    Ok(())
}

fn config(args: &ArgMatches) -> Result<()> {
    let path = path_arg(args, "path")?;
    let config = DriverConfig::load(path)?;
    let dimensions: Vec<_> = config.dimensions.iter().map(ToString::to_string).collect();
    println!("Region: {} ({} chunks)", config.region, config.region.area());
    println!("Dimensions: {}", dimensions.join(", "));
    println!("Max generation rate: {}", config.max_generation_rate);
    println!("Save progress: {}", config.save_progress);
    Ok(())
}
