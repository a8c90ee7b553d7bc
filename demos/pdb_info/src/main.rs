use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgMatches, Command};
use tracing_subscriber::EnvFilter;

use symbolic::common::{CancellationToken, Sniff};
use symbolic::identify::{BoxedSource, ProviderRegistry, SymbolMetadata};
use symbolic::msf::{MsfFile, MsfFormat, Pdb20File, Pdb70File};
use symbolic::srcsrv::SourceInformation;

fn print_error(error: &anyhow::Error) {
    println!("Error: {error}");

    for cause in error.chain().skip(1) {
        println!("   caused by {cause}");
    }
}

fn print_container<F: MsfFormat>(file: &MsfFile<File, F>) {
    println!("Container:  {} ({} byte pages)", F::NAME, file.page_size());
    println!("Debug ID:   {}", file.debug_id());
    println!("Version:    {}", file.version());
    println!("Streams:    {}", file.stream_count());

    for name in file.stream_names() {
        if let Some(index) = file.named_stream_index(&name) {
            println!("  {index:>5}  {name}");
        }
    }
}

fn inspect_container(path: &Path) -> Result<()> {
    let file = File::open(path)?;
    match Pdb70File::open(file)? {
        Sniff::Recognized(pdb) => print_container(&pdb),
        Sniff::NotRecognized(file) => {
            if let Sniff::Recognized(pdb) = Pdb20File::open(file)? {
                print_container(&pdb);
            }
        }
    }

    Ok(())
}

/// Reads `original*target` lines.
fn read_mappings(path: &Path) -> Result<Vec<SourceInformation>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read mappings from {}", path.display()))?;

    let mappings = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match line.split_once('*') {
            Some((original, "")) => SourceInformation::new(original, None),
            Some((original, target)) => SourceInformation::new(original, Some(target.into())),
            None => SourceInformation::new(line, None),
        })
        .collect();

    Ok(mappings)
}

fn print_source_information(metadata: &dyn SymbolMetadata) -> Result<()> {
    if !metadata.has_source_server_info() {
        println!("Source server information: none");
        return Ok(());
    }

    let files = metadata.source_information()?;
    println!("Source server information: {} files", files.len());
    for info in files {
        println!("  {}", info.original_file());
        println!("    -> {}", info.target_path().unwrap_or("<none>"));
    }

    Ok(())
}

fn inspect(path: &Path, mappings: Option<&Path>) -> Result<()> {
    println!("Inspecting {}", path.display());

    let file = OpenOptions::new()
        .read(true)
        .write(mappings.is_some())
        .open(path)?;
    let source: BoxedSource = Box::new(file);

    let registry = ProviderRegistry::default();
    let mut metadata = match registry.identify(source, &CancellationToken::new())? {
        Sniff::Recognized(metadata) => metadata,
        Sniff::NotRecognized(_) => bail!("unknown file format"),
    };

    println!("Identifier: {}", metadata.identifier());
    if metadata.supports_source_server_info() {
        inspect_container(path)?;
        print_source_information(metadata.as_ref())?;
    }

    if let Some(mappings) = mappings {
        let files = read_mappings(mappings)?;
        println!("Writing {} source mappings", files.len());
        metadata.set_source_information(files)?;
        metadata.save()?;
    }

    Ok(())
}

fn execute(matches: &ArgMatches) {
    let mappings = matches.get_one::<PathBuf>("write_srcsrv");
    for path in matches.get_many::<PathBuf>("paths").unwrap_or_default() {
        if let Err(e) = inspect(path, mappings.map(PathBuf::as_path)) {
            print_error(&e);
        }

        println!();
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let matches = Command::new("pdb-info")
        .about("Shows symbol server identifiers and source server information")
        .arg(
            Arg::new("paths")
                .required(true)
                .num_args(1..)
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .help("Path to the symbol file")
                .index(1),
        )
        .arg(
            Arg::new("write_srcsrv")
                .long("write-srcsrv")
                .value_name("MAPPINGS")
                .value_parser(value_parser!(PathBuf))
                .help("Replaces the source server stream with `original*target` lines from a file"),
        )
        .get_matches();

    execute(&matches);
}
