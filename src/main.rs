//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use aslc::{error::Diagnostics, Options};
use clap::{self, crate_version, Arg, Command};

use std::{
    fs::{self, File},
    io::{self, BufReader, Write},
    path::{Path, PathBuf},
    process,
};

fn main() -> anyhow::Result<()> {
    let env = env_logger::Env::default().filter_or("ASLC_LOG", "warn");
    env_logger::init_from_env(env);

    // Parsing de CLI
    let args = Command::new("aslc")
        .version(crate_version!())
        .about("ACPI Source Language compiler")
        .arg(
            Arg::new("input")
                .value_name("INPUT")
                .required(true)
                .help("ASL source file"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .takes_value(true)
                .value_name("FILE")
                .help("Output file ('-' for stdout), defaults to the DefinitionBlock file name"),
        )
        .arg(
            Arg::new("creator-id")
                .long("creator-id")
                .takes_value(true)
                .value_name("ID")
                .help("Creator ID written to the table header, up to 4 characters"),
        )
        .arg(
            Arg::new("creator-revision")
                .long("creator-revision")
                .takes_value(true)
                .value_name("N")
                .help("Creator revision written to the table header"),
        )
        .arg(
            Arg::new("namespace")
                .long("namespace")
                .help("Print the resolved namespace to stderr"),
        )
        .get_matches();

    let input = args.value_of("input").context("Missing input file")?;

    let mut options = Options::default();
    if let Some(id) = args.value_of("creator-id") {
        if id.is_empty() || id.len() > 4 || !id.is_ascii() {
            bail!("Creator ID must be 1 to 4 ASCII characters: {:?}", id);
        }

        options.creator_id = aslc::aml::pad(id);
    }

    if let Some(revision) = args.value_of("creator-revision") {
        options.creator_revision = parse_u32(revision)
            .with_context(|| format!("Bad creator revision: {}", revision))?;
    }

    let file = File::open(input).with_context(|| format!("Failed to open: {}", input))?;

    let unit = aslc::parse(BufReader::new(file), input).unwrap_or_else(|error| fail(error));
    if args.is_present("namespace") {
        eprint!("{}", unit.namespace);
    }

    let table = unit.emit(&options).unwrap_or_else(|error| fail(error));

    match args.value_of("output") {
        // Salida a stdout
        Some("-") => {
            let mut stdout = io::stdout();
            stdout
                .write_all(&table)
                .and_then(|()| stdout.flush())
                .context("Failed to write to stdout")?;
        }

        // Salida a archivo
        path => {
            let path = match path {
                Some(path) => PathBuf::from(path),
                None => default_output(input, &unit.block.hint),
            };

            fs::write(&path, &table)
                .with_context(|| format!("Failed to write: {}", path.display()))?;
        }
    }

    Ok(())
}

/// Reporta el diagnóstico y termina con el código de su categoría.
fn fail(diagnostics: Diagnostics) -> ! {
    eprint!("{}", diagnostics);
    process::exit(diagnostics.status().exit_code());
}

/// Nombre sugerido por el `DefinitionBlock`, junto al archivo de entrada.
fn default_output(input: &str, hint: &str) -> PathBuf {
    let input = Path::new(input);
    if hint.is_empty() {
        input.with_extension("aml")
    } else {
        input.with_file_name(hint)
    }
}

fn parse_u32(text: &str) -> Result<u32, std::num::ParseIntError> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    }
}
