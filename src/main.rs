mod cli;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::ArgMatches;
use log::LevelFilter;
use wfnet::{Error, OwfnOptions, Registry, default_output, format_from_ext, process_workflow};

fn main() -> ExitCode {
    let matches = cli::cli();

    let level = if matches.get_flag("debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let result = match matches.subcommand() {
        Some(("compile", args)) => compile(args),
        Some(("stats", args)) => stats(args),
        _ => Ok(()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn compile(args: &ArgMatches) -> Result<(), Error> {
    let file = args.get_one::<PathBuf>("file");
    let input = match file {
        Some(path) => std::fs::read_to_string(path)?,
        None => args
            .get_one::<String>("input")
            .cloned()
            .unwrap_or_default(),
    };

    let format = format_from_ext(
        args.get_one::<String>("type")
            .map_or("owfn", String::as_str),
    )?;
    let output = args
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| default_output(file.map(PathBuf::as_path), format));
    let options = OwfnOptions {
        ports: args.get_flag("ports"),
    };

    process_workflow(&input, &Registry::standard(), &output, format, options)?;
    println!("✅ {}", output.display());
    Ok(())
}

fn stats(args: &ArgMatches) -> Result<(), Error> {
    let Some(path) = args.get_one::<PathBuf>("file") else {
        return Ok(());
    };
    let text = std::fs::read_to_string(path)?;
    println!("{}", wfnet::read_statistics(&text)?);
    Ok(())
}
