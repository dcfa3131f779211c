use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgGroup, ArgMatches, arg, command, value_parser};

pub(crate) fn cli() -> ArgMatches {
    command!()
        .arg(arg!(-d --debug "Log compilation steps").global(true).action(ArgAction::SetTrue))
        .subcommand_required(true)
        .subcommand(
            command!("compile")
                .about("Compile a XAML workflow into an open workflow net")
                .arg(arg!(-i --input <INPUT> "Raw input (inline)"))
                .arg(
                    arg!(-f --file <INPUT> "Source file to process")
                        .value_parser(value_parser!(PathBuf)),
                )
                .group(
                    ArgGroup::new("input-source")
                        .args(["input", "file"])
                        .required(true)
                        .multiple(false),
                )
                .arg(
                    Arg::new("type")
                        .short('t')
                        .long("type")
                        .value_name("FORMAT")
                        .help("Output format")
                        .value_parser(["owfn", "dot", "pdf"])
                        .default_value("owfn"),
                )
                .arg(
                    arg!(-o --output <OUTPUT> "Output file")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(arg!(--ports "Write the PORTS section of the oWFN file")),
        )
        .subcommand(
            command!("stats")
                .about("Print the size of an oWFN file")
                .arg(
                    arg!(-f --file <INPUT> "oWFN file to read")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .get_matches()
}
