use log::*;

use clap::{crate_authors, crate_version, App, AppSettings, Arg, ArgMatches};

use syschain::policy::{PolicyKind, POLICY_NAMES};
use syschain::run::{self, RunOptions};
use syschain::sysnum::{detranslate_sysnum, Abi, Sysnum};

fn command_args(index: usize) -> Arg<'static> {
    Arg::new("command")
        .help("Command to trace, followed by its arguments")
        .multiple_occurrences(true)
        .required(true)
        .index(index)
}

fn run(args: &ArgMatches) {
    let opts = RunOptions {
        command: args.values_of_t("command").unwrap_or_else(|e| e.exit()),
        policy: args.value_of_t_or_exit::<PolicyKind>("policy"),
    };

    match run::run(&opts) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            error!("{}", err);
            std::process::exit(1);
        }
    }
}

fn sysnum(args: &ArgMatches) {
    let sysnum = args.value_of_t_or_exit::<Sysnum>("name");
    let abi = args.value_of_t_or_exit::<Abi>("abi");
    println!("{}", detranslate_sysnum(abi, sysnum) as i64);
}

fn setup_logging(matches: &clap::ArgMatches) {
    if matches.is_present("verbose") {
        env_logger::Builder::new().parse_filters("debug").init();
        return;
    }

    let loglevel = matches.value_of("loglevel");
    if let Some(level) = loglevel {
        env_logger::Builder::new().parse_filters(level).init();
        return;
    }

    // default
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

fn main() {
    let run_command = App::new("run")
        .about("Run a command and translate its syscalls.")
        .version(crate_version!())
        .author(crate_authors!("\n"))
        .setting(AppSettings::TrailingVarArg)
        .arg(
            Arg::new("policy")
                .short('p')
                .long("policy")
                .takes_value(true)
                .possible_values(POLICY_NAMES)
                .default_value("none")
                .help("Syscall policy applied to the command"),
        )
        .arg(command_args(1));

    let sysnum_command = App::new("sysnum")
        .about("Print the number of a syscall.")
        .version(crate_version!())
        .author(crate_authors!("\n"))
        .arg(
            Arg::new("name")
                .help("Syscall name, e.g. openat")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("abi")
                .long("abi")
                .takes_value(true)
                .possible_values(&["x86_64", "i386"])
                .default_value("x86_64"),
        );

    let main_app = App::new("syschain")
        .about("Trace a command and chain syscalls into its syscall stream.")
        .version(crate_version!())
        .author(crate_authors!("\n"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::new("verbose")
             .short('v')
             .conflicts_with("loglevel")
             .help("shorthand for --loglevel debug)"))
        .arg(Arg::new("loglevel")
             .short('l')
             .takes_value(true)
             .help("Finegrained verbosity control. See docs.rs/env_logger. Examples: [error, warn, info, debug, trace]"))
        .subcommands([run_command, sysnum_command]);

    let matches = main_app.get_matches();
    setup_logging(&matches);
    match matches.subcommand() {
        Some(("run", sub_matches)) => run(sub_matches),
        Some(("sysnum", sub_matches)) => sysnum(sub_matches),
        Some((_, _)) => unreachable!(),
        None => unreachable!(),
    }
}
