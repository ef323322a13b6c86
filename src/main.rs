//! infra-plugins: single-shot metrics collectors that print one JSON document per run.

#[macro_use]
extern crate log;

use std::env;
use std::io::{self, Write};

use chrono::Local;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::{LevelFilter, SetLoggerError};

use infra_plugins::collectors::{self, COLLECTORS};
use infra_plugins::{plugin, Env};

static VERSION: &str = env!("CARGO_PKG_VERSION");

fn main() {
    let cli_args = build_cli().get_matches();
    let (name, sub_args) = cli_args.subcommand();
    let verbose = flag(&cli_args, sub_args, "verbose");
    let pretty_print = flag(&cli_args, sub_args, "pretty-print");

    if init_logger(verbose).is_err() {
        exit_with_error("Could not initialize logger");
    }
    std::panic::set_hook(Box::new(print_panic_and_abort));

    if name == "version" {
        println!("{}", VERSION);
        return;
    }

    if let Err(err) = run(name, pretty_print) {
        error!("{} failed: {}", name, err);
        std::process::exit(1);
    }
}

fn build_cli() -> App<'static, 'static> {
    let mut app = App::new("infra-plugins")
        .version(VERSION)
        .about("Collects the status of one service and prints it as a JSON document")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .setting(AppSettings::VersionlessSubcommands)
        .arg(Arg::with_name("pretty-print").long("pretty-print").global(true).help("Indents the JSON output"))
        .arg(Arg::with_name("verbose").long("verbose").global(true).help("Logs debug messages to stderr"));

    for &(name, about) in COLLECTORS {
        app = app.subcommand(SubCommand::with_name(name).about(about));
    }
    app.subcommand(SubCommand::with_name("version").about("Prints the plugin version"))
}

fn flag(cli_args: &ArgMatches, sub_args: Option<&ArgMatches>, name: &str) -> bool {
    cli_args.is_present(name) || sub_args.map(|args| args.is_present(name)).unwrap_or(false)
}

fn run(name: &str, pretty_print: bool) -> Result<(), collectors::Error> {
    let env = Env::from_process();
    let collector = collectors::create_collector(name, &env)?;
    let data = infra_plugins::run(collector.as_ref())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    plugin::emit(&mut out, &data, pretty_print)
}

fn print_panic_and_abort(info: &std::panic::PanicHookInfo<'_>) {
    if let Some(loc) = info.location() {
        eprintln!("Application panicked at {}", loc);
    } else {
        eprintln!("Application panicked");
    }

    if let Some(msg) = info.payload().downcast_ref::<&str>() {
        eprintln!("Reason: {}", msg);
    } else if let Some(msg) = info.payload().downcast_ref::<String>() {
        eprintln!("Reason: {}", msg);
    }

    std::process::abort()
}

fn init_logger(verbose: bool) -> Result<(), SetLoggerError> {
    let level = if verbose { LevelFilter::Debug } else { LevelFilter::Warn };

    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}:{}",
                Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
                record.level(),
                record.args(),
                record.file().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
            )
        })
        .filter_level(level)
        .target(env_logger::Target::Stderr);

    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder.try_init()
}

fn exit_with_error(msg: &str) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}
