#[macro_use]
extern crate clap;
#[macro_use]
extern crate lazy_static;

use std::path::PathBuf;
use std::process;
use std::time::Instant;

use clap::{Arg, ArgAction, Command};
use log::{error, LevelFilter};
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{Appender, Config, Root},
    filter::threshold::ThresholdFilter,
};

mod backup;
mod configuration;
mod formatter;
mod helper;
mod job;
mod mailer;
mod report;

use configuration::Configuration;
use job::JobOptions;

struct Arguments {
    config_file: PathBuf,
    debug: bool,
    options: JobOptions,
}

fn start_main(arguments: &Arguments) -> i32 {
    let configuration = match Configuration::load(&arguments.config_file) {
        Ok(configuration) => configuration,
        Err(message) => {
            error!("Error: {}", message);
            return 1;
        }
    };

    match job::run(&configuration, &arguments.options) {
        Ok(_) => 0,
        Err(why) => {
            error!("{}", why);
            error!("exiting");
            1
        }
    }
}

fn main() {
    let started = Instant::now();
    let arguments = get_arguments();

    let level = if arguments.debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(err) = init_logging(level) {
        eprintln!("unable to initialize logging: {}", err);
        process::exit(1);
    }

    let code = start_main(&arguments);
    if code == 0 {
        let elapsed = started.elapsed();
        println!();
        println!(
            "Completed in: {} ({} ms)",
            helper::format_duration(elapsed),
            elapsed.as_millis()
        );
    }
    process::exit(code);
}

fn init_logging(level: LevelFilter) -> Result<(), Box<dyn std::error::Error>> {
    let stderr = ConsoleAppender::builder().target(Target::Stderr).build();

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(level)))
                .build("stderr", Box::new(stderr)),
        )
        .build(Root::builder().appender("stderr").build(level))?;
    log4rs::init_config(config)?;

    Ok(())
}

fn build_command() -> Command {
    Command::new("backit")
        .version(crate_version!())
        .about("Archive the configured sources into a timestamped tar.gz and report on the job.")
        .after_help(
            "Usage examples:\n  \
             backit configs/pentest.ini\n  \
             backit configs/pentest.ini --sendlog\n  \
             backit configs/pentest.ini --keeplog --sendlog --showlog",
        )
        .disable_help_flag(true)
        .arg(
            Arg::new("configfile")
                .value_name("CONFIGFILE")
                .help("Input from configuration file"),
        )
        .arg(
            Arg::new("keeplog")
                .long("keeplog")
                .action(ArgAction::SetTrue)
                .help("Do not remove the log file"),
        )
        .arg(
            Arg::new("sendlog")
                .long("sendlog")
                .action(ArgAction::SetTrue)
                .help("E-mail the log file"),
        )
        .arg(
            Arg::new("showlog")
                .long("showlog")
                .action(ArgAction::SetTrue)
                .help("Print the log file"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Print debug output, including the SMTP conversation"),
        )
        .arg(
            Arg::new("logdir")
                .long("logdir")
                .value_name("DIR")
                .help("Directory the log file is written to [default: .]"),
        )
        .arg(
            Arg::new("help")
                .short('h')
                .long("help")
                .action(ArgAction::SetTrue)
                .help("Print help"),
        )
}

fn print_usage_and_exit() -> ! {
    eprintln!("{}", build_command().render_help());
    process::exit(1);
}

fn get_arguments() -> Arguments {
    let matches = build_command().get_matches();

    if matches.get_flag("help") {
        print_usage_and_exit();
    }
    let config_file = match matches.get_one::<String>("configfile") {
        Some(file) => PathBuf::from(file),
        None => print_usage_and_exit(),
    };
    let log_directory = matches
        .get_one::<String>("logdir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    Arguments {
        config_file,
        debug: matches.get_flag("debug"),
        options: JobOptions {
            keep_log: matches.get_flag("keeplog"),
            send_log: matches.get_flag("sendlog"),
            show_log: matches.get_flag("showlog"),
            log_directory,
        },
    }
}
