//! Command line definition.

pub mod handlers;

use clap::{value_parser, Arg, ArgAction, Command};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
/// `acquire` found every permit taken.
pub const EXIT_NO_PERMIT: i32 = 3;

pub fn build_cli() -> Command {
    Command::new("permitdb")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Counting semaphores shared by every process that opens the same database")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("db")
                .long("db")
                .global(true)
                .value_name("PATH")
                .help("Database file (overrides config and PERMITDB_DB_PATH)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_name("PATH")
                .help("Config file layered over the global config"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .short('j')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging on stderr"),
        )
        .subcommand(cmd_acquire())
        .subcommand(cmd_release())
        .subcommand(cmd_refresh())
        .subcommand(cmd_holder())
        .subcommand(cmd_status())
        .subcommand(cmd_reset())
        .subcommand(cmd_gc())
        .subcommand(cmd_count())
}

fn key_arg() -> Arg {
    Arg::new("key")
        .required(true)
        .value_name("KEY")
        .help("Semaphore key")
}

fn token_arg() -> Arg {
    Arg::new("token")
        .required(true)
        .value_name("TOKEN")
        .help("Token returned by acquire")
}

fn timeout_arg(default: &'static str) -> Arg {
    Arg::new("timeout")
        .long("timeout")
        .short('t')
        .value_name("SECS")
        .default_value(default)
        .allow_negative_numbers(true)
        .value_parser(value_parser!(i64))
        .help("Lease length in seconds")
}

fn cmd_acquire() -> Command {
    Command::new("acquire")
        .about("Try to take a permit; exits 3 when none is available")
        .arg(key_arg())
        .arg(
            Arg::new("permits")
                .long("permits")
                .short('p')
                .value_name("N")
                .default_value("1")
                .value_parser(value_parser!(u32))
                .help("Maximum concurrent holders for the key"),
        )
        .arg(timeout_arg("60"))
        .arg(
            Arg::new("context")
                .long("context")
                .value_name("TEXT")
                .help("Holder label shown to operators (default: permitdb pid-<pid>)"),
        )
}

fn cmd_release() -> Command {
    Command::new("release")
        .about("Give back a permit")
        .arg(key_arg())
        .arg(token_arg())
}

fn cmd_refresh() -> Command {
    Command::new("refresh")
        .about("Extend the lease of a held permit")
        .arg(key_arg())
        .arg(token_arg())
        .arg(timeout_arg("60"))
}

fn cmd_holder() -> Command {
    Command::new("holder")
        .about("Show the context of a current holder")
        .arg(key_arg())
}

fn cmd_status() -> Command {
    Command::new("status")
        .about("List the slots of a key")
        .arg(key_arg())
}

fn cmd_reset() -> Command {
    Command::new("reset").about("Force-release every permit of every key")
}

fn cmd_gc() -> Command {
    Command::new("gc")
        .about("Delete released slots whose grace period is over")
        .arg(
            Arg::new("watch")
                .long("watch")
                .short('w')
                .action(ArgAction::SetTrue)
                .help("Keep collecting until interrupted"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(1..))
                .requires("watch")
                .help("Seconds between sweeps (default: gc.interval_secs)"),
        )
}

fn cmd_count() -> Command {
    Command::new("count").about("Count slot rows across all keys")
}
