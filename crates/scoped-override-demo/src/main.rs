//! Scoped override walkthrough
//!
//! Runs the nesting, failure, thread isolation and empty-stack scenarios and
//! prints what each frame observed. Set `RUST_LOG=trace` to also see the
//! per-thread registries being created and torn down.

use clap::{value_parser, Arg, Command};
use tracing_subscriber::EnvFilter;

mod harness;

use harness::{run_empty, run_failing, run_nested, run_threads, ScenarioReport};

fn start_arg() -> Arg {
    Arg::new("start")
        .long("start")
        .default_value("10")
        .value_parser(value_parser!(i32))
        .help("Level installed before climbing")
}

fn limit_arg() -> Arg {
    Arg::new("limit")
        .long("limit")
        .default_value("20")
        .value_parser(value_parser!(i32))
        .help("Level at which the climb stops")
}

fn cli() -> Command {
    Command::new("scoped-override-demo")
        .version(scoped_override::VERSION)
        .about("Walk through scoped override behaviour")
        .subcommand(
            Command::new("nested")
                .about("Climb by installing ever higher levels")
                .arg(start_arg())
                .arg(limit_arg()),
        )
        .subcommand(
            Command::new("failing")
                .about("Climb that fails part way and unwinds")
                .arg(start_arg())
                .arg(limit_arg())
                .arg(
                    Arg::new("fail-at")
                        .long("fail-at")
                        .default_value("15")
                        .value_parser(value_parser!(i32))
                        .help("Level at which the climb fails"),
                ),
        )
        .subcommand(
            Command::new("threads")
                .about("Climb on several threads at once")
                .arg(
                    Arg::new("threads")
                        .long("threads")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Number of threads"),
                )
                .arg(start_arg().default_value("18"))
                .arg(limit_arg()),
        )
        .subcommand(
            Command::new("empty")
                .about("Climb without installing a start level")
                .arg(limit_arg()),
        )
        .subcommand(Command::new("all").about("Run every scenario with defaults"))
}

fn run_all() -> Vec<ScenarioReport> {
    vec![
        run_nested(10, 20),
        run_failing(10, 15, 20),
        run_threads(4, 18, 20),
        run_empty(20),
    ]
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();

    let reports = match matches.subcommand() {
        Some(("nested", args)) => {
            let start = *args
                .get_one::<i32>("start")
                .ok_or_else(|| anyhow::anyhow!("missing --start"))?;
            let limit = *args
                .get_one::<i32>("limit")
                .ok_or_else(|| anyhow::anyhow!("missing --limit"))?;
            vec![run_nested(start, limit)]
        }
        Some(("failing", args)) => {
            let start = *args
                .get_one::<i32>("start")
                .ok_or_else(|| anyhow::anyhow!("missing --start"))?;
            let limit = *args
                .get_one::<i32>("limit")
                .ok_or_else(|| anyhow::anyhow!("missing --limit"))?;
            let fail_at = *args
                .get_one::<i32>("fail-at")
                .ok_or_else(|| anyhow::anyhow!("missing --fail-at"))?;
            vec![run_failing(start, fail_at, limit)]
        }
        Some(("threads", args)) => {
            let threads = *args
                .get_one::<usize>("threads")
                .ok_or_else(|| anyhow::anyhow!("missing --threads"))?;
            let start = *args
                .get_one::<i32>("start")
                .ok_or_else(|| anyhow::anyhow!("missing --start"))?;
            let limit = *args
                .get_one::<i32>("limit")
                .ok_or_else(|| anyhow::anyhow!("missing --limit"))?;
            vec![run_threads(threads, start, limit)]
        }
        Some(("empty", args)) => {
            let limit = *args
                .get_one::<i32>("limit")
                .ok_or_else(|| anyhow::anyhow!("missing --limit"))?;
            vec![run_empty(limit)]
        }
        _ => run_all(),
    };

    for report in &reports {
        println!("{}", report.generate_text());
    }

    if reports.iter().all(|report| report.passed) {
        Ok(())
    } else {
        anyhow::bail!("one or more scenarios failed")
    }
}
