//! hconverge: converge a Hadoop client node from attribute files.
//!
//! # Usage
//!
//! ```text
//! hconverge apply -a node.yaml
//! hconverge plan -a node.yaml --set 'hadoop.hadoop_env.hadoop_log_dir=/data/log/hdfs'
//! hconverge render -a node.yaml --out /tmp/conf
//! hconverge profile --set hadoop.distribution=hdp
//! ```
//!
//! Exit status: 0 converged, 1 a resource failed or the host could not be
//! read, 2 the input was rejected before anything was applied.

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use hadoop_converge_core::attributes::{load, Assignment, AttributeTree};
use hadoop_converge_core::engine;
use hadoop_converge_core::error::{Error, Result};
use hadoop_converge_core::host::local::LocalHost;
use hadoop_converge_core::settings;
use hadoop_converge_core::template::BuiltinRenderer;
use hadoop_converge_core::types::config::{PackageTool, RunSettings};

const EXIT_FAILED: i32 = 1;
const EXIT_REJECTED: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "hconverge", version, about = "Converge a Hadoop client node")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Converge the host.
    Apply(RunArgs),
    /// Report what `apply` would change without changing it.
    Plan(RunArgs),
    /// Write the rendered configuration files into a directory.
    Render {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Print the resolved distribution profile as JSON.
    Profile(InputArgs),
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Attribute file (YAML or JSON). Repeatable; later files win.
    #[arg(short, long = "attributes")]
    attributes: Vec<PathBuf>,

    /// Set one attribute: [LAYER:]PATH=VALUE.
    #[arg(long = "set", value_name = "ASSIGNMENT")]
    set: Vec<String>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Run settings file (YAML).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Map every managed path under this directory.
    #[arg(long)]
    root: Option<PathBuf>,

    #[arg(long, value_parser = parse_package_tool)]
    package_tool: Option<PackageTool>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,
}

fn parse_package_tool(s: &str) -> std::result::Result<PackageTool, String> {
    s.parse()
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match execute(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("hconverge: {}", e);
            exit_code_for(&e)
        }
    };
    process::exit(code);
}

/// Errors raised before convergence reject the input. Anything else means
/// the host could not be read or written.
fn exit_code_for(e: &Error) -> i32 {
    if e.is_pre_execution() {
        EXIT_REJECTED
    } else {
        EXIT_FAILED
    }
}

/// `RUST_LOG` wins over `-v` when it is set.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn execute(command: Command) -> Result<i32> {
    match command {
        Command::Apply(args) => converge(args, false),
        Command::Plan(args) => converge(args, true),
        Command::Render { input, out } => render(&input, &out),
        Command::Profile(input) => {
            let prepared = engine::prepare(read_attributes(&input)?, &BuiltinRenderer)?;
            println!("{}", to_json(&prepared.profile)?);
            Ok(0)
        }
    }
}

fn read_attributes(input: &InputArgs) -> Result<AttributeTree> {
    let mut tree = AttributeTree::new();
    for path in &input.attributes {
        load::load(path)?.merge_into(&mut tree)?;
    }
    for raw in &input.set {
        Assignment::parse(raw)?.apply(&mut tree)?;
    }
    Ok(tree)
}

fn run_settings(args: &RunArgs, dry_run: bool) -> Result<RunSettings> {
    let mut run = match &args.settings {
        Some(path) => settings::load(path)?,
        None => settings::default_run_settings(),
    };
    if dry_run {
        run.dry_run = true;
    }
    if args.root.is_some() {
        run.root = args.root.clone();
    }
    if args.package_tool.is_some() {
        run.package_tool = args.package_tool;
    }
    Ok(run)
}

fn converge(args: RunArgs, dry_run: bool) -> Result<i32> {
    let attrs = read_attributes(&args.input)?;
    let run = run_settings(&args, dry_run)?;

    let tool = match run.package_tool {
        Some(tool) => tool,
        None => attrs
            .get_str("platform_family")?
            .as_deref()
            .and_then(PackageTool::for_platform_family)
            .unwrap_or_else(LocalHost::detect_package_tool),
    };
    let mut host = LocalHost::new(tool);
    if let Some(root) = &run.root {
        host = host.with_root(root);
    }

    let report = engine::run(attrs, &mut host, &BuiltinRenderer, &run)?;
    if args.json {
        println!("{}", to_json(&report)?);
    } else {
        for outcome in &report.outcomes {
            println!("{:<12} {}", outcome.state.to_string(), outcome.id);
            for step in &outcome.steps {
                println!("{:<12}   - {}", "", step);
            }
        }
        println!("{}", report.summary());
    }
    Ok(report.exit_code())
}

fn render(input: &InputArgs, out: &Path) -> Result<i32> {
    let files = engine::render_conf(read_attributes(input)?, &BuiltinRenderer)?;
    std::fs::create_dir_all(out)
        .map_err(|e| Error::config(out.display().to_string(), format!("cannot create: {}", e)))?;
    for (name, content) in files {
        let path = out.join(&name);
        std::fs::write(&path, content)
            .map_err(|e| Error::config(path.display().to_string(), format!("cannot write: {}", e)))?;
        println!("{}", path.display());
    }
    Ok(0)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| Error::config("<output>", e.to_string()))
}
