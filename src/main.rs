use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use std::io;
use std::path::PathBuf;
use tracing::{error, info};

use sandboxed_methods::config::Config;
use sandboxed_methods::core::assembly::Assembly;
use sandboxed_methods::core::auto_register::CapabilityDescriptor;
use sandboxed_methods::core::value::Value;
use sandboxed_methods::symbols::*;

const DEFAULT_TIME_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

#[derive(Parser)]
#[command(name = "sandboxed-methods")]
#[command(about = "Compose sandboxed capability modules onto host objects")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (overrides config file)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate shell completions for the specified shell
    #[arg(long, value_enum)]
    completions: Option<Shell>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Parser)]
enum Commands {
    /// List registered capability modules
    List,
    /// Build the configured hosts and apply every configured composition
    Check,
    /// Invoke a public method on a configured host
    Call {
        /// Host type name from the config
        host: String,

        /// Method to invoke
        method: String,

        /// Arguments (`:sym`, integers, floats, true/false, nil, otherwise strings)
        args: Vec<String>,

        /// Invoke on the host type instead of its sample instance
        #[arg(long)]
        class: bool,
    },
}

fn create_subscriber(
    verbose: bool,
    time_format: &str,
) -> Result<impl tracing::Subscriber + Send + Sync> {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    let format_desc = match time::format_description::parse_owned::<1>(time_format) {
        Ok(format_desc) => format_desc,
        Err(_) => {
            eprintln!("Custom time format '{time_format}' not supported. Using default format.");
            time::format_description::parse_owned::<1>(DEFAULT_TIME_FORMAT)
                .context("Failed to parse default time format")?
        }
    };

    Ok(tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_timer(tracing_subscriber::fmt::time::LocalTime::new(format_desc))
        .finish())
}

fn list_capabilities() {
    let descriptors = CapabilityDescriptor::all();

    println!("Available capabilities:");
    println!();

    if descriptors.is_empty() {
        println!("  (none registered)");
        return;
    }

    for descriptor in descriptors {
        println!(
            "{SYMBOL_TOOL_CAPABILITY} {:<12} {}",
            descriptor.name, descriptor.description
        );
        println!("    module:   {}", (descriptor.qualified_name)());
        println!("    accessor: {}", (descriptor.accessor)());
        println!("    methods:  {}", (descriptor.surface)().join(", "));
        println!();
    }

    println!("Usage:");
    println!("  [[compositions]] module = \"<name>\"  Compose a capability from config");
    println!("  sandboxed-methods check             Validate configured compositions");
}

fn handle_check_command(config: &Config) -> Result<()> {
    let assembly = match Assembly::from_config(config) {
        Ok(assembly) => assembly,
        Err(e) => {
            error!("{SYMBOL_INDICATOR_ERROR} Composition check failed: {e:#}");
            std::process::exit(1);
        }
    };

    if assembly.hosts.is_empty() {
        println!("{SYMBOL_INDICATOR_WARNING} No hosts configured");
        return Ok(());
    }

    for (name, host) in &assembly.hosts {
        println!("{SYMBOL_INDICATOR_INFO} {name}");
        println!(
            "  {SYMBOL_SCOPE_INSTANCE} instance {SYMBOL_CONTENT_ARROW_RIGHT} {}",
            assembly.runtime.exposed(&host.instance).join(", ")
        );
        println!(
            "  {SYMBOL_SCOPE_TYPE} type     {SYMBOL_CONTENT_ARROW_RIGHT} {}",
            assembly.runtime.exposed(&host.host_type).join(", ")
        );
    }

    info!(
        "{SYMBOL_INDICATOR_SUCCESS} {} composition(s) applied to {} host(s)",
        assembly.compositions.len(),
        assembly.hosts.len()
    );
    Ok(())
}

fn handle_call_command(
    config: &Config,
    host_name: &str,
    method: &str,
    args: &[String],
    class: bool,
) -> Result<()> {
    let mut assembly = Assembly::from_config(config)?;
    let host = assembly
        .host(host_name)
        .with_context(|| format!("Host '{host_name}' is not configured"))?;
    let receiver = if class {
        host.host_type.clone()
    } else {
        host.instance.clone()
    };

    let args: Vec<Value> = args.iter().map(|arg| parse_arg(arg)).collect();
    match assembly.runtime.send(&receiver, method, &args) {
        Ok(value) => {
            println!("{value}");
            for field in receiver.field_names() {
                println!("  {field} = {}", receiver.get_field(&field));
            }
            Ok(())
        }
        Err(e) => {
            error!("{SYMBOL_INDICATOR_ERROR} {e}");
            std::process::exit(1);
        }
    }
}

/// Interpret a command-line argument as a value
fn parse_arg(arg: &str) -> Value {
    if let Some(symbol) = arg.strip_prefix(':').filter(|s| !s.is_empty()) {
        return Value::sym(symbol);
    }
    match arg {
        "nil" => Value::Nil,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => arg
            .parse::<i64>()
            .map(Value::Int)
            .or_else(|_| arg.parse::<f64>().map(Value::Float))
            .unwrap_or_else(|_| Value::from(arg)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --completions flag early
    if let Some(shell) = args.completions {
        let mut app = Args::command();
        generate(shell, &mut app, "sandboxed-methods", &mut io::stdout());
        return Ok(());
    }

    let config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path).await?
    } else {
        Config::load().await?
    };

    let verbose = args.verbose || config.is_verbose_default();
    let subscriber = create_subscriber(verbose, &config.get_time_format())?;
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set default subscriber")?;

    if let Some(config_path) = &args.config {
        info!(
            "{SYMBOL_TOOL_CONFIG} Using custom config file: {}",
            config_path.display()
        );
    }

    match args.command {
        Some(Commands::Check) => handle_check_command(&config),
        Some(Commands::Call {
            host,
            method,
            args,
            class,
        }) => handle_call_command(&config, &host, &method, &args, class),
        Some(Commands::List) | None => {
            list_capabilities();
            Ok(())
        }
    }
}
