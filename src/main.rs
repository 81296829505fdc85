use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use dayone_export::config::{self, ExportConfig};
use dayone_export::filter::{ANY_TAG, TagFilter, split_tags};
use dayone_export::output::{self, Written};
use dayone_export::template::default_template_dir;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dayone-export")]
#[command(about = "Export Day One journal entries through a template")]
#[command(long_about = "\
Export Day One journal entries through a template

Reads a Day One journal folder and renders its entries with a Handlebars
template, to stdout or to one or more files.

Journal structure:

  Journal.dayone/
  ├── entries/
  │   └── <UUID>.doentry         # One property list per entry
  └── photos/                    # Optional
      └── <UUID>.jpg             # Attached to the entry with that UUID

Templates are looked up in the current directory (only when --template is
a bare name), then ~/.dayone_export, then the built-in default.html and
default.md. --template-dir restricts the search to one directory.

Output file names may contain strftime codes: -o 'journal-%Y-%m.html'
writes one file per month.

Run 'dayone-export gen-config' to generate a documented config.toml.")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(flatten)]
    export: ExportArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(clap::Args)]
struct ExportArgs {
    /// Path to the Day One journal folder
    journal: Option<PathBuf>,

    /// Output file; strftime codes split the output into several files
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Template file name or path
    #[arg(long)]
    template: Option<PathBuf>,

    /// Only look for templates in this directory
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// Output format; picks default.<format> (inferred from --output)
    #[arg(long)]
    format: Option<String>,

    /// Keep entries with one of these comma-separated tags, or 'any'
    #[arg(long)]
    tags: Option<String>,

    /// Drop entries with any of these comma-separated tags
    #[arg(long)]
    exclude: Option<String>,

    /// Keep entries created on or after this date
    #[arg(long)]
    after: Option<String>,

    /// Keep entries created before this date
    #[arg(long)]
    before: Option<String>,

    /// Newest entries first
    #[arg(long)]
    reverse: bool,

    /// Turn the first line of each entry into a heading
    #[arg(long)]
    autobold: bool,

    /// Turn single newlines into line breaks
    #[arg(long)]
    nl2br: bool,

    /// Config file (default: config.toml in the template directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::GenConfig) = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let args = cli.export;
    init_logging(args.verbose);

    let Some(journal) = args.journal.as_deref() else {
        Cli::command()
            .error(
                clap::error::ErrorKind::MissingRequiredArgument,
                "the journal folder is required",
            )
            .exit();
    };

    let export_config = resolve_export_config(&args)?;
    debug!(?export_config, "resolved options");

    let groups = dayone_export::dayone_export(journal, &export_config)?;

    if export_config.filename_template.is_empty() {
        let mut stdout = std::io::stdout().lock();
        for group in groups {
            let (_, text) = group?;
            stdout.write_all(text.as_bytes())?;
        }
        stdout.flush()?;
        return Ok(());
    }

    let mut written = Vec::new();
    for group in groups {
        let (name, text) = group?;
        let path = PathBuf::from(name);
        write_document(&path, &text)?;
        written.push(Written {
            path,
            bytes: text.len(),
        });
    }
    output::print_written(&written);

    Ok(())
}

/// Stock defaults, then the config file, then command-line flags.
fn resolve_export_config(args: &ExportArgs) -> Result<ExportConfig, config::ConfigError> {
    let file = match &args.config {
        Some(path) => Some(config::load_config_file(path)?),
        None => match args.template_dir.clone().or_else(default_template_dir) {
            Some(dir) => config::load_raw_config(&dir)?,
            None => None,
        },
    };
    config::resolve_config(
        config::stock_defaults_value(),
        file.into_iter().chain([flag_overlay(args)]),
    )
}

/// The options set on the command line, as a TOML table.
fn flag_overlay(args: &ExportArgs) -> toml::Value {
    let mut table = toml::Table::new();
    let mut set = |key: &str, value: toml::Value| {
        table.insert(key.to_string(), value);
    };

    if let Some(template) = &args.template {
        set("template", path_value(template));
    }
    if let Some(dir) = &args.template_dir {
        set("template_dir", path_value(dir));
    }
    match (&args.format, &args.output) {
        (Some(format), _) => set("format", toml::Value::String(format.clone())),
        (None, Some(output)) if args.template.is_none() => {
            if let Some(ext) = output.extension() {
                set("format", toml::Value::String(ext.to_string_lossy().into_owned()));
            }
        }
        _ => {}
    }
    if let Some(tags) = &args.tags {
        let value = match TagFilter::parse(tags) {
            TagFilter::Any => toml::Value::String(ANY_TAG.to_string()),
            TagFilter::Only(tags) => string_list(tags),
        };
        set("tags", value);
    }
    if let Some(exclude) = &args.exclude {
        set("exclude", string_list(split_tags(exclude)));
    }
    if let Some(after) = &args.after {
        set("after", toml::Value::String(after.clone()));
    }
    if let Some(before) = &args.before {
        set("before", toml::Value::String(before.clone()));
    }
    for (key, on) in [
        ("reverse", args.reverse),
        ("autobold", args.autobold),
        ("nl2br", args.nl2br),
    ] {
        if on {
            set(key, toml::Value::Boolean(true));
        }
    }
    if let Some(output) = &args.output {
        set("filename_template", path_value(output));
    }

    toml::Value::Table(table)
}

fn path_value(path: &Path) -> toml::Value {
    toml::Value::String(path.to_string_lossy().into_owned())
}

fn string_list(items: impl IntoIterator<Item = String>) -> toml::Value {
    toml::Value::Array(items.into_iter().map(toml::Value::String).collect())
}

fn write_document(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

/// Logs go to stderr; stdout may carry the rendered document.
fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
