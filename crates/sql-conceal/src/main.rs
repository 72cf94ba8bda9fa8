//! SQL Conceal command-line interface

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use sql_conceal_core::extractor::unwrap_sql_block;
use sql_conceal_core::{
    summarize, Analysis, Category, Config, MappingTable, MaskingSession, NamingMode, SqlAnalyzer,
    SqlSummary,
};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    #[arg(
        long,
        global = true,
        default_value = "info",
        help = "Log level (error, warn, info, debug, trace)"
    )]
    pub log_level: String,

    #[arg(long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the entities, summary and warnings for a query
    Analyze {
        #[arg(help = "SQL file to read, or - for stdin")]
        input: String,

        #[arg(long, help = "Print machine-readable JSON")]
        json: bool,
    },

    /// Replace schema names and literals with placeholders
    Mask {
        #[arg(help = "SQL file to read, or - for stdin")]
        input: String,

        #[arg(long, help = "Where to write the mapping document")]
        mapping_out: Option<PathBuf>,

        #[arg(long, help = "Reuse an existing mapping document instead of analyzing")]
        mapping_in: Option<PathBuf>,

        #[arg(long, value_enum, help = "Placeholder style (overrides the configuration)")]
        mode: Option<NamingMode>,

        #[arg(long, help = "Seed for realistic names")]
        seed: Option<u64>,

        #[arg(long, help = "Write the masked text here instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Restore originals in text produced from a masked query
    Unmask {
        #[arg(help = "Text file to read, or - for stdin")]
        input: String,

        #[arg(long, help = "Mapping document produced by mask")]
        mapping: PathBuf,

        #[arg(long, help = "Write the restored text here instead of stdout")]
        output: Option<PathBuf>,
    },

    /// Inspect or edit a mapping document
    Mapping {
        #[command(subcommand)]
        action: MappingCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum MappingCommand {
    /// List every entry with its placeholder
    Show {
        path: PathBuf,

        #[arg(long, help = "Print statistics as JSON")]
        json: bool,
    },

    /// Enable or disable a single entry
    Toggle {
        path: PathBuf,

        #[arg(long, help = "Entry category (table, column, string, ...)")]
        category: Category,

        #[arg(long, help = "Original text of the entry")]
        original: String,

        #[arg(long, conflicts_with = "disable", required_unless_present = "disable")]
        enable: bool,

        #[arg(long)]
        disable: bool,
    },
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut text = String::new();
        tokio::io::stdin().read_to_string(&mut text).await?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read input '{}'", input))
    }
}

async fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, text)
                .await
                .with_context(|| format!("Failed to write '{}'", path.display()))?;
            info!("Wrote {}", path.display());
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}

async fn read_document(path: &Path) -> Result<Value> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read mapping '{}'", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Mapping '{}' is not valid JSON", path.display()))
}

async fn write_document(path: &Path, table: &MappingTable) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = table.serialize().to_json_pretty()?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write mapping '{}'", path.display()))?;
    info!("Saved mapping to {}", path.display());
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => {
            info!("Loading configuration from: {}", config_path.display());
            Config::from_file(config_path)?
        }
        None => match Config::get_default_config_path() {
            Ok(default_path) if default_path.exists() => {
                info!("Loading configuration from default location: {}", default_path.display());
                Config::from_file(&default_path)?
            }
            Ok(default_path) => {
                info!("Creating default configuration at: {}", default_path.display());
                let mut config = Config::default();
                config.resolve_paths()?;
                config.to_file(&default_path)?;
                config
            }
            Err(_) => {
                info!("Using default configuration (could not determine config directory)");
                let mut config = Config::default();
                config.resolve_paths()?;
                config
            }
        },
    };

    config.validate()?;
    info!("Configuration validated successfully");
    Ok(config)
}

fn render_analysis(analysis: &Analysis, summary: &SqlSummary) -> String {
    let entities = &analysis.entities;
    let mut lines = vec![
        format!("Query type: {}", summary.query_type),
        format!("Tables: {}", summary.tables.join(", ")),
        format!("CTEs: {}", summary.cte_count),
        format!("Lines: {}", summary.lines),
        String::new(),
        format!("Entities ({}):", entities.total()),
    ];
    lines.extend(
        [
            ("tables", &entities.tables),
            ("columns", &entities.columns),
            ("strings", &entities.strings),
            ("functions", &entities.functions),
            ("aliases", &entities.aliases),
        ]
        .into_iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(label, values)| format!("  {}: {}", label, values.join(", "))),
    );

    if analysis.degraded {
        lines.push(String::new());
        lines.push("Parsed with the regex fallback".to_string());
    }
    if !analysis.warnings.is_empty() {
        lines.push(String::new());
        lines.push("Warnings:".to_string());
        lines.extend(analysis.warnings.iter().map(|w| format!("  - {}", w)));
    }
    lines.join("\n") + "\n"
}

fn render_mapping(table: &MappingTable) -> String {
    let mut lines = vec![format!(
        "Session {} ({} mode, {} entries)",
        table.session_id(),
        table.naming_mode(),
        table.len()
    )];

    for category in Category::ALL {
        let mut entries = table.entries(category).peekable();
        if entries.peek().is_none() {
            continue;
        }
        lines.push(String::new());
        lines.push(format!("{}:", category.section()));
        lines.extend(entries.map(|entry| {
            let state = if entry.enabled { "" } else { " (disabled)" };
            format!("  {} -> {}{}", entry.original, entry.placeholder, state)
        }));
    }
    lines.join("\n") + "\n"
}

async fn execute(command: Command, mut config: Config) -> Result<()> {
    match command {
        Command::Analyze { input, json } => {
            let text = read_input(&input).await?;
            let sql = if config.extraction.strip_code_fences {
                unwrap_sql_block(&text)
            } else {
                text.as_str()
            };
            let analysis = SqlAnalyzer::new(&config.extraction).analyze(&text);
            let summary = summarize(sql);

            let rendered = if json {
                let value = serde_json::json!({
                    "entities": analysis.entities,
                    "summary": summary,
                    "warnings": analysis.warnings,
                    "degraded": analysis.degraded,
                });
                serde_json::to_string_pretty(&value)? + "\n"
            } else {
                render_analysis(&analysis, &summary)
            };
            write_output(None, &rendered).await
        }

        Command::Mask {
            input,
            mapping_out,
            mapping_in,
            mode,
            seed,
            output,
        } => {
            if let Some(mode) = mode {
                config.naming.mode = mode;
            }
            if seed.is_some() {
                config.naming.seed = seed;
            }
            let mapping_dir = config.mapping.directory.clone();
            let mut session = MaskingSession::new(config);

            if let Some(path) = &mapping_in {
                let document = read_document(path).await?;
                if let Some(mismatch) = session.load_mapping(&document)? {
                    warn!("{}", mismatch);
                }
            }

            let text = read_input(&input).await?;
            let masked = session.mask(&text)?;

            let table = session
                .mapping()
                .ok_or_else(|| anyhow::anyhow!("No mapping was produced"))?;
            let mapping_path = match (mapping_out, &mapping_in) {
                (Some(path), _) => Some(path),
                (None, Some(_)) => None,
                (None, None) => Some(mapping_dir.join(format!("{}.json", table.session_id()))),
            };
            if let Some(path) = mapping_path {
                write_document(&path, table).await?;
            }

            write_output(output.as_deref(), &masked).await
        }

        Command::Unmask {
            input,
            mapping,
            output,
        } => {
            let document = read_document(&mapping).await?;
            let mut session = MaskingSession::new(config);
            if let Some(mismatch) = session.load_mapping(&document)? {
                info!("{}", mismatch);
            }

            let text = read_input(&input).await?;
            let restored = session.unmask(&text)?;
            write_output(output.as_deref(), &restored).await
        }

        Command::Mapping { action } => match action {
            MappingCommand::Show { path, json } => {
                let table = MappingTable::deserialize(&read_document(&path).await?)?;
                let rendered = if json {
                    serde_json::to_string_pretty(&table.statistics())? + "\n"
                } else {
                    render_mapping(&table)
                };
                write_output(None, &rendered).await
            }
            MappingCommand::Toggle {
                path,
                category,
                original,
                enable,
                disable: _,
            } => {
                let mut table = MappingTable::deserialize(&read_document(&path).await?)?;
                table.toggle(category, &original, enable)?;
                info!(
                    "{} {} '{}'",
                    if enable { "Enabled" } else { "Disabled" },
                    category,
                    original
                );
                write_document(&path, &table).await
            }
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = args.log_level.parse::<tracing::Level>()
        .unwrap_or_else(|_| {
            eprintln!("Invalid log level '{}', defaulting to 'info'", args.log_level);
            tracing::Level::INFO
        });

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config.as_deref())?;
    execute(args.command, config).await
}
