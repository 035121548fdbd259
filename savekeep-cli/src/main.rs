/*!
Savekeep CLI - Command-line interface for the Savekeep persistence engine.

This CLI saves, loads, inspects and removes records using the same settings,
codecs and ciphers an application would use.
*/

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use savekeep_core::{
    create_engine_from_settings, observability::init_logging, BaseLocation, SaveEngine,
    SaveOptions, SaveSettings,
};
use serde_json::Value;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::{error, info};

const KEY_VALUE_FILE: &str = "savekeep-store.json";

#[derive(Parser)]
#[command(name = "savekeep")]
#[command(about = "CLI for the Savekeep persistence engine")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Base location records are resolved against
    #[arg(short, long, global = true, value_enum)]
    location: Option<LocationType>,

    /// Directory holding the primary and secondary roots
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Use the key-value store instead of files
    #[arg(long, global = true)]
    kv: bool,

    /// Encrypt on save, decrypt on load
    #[arg(short, long, global = true)]
    encrypt: bool,

    /// Cipher password (derived from the device when unset)
    #[arg(short, long, global = true, env = "SAVEKEEP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Codec name: json, json-pretty or gzip
    #[arg(long, global = true)]
    codec: Option<String>,

    /// JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LocationType {
    Primary,
    Secondary,
    Custom,
}

impl From<LocationType> for BaseLocation {
    fn from(location: LocationType) -> Self {
        match location {
            LocationType::Primary => BaseLocation::PrimaryStorage,
            LocationType::Secondary => BaseLocation::SecondaryStorage,
            LocationType::Custom => BaseLocation::CustomPath,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Save a JSON value under an identifier
    Save {
        /// Record identifier
        id: String,
        /// JSON value to store
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        json: Option<String>,
        /// Read the JSON value from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print the value stored under an identifier
    Load {
        /// Record identifier
        id: String,
        /// JSON value printed when nothing is stored
        #[arg(short, long)]
        default: Option<String>,
    },
    /// Check whether a record exists
    Exists {
        /// Record identifier
        id: String,
    },
    /// Delete a record
    Delete {
        /// Record identifier
        id: String,
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Remove every record under the location
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// List records under the location
    List {
        /// Subdirectory to list
        path: Option<String>,
        /// List directories instead of files
        #[arg(long)]
        dirs: bool,
    },
}

#[derive(Tabled)]
struct RecordInfo {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs)?;

    let settings = build_settings(&cli)?;
    let engine = Arc::new(create_engine_from_settings(settings)?);
    let options = build_options(&cli);

    match cli.command {
        Commands::Save { id, json, file } => {
            save_record(engine, &id, json.as_deref(), file.as_deref(), options).await?
        }
        Commands::Load { id, default } => {
            load_record(engine, &id, default.as_deref(), options).await?
        }
        Commands::Exists { id } => {
            println!("{}", engine.exists(&id, options_location(&cli.location))?)
        }
        Commands::Delete { id, force } => {
            delete_record(&engine, &id, options_location(&cli.location), force)?
        }
        Commands::Clear { force } => {
            clear_records(&engine, options_location(&cli.location), force)?
        }
        Commands::List { path, dirs } => {
            list_records(&engine, path.as_deref(), options_location(&cli.location), dirs)?
        }
    }

    Ok(())
}

fn options_location(location: &Option<LocationType>) -> Option<BaseLocation> {
    location.map(BaseLocation::from)
}

fn build_settings(cli: &Cli) -> Result<SaveSettings, anyhow::Error> {
    let mut settings = match &cli.config {
        Some(path) => SaveSettings::from_json_file(path)?,
        None => SaveSettings::default(),
    };

    if let Some(root) = &cli.root {
        let rooted = SaveSettings::with_root(root);
        settings.primary_root = rooted.primary_root;
        settings.secondary_root = rooted.secondary_root;
    }

    if let Some(codec) = &cli.codec {
        settings.codec = codec.clone();
    }

    if cli.kv {
        settings.use_key_value_store = true;
    }

    // The store sits beside the record roots, never inside them
    let store = match (&settings.key_value_store_path, &cli.root) {
        (Some(path), _) => path.clone(),
        (None, Some(root)) => root.join(KEY_VALUE_FILE),
        (None, None) => settings.key_value_store_file(KEY_VALUE_FILE),
    };
    protect_store_file(&mut settings, &store);
    if settings.use_key_value_store {
        settings.key_value_store_path = Some(store);
    }

    settings.validate()?;
    Ok(settings)
}

/// Keep a store file that was configured inside a record root out of
/// listings and clears
fn protect_store_file(settings: &mut SaveSettings, store: &Path) {
    let (Some(parent), Some(name)) = (store.parent(), store.file_name()) else {
        return;
    };
    let roots = settings.location_roots();
    let in_root = [Some(&roots.primary), Some(&roots.secondary), roots.custom.as_ref()]
        .into_iter()
        .flatten()
        .any(|root| root == parent);

    let name = name.to_string_lossy().into_owned();
    if in_root && !settings.ignored_file_names.contains(&name) {
        settings.ignored_file_names.push(name);
    }
}

fn build_options(cli: &Cli) -> SaveOptions {
    let mut options = SaveOptions::new();
    if cli.encrypt {
        options = options.with_encrypt(true);
    }
    if let Some(password) = &cli.password {
        options = options.with_password(password.clone());
    }
    if let Some(location) = cli.location {
        options = options.with_location(location.into());
    }
    options
}

async fn save_record(
    engine: Arc<SaveEngine>,
    id: &str,
    json: Option<&str>,
    file: Option<&Path>,
    options: SaveOptions,
) -> Result<(), anyhow::Error> {
    let text = match (json, file) {
        (Some(json), _) => json.to_string(),
        (None, Some(file)) => std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read {}", file.display()))?,
        (None, None) => return Err(anyhow::anyhow!("Provide a JSON value or --file")),
    };
    let value: Value = serde_json::from_str(&text).context("Value is not valid JSON")?;

    info!("Saving record: {}", id);
    match engine.save_async(id, value, options).await {
        Ok(()) => println!("✓ Saved '{id}'"),
        Err(e) => {
            error!("✗ Failed to save record: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

async fn load_record(
    engine: Arc<SaveEngine>,
    id: &str,
    default: Option<&str>,
    options: SaveOptions,
) -> Result<(), anyhow::Error> {
    let default = match default {
        Some(text) => serde_json::from_str(text).context("Default is not valid JSON")?,
        None => Value::Null,
    };

    info!("Loading record: {}", id);
    match engine.load_async(id, default, options).await {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        Err(e) => {
            if e.is_decode_failure() {
                error!("✗ Could not decrypt '{}', check the password", id);
            } else {
                error!("✗ Failed to load record: {}", e);
            }
            return Err(e.into());
        }
    }

    Ok(())
}

fn confirm(prompt: &str) -> Result<bool, anyhow::Error> {
    print!("{prompt} (y/N): ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_lowercase().starts_with('y'))
}

fn delete_record(
    engine: &SaveEngine,
    id: &str,
    location: Option<BaseLocation>,
    force: bool,
) -> Result<(), anyhow::Error> {
    if !engine.exists(id, location)? {
        println!("Nothing stored under '{id}'");
        return Ok(());
    }

    if !force && !confirm(&format!("Are you sure you want to delete '{id}'?"))? {
        println!("Deletion cancelled");
        return Ok(());
    }

    if engine.delete(id, location)? {
        println!("✓ Deleted '{id}'");
    } else {
        println!("'{id}' is protected and was left in place");
    }
    Ok(())
}

fn clear_records(
    engine: &SaveEngine,
    location: Option<BaseLocation>,
    force: bool,
) -> Result<(), anyhow::Error> {
    let target = location.unwrap_or(engine.defaults().location);
    if !force && !confirm(&format!("Remove every record in {target} storage?"))? {
        println!("Clear cancelled");
        return Ok(());
    }

    let removed = engine.clear(location)?;
    println!("✓ Removed {removed} entries");
    Ok(())
}

fn list_records(
    engine: &SaveEngine,
    path: Option<&str>,
    location: Option<BaseLocation>,
    dirs: bool,
) -> Result<(), anyhow::Error> {
    let entries = if dirs {
        engine.list_directories(path, location)?
    } else {
        engine.list_files(path, location)?
    };

    if entries.is_empty() {
        println!("No records found");
        return Ok(());
    }

    let records: Vec<RecordInfo> = entries.iter().map(|entry| describe(entry)).collect();
    println!("{}", Table::new(records));
    Ok(())
}

fn describe(path: &Path) -> RecordInfo {
    let name = path
        .file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    match std::fs::metadata(path) {
        Ok(meta) => RecordInfo {
            name,
            size: if meta.is_dir() {
                "-".to_string()
            } else {
                format_size(meta.len())
            },
            modified: meta
                .modified()
                .map(format_modified)
                .unwrap_or_else(|_| "Unknown".to_string()),
        },
        Err(_) => RecordInfo {
            name,
            size: "Unknown".to_string(),
            modified: "Unknown".to_string(),
        },
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

fn format_modified(time: std::time::SystemTime) -> String {
    let local: chrono::DateTime<chrono::Local> = time.into();
    local.format("%Y-%m-%d %H:%M:%S").to_string()
}
