//! Labroster CLI - operator surface for the selection/versioning engine
//!
//! Stands in for the web layer: uploads get archived and become the
//! current documents, `generate` applies a submitted selection and
//! publishes the rewritten config, and the `archives`/`versions`
//! subcommands manage the two ledgers.

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labroster::{
    archive::{validate_upload_name, ArchiveStore, UploadFile},
    config::{Config, GROUP_CONFIG_NAME, THUMBNAIL_SETTINGS_NAME},
    dom::Document,
    parse::{normalize_group_config, normalize_thumbnail_settings},
    rewrite,
    selection::{apply_selection, default_selection, parse_ip_list},
    versions::{GeneratedFile, VersionStore},
};

/// Labroster - selection and versioning engine for lab VM assignment configs
#[derive(Parser, Debug)]
#[command(name = "labroster")]
#[command(about = "Prune per-access-code VM assignments and version the results")]
struct Args {
    /// Data directory holding uploads, archives and generated configs
    #[arg(long, env = "LABROSTER_DATA_DIR", default_value = "data")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive one or two inventory files and make them the current documents
    Upload {
        /// Path to group_config.xml
        #[arg(long)]
        group: Option<PathBuf>,

        /// Path to thumbnail_settings.xml
        #[arg(long)]
        thumbnails: Option<PathBuf>,

        /// Narrow the default selection to systems on the allow-list
        #[arg(long)]
        use_ip_filter: bool,

        /// Newline-delimited IP allow-list file
        #[arg(long)]
        ip_list: Option<PathBuf>,
    },

    /// Print the normalized model of a current document
    Show {
        #[arg(long, value_enum, default_value = "group")]
        dialect: Dialect,
    },

    /// Apply a selection to the current document and publish the result
    Generate {
        #[arg(long, value_enum)]
        dialect: Dialect,

        /// JSON file mapping access code to retained identity keys
        #[arg(long)]
        selection: PathBuf,
    },

    /// Manage the uploaded-source archive
    Archives {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Manage generated config versions
    Versions {
        #[command(subcommand)]
        action: StoreAction,
    },
}

#[derive(Subcommand, Debug)]
enum StoreAction {
    /// List ledger entries
    List,
    /// Write an entry's zip bundle to a directory
    Download {
        id: String,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
    /// Delete one entry and its bundle
    Delete { id: String },
    /// Delete every entry and bundle
    DeleteAll,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Dialect {
    Group,
    Thumbnails,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("labroster={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::under(&args.data_dir);
    match args.command {
        Command::Upload {
            group,
            thumbnails,
            use_ip_filter,
            ip_list,
        } => upload(&config, group, thumbnails, use_ip_filter, ip_list).await,
        Command::Show { dialect } => show(&config, dialect).await,
        Command::Generate { dialect, selection } => generate(&config, dialect, selection).await,
        Command::Archives { action } => {
            let store = ArchiveStore::new(&config).await?;
            match action {
                StoreAction::List => print_json(&store.list().await?),
                StoreAction::Download { id, out } => {
                    let (name, bytes) = store.open_bundle(&id).await?;
                    write_download(&out, &name, &bytes).await
                }
                StoreAction::Delete { id } => print_json(&store.delete(&id).await?),
                StoreAction::DeleteAll => {
                    println!("deleted {} archive entries", store.delete_all().await?);
                    Ok(())
                }
            }
        }
        Command::Versions { action } => {
            let store = VersionStore::new(&config).await?;
            match action {
                StoreAction::List => print_json(&store.list().await?),
                StoreAction::Download { id, out } => {
                    let (name, bytes) = store.open_bundle(&id).await?;
                    write_download(&out, &name, &bytes).await
                }
                StoreAction::Delete { id } => print_json(&store.delete(&id).await?),
                StoreAction::DeleteAll => {
                    println!("deleted {} version entries", store.delete_all().await?);
                    Ok(())
                }
            }
        }
    }
}

async fn upload(
    config: &Config,
    group: Option<PathBuf>,
    thumbnails: Option<PathBuf>,
    use_ip_filter: bool,
    ip_list: Option<PathBuf>,
) -> anyhow::Result<()> {
    if group.is_none() && thumbnails.is_none() {
        anyhow::bail!("nothing to upload: pass --group and/or --thumbnails");
    }

    let allow_list = match &ip_list {
        Some(path) => parse_ip_list(&tokio::fs::read_to_string(path).await?),
        None => Vec::new(),
    };

    let mut files = Vec::new();
    if let Some(path) = &group {
        files.push(read_upload(path, "file1", GROUP_CONFIG_NAME).await?);
    }
    if let Some(path) = &thumbnails {
        files.push(read_upload(path, "file2", THUMBNAIL_SETTINGS_NAME).await?);
    }

    let store = ArchiveStore::new(config).await?;
    let entry = store.append_archive(&files).await?;
    print_json(&entry)?;

    // Echo the default selection so the operator can edit it and feed it
    // back through `generate --selection`.
    for file in &files {
        let model = match file.slot.as_str() {
            "file1" => labroster::parse::parse_group_config(&file.bytes)?,
            _ => labroster::parse::parse_thumbnail_settings(&file.bytes)?,
        };
        let selection = default_selection(&model, use_ip_filter, &allow_list);
        eprintln!("default selection for {}:", file.original_name);
        print_json(&selection)?;
    }
    Ok(())
}

async fn read_upload(path: &PathBuf, slot: &str, expected: &str) -> anyhow::Result<UploadFile> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    validate_upload_name(&name, expected)?;
    Ok(UploadFile {
        slot: slot.to_string(),
        original_name: name,
        bytes: tokio::fs::read(path).await?,
    })
}

async fn show(config: &Config, dialect: Dialect) -> anyhow::Result<()> {
    let store = ArchiveStore::new(config).await?;
    match dialect {
        Dialect::Group => {
            let bytes = store.read_current(GROUP_CONFIG_NAME).await?;
            let model = labroster::parse::parse_group_config(&bytes)?;
            for (code, systems) in model.iter() {
                println!("{code}");
                for system in systems {
                    println!("  {}", system.identity());
                }
            }
        }
        Dialect::Thumbnails => {
            let bytes = store.read_current(THUMBNAIL_SETTINGS_NAME).await?;
            let model = labroster::parse::parse_thumbnail_settings(&bytes)?;
            for (code, systems) in model.iter() {
                println!("{code}");
                for system in systems {
                    println!("  {}", system.identity());
                }
            }
        }
    }
    Ok(())
}

async fn generate(config: &Config, dialect: Dialect, selection: PathBuf) -> anyhow::Result<()> {
    let submitted: BTreeMap<String, Vec<String>> =
        serde_json::from_slice(&tokio::fs::read(&selection).await?)?;

    let (slot, source_name) = match dialect {
        Dialect::Group => ("file1", GROUP_CONFIG_NAME),
        Dialect::Thumbnails => ("file2", THUMBNAIL_SETTINGS_NAME),
    };

    let archive_store = ArchiveStore::new(config).await?;
    let bytes = archive_store.read_current(source_name).await?;
    let mut doc = Document::parse(&bytes)?;

    let model = match dialect {
        Dialect::Group => normalize_group_config(&doc),
        Dialect::Thumbnails => normalize_thumbnail_settings(&doc),
    };
    let selection = apply_selection(&model, &submitted);

    match dialect {
        Dialect::Group => rewrite::rewrite_group_config(&mut doc, &selection),
        Dialect::Thumbnails => rewrite::rewrite_thumbnail_settings(&mut doc, &selection),
    }

    let staged_path = config.staging_dir().join(format!("new_{source_name}"));
    rewrite::write_staged(&doc, &staged_path).await?;

    let version_store = VersionStore::new(config).await?;
    let entry = version_store
        .append_version(
            &[GeneratedFile {
                slot: slot.to_string(),
                staged_path,
            }],
            BTreeMap::from([(slot.to_string(), source_name.to_string())]),
        )
        .await?;
    print_json(&entry)
}

async fn write_download(out: &PathBuf, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(out).await?;
    let path = out.join(name);
    tokio::fs::write(&path, bytes).await?;
    println!("{}", path.display());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
