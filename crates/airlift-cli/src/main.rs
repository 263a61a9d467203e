use std::fs;
use std::path::PathBuf;

use airlift_core::{
    ContentSlot, FileStore, RemoteManifest, StdLog, StoreEntryKind, UpdateState,
};
use airlift_injector::HeadlessView;
use airlift_store::{DiskStore, PrefsStore};
use airlift_updater::{
    clear_local_content, load_config, AtomicSwapManager, BootSequencer, CheckOutcome, HttpFetch,
    PassOutcome, RecoveryOutcome, SwapOutcome, UpdateConfig, VersionResolver,
};
use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "airlift")]
#[command(about = "Over-the-air web content updater", long_about = None)]
struct Cli {
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long)]
    manifest_url: Option<String>,
    #[arg(long)]
    bundle_url: Option<String>,
    #[arg(long)]
    container_id: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Boot,
    Check,
    Apply {
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        version: Option<String>,
        #[arg(long)]
        build_id: Option<String>,
    },
    Status,
    List,
    Recover,
    Reset,
}

fn default_data_dir() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows data dir")?;
        return Ok(PathBuf::from(app_data).join("Airlift"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve data dir")?;
    Ok(PathBuf::from(home).join(".airlift"))
}

fn resolve_config(cli: &Cli, files: &DiskStore) -> Result<UpdateConfig> {
    let mut config = load_config(files)?;
    if let Some(url) = &cli.manifest_url {
        config.manifest_url = url.clone();
    }
    if let Some(url) = &cli.bundle_url {
        config.bundle_url = url.clone();
    }
    if let Some(id) = &cli.container_id {
        config.container_id = id.clone();
    }
    Ok(config)
}

fn print_tree(files: &dyn FileStore, path: &str) -> Result<()> {
    for entry in files.list(path)? {
        let child = format!("{path}/{}", entry.name);
        match entry.kind {
            StoreEntryKind::Directory => print_tree(files, &child)?,
            StoreEntryKind::File => println!("{child}"),
        }
    }
    Ok(())
}

fn describe_pass(outcome: &PassOutcome) -> String {
    match outcome {
        PassOutcome::UpToDate => "content is up to date".to_string(),
        PassOutcome::Unreachable => "update server unreachable, kept current content".to_string(),
        PassOutcome::Applied(manifest) => format!("applied update {}", manifest.version),
        PassOutcome::Deferred(manifest) => {
            format!("queued update {} for next boot", manifest.version)
        }
        PassOutcome::Failed(failure) => format!("update failed ({}), rolled back", failure.as_str()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => default_data_dir()?,
    };
    let files = DiskStore::new(data_dir.clone());
    let prefs = PrefsStore::new(data_dir.join("prefs"));
    let log = StdLog;
    let config = resolve_config(&cli, &files)?;
    let container_ids = [config.container_id.as_str()];
    let view = HeadlessView::new(&files, &container_ids);

    match cli.command {
        Commands::Boot => {
            let fetch = HttpFetch::new()?;
            let sequencer = BootSequencer::new(&files, &prefs, &view, &log, &fetch);
            let report = sequencer.boot(&config)?;

            match report.recovery {
                Some(RecoveryOutcome::Recovered) => println!("recovered interrupted update"),
                Some(RecoveryOutcome::Clean) => {}
                None => println!("recovery failed, serving default content"),
            }
            if let Some(outcome) = report.pending {
                match outcome {
                    SwapOutcome::Committed => println!("applied deferred update"),
                    SwapOutcome::RolledBack(failure) => {
                        println!("deferred update rolled back: {}", failure.as_str());
                    }
                }
            }
            println!("content mode: {}", report.mode.as_str());

            if !config.manifest_url.is_empty() && !config.bundle_url.is_empty() {
                match sequencer.run_update_pass(&config) {
                    Ok(outcome) => println!("{}", describe_pass(&outcome)),
                    Err(err) => log::warn!("update pass failed: {err:#}"),
                }
            }
        }
        Commands::Check => {
            if config.manifest_url.is_empty() {
                return Err(anyhow!("no manifest url configured"));
            }
            let fetch = HttpFetch::new()?;
            let resolver = VersionResolver::new(&fetch, &prefs, &log);
            match resolver.check(&config.manifest_url)? {
                CheckOutcome::UpdateAvailable(manifest) => {
                    println!(
                        "update available: {} (buildId: {})",
                        manifest.version,
                        manifest.build_id.as_deref().unwrap_or("-")
                    );
                }
                CheckOutcome::UpToDate => println!("content is up to date"),
                CheckOutcome::Unreachable => println!("update server unreachable"),
            }
        }
        Commands::Apply {
            file,
            version,
            build_id,
        } => match file {
            Some(path) => {
                let bytes = fs::read(&path)
                    .with_context(|| format!("failed to read bundle: {}", path.display()))?;
                let manifest = RemoteManifest {
                    version: version.unwrap_or_else(|| "0.0.0".to_string()),
                    build_id,
                };
                let swap = AtomicSwapManager::new(&files, &prefs, &view, &log);
                match swap.begin_update(&bytes, &manifest, &config.container_id)? {
                    SwapOutcome::Committed => println!("applied {}", manifest_label(&manifest)),
                    SwapOutcome::RolledBack(failure) => {
                        println!("bundle rejected ({}), rolled back", failure.as_str());
                    }
                }
            }
            None => {
                let fetch = HttpFetch::new()?;
                let sequencer = BootSequencer::new(&files, &prefs, &view, &log, &fetch);
                let outcome = sequencer.run_update_pass(&config)?;
                println!("{}", describe_pass(&outcome));
            }
        },
        Commands::Status => {
            let state = UpdateState::new(&prefs);
            println!("data dir: {}", data_dir.display());
            println!("applied version: {}", state.applied_version()?);
            println!(
                "applied buildId: {}",
                state.applied_build_id()?.as_deref().unwrap_or("-")
            );
            match state.pending()? {
                Some(pending) => println!("pending update: {}", manifest_label(&pending)),
                None => println!("pending update: none"),
            }
            println!(
                "update in progress: {}",
                if state.update_in_progress()? {
                    "yes (interrupted, will recover at boot)"
                } else {
                    "no"
                }
            );
            for slot in [ContentSlot::Active, ContentSlot::Staging, ContentSlot::Backup] {
                println!(
                    "{} slot: {}",
                    slot.dir_name(),
                    if files.exists(slot.dir_name()) {
                        "present"
                    } else {
                        "absent"
                    }
                );
            }
        }
        Commands::List => {
            if !files.exists(ContentSlot::Active.dir_name()) {
                println!("no local content installed");
            } else {
                print_tree(&files, ContentSlot::Active.dir_name())?;
            }
        }
        Commands::Recover => {
            let swap = AtomicSwapManager::new(&files, &prefs, &view, &log);
            match swap.recover_if_needed()? {
                RecoveryOutcome::Recovered => println!("recovered interrupted update"),
                RecoveryOutcome::Clean => println!("nothing to recover"),
            }
        }
        Commands::Reset => {
            clear_local_content(&files, &prefs, &log)?;
            println!("local content cleared");
        }
    }

    Ok(())
}

fn manifest_label(manifest: &RemoteManifest) -> String {
    match manifest.build_id.as_deref() {
        Some(build_id) => format!("{} (buildId: {build_id})", manifest.version),
        None => manifest.version.clone(),
    }
}
