//! Entry point: parse CLI flags, build the shared runtime state, mount.

mod cli;
mod config;
mod dirty;
mod diskcache;
mod error;
mod fs;
mod logging;
mod metacache;
mod pathutil;
mod remote;
mod retry;

use std::sync::Arc;

use clap::Parser;
use fuser::MountOption;
use log::{error, info};

use cli::Cli;
use config::{Config, DEFAULT_SHUTDOWN_FLUSH_DEADLINE};
use dirty::DirtyRegistry;
use diskcache::DiskCache;
use fs::{FsState, FsWrapper};
use metacache::MetadataCache;
use remote::RemoteClient;

fn main() {
    let cli = Cli::parse();

    if cli.version {
        println!("{}", cli::version_string());
        std::process::exit(0);
    }

    let config = match Config::from_cli(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("wsfs: {e}");
            std::process::exit(1);
        }
    };

    logging::init(config.log_level, config.debug);

    let meta = Arc::new(MetadataCache::new(
        config.metadata_cache_capacity,
        config.metadata_cache_ttl,
    ));

    let remote = match RemoteClient::new(meta) {
        Ok(remote) => remote,
        Err(e) => {
            eprintln!("wsfs: {e}");
            std::process::exit(1);
        }
    };

    let disk_cache = match DiskCache::open(
        config.cache_dir.clone(),
        config.cache_max_bytes,
        config.cache_ttl,
        config.cache_enabled,
    ) {
        Ok(cache) => cache,
        Err(e) => {
            eprintln!("wsfs: failed to open cache directory: {e}");
            std::process::exit(1);
        }
    };

    let dirty_registry = DirtyRegistry::new();

    let fs_state = Arc::new(FsState::new(&config, remote, disk_cache, dirty_registry));

    let mut options = vec![
        MountOption::FSName("wsfs".to_string()),
        MountOption::AutoUnmount,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }

    info!("mounting wsfs at {:?}", config.mountpoint);
    let session = match fuser::spawn_mount2(FsWrapper(fs_state.clone()), &config.mountpoint, &options) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("wsfs: failed to mount: {e}");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel();
    let handler_installed = ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .is_ok();
    if !handler_installed {
        error!("failed to install signal handler; shutdown flush will not run on interrupt");
    }

    // Blocks until a signal arrives; the mount itself runs on background threads.
    let _ = shutdown_rx.recv();

    info!("shutdown requested, flushing dirty nodes");
    let report = fs_state
        .dirty_registry
        .flush_all(DEFAULT_SHUTDOWN_FLUSH_DEADLINE, |ino| {
            fs_state.flush_node(ino).map_err(|e| e.to_string())
        });
    if !report.failed.is_empty() || !report.timed_out.is_empty() {
        error!(
            "shutdown flush incomplete: {} failed, {} timed out",
            report.failed.len(),
            report.timed_out.len()
        );
    }

    drop(session);
}
