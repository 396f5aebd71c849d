//! hako - poke at the virtual filesystem from a shell.
//!
//! Usage:
//!   hako ls ~/src -r --hide-dotfiles
//!   hako cat notes/todo.md
//!   hako cp photos /mnt/backup/photos
//!   hako exec . -- git status
//!   hako watch .
//!   hako --jail /srv/data ls /
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see backend traffic.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use futures::TryStreamExt;
use hako_vfs::{ConfiguredLocalProvider, LocalVfsProvider, VfsConfig, VfsFile};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Asynchronous virtual filesystem tool.
#[derive(Parser, Debug)]
#[command(name = "hako")]
#[command(about = "Browse, copy and watch files through the hako VFS")]
struct Args {
    /// Config file (default: ~/.config/hako/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Resolve every path inside a jail rooted at this directory
    #[arg(long, global = true)]
    jail: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List a directory
    Ls {
        #[arg(default_value = ".")]
        path: String,

        /// Walk the whole tree
        #[arg(short, long)]
        recursive: bool,

        /// Skip entries starting with '.' (and don't descend into them)
        #[arg(long)]
        hide_dotfiles: bool,
    },

    /// Print a file to stdout
    Cat { path: String },

    /// Copy a file or directory tree
    Cp { src: String, dst: String },

    /// Run a command inside a directory
    Exec {
        dir: String,

        #[arg(last = true, required = true)]
        cmd: Vec<String>,
    },

    /// Print change events until Ctrl-C
    Watch {
        #[arg(default_value = ".")]
        path: String,
    },

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    if let Command::Config = args.command {
        print!("{}", config.to_toml_string()?);
        return Ok(ExitCode::SUCCESS);
    }

    let provider = ConfiguredLocalProvider::new(config);
    let base = base_dir(&provider, args.jail.as_deref())?;
    tracing::debug!(base = %base, "resolved base directory");

    match args.command {
        Command::Ls {
            path,
            recursive,
            hide_dotfiles,
        } => ls(&base.get(&path), recursive, hide_dotfiles).await?,
        Command::Cat { path } => cat(&base.get(&path)).await?,
        Command::Cp { src, dst } => cp(&base.get(&src), &base.get(&dst)).await?,
        Command::Exec { dir, cmd } => {
            let code = base
                .get(&dir)
                .passthru(&cmd)
                .await
                .with_context(|| format!("failed to run {}", cmd.join(" ")))?;
            return Ok(ExitCode::from(exit_status_byte(code)));
        }
        Command::Watch { path } => watch(&base.get(&path)).await?,
        Command::Config => {}
    }

    Ok(ExitCode::SUCCESS)
}

fn load_config(path: Option<&PathBuf>) -> Result<VfsConfig> {
    let config = match path {
        Some(path) => VfsConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => VfsConfig::load_or_default().context("failed to load default config")?,
    };
    Ok(config.apply_env()?)
}

/// Directory that relative arguments resolve against.
///
/// Without a jail this is the working directory, as long as the provider
/// is rooted at `/`.
fn base_dir(provider: &ConfiguredLocalProvider, jail: Option<&str>) -> Result<VfsFile> {
    if let Some(dir) = jail {
        let dir = absolute_host_path(dir)?;
        tracing::info!(jail = %dir, policy = %provider.jail_policy(), "jailed");
        return Ok(provider.jailed_local(&dir));
    }
    if provider.config().local_root == "/" {
        let cwd = std::env::current_dir().context("no working directory")?;
        return Ok(provider.local_at(&cwd.to_string_lossy()));
    }
    Ok(provider.local())
}

fn absolute_host_path(dir: &str) -> Result<String> {
    let path = PathBuf::from(dir);
    let path = if path.is_absolute() {
        path
    } else {
        std::env::current_dir().context("no working directory")?.join(path)
    };
    Ok(path.to_string_lossy().into_owned())
}

fn show_entry(file: &VfsFile, hide_dotfiles: bool) -> bool {
    !hide_dotfiles || !file.basename().starts_with('.')
}

async fn ls(dir: &VfsFile, recursive: bool, hide_dotfiles: bool) -> Result<()> {
    let mut out = std::io::stdout().lock();
    if recursive {
        let mut entries = dir.list_recursive(move |f| show_entry(f, hide_dotfiles));
        while let Some(entry) = entries.try_next().await? {
            writeln!(out, "{}", entry.path())?;
        }
    } else {
        let mut entries = dir
            .list()
            .await
            .with_context(|| format!("failed to list {dir}"))?;
        while let Some(entry) = entries.try_next().await? {
            if show_entry(&entry, hide_dotfiles) {
                writeln!(out, "{}", entry.basename())?;
            }
        }
    }
    Ok(())
}

async fn cat(file: &VfsFile) -> Result<()> {
    let data = file
        .read()
        .await
        .with_context(|| format!("failed to read {file}"))?;
    let mut out = std::io::stdout().lock();
    out.write_all(&data)?;
    out.flush()?;
    Ok(())
}

async fn cp(src: &VfsFile, dst: &VfsFile) -> Result<()> {
    let mut copied = 0usize;
    let mut log_copy = |from: &VfsFile, to: &VfsFile| {
        tracing::info!(src = %from.path(), dst = %to.path(), "copy");
        copied += 1;
    };
    src.copy_to_tree(dst, &mut log_copy)
        .await
        .with_context(|| format!("failed to copy {src} to {dst}"))?;
    tracing::info!(entries = copied, "copy finished");
    Ok(())
}

async fn watch(dir: &VfsFile) -> Result<()> {
    let handle = dir
        .watch(|event| println!("{:?} {}", event.kind, event.path))
        .await
        .with_context(|| format!("failed to watch {dir}"))?;
    tracing::info!(path = %dir.path(), "watching, Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    handle.close();
    Ok(())
}

/// Process exit status as a CLI exit code. Anything outside `0..=255` is 1.
fn exit_status_byte(code: i32) -> u8 {
    u8::try_from(code).unwrap_or(1)
}
