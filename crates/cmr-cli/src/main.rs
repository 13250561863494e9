//! cmr: cryptmirror CLI
//!
//! Commands:
//!   encrypt <source> <target>  - mirror a tree into AEAD-sealed artifacts
//!   decrypt <source> <target>  - reconstruct the original tree from a mirror
//!   keygen <file>              - generate a random master key file

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use cmr_core::{ForceMode, OperationMode, SyncOptions};
use cmr_crypto::KeySize;
use cmr_sync::{SyncSession, SyncStats};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "cmr",
    version,
    about = "Encrypted tree mirroring",
    long_about = "cmr mirrors a directory tree into an encrypted replica: file \
                  contents are sealed with XChaCha20-Poly1305 and every name is \
                  replaced by a digest. The replica decrypts back to the original \
                  tree with the same key file."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mirror a source tree into an encrypted target tree
    ///
    /// Re-runs are incremental: files whose timestamps already agree with
    /// their target artifact are skipped, and target entries whose source
    /// counterpart vanished are removed.
    Encrypt {
        /// Source directory (plaintext)
        source: PathBuf,
        /// Target directory (encrypted mirror)
        target: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
        /// Re-encrypt every file regardless of timestamps
        #[arg(long, conflicts_with = "force_timestamp")]
        force: bool,
        /// Re-encrypt every file and advance each source mtime by one minute
        #[arg(long)]
        force_timestamp: bool,
    },

    /// Reconstruct the original tree from an encrypted mirror
    ///
    /// The target directory must be empty.
    Decrypt {
        /// Source directory (encrypted mirror)
        source: PathBuf,
        /// Target directory (must be empty)
        target: PathBuf,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate a random master key file
    Keygen {
        /// Output path for the key file
        file: PathBuf,
        /// Key file size
        #[arg(long, value_enum, default_value_t = SizeArg::Medium)]
        size: SizeArg,
        /// Restrict key bytes to printable ASCII
        #[arg(long)]
        ascii: bool,
    },
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// Path to the master key file
    #[arg(long, short = 'k', env = "CMR_KEY_FILE")]
    key_file: PathBuf,

    /// Decide and report everything, mutate nothing
    #[arg(long)]
    dry_run: bool,

    /// Per-file debug logging
    #[arg(long, short = 'v')]
    verbose: bool,

    /// Suppress the options banner
    #[arg(long)]
    no_banner: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SizeArg {
    /// 32 bytes
    Small,
    /// 64 bytes
    Medium,
    /// 128 bytes
    Large,
    /// 256 bytes
    Huge,
}

impl From<SizeArg> for KeySize {
    fn from(arg: SizeArg) -> Self {
        match arg {
            SizeArg::Small => KeySize::Small,
            SizeArg::Medium => KeySize::Medium,
            SizeArg::Large => KeySize::Large,
            SizeArg::Huge => KeySize::Huge,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Encrypt {
            source,
            target,
            common,
            force,
            force_timestamp,
        } => {
            let force = if force_timestamp {
                ForceMode::ForceWithTimestamp
            } else if force {
                ForceMode::Force
            } else {
                ForceMode::None
            };
            init_logging(common.verbose);
            let opts = SyncOptions::new(
                source,
                target,
                common.key_file.clone(),
                OperationMode::Encrypt,
                force,
                common.verbose,
                common.dry_run,
            );
            cmd_sync(opts, &common)
        }
        Commands::Decrypt {
            source,
            target,
            common,
        } => {
            init_logging(common.verbose);
            let opts = SyncOptions::new(
                source,
                target,
                common.key_file.clone(),
                OperationMode::Decrypt,
                ForceMode::None,
                common.verbose,
                common.dry_run,
            );
            cmd_sync(opts, &common)
        }
        Commands::Keygen { file, size, ascii } => cmd_keygen(&file, size.into(), ascii),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

// ── `cmr encrypt` / `cmr decrypt` ─────────────────────────────────────────────

fn cmd_sync(opts: SyncOptions, common: &CommonArgs) -> Result<()> {
    if !common.no_banner {
        print_banner(&opts);
    }

    let mut session = SyncSession::new(opts).context("starting sync session")?;
    let mut stats = session.process().context("processing")?;
    session.cleanup(&mut stats).context("cleanup")?;

    print_summary(&stats, session.options().dry_run);
    Ok(())
}

fn print_banner(opts: &SyncOptions) {
    println!("cmr {}", env!("CARGO_PKG_VERSION"));
    println!("  mode:     {}", opts.mode);
    println!("  source:   {}", opts.source.display());
    println!("  target:   {}", opts.target.display());
    println!("  key file: {}", opts.key_file.display());
    if opts.force() != ForceMode::None {
        println!("  force:    {}", opts.force());
    }
    if opts.dry_run {
        println!("  dry run:  no files will be written or removed");
    }
    println!();
}

fn print_summary(stats: &SyncStats, dry_run: bool) {
    println!();
    if dry_run {
        println!("Dry run complete (nothing was written):");
    } else {
        println!("Complete:");
    }
    println!("  processed: {}", stats.processed);
    println!("  skipped:   {}", stats.skipped);
    if stats.failed > 0 {
        println!("  failed:    {}", stats.failed);
    }
    if stats.dirs_pruned > 0 || stats.files_pruned > 0 {
        println!(
            "  pruned:    {} directories, {} files",
            stats.dirs_pruned, stats.files_pruned
        );
    }
}

// ── `cmr keygen` ──────────────────────────────────────────────────────────────

fn cmd_keygen(file: &std::path::Path, size: KeySize, ascii: bool) -> Result<()> {
    cmr_crypto::generate_key_file(file, size, ascii)
        .with_context(|| format!("generating key file: {}", file.display()))?;
    println!(
        "Wrote {} byte {} key: {}",
        size.bytes(),
        if ascii { "ASCII" } else { "binary" },
        file.display()
    );
    println!("Keep this file safe; without it the mirror cannot be decrypted.");
    Ok(())
}
