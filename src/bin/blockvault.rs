//! Command-line archiver.
//!
//! `archive` chops and indexes a file (or an inherited file descriptor)
//! into the block database and prints the resulting handle on a single
//! line; `restore` replays the stream behind a handle to standard output.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{format_err, Context};
use clap::{Parser, Subcommand, ValueEnum};

use blockvault::archive::{archive, restore, ArchiveConfig, ChopperKind};
use blockvault::index::{BlockIndexer, HashMethod};
use blockvault::store::{
    Backend, BlockStore, DummyStore, FilteredStore, FsStore, ProxySemantics, SmartStore,
    StatStore, ZipAlgorithm,
};
use blockvault::stream::{FileStream, Stream};

const DB_DIR_NAME: &str = ".blockvault";
const DB_DATA_FILE_BASE: &str = "archive-data.blocks";
const DB_META_DATA_FILE_BASE: &str = "archive-meta-data.blocks";

#[derive(Parser)]
#[command(
    name = "blockvault",
    version,
    about = "Archive byte streams into a content-addressed block store and restore them from a handle"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the data and metadata block databases
    #[arg(long, global = true)]
    db_dir: Option<PathBuf>,

    /// Typical block size produced by the chopper
    #[arg(long, global = true, default_value_t = 65536)]
    block_size: usize,

    /// How the input stream is cut into blocks
    #[arg(long, global = true, value_enum, default_value = "fixed")]
    chopper: ChopperArg,

    /// Pad the last fixed-size block up to the full block size
    #[arg(long, global = true)]
    pad_blocks: bool,

    /// Digest used for block keys
    #[arg(long, global = true, default_value = "SHA256")]
    hash: String,

    /// Cipher blocks convergently (content-hash keyed) before storing
    #[arg(long, global = true)]
    chk: bool,

    /// Maximum child handles per key block of the index tree
    #[arg(long, global = true, default_value_t = 100)]
    indices_per_block: usize,

    /// Compress each block before it reaches the store (zstd or zlib)
    #[arg(long, global = true, value_name = "ALGO")]
    zip_blocks: Option<String>,

    /// Compress the input stream itself; pass again when restoring
    #[arg(long, global = true)]
    zip_input: bool,

    /// Write blocks unconditionally instead of skipping ones the store
    /// already holds
    #[arg(long, global = true)]
    no_smart_store: bool,

    /// Print block-store write statistics to stderr when done
    #[arg(long, global = true)]
    show_stats: bool,

    /// Use call-tracing sink stores instead of the block databases
    #[arg(long, global = true)]
    debug_store: bool,

    /// Log every store access
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ChopperArg {
    Fixed,
    Anchor,
}

#[derive(Subcommand)]
enum Command {
    /// Archive a file and print its handle
    Archive { path: PathBuf },
    /// Archive from an open file descriptor (default: stdin)
    ArchiveFd { fd: Option<i32> },
    /// Restore the stream behind a handle to stdout
    Restore { handle: String },
}

/// One fully-stacked store plus the handle needed to read its counters
/// back out.
struct StoreStack {
    store: Arc<dyn BlockStore>,
    stats: Option<Arc<StatStore>>,
}

impl Cli {
    fn block_indexer(&self) -> anyhow::Result<BlockIndexer> {
        let hash: HashMethod = self
            .hash
            .parse()
            .with_context(|| format!("unusable --hash value `{}'", self.hash))?;
        Ok(if self.chk {
            BlockIndexer::Chk {
                content_hash: hash,
                key_hash: hash,
            }
        } else {
            BlockIndexer::Hash(hash)
        })
    }

    fn archive_config(&self) -> anyhow::Result<ArchiveConfig> {
        let chopper = match self.chopper {
            ChopperArg::Fixed => ChopperKind::Fixed {
                pad_blocks: self.pad_blocks,
            },
            ChopperArg::Anchor => ChopperKind::Anchor,
        };
        Ok(ArchiveConfig {
            chopper,
            block_size: self.block_size,
            block_indexer: self.block_indexer()?,
            indices_per_block: self.indices_per_block,
            zip_input: self.zip_input,
        })
    }

    fn db_dir(&self) -> anyhow::Result<PathBuf> {
        if let Some(dir) = &self.db_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME")
            .ok_or_else(|| format_err!("HOME is not set; pass --db-dir"))?;
        Ok(PathBuf::from(home).join(DB_DIR_NAME))
    }

    /// Open one block database and stack the requested proxies on top,
    /// innermost first: compression, then dedup, then statistics.
    fn open_store(&self, base_name: &str, archiving: bool) -> anyhow::Result<StoreStack> {
        let mut store: Arc<dyn BlockStore> = if self.debug_store {
            Arc::new(DummyStore::new(base_name))
        } else {
            let path = self.db_dir()?.join(base_name);
            Arc::new(
                FsStore::open(&path)
                    .with_context(|| format!("unable to open block database {:?}", path))?,
            )
        };

        if let Some(algorithm) = &self.zip_blocks {
            let algorithm: ZipAlgorithm = algorithm.parse()?;
            store = Arc::new(FilteredStore::new(
                Backend::new(store, ProxySemantics::EventuallyDestroy),
                algorithm,
            ));
        }

        if archiving && !self.no_smart_store {
            store = Arc::new(SmartStore::new(Backend::new(
                store,
                ProxySemantics::EventuallyDestroy,
            )));
        }

        let mut stats = None;
        if self.show_stats {
            let stat_store = Arc::new(StatStore::new(
                base_name,
                Some(Backend::new(store, ProxySemantics::EventuallyDestroy)),
            ));
            stats = Some(stat_store.clone());
            store = stat_store;
        }

        if self.verbose {
            store = Arc::new(DummyStore::proxy(
                base_name,
                Backend::new(store, ProxySemantics::EventuallyDestroy),
            ));
        }

        Ok(StoreStack { store, stats })
    }

    fn open_stores(&self, archiving: bool) -> anyhow::Result<(StoreStack, StoreStack)> {
        Ok((
            self.open_store(DB_DATA_FILE_BASE, archiving)?,
            self.open_store(DB_META_DATA_FILE_BASE, archiving)?,
        ))
    }
}

fn input_stream(command: &Command) -> anyhow::Result<Box<dyn Stream>> {
    match command {
        Command::Archive { path } => Ok(Box::new(
            FileStream::open(path).with_context(|| format!("unable to archive {:?}", path))?,
        )),
        Command::ArchiveFd { fd } => {
            let fd = fd.unwrap_or(0);
            if fd < 0 {
                return Err(format_err!("{}: not a usable file descriptor", fd));
            }
            use std::os::unix::io::FromRawFd;
            let file = unsafe { File::from_raw_fd(fd) };
            Ok(Box::new(FileStream::from_file(file, &format!("fd {}", fd))))
        }
        Command::Restore { .. } => unreachable!("restore has no input stream"),
    }
}

fn report_stats(stacks: &[&StoreStack]) {
    for stack in stacks {
        if let Some(stat_store) = &stack.stats {
            let stats = stat_store.stats();
            match serde_json::to_string(&stats) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("{}", stats),
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Command::Archive { .. } | Command::ArchiveFd { .. } => {
            let config = cli.archive_config()?;
            let (data, meta) = cli.open_stores(true)?;
            let stream = input_stream(&cli.command)?;

            let handle = archive(stream, &config, data.store.as_ref(), meta.store.as_ref())?;
            println!("{}", handle);

            report_stats(&[&data, &meta]);
            data.store.close()?;
            meta.store.close()?;
            Ok(())
        }
        Command::Restore { handle } => {
            let (data, meta) = cli.open_stores(false)?;
            let stdout = std::io::stdout();
            let mut out = stdout.lock();

            restore(
                handle,
                data.store.clone(),
                meta.store.clone(),
                cli.zip_input,
                &mut out,
            )?;

            report_stats(&[&data, &meta]);
            data.store.close()?;
            meta.store.close()?;
            Ok(())
        }
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "info" } else { "warn" },
    ))
    .init();

    if let Err(err) = run(&cli) {
        eprintln!("blockvault: {:#}", err);
        let code = err
            .downcast_ref::<blockvault::Error>()
            .map(blockvault::Error::code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}
