//! VeriKV demo CLI
//!
//! Run with:
//! ```bash
//! cargo run -p verikv-dict -- --entries 10000 --threads 8 --save dict.bin
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use verikv_core::{DictionaryConfig, LabelScheme, MemoryStorage, StorageConfig};
use verikv_dict::{Dictionary, Entry, Registry};

#[derive(Parser, Debug)]
#[command(name = "verikv-dict")]
#[command(about = "Run an in-memory VeriKV dictionary: insert, commit, query")]
struct Args {
    /// Dictionary configuration (JSON); defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of generated entries to insert
    #[arg(long, default_value = "1000")]
    entries: usize,

    /// Batch insert workers (overrides the config)
    #[arg(long)]
    threads: Option<usize>,

    /// Queriers per dictionary (overrides the config)
    #[arg(long)]
    queriers: Option<usize>,

    /// Use verifiable (VRF-based) labels
    #[arg(long)]
    verifiable: bool,

    /// Commit through the background scheduler with this period instead of an explicit apply
    #[arg(long)]
    commit_interval_ms: Option<u64>,

    /// Write a snapshot of the dictionary here
    #[arg(long)]
    save: Option<PathBuf>,

    /// Restore a snapshot and print its identity instead of running the demo
    #[arg(long)]
    load: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("verikv_dict=info".parse()?))
        .init();

    let args = Args::parse();
    let registry = Arc::new(Registry::new());
    let storage = StorageConfig::new(Arc::new(MemoryStorage::new()));

    if let Some(path) = &args.load {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let dict = Dictionary::load(&bytes, storage, registry)?;
        println!("id:           {}", dict.id());
        println!("label scheme: {}", dict.config().label_scheme);
        println!("config hash:  {}", dict.config().compute_hash());
        if let Some(pk) = dict.public_key() {
            println!("public key:   0x{}", hex::encode(pk));
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => DictionaryConfig::load(path)?,
        None => DictionaryConfig::default(),
    };
    if let Some(threads) = args.threads {
        config = config.with_thread_count(threads);
    }
    if let Some(queriers) = args.queriers {
        config = config.with_querier_pool_size(queriers);
    }
    if args.verifiable {
        config = config.with_label_scheme(LabelScheme::Verifiable);
    }
    if let Some(ms) = args.commit_interval_ms {
        config = config.with_commit_interval(Duration::from_millis(ms));
    }

    let dict = Dictionary::new(config, storage, registry.clone())?;

    let entries: Vec<Entry> = (0..args.entries)
        .map(|i| (format!("key-{}", i).into_bytes(), format!("value-{}", i).into_bytes()))
        .collect();
    let start = Instant::now();
    let written = dict.insert_batch(entries).await?;
    println!("[OK] Inserted {} entries in {:?}", written, start.elapsed());

    if let Some(period) = dict.config().commit_interval {
        while dict.pending_len() > 0 {
            tokio::time::sleep(period).await;
        }
    }
    // waits for an in-flight scheduled cycle, or commits when there is no scheduler
    dict.apply_pending()?;
    dict.check_for_update()?;

    let commitment = dict.get_commitment()?;
    println!("[OK] Epoch {} root 0x{}", commitment.epoch, hex::encode(commitment.root));

    let scheme = dict.config().commitment_scheme;
    let public_key = commitment.public_key.as_ref();
    for key in [&b"key-0"[..], b"missing"] {
        let result = dict.query(key)?;
        let verified = result.verify(key, &commitment.root, public_key, scheme);
        println!(
            "[OK] {:<8} member={} verified={} payload={:?}",
            String::from_utf8_lossy(key),
            result.is_member(),
            verified,
            result.payload().map(String::from_utf8_lossy)
        );
    }

    if let Some(path) = &args.save {
        let bytes = dict.save()?;
        std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        println!("[OK] Saved snapshot ({} bytes) to {}", bytes.len(), path.display());
    }

    dict.shutdown().await?;
    let dropped = registry.shutdown().await;
    anyhow::ensure!(dropped == 0, "{} updates were never applied", dropped);
    Ok(())
}
