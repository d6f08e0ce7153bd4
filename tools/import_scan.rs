use std::env;
use std::path::{Path, PathBuf};

use library::Library;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut args = env::args().skip(1);
    let music_root = args
        .next()
        .or_else(|| env::var("MUSIC_ROOT").ok())
        .ok_or("MUSIC_ROOT not set and no path argument")?;
    let index_path = args
        .next()
        .or_else(|| env::var("INDEX_PATH").ok())
        .unwrap_or_else(|| "data/library.redb".to_string());

    let library = Library::open(PathBuf::from(&music_root), Path::new(&index_path))?;
    let summary = library.run_scan()?;
    let stats = library.stats()?;

    println!(
        "Scanned: {} added, {} removed, {} skipped",
        summary.added, summary.removed, summary.skipped
    );
    println!(
        "Indexed: {} artists, {} albums, {} tracks",
        stats.artists, stats.albums, stats.tracks
    );
    if env::var("IMPORT_SCAN_JSON").is_ok() {
        println!("{}", json!({ "summary": summary, "stats": stats }));
    }

    Ok(())
}
