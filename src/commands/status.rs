//! Status command - store statistics

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use recollect::store::db::JournalStore;

pub fn run(db_path: &Path, json: bool) -> Result<()> {
    let store = JournalStore::open(db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;
    let stats = store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let coverage = if stats.entry_count > 0 {
        (stats.embedded_count as f64 / stats.entry_count as f64) * 100.0
    } else {
        0.0
    };

    println!("{}", "Journal Store".bold());
    println!("{}", "=".repeat(40));
    println!("Entries:            {}", stats.entry_count);
    println!(
        "With embedding:     {} ({:.0}%)",
        stats.embedded_count, coverage
    );
    println!("Tags:               {}", stats.tag_count);
    println!("Media attachments:  {}", stats.media_count);

    if stats.entry_count > 0 && stats.embedded_count < stats.entry_count {
        println!();
        println!(
            "{} {} entries have no embedding and are reachable by keyword only",
            "!".yellow(),
            stats.entry_count - stats.embedded_count
        );
    }

    Ok(())
}
