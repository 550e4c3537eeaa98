//! Similar command - nearest neighbors of one journal entry

use std::path::Path;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use uuid::Uuid;

use recollect::search::embedding::HarmonicEmbedder;
use recollect::search::engine::RetrievalEngine;
use recollect::store::db::JournalStore;

use super::search::truncate;

pub fn run(uuid: &str, db_path: &Path, limit: Option<usize>, json: bool) -> Result<()> {
    let Ok(source) = Uuid::parse_str(uuid.trim()) else {
        bail!("'{}' is not a valid entry UUID", uuid);
    };

    let store = JournalStore::open(db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;
    let engine = RetrievalEngine::new(store, HarmonicEmbedder::new());

    let hits = engine.find_similar(source, limit.unwrap_or(5))?;

    if json {
        let json_results: Vec<_> = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "uuid": hit.entry.uuid,
                    "text": hit.entry.text,
                    "created_at": hit.entry.created_at.to_rfc3339(),
                    "city": hit.entry.city,
                    "tags": hit.entry.tags,
                    "similarity": hit.similarity,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!(
            "{} No similar entries for {}",
            "→".dimmed(),
            source.to_string().cyan()
        );
        println!(
            "{}",
            "The source may be missing or not embedded yet.".dimmed()
        );
        return Ok(());
    }

    println!(
        "{} {} entries similar to {}",
        "→".dimmed(),
        hits.len(),
        source.to_string().cyan()
    );
    println!();

    for (i, hit) in hits.iter().enumerate() {
        let score_str = format!("{:.2}", hit.similarity);
        let score_colored = if hit.similarity > 0.8 {
            score_str.green()
        } else if hit.similarity > 0.6 {
            score_str.yellow()
        } else {
            score_str.dimmed()
        };

        println!(
            "{}. [{}] {}",
            (i + 1).to_string().bold(),
            score_colored,
            hit.entry.created_at.format("%Y-%m-%d").to_string().cyan()
        );
        println!("   {}", truncate(&hit.entry.text, 100).dimmed());
        println!();
    }

    Ok(())
}
