//! Search command - hybrid semantic + keyword retrieval

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use recollect::core::filter::SearchFilters;
use recollect::search::embedding::HarmonicEmbedder;
use recollect::search::engine::RetrievalEngine;
use recollect::store::db::JournalStore;
use recollect::SearchHit;

#[allow(clippy::too_many_arguments)]
pub fn run(
    query: &str,
    db_path: &Path,
    from: Option<String>,
    to: Option<String>,
    city: Option<String>,
    starred: Option<bool>,
    tags: Vec<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let store = JournalStore::open(db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;
    let engine = RetrievalEngine::new(store, HarmonicEmbedder::new());

    let filters = SearchFilters {
        date_from: from,
        date_to: to,
        city,
        starred,
        tags: if tags.is_empty() { None } else { Some(tags) },
    };

    let limit = limit.unwrap_or(5);
    let hits = engine.search(query, &filters, limit)?;

    if json {
        let json_results: Vec<_> = hits
            .iter()
            .map(|hit| {
                serde_json::json!({
                    "uuid": hit.entry.uuid,
                    "text": hit.entry.text,
                    "created_at": hit.entry.created_at.to_rfc3339(),
                    "city": hit.entry.city,
                    "starred": hit.entry.starred,
                    "tags": hit.entry.tags,
                    "media_counts": hit.entry.media_counts,
                    "score": hit.score,
                    "matched_by": matched_by(hit),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json_results)?);
        return Ok(());
    }

    if hits.is_empty() {
        println!(
            "{} No matching entries for: {}",
            "→".dimmed(),
            query.cyan()
        );
        println!(
            "{}",
            "Try a broader query or looser filters.".dimmed()
        );
        return Ok(());
    }

    println!(
        "{} {} results for: {}",
        "→".dimmed(),
        hits.len(),
        query.cyan()
    );
    println!();

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{}] {} {}",
            (i + 1).to_string().bold(),
            format!("{:.4}", hit.score).green(),
            hit.entry.created_at.format("%Y-%m-%d").to_string().cyan(),
            format!("({})", matched_by(hit)).dimmed()
        );

        println!("   {}", truncate(&hit.entry.text, 100).dimmed());

        let mut details = Vec::new();
        if let Some(city) = &hit.entry.city {
            details.push(city.clone());
        }
        if !hit.entry.tags.is_empty() {
            details.push(hit.entry.tags.join(", "));
        }
        if !details.is_empty() {
            println!("   {}", details.join(" | "));
        }
        println!();
    }

    Ok(())
}

fn matched_by(hit: &SearchHit) -> &'static str {
    match (hit.matched_semantic, hit.matched_lexical) {
        (true, true) => "meaning + keyword",
        (true, false) => "meaning",
        (false, true) => "keyword",
        (false, false) => "none",
    }
}

/// Char-aware truncation for display.
pub fn truncate(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() > max_chars {
        format!("{}...", flat.chars().take(max_chars).collect::<String>())
    } else {
        flat
    }
}
