//! Import command - load journal export files into the store
//!
//! The retrieval engine never writes; this is the ingestion surface it
//! reads from. Each export file is a JSON array of entries. Texts are
//! embedded in one batch and the tagged results are restored to input
//! order before they are paired back with their entries.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;
use walkdir::WalkDir;

use recollect::core::entry::{JournalEntry, MediaItem};
use recollect::search::embedding::{into_input_order, EmbeddingProvider, HarmonicEmbedder};
use recollect::store::db::JournalStore;

#[derive(Debug, Deserialize)]
struct ImportEntry {
    #[serde(default)]
    uuid: Option<Uuid>,
    text: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    weather: Option<String>,
    #[serde(default)]
    starred: bool,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    media: Vec<ImportMedia>,
}

#[derive(Debug, Deserialize)]
struct ImportMedia {
    #[serde(rename = "type")]
    media_type: String,
    #[serde(default)]
    access_ref: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

pub fn run(dir: &Path, db_path: &Path, json: bool) -> Result<()> {
    let store = JournalStore::open(db_path)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;
    let embedder = HarmonicEmbedder::new();

    let mut imported = 0usize;
    let mut skipped_files = 0usize;

    let mut files: Vec<_> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|ext| ext == "json").unwrap_or(false))
        .map(|e| e.into_path())
        .collect();
    files.sort();

    for file in &files {
        match import_file(&store, &embedder, file) {
            Ok(count) => {
                debug!(file = %file.display(), entries = count, "imported file");
                imported += count;
            }
            Err(e) => {
                eprintln!("Failed to import {}: {}", file.display(), e);
                skipped_files += 1;
            }
        }
    }

    if json {
        let summary = serde_json::json!({
            "files": files.len(),
            "imported": imported,
            "skipped_files": skipped_files,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{} Imported {} entries from {} files",
            "✓".green(),
            imported.to_string().bold(),
            files.len()
        );
        if skipped_files > 0 {
            println!(
                "{} {} files could not be parsed",
                "!".yellow(),
                skipped_files
            );
        }
    }

    Ok(())
}

fn import_file(
    store: &JournalStore,
    embedder: &HarmonicEmbedder,
    file: &Path,
) -> Result<usize> {
    let raw = fs::read_to_string(file)?;
    let entries: Vec<ImportEntry> =
        serde_json::from_str(&raw).context("malformed export file")?;

    let count = entries.len();
    let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
    let batch = embedder.embed_batch(&texts)?;
    let vectors = into_input_order(batch, count)?;

    for (entry, vector) in entries.into_iter().zip(vectors) {
        // Entries with no usable text keep a null vector and stay out of
        // the semantic channel.
        let embedding = if entry.text.trim().is_empty() {
            None
        } else {
            Some(vector)
        };

        let record = JournalEntry {
            uuid: entry.uuid.unwrap_or_else(Uuid::new_v4),
            text: entry.text,
            created_at: entry.created_at,
            city: entry.city,
            weather: entry.weather,
            starred: entry.starred,
            embedding,
        };
        store.upsert_entry(&record)?;
        store.replace_tags(record.uuid, &entry.tags)?;

        let media: Vec<MediaItem> = entry
            .media
            .into_iter()
            .map(|m| MediaItem {
                media_type: m.media_type,
                access_ref: m.access_ref,
                width: m.width,
                height: m.height,
            })
            .collect();
        store.replace_media(record.uuid, &media)?;
    }

    Ok(count)
}
