//! Result hydration.
//!
//! Expands an ordered id list into full display records. Hydration is
//! presentation-only: the relevance order established upstream is kept
//! exactly, tag names are deduplicated, media counts cover every
//! attachment by type, and the media list carries only attachments with a
//! resolved access reference.

use std::collections::BTreeMap;

use rusqlite::params;
use uuid::Uuid;

use crate::core::entry::{HydratedEntry, MediaItem};
use crate::core::error::Result;

use super::db::JournalStore;

impl JournalStore {
    /// Hydrate `ids` in order. Ids with no stored entry are skipped; within
    /// one query's snapshot this does not happen.
    pub fn hydrate(&self, ids: &[Uuid]) -> Result<Vec<HydratedEntry>> {
        let mut hydrated = Vec::with_capacity(ids.len());
        for &uuid in ids {
            if let Some(record) = self.hydrate_one(uuid)? {
                hydrated.push(record);
            }
        }
        Ok(hydrated)
    }

    fn hydrate_one(&self, uuid: Uuid) -> Result<Option<HydratedEntry>> {
        let Some(entry) = self.get_entry(uuid)? else {
            return Ok(None);
        };

        let tags = self.entry_tags(uuid)?;
        let media_rows = self.entry_media(uuid)?;

        let mut media_counts: BTreeMap<String, usize> = BTreeMap::new();
        for item in &media_rows {
            *media_counts.entry(item.media_type.clone()).or_insert(0) += 1;
        }

        let media = media_rows
            .into_iter()
            .filter(|item| item.access_ref.is_some())
            .collect();

        Ok(Some(HydratedEntry {
            uuid: entry.uuid,
            text: entry.text,
            created_at: entry.created_at,
            city: entry.city,
            weather: entry.weather,
            starred: entry.starred,
            tags,
            media_counts,
            media,
        }))
    }

    fn entry_tags(&self, uuid: Uuid) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare(
            "SELECT DISTINCT t.name FROM tags t
             JOIN entry_tags et ON et.tag_id = t.id
             WHERE et.entry_uuid = ?1
             ORDER BY t.name",
        )?;
        let rows = stmt.query_map(params![uuid.to_string()], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn entry_media(&self, uuid: Uuid) -> Result<Vec<MediaItem>> {
        let mut stmt = self.conn().prepare(
            "SELECT media_type, access_ref, width, height
             FROM media WHERE entry_uuid = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![uuid.to_string()], |row| {
            Ok(MediaItem {
                media_type: row.get(0)?,
                access_ref: row.get(1)?,
                width: row.get(2)?,
                height: row.get(3)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entry::JournalEntry;
    use chrono::Utc;

    fn stored_entry(store: &JournalStore, text: &str) -> Uuid {
        let entry = JournalEntry {
            uuid: Uuid::new_v4(),
            text: text.to_string(),
            created_at: Utc::now(),
            city: Some("Porto".to_string()),
            weather: Some("sunny".to_string()),
            starred: false,
            embedding: None,
        };
        store.upsert_entry(&entry).unwrap();
        entry.uuid
    }

    fn media(media_type: &str, access_ref: Option<&str>) -> MediaItem {
        MediaItem {
            media_type: media_type.to_string(),
            access_ref: access_ref.map(String::from),
            width: Some(640),
            height: Some(480),
        }
    }

    #[test]
    fn hydration_preserves_input_order() {
        let store = JournalStore::open_in_memory().unwrap();
        let first = stored_entry(&store, "first");
        let second = stored_entry(&store, "second");
        let third = stored_entry(&store, "third");

        let ordered = store.hydrate(&[third, first, second]).unwrap();
        let ids: Vec<Uuid> = ordered.iter().map(|e| e.uuid).collect();
        assert_eq!(ids, vec![third, first, second]);
    }

    #[test]
    fn tags_are_deduplicated() {
        let store = JournalStore::open_in_memory().unwrap();
        let id = stored_entry(&store, "tagged");
        store
            .replace_tags(
                id,
                &[
                    "travel".to_string(),
                    "travel".to_string(),
                    "food".to_string(),
                ],
            )
            .unwrap();

        let hydrated = store.hydrate(&[id]).unwrap();
        assert_eq!(hydrated[0].tags, vec!["food", "travel"]);
    }

    #[test]
    fn media_counts_cover_everything_but_list_needs_access_ref() {
        let store = JournalStore::open_in_memory().unwrap();
        let id = stored_entry(&store, "with media");
        store
            .replace_media(
                id,
                &[
                    media("photo", Some("blob://a")),
                    media("photo", None),
                    media("audio", Some("blob://b")),
                ],
            )
            .unwrap();

        let hydrated = store.hydrate(&[id]).unwrap();
        let record = &hydrated[0];

        assert_eq!(record.media_counts.get("photo"), Some(&2));
        assert_eq!(record.media_counts.get("audio"), Some(&1));
        // The unresolved photo is counted but not listed.
        assert_eq!(record.media.len(), 2);
        assert!(record.media.iter().all(|m| m.access_ref.is_some()));
    }

    #[test]
    fn missing_ids_are_skipped() {
        let store = JournalStore::open_in_memory().unwrap();
        let id = stored_entry(&store, "present");
        let hydrated = store.hydrate(&[Uuid::new_v4(), id]).unwrap();
        assert_eq!(hydrated.len(), 1);
        assert_eq!(hydrated[0].uuid, id);
    }

    #[test]
    fn attributes_carry_through() {
        let store = JournalStore::open_in_memory().unwrap();
        let id = stored_entry(&store, "attributes");
        let hydrated = store.hydrate(&[id]).unwrap();
        assert_eq!(hydrated[0].city.as_deref(), Some("Porto"));
        assert_eq!(hydrated[0].weather.as_deref(), Some("sunny"));
    }
}
