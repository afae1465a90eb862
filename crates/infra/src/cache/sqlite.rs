//! SQLite-backed cache (sqlx).

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use famreport_core::{Contact, ContactId, ContactNote, Engagement, SyncProgress};

use super::{CacheError, ClearedCounts, ContactCache, Enrichment, FamilyQuery, fold_name};

const PROGRESS_KEY: &str = "patient_families_sync";

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS families (
        id                   INTEGER PRIMARY KEY,
        name                 TEXT NOT NULL,
        name_folded          TEXT NOT NULL DEFAULT '',
        contact_type         TEXT NULL,
        created_date         TEXT NULL,
        email                TEXT NULL,
        phone                TEXT NULL,
        address              TEXT NULL,
        tags                 TEXT NOT NULL DEFAULT '[]',
        last_engagement_date TEXT NULL,
        diagnosis_date       TEXT NULL,
        updated_at           TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS engagements (
        contact_id      INTEGER NOT NULL,
        date            TEXT NOT NULL,
        engagement_type TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS engagements_by_contact ON engagements (contact_id)",
    r#"
    CREATE TABLE IF NOT EXISTS contact_notes (
        contact_id INTEGER NOT NULL,
        date       TEXT NOT NULL,
        note_type  TEXT NOT NULL,
        staff      TEXT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS notes_by_contact ON contact_notes (contact_id)",
    r#"
    CREATE TABLE IF NOT EXISTS sync_state (
        id                    TEXT PRIMARY KEY,
        last_processed_offset INTEGER NOT NULL,
        total_known           INTEGER NULL,
        cached_count          INTEGER NOT NULL
    )
    "#,
];

/// Default database location: `<data dir>/famreport/cache.db`.
pub fn default_db_path() -> Option<PathBuf> {
    let mut dir = dirs::data_dir()?;
    dir.push("famreport");
    dir.push("cache.db");
    Some(dir)
}

fn storage(context: &str) -> impl FnOnce(sqlx::Error) -> CacheError + '_ {
    move |e| CacheError::Storage(format!("{context}: {e}"))
}

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn to_u64(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

fn date_text(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.to_string())
}

fn parse_date(raw: Option<String>, column: &str) -> Result<Option<NaiveDate>, CacheError> {
    raw.map(|s| NaiveDate::from_str(&s).map_err(|e| CacheError::Corrupt(format!("{column}={s:?}: {e}"))))
        .transpose()
}

fn required_date(raw: String, column: &str) -> Result<NaiveDate, CacheError> {
    NaiveDate::from_str(&raw).map_err(|e| CacheError::Corrupt(format!("{column}={raw:?}: {e}")))
}

fn contact_from_row(row: &SqliteRow) -> Result<Contact, CacheError> {
    let get_err = |e: sqlx::Error| CacheError::Corrupt(e.to_string());

    let tags_json: String = row.try_get("tags").map_err(get_err)?;
    let tags: BTreeSet<String> = serde_json::from_str(&tags_json)
        .map_err(|e| CacheError::Corrupt(format!("tags: {e}")))?;

    let mut contact = Contact::new(
        ContactId::new(row.try_get("id").map_err(get_err)?),
        row.try_get::<String, _>("name").map_err(get_err)?,
    );
    contact.contact_type = row.try_get("contact_type").map_err(get_err)?;
    contact.created_date = parse_date(row.try_get("created_date").map_err(get_err)?, "created_date")?;
    contact.email = row.try_get("email").map_err(get_err)?;
    contact.phone = row.try_get("phone").map_err(get_err)?;
    contact.address = row.try_get("address").map_err(get_err)?;
    contact.tags = tags;
    contact.last_engagement_date = parse_date(
        row.try_get("last_engagement_date").map_err(get_err)?,
        "last_engagement_date",
    )?;
    contact.diagnosis_date = parse_date(row.try_get("diagnosis_date").map_err(get_err)?, "diagnosis_date")?;
    Ok(contact)
}

const CONTACT_COLUMNS: &str = "id, name, contact_type, created_date, email, phone, address, tags, last_engagement_date, diagnosis_date";

#[derive(Debug, Clone)]
pub struct SqliteContactCache {
    pool: SqlitePool,
}

impl SqliteContactCache {
    /// Open (creating if needed) the database at `url` and apply the schema.
    ///
    /// In-memory URLs get a single connection so every query sees the same
    /// database.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage("invalid database url"))?
            .create_if_missing(true);
        let in_memory = url.contains(":memory:");

        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(storage("failed to open SQLite pool"))?;

        let cache = Self { pool };
        cache.migrate().await?;
        Ok(cache)
    }

    /// Open the database file at `path`, creating parent directories.
    pub async fn open_path(path: &std::path::Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CacheError::Storage(format!("failed to create {parent:?}: {e}")))?;
        }
        Self::connect(&format!("sqlite://{}", path.to_string_lossy())).await
    }

    async fn migrate(&self) -> Result<(), CacheError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(storage("failed to apply cache schema"))?;
        }
        self.add_folded_names().await
    }

    /// Search matches against `name_folded`, folded in Rust so it agrees with
    /// the needle. Older databases get the column and a backfill.
    async fn add_folded_names(&self) -> Result<(), CacheError> {
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM pragma_table_info('families') WHERE name = 'name_folded'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage("failed to inspect cache schema"))?;
        if present > 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(storage("failed to begin migration"))?;
        sqlx::query("ALTER TABLE families ADD COLUMN name_folded TEXT NOT NULL DEFAULT ''")
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to add name_folded"))?;
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM families")
            .fetch_all(&mut *tx)
            .await
            .map_err(storage("failed to read names"))?;
        for (id, name) in &rows {
            sqlx::query("UPDATE families SET name_folded = ?1 WHERE id = ?2")
                .bind(fold_name(name))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(storage("failed to backfill name_folded"))?;
        }
        tx.commit().await.map_err(storage("failed to commit migration"))?;
        tracing::info!(families = rows.len(), "backfilled folded family names");
        Ok(())
    }
}

#[async_trait::async_trait]
impl ContactCache for SqliteContactCache {
    async fn read_progress(&self) -> Result<Option<SyncProgress>, CacheError> {
        let row = sqlx::query(
            "SELECT last_processed_offset, total_known, cached_count FROM sync_state WHERE id = ?1",
        )
        .bind(PROGRESS_KEY)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("failed to read sync state"))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let get_err = |e: sqlx::Error| CacheError::Corrupt(e.to_string());
        Ok(Some(SyncProgress {
            last_processed_offset: to_u64(row.try_get("last_processed_offset").map_err(get_err)?),
            total_known: row
                .try_get::<Option<i64>, _>("total_known")
                .map_err(get_err)?
                .map(to_u64),
            cached_count: to_u64(row.try_get("cached_count").map_err(get_err)?),
        }))
    }

    async fn write_progress(&self, progress: SyncProgress) -> Result<(), CacheError> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (id, last_processed_offset, total_known, cached_count)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                last_processed_offset = excluded.last_processed_offset,
                total_known = excluded.total_known,
                cached_count = excluded.cached_count
            "#,
        )
        .bind(PROGRESS_KEY)
        .bind(to_i64(progress.last_processed_offset))
        .bind(progress.total_known.map(to_i64))
        .bind(to_i64(progress.cached_count))
        .execute(&self.pool)
        .await
        .map_err(storage("failed to write sync state"))?;
        Ok(())
    }

    async fn upsert_contacts(&self, contacts: &[Contact]) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await.map_err(storage("failed to begin upsert"))?;
        let now = Utc::now().to_rfc3339();

        for c in contacts {
            let tags = serde_json::to_string(&c.tags)
                .map_err(|e| CacheError::Storage(format!("failed to encode tags: {e}")))?;

            sqlx::query(
                r#"
                INSERT INTO families (
                    id, name, contact_type, created_date, email, phone, address, tags,
                    last_engagement_date, diagnosis_date, updated_at, name_folded
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    name_folded = excluded.name_folded,
                    contact_type = excluded.contact_type,
                    created_date = COALESCE(excluded.created_date, families.created_date),
                    email = COALESCE(excluded.email, families.email),
                    phone = COALESCE(excluded.phone, families.phone),
                    address = COALESCE(excluded.address, families.address),
                    tags = excluded.tags,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(c.id.get())
            .bind(&c.name)
            .bind(&c.contact_type)
            .bind(date_text(c.created_date))
            .bind(&c.email)
            .bind(&c.phone)
            .bind(&c.address)
            .bind(&tags)
            .bind(date_text(c.last_engagement_date))
            .bind(date_text(c.diagnosis_date))
            .bind(&now)
            .bind(fold_name(&c.name))
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to upsert family"))?;
        }

        tx.commit().await.map_err(storage("failed to commit upsert"))?;
        Ok(())
    }

    async fn count(&self) -> Result<u64, CacheError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM families")
            .fetch_one(&self.pool)
            .await
            .map_err(storage("failed to count families"))?;
        Ok(to_u64(n))
    }

    async fn list_families(&self, query: &FamilyQuery) -> Result<(Vec<Contact>, u64), CacheError> {
        let needle = query.needle();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM families WHERE ?1 IS NULL OR instr(name_folded, ?1) > 0",
        )
        .bind(&needle)
        .fetch_one(&self.pool)
        .await
        .map_err(storage("failed to count families"))?;

        let rows = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS} FROM families \
             WHERE ?1 IS NULL OR instr(name_folded, ?1) > 0 \
             ORDER BY name, id LIMIT ?2 OFFSET ?3"
        ))
        .bind(&needle)
        .bind(to_i64(query.limit))
        .bind(to_i64(query.skip))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("failed to list families"))?;

        let families = rows.iter().map(contact_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok((families, to_u64(total)))
    }

    async fn slice_by_id(&self, offset: u64, limit: u64) -> Result<Vec<Contact>, CacheError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONTACT_COLUMNS} FROM families ORDER BY id LIMIT ?1 OFFSET ?2"
        ))
        .bind(to_i64(limit))
        .bind(to_i64(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("failed to slice families"))?;

        rows.iter().map(contact_from_row).collect()
    }

    async fn record_enrichment(&self, id: ContactId, enrichment: &Enrichment) -> Result<(), CacheError> {
        let mut tx = self.pool.begin().await.map_err(storage("failed to begin enrichment"))?;

        let row = sqlx::query(&format!("SELECT {CONTACT_COLUMNS} FROM families WHERE id = ?1"))
            .bind(id.get())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("failed to load family"))?;
        let Some(row) = row else {
            return Ok(());
        };

        let mut contact = contact_from_row(&row)?;
        enrichment.apply_to(&mut contact);

        sqlx::query(
            r#"
            UPDATE families SET
                created_date = ?2,
                email = ?3,
                phone = ?4,
                address = ?5,
                last_engagement_date = ?6,
                diagnosis_date = ?7,
                updated_at = ?8
            WHERE id = ?1
            "#,
        )
        .bind(id.get())
        .bind(date_text(contact.created_date))
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.address)
        .bind(date_text(contact.last_engagement_date))
        .bind(date_text(contact.diagnosis_date))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage("failed to update family"))?;

        sqlx::query("DELETE FROM engagements WHERE contact_id = ?1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to replace engagements"))?;
        for e in &enrichment.engagements {
            sqlx::query("INSERT INTO engagements (contact_id, date, engagement_type) VALUES (?1, ?2, ?3)")
                .bind(id.get())
                .bind(e.date.to_string())
                .bind(&e.engagement_type)
                .execute(&mut *tx)
                .await
                .map_err(storage("failed to insert engagement"))?;
        }

        sqlx::query("DELETE FROM contact_notes WHERE contact_id = ?1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to replace notes"))?;
        for n in &enrichment.notes {
            sqlx::query("INSERT INTO contact_notes (contact_id, date, note_type, staff) VALUES (?1, ?2, ?3, ?4)")
                .bind(id.get())
                .bind(n.date.to_string())
                .bind(&n.note_type)
                .bind(&n.staff)
                .execute(&mut *tx)
                .await
                .map_err(storage("failed to insert note"))?;
        }

        tx.commit().await.map_err(storage("failed to commit enrichment"))?;
        Ok(())
    }

    async fn all_contacts(&self) -> Result<Vec<Contact>, CacheError> {
        let rows = sqlx::query(&format!("SELECT {CONTACT_COLUMNS} FROM families ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(storage("failed to load families"))?;
        rows.iter().map(contact_from_row).collect()
    }

    async fn all_engagements(&self) -> Result<Vec<Engagement>, CacheError> {
        let rows = sqlx::query("SELECT contact_id, date, engagement_type FROM engagements ORDER BY contact_id, date")
            .fetch_all(&self.pool)
            .await
            .map_err(storage("failed to load engagements"))?;

        rows.iter()
            .map(|row| {
                let get_err = |e: sqlx::Error| CacheError::Corrupt(e.to_string());
                Ok(Engagement {
                    contact_id: ContactId::new(row.try_get("contact_id").map_err(get_err)?),
                    date: required_date(row.try_get("date").map_err(get_err)?, "engagements.date")?,
                    engagement_type: row.try_get("engagement_type").map_err(get_err)?,
                })
            })
            .collect()
    }

    async fn all_notes(&self) -> Result<Vec<ContactNote>, CacheError> {
        let rows = sqlx::query("SELECT contact_id, date, note_type, staff FROM contact_notes ORDER BY contact_id, date")
            .fetch_all(&self.pool)
            .await
            .map_err(storage("failed to load notes"))?;

        rows.iter()
            .map(|row| {
                let get_err = |e: sqlx::Error| CacheError::Corrupt(e.to_string());
                Ok(ContactNote {
                    contact_id: ContactId::new(row.try_get("contact_id").map_err(get_err)?),
                    date: required_date(row.try_get("date").map_err(get_err)?, "contact_notes.date")?,
                    note_type: row.try_get("note_type").map_err(get_err)?,
                    staff: row.try_get("staff").map_err(get_err)?,
                })
            })
            .collect()
    }

    async fn clear(&self) -> Result<ClearedCounts, CacheError> {
        let mut tx = self.pool.begin().await.map_err(storage("failed to begin clear"))?;

        let families = sqlx::query("DELETE FROM families")
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to clear families"))?
            .rows_affected();
        sqlx::query("DELETE FROM engagements")
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to clear engagements"))?;
        sqlx::query("DELETE FROM contact_notes")
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to clear notes"))?;
        let sync_states = sqlx::query("DELETE FROM sync_state")
            .execute(&mut *tx)
            .await
            .map_err(storage("failed to clear sync state"))?
            .rows_affected();

        tx.commit().await.map_err(storage("failed to commit clear"))?;
        tracing::info!(families, sync_states, "cache cleared");
        Ok(ClearedCounts { families, sync_states })
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    async fn memory() -> SqliteContactCache {
        SqliteContactCache::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn upsert_merges_and_counts() {
        contract::upsert_merges_and_counts(&memory().await).await;
    }

    #[tokio::test]
    async fn lists_by_name_with_search() {
        contract::lists_by_name_with_search(&memory().await).await;
    }

    #[tokio::test]
    async fn search_folds_non_ascii_names() {
        contract::search_folds_non_ascii_names(&memory().await).await;
    }

    #[tokio::test]
    async fn progress_round_trips_and_clears() {
        contract::progress_round_trips_and_clears(&memory().await).await;
    }

    #[tokio::test]
    async fn enrichment_replaces_rows() {
        contract::enrichment_replaces_rows(&memory().await).await;
    }

    #[tokio::test]
    async fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        {
            let cache = SqliteContactCache::open_path(&path).await.unwrap();
            let mut c = Contact::new(ContactId::new(1), "Disk Family");
            c.tags.insert("Patient Family".into());
            cache.upsert_contacts(&[c]).await.unwrap();
            cache.pool.close().await;
        }

        let cache = SqliteContactCache::open_path(&path).await.unwrap();
        let all = cache.all_contacts().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].tags.contains("Patient Family"));
    }

    #[tokio::test]
    async fn backfills_folded_names_in_older_databases() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("old.db").to_string_lossy());

        {
            let options = SqliteConnectOptions::from_str(&url).unwrap().create_if_missing(true);
            let pool = SqlitePool::connect_with(options).await.unwrap();
            sqlx::query(
                "CREATE TABLE families (id INTEGER PRIMARY KEY, name TEXT NOT NULL, \
                 contact_type TEXT NULL, created_date TEXT NULL, email TEXT NULL, phone TEXT NULL, \
                 address TEXT NULL, tags TEXT NOT NULL DEFAULT '[]', last_engagement_date TEXT NULL, \
                 diagnosis_date TEXT NULL, updated_at TEXT NOT NULL)",
            )
            .execute(&pool)
            .await
            .unwrap();
            sqlx::query("INSERT INTO families (id, name, updated_at) VALUES (1, 'ÉLODIE Family', '2024-01-01')")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }

        let cache = SqliteContactCache::connect(&url).await.unwrap();
        let (page, total) = cache
            .list_families(&FamilyQuery {
                skip: 0,
                limit: 10,
                search: Some("élodie".into()),
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].name, "ÉLODIE Family");
    }
}
