use anyhow::Result;
use sqlx::{Sqlite, Transaction};

use super::schema::Database;
use super::types::{Enrichment, NewItem, ProcessFlag, StatusCounts, TrackedItem, TrackedItemRow};

/// Column list shared by every item query
const ITEM_COLUMNS: &str = "id, title, url, content, image, image_name, process_flag, \
                            last_error, created_at, updated_at, published_at";

// ============================================================================
// Reads
// ============================================================================

impl Database {
    /// Begin a write session. Every mutation of a run goes through one of these;
    /// dropping it without [`Session::commit`] rolls back.
    pub async fn begin(&self) -> Result<Session> {
        let tx = self.pool.begin().await?;
        Ok(Session { tx })
    }

    /// Items still lacking content that have not reached a terminal state.
    pub async fn needing_enrichment(&self) -> Result<Vec<TrackedItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM tracked_items \
             WHERE content = '' AND process_flag >= 0 AND process_flag < ? \
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, TrackedItemRow>(&sql)
            .bind(ProcessFlag::ABANDONED.value())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(TrackedItemRow::into_item).collect())
    }

    /// Items eligible for a publish attempt (`0 <= process_flag < 10`).
    pub async fn publishable(&self) -> Result<Vec<TrackedItem>> {
        let sql = format!(
            "SELECT {ITEM_COLUMNS} FROM tracked_items \
             WHERE process_flag >= 0 AND process_flag < ? \
             ORDER BY id"
        );
        let rows = sqlx::query_as::<_, TrackedItemRow>(&sql)
            .bind(ProcessFlag::ABANDONED.value())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(TrackedItemRow::into_item).collect())
    }

    pub async fn get_item(&self, id: i64) -> Result<Option<TrackedItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM tracked_items WHERE id = ?");
        let row = sqlx::query_as::<_, TrackedItemRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(TrackedItemRow::into_item))
    }

    pub async fn find_by_url(&self, url: &str) -> Result<Option<TrackedItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM tracked_items WHERE url = ?");
        let row = sqlx::query_as::<_, TrackedItemRow>(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(TrackedItemRow::into_item))
    }

    pub async fn count_items(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tracked_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Count rows in each publish state.
    pub async fn status_counts(&self) -> Result<StatusCounts> {
        let (pending, retrying, done, abandoned): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(CASE WHEN process_flag = 0 THEN 1 END),
                COUNT(CASE WHEN process_flag > 0 AND process_flag < ? THEN 1 END),
                COUNT(CASE WHEN process_flag < 0 THEN 1 END),
                COUNT(CASE WHEN process_flag >= ? THEN 1 END)
            FROM tracked_items
        "#,
        )
        .bind(ProcessFlag::ABANDONED.value())
        .bind(ProcessFlag::ABANDONED.value())
        .fetch_one(&self.pool)
        .await?;

        Ok(StatusCounts {
            pending,
            retrying,
            done,
            abandoned,
        })
    }
}

// ============================================================================
// Session
// ============================================================================

/// One storage transaction.
///
/// Flag writes are guarded by the flag value the caller read
/// (`WHERE process_flag = old`) and by `0 <= process_flag < 10`, so a stale
/// or repeated write can never move a flag backwards or out of a terminal
/// state. Guarded writes that match no row report `None`/`false`.
pub struct Session {
    tx: Transaction<'static, Sqlite>,
}

impl Session {
    pub async fn find_by_url(&mut self, url: &str) -> Result<Option<TrackedItem>> {
        let sql = format!("SELECT {ITEM_COLUMNS} FROM tracked_items WHERE url = ?");
        let row = sqlx::query_as::<_, TrackedItemRow>(&sql)
            .bind(url)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(TrackedItemRow::into_item))
    }

    /// Insert a new pending item, returning its id.
    ///
    /// Fails on a duplicate URL (UNIQUE constraint).
    pub async fn insert(&mut self, item: &NewItem) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO tracked_items (title, url, process_flag, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
        "#,
        )
        .bind(&item.title)
        .bind(&item.url)
        .bind(ProcessFlag::PENDING.value())
        .bind(now)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(id)
    }

    /// Store enriched content and lead image together. The flag is untouched.
    ///
    /// Returns false if the item already has content or is terminal.
    pub async fn apply_enrichment(
        &mut self,
        item: &TrackedItem,
        enrichment: &Enrichment,
    ) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            UPDATE tracked_items
            SET content = ?, image = ?, image_name = ?, updated_at = ?
            WHERE id = ? AND content = '' AND process_flag >= 0 AND process_flag < ?
        "#,
        )
        .bind(&enrichment.content)
        .bind(&enrichment.image)
        .bind(&enrichment.image_name)
        .bind(now)
        .bind(item.id)
        .bind(ProcessFlag::ABANDONED.value())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count one more failed attempt, returning the new flag.
    pub async fn record_failure(
        &mut self,
        item: &TrackedItem,
        reason: &str,
    ) -> Result<Option<ProcessFlag>> {
        let next = item.process_flag.after_failure();
        self.write_flag(item, next, Some(reason), None).await
    }

    /// Mark the item published, returning the new flag.
    pub async fn record_success(&mut self, item: &TrackedItem) -> Result<Option<ProcessFlag>> {
        let next = item.process_flag.after_success();
        let now = chrono::Utc::now().timestamp();
        self.write_flag(item, next, None, Some(now)).await
    }

    async fn write_flag(
        &mut self,
        item: &TrackedItem,
        next: ProcessFlag,
        last_error: Option<&str>,
        published_at: Option<i64>,
    ) -> Result<Option<ProcessFlag>> {
        if item.process_flag.is_terminal() {
            return Ok(None);
        }

        let now = chrono::Utc::now().timestamp();
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            UPDATE tracked_items
            SET process_flag = ?, last_error = ?, published_at = COALESCE(?, published_at),
                updated_at = ?
            WHERE id = ? AND process_flag = ? AND process_flag >= 0 AND process_flag < ?
            RETURNING process_flag
        "#,
        )
        .bind(next.value())
        .bind(last_error)
        .bind(published_at)
        .bind(now)
        .bind(item.id)
        .bind(item.process_flag.value())
        .bind(ProcessFlag::ABANDONED.value())
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|(flag,)| ProcessFlag::from_raw(flag)))
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
