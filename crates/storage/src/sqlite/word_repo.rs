use std::collections::HashMap;

use learn_core::model::{StudyTarget, Word, WordId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, id_i64, map_word_row, placeholders, ser};
use crate::repository::{StorageError, WordCatalog};

impl SqliteRepository {
    /// Insert or update catalog entries in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if any row cannot be written.
    pub async fn upsert_words(&self, words: &[Word]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for word in words {
            sqlx::query(
                r"
                INSERT INTO words (id, headword, meaning, exam, level)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    headword = excluded.headword,
                    meaning = excluded.meaning,
                    exam = excluded.exam,
                    level = excluded.level
                ",
            )
            .bind(id_i64("word_id", word.id.value())?)
            .bind(&word.headword)
            .bind(&word.meaning)
            .bind(word.exam.as_str())
            .bind(i64::from(word.level.value()))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;
        }
        tx.commit().await.map_err(conn)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WordCatalog for SqliteRepository {
    async fn count(&self, target: &StudyTarget) -> Result<u32, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM words WHERE exam = ?1 AND level = ?2")
            .bind(target.exam.as_str())
            .bind(i64::from(target.level.value()))
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        let n: i64 = row.try_get("n").map_err(ser)?;
        u32::try_from(n).map_err(ser)
    }

    async fn page(
        &self,
        target: &StudyTarget,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<Word>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, headword, meaning, exam, level
            FROM words
            WHERE exam = ?1 AND level = ?2
            ORDER BY id ASC
            LIMIT ?3 OFFSET ?4
            ",
        )
        .bind(target.exam.as_str())
        .bind(i64::from(target.level.value()))
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter().map(map_word_row).collect()
    }

    async fn get_many(&self, ids: &[WordId]) -> Result<Vec<Word>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, headword, meaning, exam, level FROM words WHERE id IN ({})",
            placeholders(1, ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id_i64("word_id", id.value())?);
        }
        let rows = q.fetch_all(&self.pool).await.map_err(conn)?;

        let mut by_id: HashMap<WordId, Word> = HashMap::with_capacity(rows.len());
        for row in &rows {
            let word = map_word_row(row)?;
            by_id.insert(word.id, word);
        }

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
