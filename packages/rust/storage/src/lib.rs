//! libSQL storage layer (local file mode).
//!
//! The [`Storage`] struct wraps a libSQL database holding stored questions,
//! the full-text passage corpus, the searcher result cache, and training rows
//! teed out of pipeline runs.
//!
//! **Access rules:**
//! - server / generate / import: read-write via [`Storage::open`]
//! - inspection tools: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use deepqa_shared::{DeepQaError, Passage, Question, Result};
use libsql::{Connection, Database, params};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| DeepQaError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open a database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    DeepQaError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(DeepQaError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Question source
    // -----------------------------------------------------------------------

    /// Store a question with its known answer. Duplicate question texts are ignored.
    pub async fn insert_question(
        &self,
        question: &str,
        answer: Option<&str>,
        category: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO questions (question, answer, category, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(question) DO NOTHING",
                params![question, answer, category, now.as_str()],
            )
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Fetch stored questions in insertion order.
    pub async fn fetch_questions(&self, limit: u32, offset: u32) -> Result<Vec<Question>> {
        self.query_questions(
            "SELECT question, answer, category FROM questions
             ORDER BY id LIMIT ?1 OFFSET ?2",
            params![i64::from(limit), i64::from(offset)],
        )
        .await
    }

    /// Fetch stored questions missing cached results from any of `engines`.
    ///
    /// A question searched by only some engines stays pending, so a failed
    /// backend is retried on the next run.
    pub async fn fetch_questions_without_results(
        &self,
        engines: &[&str],
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Question>> {
        let engines_json = serde_json::to_string(engines)?;
        self.query_questions(
            "SELECT q.question, q.answer, q.category FROM questions q
             WHERE (SELECT COUNT(DISTINCT c.engine) FROM search_cache c
                    WHERE c.query = q.question
                      AND c.engine IN (SELECT value FROM json_each(?3))) < ?4
             ORDER BY q.id LIMIT ?1 OFFSET ?2",
            params![
                i64::from(limit),
                i64::from(offset),
                engines_json.as_str(),
                engines.len() as i64,
            ],
        )
        .await
    }

    async fn query_questions(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<Question>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let text: String = row
                .get(0)
                .map_err(|e| DeepQaError::Storage(e.to_string()))?;
            let answer: Option<String> = row.get::<String>(1).ok();
            let category: String = row.get::<String>(2).unwrap_or_default();
            let question = match answer {
                Some(answer) => Question::known(text, answer, category),
                None => {
                    let mut q = Question::new(text);
                    q.category = category;
                    q
                }
            };
            results.push(question);
        }
        Ok(results)
    }

    /// Count stored questions.
    pub async fn count_questions(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM questions").await
    }

    // -----------------------------------------------------------------------
    // Passage corpus
    // -----------------------------------------------------------------------

    /// Upsert a corpus passage (keyed by `source + title`).
    pub async fn insert_passage(&self, title: &str, body: &str, source: &str) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO passages (title, body, source) VALUES (?1, ?2, ?3)
                 ON CONFLICT(source, title) DO UPDATE SET body = excluded.body",
                params![title, body, source],
            )
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Full-text search across the passage corpus, best match first.
    ///
    /// The query is reduced to its alphanumeric terms, so arbitrary question
    /// punctuation never reaches the FTS5 parser.
    pub async fn search_passages(&self, query: &str, limit: u32) -> Result<Vec<CorpusHit>> {
        let Some(expression) = match_expression(query) else {
            return Ok(Vec::new());
        };

        let mut rows = self
            .conn
            .query(
                "SELECT p.title, p.body, p.source, bm25(passages_fts) AS rank
                 FROM passages_fts
                 JOIN passages p ON p.id = passages_fts.rowid
                 WHERE passages_fts MATCH ?1
                 ORDER BY rank
                 LIMIT ?2",
                params![expression.as_str(), i64::from(limit)],
            )
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let title: String = row
                .get(0)
                .map_err(|e| DeepQaError::Storage(e.to_string()))?;
            let body: String = row
                .get(1)
                .map_err(|e| DeepQaError::Storage(e.to_string()))?;
            let source: String = row
                .get(2)
                .map_err(|e| DeepQaError::Storage(e.to_string()))?;
            let rank: f64 = row.get(3).unwrap_or(0.0);
            results.push(CorpusHit {
                title,
                body,
                source,
                // bm25 is lower-is-better; flip so callers see higher-is-better.
                score: -rank,
            });
        }
        Ok(results)
    }

    /// Count corpus passages.
    pub async fn count_passages(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM passages").await
    }

    // -----------------------------------------------------------------------
    // Search cache
    // -----------------------------------------------------------------------

    /// Get cached searcher results for `(engine, query)`.
    pub async fn get_cached_results(
        &self,
        engine: &str,
        query: &str,
    ) -> Result<Option<Vec<Passage>>> {
        let mut rows = self
            .conn
            .query(
                "SELECT results_json FROM search_cache WHERE engine = ?1 AND query = ?2",
                params![engine, query],
            )
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let json: String = row
                    .get(0)
                    .map_err(|e| DeepQaError::Storage(e.to_string()))?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DeepQaError::Storage(e.to_string())),
        }
    }

    /// Store searcher results for `(engine, query)` (upserts).
    pub async fn set_cached_results(
        &self,
        engine: &str,
        query: &str,
        passages: &[Passage],
    ) -> Result<()> {
        self.check_writable()?;
        let id = cache_key(engine, query);
        let json = serde_json::to_string(passages)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO search_cache (id, engine, query, results_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(engine, query) DO UPDATE SET
                   results_json = excluded.results_json,
                   created_at = excluded.created_at",
                params![id.as_str(), engine, query, json.as_str(), now.as_str()],
            )
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Training rows
    // -----------------------------------------------------------------------

    /// Append training rows as one batch: either every row lands or none do.
    pub async fn insert_training_rows(&self, rows: &[TrainingRow]) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;
        for row in rows {
            let id = Uuid::now_v7().to_string();
            tx.execute(
                "INSERT INTO training_rows
                   (id, question_id, question, candidate, is_correct, scores_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id.as_str(),
                    row.question_id.as_str(),
                    row.question.as_str(),
                    row.candidate.as_str(),
                    row.is_correct.map(i64::from),
                    row.scores_json.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;
        }
        tx.commit()
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Count training rows.
    pub async fn count_training_rows(&self) -> Result<u64> {
        self.count("SELECT COUNT(*) FROM training_rows").await
    }

    async fn count(&self, sql: &str) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, params![])
            .await
            .map_err(|e| DeepQaError::Storage(e.to_string()))?;
        match rows.next().await {
            Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0).max(0) as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(DeepQaError::Storage(e.to_string())),
        }
    }
}

/// A full-text hit from the passage corpus.
#[derive(Debug, Clone)]
pub struct CorpusHit {
    pub title: String,
    pub body: String,
    pub source: String,
    /// Negated bm25 (higher is better).
    pub score: f64,
}

/// One answer's feature row, teed out for ranking-model training.
#[derive(Debug, Clone)]
pub struct TrainingRow {
    pub question_id: String,
    pub question: String,
    pub candidate: String,
    /// `None` when the question has no known answer.
    pub is_correct: Option<bool>,
    /// Score map as JSON (withheld scores are `null`).
    pub scores_json: String,
}

/// Build an FTS5 expression: quoted alphanumeric terms joined with `OR`.
fn match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t.to_lowercase()))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Stable cache row id for an engine/query pair.
fn cache_key(engine: &str, query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(engine.as_bytes());
    hasher.update([0u8]);
    hasher.update(query.as_bytes());
    format!("{:x}", hasher.finalize())
}
