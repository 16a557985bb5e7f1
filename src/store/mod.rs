use chrono::{DateTime, SecondsFormat, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use uuid::Uuid;

use crate::models::*;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Invalid(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Generate an unguessable share token: 16 random bytes as 32 lowercase hex
/// characters. Uniqueness is enforced by the storage constraint; callers
/// regenerate on collision rather than reuse.
pub fn new_share_token() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Timestamps are persisted as fixed-width RFC3339 with nanosecond precision
/// so lexicographic comparison in SQL matches chronological order. Cursor
/// values are reformatted through this before they hit a query.
fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Thread-safe SQLite store. The mutex serializes connection access; every
/// multi-row mutation additionally runs inside a transaction so partial
/// application is impossible, and unique constraints arbitrate concurrent
/// toggle/token races.
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn new(db_path: &str) -> StoreResult<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> StoreResult<Self> {
        Self::new(":memory:")
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                drive_refresh_token TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT 'Untitled',
                content TEXT NOT NULL DEFAULT '{}',
                is_public INTEGER NOT NULL DEFAULT 0,
                share_token TEXT UNIQUE,
                copied_from_id TEXT,
                drive_file_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (owner_id) REFERENCES users(id),
                FOREIGN KEY (copied_from_id) REFERENCES documents(id)
            );

            CREATE TABLE IF NOT EXISTS publications (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                document_id TEXT,
                title TEXT NOT NULL,
                abstract TEXT,
                type TEXT NOT NULL,
                pdf_path TEXT NOT NULL,
                thumbnail_path TEXT NOT NULL,
                share_token TEXT UNIQUE NOT NULL,
                like_count INTEGER NOT NULL DEFAULT 0,
                comment_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id),
                FOREIGN KEY (document_id) REFERENCES documents(id)
            );

            CREATE TABLE IF NOT EXISTS publication_likes (
                id TEXT PRIMARY KEY,
                publication_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (publication_id) REFERENCES publications(id),
                FOREIGN KEY (user_id) REFERENCES users(id),
                UNIQUE(publication_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS publication_comments (
                id TEXT PRIMARY KEY,
                publication_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                parent_id TEXT,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (publication_id) REFERENCES publications(id),
                FOREIGN KEY (author_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS follows (
                id TEXT PRIMARY KEY,
                follower_id TEXT NOT NULL,
                following_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (follower_id) REFERENCES users(id),
                FOREIGN KEY (following_id) REFERENCES users(id),
                UNIQUE(follower_id, following_id)
            );

            CREATE INDEX IF NOT EXISTS idx_documents_owner_id ON documents(owner_id);
            CREATE INDEX IF NOT EXISTS idx_publications_author_id ON publications(author_id);
            CREATE INDEX IF NOT EXISTS idx_publications_created_at ON publications(created_at);
            CREATE INDEX IF NOT EXISTS idx_comments_publication_id ON publication_comments(publication_id);
            CREATE INDEX IF NOT EXISTS idx_comments_created_at ON publication_comments(created_at);
            CREATE INDEX IF NOT EXISTS idx_likes_user_id ON publication_likes(user_id);
            CREATE INDEX IF NOT EXISTS idx_follows_follower_id ON follows(follower_id);
            CREATE INDEX IF NOT EXISTS idx_follows_following_id ON follows(following_id);
            "#,
        )?;
        Ok(())
    }

    // ==================== User Operations ====================

    pub fn create_user(&self, user: &mut User) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        user.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        user.created_at = now;
        user.updated_at = now;

        conn.execute(
            r#"INSERT INTO users (id, name, email, password_hash, drive_refresh_token, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                &user.id,
                &user.name,
                &user.email,
                &user.password_hash,
                &user.drive_refresh_token,
                fmt_ts(user.created_at),
                fmt_ts(user.updated_at),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict("Email already registered".to_string())
            } else {
                StoreError::Database(e)
            }
        })?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT * FROM users WHERE id = ?1", params![id], row_to_user)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("User".to_string()),
                _ => StoreError::Database(e),
            })
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM users WHERE email = ?1",
            params![email],
            row_to_user,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("User".to_string()),
            _ => StoreError::Database(e),
        })
    }

    // ==================== Document Operations ====================

    pub fn create_document(&self, doc: &mut Document) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        doc.id = Uuid::new_v4().to_string();
        let now = Utc::now();
        doc.created_at = now;
        doc.updated_at = now;

        let content_json = serde_json::to_string(&doc.content)?;
        conn.execute(
            r#"INSERT INTO documents (id, owner_id, title, content, is_public, share_token,
                copied_from_id, drive_file_id, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                &doc.id,
                &doc.owner_id,
                &doc.title,
                &content_json,
                doc.is_public,
                &doc.share_token,
                &doc.copied_from_id,
                &doc.drive_file_id,
                fmt_ts(doc.created_at),
                fmt_ts(doc.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_document(&self, id: &str) -> StoreResult<Document> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM documents WHERE id = ?1",
            params![id],
            row_to_document,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("Document".to_string()),
            _ => StoreError::Database(e),
        })
    }

    pub fn list_documents(&self, owner_id: &str) -> StoreResult<Vec<Document>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM documents WHERE owner_id = ?1 ORDER BY updated_at DESC, id DESC",
        )?;
        let docs = stmt
            .query_map(params![owner_id], row_to_document)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }

    pub fn update_document(&self, doc: &mut Document) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        doc.updated_at = Utc::now();
        let content_json = serde_json::to_string(&doc.content)?;

        let rows = conn.execute(
            "UPDATE documents SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
            params![&doc.title, &content_json, fmt_ts(doc.updated_at), &doc.id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Document".to_string()));
        }
        Ok(())
    }

    pub fn delete_document(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound("Document".to_string()));
        }
        Ok(())
    }

    // ==================== Share-Token Gate ====================

    /// Idempotent share: an existing token is reused; otherwise a fresh one
    /// is generated, retrying on the (vanishingly rare) uniqueness collision.
    /// Token and `is_public` flip in one transaction.
    pub fn share_document(&self, doc_id: &str) -> StoreResult<String> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let current: Option<String> = tx
            .query_row(
                "SELECT share_token FROM documents WHERE id = ?1",
                params![doc_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound("Document".to_string())
                }
                _ => StoreError::Database(e),
            })?;

        let token = match current {
            Some(token) => {
                tx.execute(
                    "UPDATE documents SET is_public = 1 WHERE id = ?1",
                    params![doc_id],
                )?;
                token
            }
            None => loop {
                let candidate = new_share_token();
                match tx.execute(
                    "UPDATE documents SET share_token = ?1, is_public = 1 WHERE id = ?2",
                    params![&candidate, doc_id],
                ) {
                    Ok(_) => break candidate,
                    Err(e) if is_unique_violation(&e) => continue,
                    Err(e) => return Err(StoreError::Database(e)),
                }
            },
        };

        tx.commit()?;
        Ok(token)
    }

    /// Clears token and visibility together; the old link 404s immediately.
    pub fn revoke_share(&self, doc_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "UPDATE documents SET share_token = NULL, is_public = 0 WHERE id = ?1",
            params![doc_id],
        )?;
        if rows == 0 {
            return Err(StoreError::NotFound("Document".to_string()));
        }
        Ok(())
    }

    /// Token match AND the public flag, in one query. A token left over from
    /// a mid-revoke race never resolves on its own.
    pub fn get_shared_document(&self, share_token: &str) -> StoreResult<Document> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM documents WHERE share_token = ?1 AND is_public = 1",
            params![share_token],
            row_to_document,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound("Shared document".to_string())
            }
            _ => StoreError::Database(e),
        })
    }

    /// Copies a shared document for `new_owner`: value copy of the content
    /// blob, `copied_from_id` back-reference, private with no token.
    pub fn copy_shared_document(
        &self,
        share_token: &str,
        new_owner_id: &str,
    ) -> StoreResult<Document> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let original = tx
            .query_row(
                "SELECT * FROM documents WHERE share_token = ?1 AND is_public = 1",
                params![share_token],
                row_to_document,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound("Shared document".to_string())
                }
                _ => StoreError::Database(e),
            })?;

        let now = Utc::now();
        let copy = Document {
            id: Uuid::new_v4().to_string(),
            owner_id: new_owner_id.to_string(),
            title: format!("Copy of {}", original.title),
            content: original.content.clone(),
            is_public: false,
            share_token: None,
            copied_from_id: Some(original.id.clone()),
            drive_file_id: None,
            created_at: now,
            updated_at: now,
        };

        let content_json = serde_json::to_string(&copy.content)?;
        tx.execute(
            r#"INSERT INTO documents (id, owner_id, title, content, is_public, share_token,
                copied_from_id, drive_file_id, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, 0, NULL, ?5, NULL, ?6, ?7)"#,
            params![
                &copy.id,
                &copy.owner_id,
                &copy.title,
                &content_json,
                &copy.copied_from_id,
                fmt_ts(copy.created_at),
                fmt_ts(copy.updated_at),
            ],
        )?;

        tx.commit()?;
        Ok(copy)
    }

    // ==================== Publication Operations ====================

    /// Inserts a publication with a freshly generated share token, retrying
    /// generation on collision. The caller sets `id` and the file paths
    /// beforehand (files are stored under the id).
    pub fn create_publication(&self, publication: &mut Publication) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        publication.created_at = Utc::now();

        loop {
            publication.share_token = new_share_token();
            let result = conn.execute(
                r#"INSERT INTO publications (id, author_id, document_id, title, abstract, type,
                    pdf_path, thumbnail_path, share_token, like_count, comment_count, created_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, 0, ?10)"#,
                params![
                    &publication.id,
                    &publication.author_id,
                    &publication.document_id,
                    &publication.title,
                    &publication.abstract_text,
                    publication.pub_type.as_str(),
                    &publication.pdf_path,
                    &publication.thumbnail_path,
                    &publication.share_token,
                    fmt_ts(publication.created_at),
                ],
            );
            match result {
                Ok(_) => return Ok(()),
                Err(e) if is_unique_violation(&e) => continue,
                Err(e) => return Err(StoreError::Database(e)),
            }
        }
    }

    pub fn get_publication(&self, id: &str) -> StoreResult<Publication> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM publications WHERE id = ?1",
            params![id],
            row_to_publication,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound("Publication".to_string())
            }
            _ => StoreError::Database(e),
        })
    }

    pub fn get_publication_view(
        &self,
        id: &str,
        viewer_id: &str,
    ) -> StoreResult<PublicationView> {
        let conn = self.conn.lock().unwrap();
        let (publication, author_name) = conn
            .query_row(
                r#"SELECT p.*, u.name AS author_name FROM publications p
                   JOIN users u ON u.id = p.author_id WHERE p.id = ?1"#,
                params![id],
                |row| Ok((row_to_publication(row)?, row.get::<_, String>("author_name")?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound("Publication".to_string())
                }
                _ => StoreError::Database(e),
            })?;

        let liked: Option<String> = conn
            .query_row(
                "SELECT id FROM publication_likes WHERE publication_id = ?1 AND user_id = ?2",
                params![id, viewer_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(publication_view(publication, author_name, liked.is_some()))
    }

    pub fn get_public_publication(&self, share_token: &str) -> StoreResult<PublicPublicationView> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            r#"SELECT p.*, u.name AS author_name FROM publications p
               JOIN users u ON u.id = p.author_id WHERE p.share_token = ?1"#,
            params![share_token],
            |row| {
                let publication = row_to_publication(row)?;
                let author_name: String = row.get("author_name")?;
                Ok(PublicPublicationView {
                    id: publication.id,
                    author_name,
                    title: publication.title,
                    abstract_text: publication.abstract_text,
                    pub_type: publication.pub_type,
                    like_count: publication.like_count,
                    comment_count: publication.comment_count,
                    created_at: publication.created_at,
                })
            },
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                StoreError::NotFound("Publication".to_string())
            }
            _ => StoreError::Database(e),
        })
    }

    /// Removes the publication row together with its likes and comments in a
    /// single transaction. Stored files are the caller's concern (cleanup is
    /// best-effort and must happen before the row disappears).
    pub fn delete_publication(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM publication_likes WHERE publication_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM publication_comments WHERE publication_id = ?1",
            params![id],
        )?;
        let rows = tx.execute("DELETE FROM publications WHERE id = ?1", params![id])?;
        if rows == 0 {
            return Err(StoreError::NotFound("Publication".to_string()));
        }

        tx.commit()?;
        Ok(())
    }

    // ==================== Social Counter Ledger ====================

    /// Toggle a like as one atomic unit. The insert is attempted first; a
    /// unique-constraint violation means "already liked", which flips the
    /// toggle to removal. The counter moves in the same transaction and is
    /// floored at zero.
    pub fn toggle_like(&self, publication_id: &str, user_id: &str) -> StoreResult<(bool, i64)> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        ensure_publication_exists(&tx, publication_id)?;

        let insert = tx.execute(
            r#"INSERT INTO publication_likes (id, publication_id, user_id, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                Uuid::new_v4().to_string(),
                publication_id,
                user_id,
                fmt_ts(Utc::now()),
            ],
        );

        let liked = match insert {
            Ok(_) => {
                tx.execute(
                    "UPDATE publications SET like_count = like_count + 1 WHERE id = ?1",
                    params![publication_id],
                )?;
                true
            }
            Err(e) if is_unique_violation(&e) => {
                tx.execute(
                    "DELETE FROM publication_likes WHERE publication_id = ?1 AND user_id = ?2",
                    params![publication_id, user_id],
                )?;
                tx.execute(
                    "UPDATE publications SET like_count = MAX(like_count - 1, 0) WHERE id = ?1",
                    params![publication_id],
                )?;
                false
            }
            Err(e) => return Err(StoreError::Database(e)),
        };

        let like_count: i64 = tx.query_row(
            "SELECT like_count FROM publications WHERE id = ?1",
            params![publication_id],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok((liked, like_count))
    }

    /// Same toggle pattern as likes, without a denormalized counter. The
    /// self-follow check lives at the handler, not here.
    pub fn toggle_follow(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let insert = tx.execute(
            r#"INSERT INTO follows (id, follower_id, following_id, created_at)
               VALUES (?1, ?2, ?3, ?4)"#,
            params![
                Uuid::new_v4().to_string(),
                follower_id,
                following_id,
                fmt_ts(Utc::now()),
            ],
        );

        let following = match insert {
            Ok(_) => true,
            Err(e) if is_unique_violation(&e) => {
                tx.execute(
                    "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                    params![follower_id, following_id],
                )?;
                false
            }
            Err(e) => return Err(StoreError::Database(e)),
        };

        tx.commit()?;
        Ok(following)
    }

    /// Comment insert and counter increment share one transaction. Parent
    /// validation happens inside it: the parent must belong to the same
    /// publication and must itself be top-level (depth cap of 2).
    pub fn create_comment(
        &self,
        publication_id: &str,
        author_id: &str,
        parent_id: Option<&str>,
        content: &str,
    ) -> StoreResult<PublicationComment> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        ensure_publication_exists(&tx, publication_id)?;

        if let Some(parent_id) = parent_id {
            let parent: Option<(String, Option<String>)> = tx
                .query_row(
                    "SELECT publication_id, parent_id FROM publication_comments WHERE id = ?1",
                    params![parent_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match parent {
                None => return Err(StoreError::NotFound("Parent comment".to_string())),
                Some((parent_pub, _)) if parent_pub != publication_id => {
                    return Err(StoreError::NotFound("Parent comment".to_string()))
                }
                Some((_, Some(_))) => {
                    return Err(StoreError::Invalid(
                        "Cannot reply to a reply. Only one level of nesting is allowed."
                            .to_string(),
                    ))
                }
                Some((_, None)) => {}
            }
        }

        let comment = PublicationComment {
            id: Uuid::new_v4().to_string(),
            publication_id: publication_id.to_string(),
            author_id: author_id.to_string(),
            parent_id: parent_id.map(str::to_string),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        tx.execute(
            r#"INSERT INTO publication_comments (id, publication_id, author_id, parent_id, content, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                &comment.id,
                &comment.publication_id,
                &comment.author_id,
                &comment.parent_id,
                &comment.content,
                fmt_ts(comment.created_at),
            ],
        )?;
        tx.execute(
            "UPDATE publications SET comment_count = comment_count + 1 WHERE id = ?1",
            params![publication_id],
        )?;

        tx.commit()?;
        Ok(comment)
    }

    pub fn get_comment(&self, id: &str) -> StoreResult<PublicationComment> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT * FROM publication_comments WHERE id = ?1",
            params![id],
            row_to_comment,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound("Comment".to_string()),
            _ => StoreError::Database(e),
        })
    }

    /// Row delete and counter decrement (floored at zero) in one transaction.
    /// Replies to the deleted comment are left in place with their original
    /// `parent_id`.
    pub fn delete_comment(&self, id: &str) -> StoreResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let publication_id: String = tx
            .query_row(
                "SELECT publication_id FROM publication_comments WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    StoreError::NotFound("Comment".to_string())
                }
                _ => StoreError::Database(e),
            })?;

        tx.execute("DELETE FROM publication_comments WHERE id = ?1", params![id])?;
        tx.execute(
            "UPDATE publications SET comment_count = MAX(comment_count - 1, 0) WHERE id = ?1",
            params![publication_id],
        )?;

        tx.commit()?;
        Ok(())
    }

    // ==================== Cursor Pagination ====================

    /// Feed: publications by followed authors, newest first, exclusive
    /// timestamp cursor. An empty follow set short-circuits without touching
    /// the publications table.
    pub fn feed(
        &self,
        viewer_id: &str,
        cursor: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<PublicationView>> {
        let conn = self.conn.lock().unwrap();

        let follow_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![viewer_id],
            |row| row.get(0),
        )?;
        if follow_count == 0 {
            return Ok(Vec::new());
        }

        let cursor = cursor.map(fmt_ts);
        let mut stmt = conn.prepare(
            r#"SELECT p.*, u.name AS author_name FROM publications p
               JOIN users u ON u.id = p.author_id
               WHERE p.author_id IN (SELECT following_id FROM follows WHERE follower_id = ?1)
                 AND (?2 IS NULL OR p.created_at < ?2)
               ORDER BY p.created_at DESC, p.id DESC
               LIMIT ?3"#,
        )?;
        let rows = stmt
            .query_map(params![viewer_id, cursor, limit], |row| {
                Ok((row_to_publication(row)?, row.get::<_, String>("author_name")?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        annotate_liked(&conn, viewer_id, rows)
    }

    /// Explore: every publication, newest first, same cursor law as the feed.
    pub fn explore(
        &self,
        viewer_id: &str,
        cursor: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<PublicationView>> {
        let conn = self.conn.lock().unwrap();

        let cursor = cursor.map(fmt_ts);
        let mut stmt = conn.prepare(
            r#"SELECT p.*, u.name AS author_name FROM publications p
               JOIN users u ON u.id = p.author_id
               WHERE (?1 IS NULL OR p.created_at < ?1)
               ORDER BY p.created_at DESC, p.id DESC
               LIMIT ?2"#,
        )?;
        let rows = stmt
            .query_map(params![cursor, limit], |row| {
                Ok((row_to_publication(row)?, row.get::<_, String>("author_name")?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        annotate_liked(&conn, viewer_id, rows)
    }

    /// Comments walk forward in time: oldest first, `created_at > cursor`.
    pub fn list_comments(
        &self,
        publication_id: &str,
        cursor: Option<DateTime<Utc>>,
        limit: i64,
    ) -> StoreResult<Vec<CommentView>> {
        let conn = self.conn.lock().unwrap();

        let cursor = cursor.map(fmt_ts);
        let mut stmt = conn.prepare(
            r#"SELECT c.*, u.name AS author_name FROM publication_comments c
               JOIN users u ON u.id = c.author_id
               WHERE c.publication_id = ?1
                 AND (?2 IS NULL OR c.created_at > ?2)
               ORDER BY c.created_at ASC, c.id ASC
               LIMIT ?3"#,
        )?;
        let comments = stmt
            .query_map(params![publication_id, cursor, limit], |row| {
                let comment = row_to_comment(row)?;
                let author_name: String = row.get("author_name")?;
                Ok(CommentView {
                    id: comment.id,
                    publication_id: comment.publication_id,
                    author_id: comment.author_id,
                    author_name,
                    parent_id: comment.parent_id,
                    content: comment.content,
                    created_at: comment.created_at,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    // ==================== Follow Queries ====================

    pub fn is_following(&self, follower_id: &str, following_id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock().unwrap();
        let found: Option<String> = conn
            .query_row(
                "SELECT id FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                params![follower_id, following_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn user_profile(&self, user_id: &str, viewer_id: &str) -> StoreResult<UserProfile> {
        let user = self.get_user(user_id)?;
        let conn = self.conn.lock().unwrap();

        let publication_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM publications WHERE author_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let follower_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE following_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let following_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follows WHERE follower_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        let is_following: Option<String> = conn
            .query_row(
                "SELECT id FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                params![viewer_id, user_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(UserProfile {
            id: user.id,
            name: user.name,
            publication_count,
            follower_count,
            following_count,
            is_following: is_following.is_some(),
        })
    }

    pub fn list_followers(&self, user_id: &str) -> StoreResult<Vec<UserSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT u.id, u.name FROM users u
               JOIN follows f ON f.follower_id = u.id
               WHERE f.following_id = ?1"#,
        )?;
        let users = stmt
            .query_map(params![user_id], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn list_following(&self, user_id: &str) -> StoreResult<Vec<UserSummary>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            r#"SELECT u.id, u.name FROM users u
               JOIN follows f ON f.following_id = u.id
               WHERE f.follower_id = ?1"#,
        )?;
        let users = stmt
            .query_map(params![user_id], |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

fn ensure_publication_exists(tx: &Transaction, publication_id: &str) -> StoreResult<()> {
    let found: Option<String> = tx
        .query_row(
            "SELECT id FROM publications WHERE id = ?1",
            params![publication_id],
            |row| row.get(0),
        )
        .optional()?;
    if found.is_none() {
        return Err(StoreError::NotFound("Publication".to_string()));
    }
    Ok(())
}

/// One batch membership query for the whole page; never a per-row lookup.
fn annotate_liked(
    conn: &Connection,
    viewer_id: &str,
    rows: Vec<(Publication, String)>,
) -> StoreResult<Vec<PublicationView>> {
    let liked: HashSet<String> = if rows.is_empty() {
        HashSet::new()
    } else {
        let placeholders = vec!["?"; rows.len()].join(", ");
        let sql = format!(
            "SELECT publication_id FROM publication_likes WHERE user_id = ? AND publication_id IN ({})",
            placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let params_iter = std::iter::once(viewer_id.to_string())
            .chain(rows.iter().map(|(p, _)| p.id.clone()));
        let liked = stmt
            .query_map(rusqlite::params_from_iter(params_iter), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<HashSet<_>, _>>()?;
        liked
    };

    Ok(rows
        .into_iter()
        .map(|(publication, author_name)| {
            let is_liked = liked.contains(&publication.id);
            publication_view(publication, author_name, is_liked)
        })
        .collect())
}

fn publication_view(
    publication: Publication,
    author_name: String,
    liked_by_me: bool,
) -> PublicationView {
    PublicationView {
        id: publication.id,
        author_id: publication.author_id,
        author_name,
        document_id: publication.document_id,
        title: publication.title,
        abstract_text: publication.abstract_text,
        pub_type: publication.pub_type,
        share_token: publication.share_token,
        like_count: publication.like_count,
        comment_count: publication.comment_count,
        created_at: publication.created_at,
        liked_by_me,
    }
}

// ==================== Row Mappers ====================

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        password_hash: row.get("password_hash")?,
        drive_refresh_token: row.get("drive_refresh_token")?,
        created_at: parse_ts(row.get::<_, String>("created_at")?),
        updated_at: parse_ts(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_document(row: &rusqlite::Row) -> rusqlite::Result<Document> {
    let content_str: String = row.get("content")?;
    let content: serde_json::Value =
        serde_json::from_str(&content_str).unwrap_or(serde_json::Value::Null);

    Ok(Document {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        title: row.get("title")?,
        content,
        is_public: row.get("is_public")?,
        share_token: row.get("share_token")?,
        copied_from_id: row.get("copied_from_id")?,
        drive_file_id: row.get("drive_file_id")?,
        created_at: parse_ts(row.get::<_, String>("created_at")?),
        updated_at: parse_ts(row.get::<_, String>("updated_at")?),
    })
}

fn row_to_publication(row: &rusqlite::Row) -> rusqlite::Result<Publication> {
    let type_str: String = row.get("type")?;
    let pub_type = PublicationType::parse(&type_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown publication type: {}", type_str).into(),
        )
    })?;

    Ok(Publication {
        id: row.get("id")?,
        author_id: row.get("author_id")?,
        document_id: row.get("document_id")?,
        title: row.get("title")?,
        abstract_text: row.get("abstract")?,
        pub_type,
        pdf_path: row.get("pdf_path")?,
        thumbnail_path: row.get("thumbnail_path")?,
        share_token: row.get("share_token")?,
        like_count: row.get("like_count")?,
        comment_count: row.get("comment_count")?,
        created_at: parse_ts(row.get::<_, String>("created_at")?),
    })
}

fn row_to_comment(row: &rusqlite::Row) -> rusqlite::Result<PublicationComment> {
    Ok(PublicationComment {
        id: row.get("id")?,
        publication_id: row.get("publication_id")?,
        author_id: row.get("author_id")?,
        parent_id: row.get("parent_id")?,
        content: row.get("content")?,
        created_at: parse_ts(row.get::<_, String>("created_at")?),
    })
}
