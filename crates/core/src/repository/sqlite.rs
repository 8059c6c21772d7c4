//! SQLite-backed item repository.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{FileStatus, Item, ItemFile, ItemMeta, ItemRepository, RepositoryError};

const CRAWL_OFFSET_KEY: &str = "CRAWL_OFFSET";

/// SQLite-backed item repository.
pub struct SqliteItemRepository {
    conn: Mutex<Connection>,
}

impl SqliteItemRepository {
    /// Open (or create) the database file and make sure the schema exists.
    pub fn new(path: &Path) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory repository (useful for testing).
    pub fn in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), RepositoryError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                feed_offset INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS item_meta (
                item_id INTEGER NOT NULL REFERENCES items(id),
                name TEXT NOT NULL,
                value TEXT NOT NULL,
                UNIQUE (item_id, name)
            );

            CREATE TABLE IF NOT EXISTS item_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id INTEGER NOT NULL REFERENCES items(id),
                name TEXT NOT NULL,
                entry_id TEXT,
                status INTEGER NOT NULL DEFAULT 0,
                UNIQUE (item_id, name)
            );

            CREATE INDEX IF NOT EXISTS idx_item_files_status ON item_files(status);

            CREATE TABLE IF NOT EXISTS admins (
                chat_id INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS chats (
                chat_id INTEGER PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS settings (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(db_err)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RepositoryError> {
        self.conn
            .lock()
            .map_err(|_| RepositoryError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        let created_at_str: String = row.get(3)?;
        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Item {
            id: row.get(0)?,
            name: row.get(1)?,
            offset: row.get::<_, i64>(2)?.max(0) as u64,
            created_at,
        })
    }

    fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<(ItemFile, i64)> {
        let status_code: i64 = row.get(4)?;
        Ok((
            ItemFile {
                id: row.get(0)?,
                item_id: row.get(1)?,
                name: row.get(2)?,
                entry_id: row.get(3)?,
                // Replaced below once the code is validated.
                status: FileStatus::Pending,
            },
            status_code,
        ))
    }

    fn query_files(
        conn: &Connection,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<ItemFile>, RepositoryError> {
        let mut stmt = conn.prepare(sql).map_err(db_err)?;
        let rows = stmt.query_map(params, Self::row_to_file).map_err(db_err)?;

        let mut files = Vec::new();
        for row in rows {
            let (mut file, code) = row.map_err(db_err)?;
            file.status = FileStatus::from_code(code)?;
            files.push(file);
        }
        Ok(files)
    }

    fn add_member(table: &str, conn: &Connection, chat: i64) -> Result<(), RepositoryError> {
        conn.execute(
            &format!("INSERT OR IGNORE INTO {} (chat_id) VALUES (?1)", table),
            params![chat],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn remove_member(table: &str, conn: &Connection, chat: i64) -> Result<(), RepositoryError> {
        conn.execute(
            &format!("DELETE FROM {} WHERE chat_id = ?1", table),
            params![chat],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn has_member(table: &str, conn: &Connection, chat: i64) -> Result<bool, RepositoryError> {
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE chat_id = ?1", table),
                params![chat],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }

    fn list_members(table: &str, conn: &Connection) -> Result<Vec<i64>, RepositoryError> {
        let mut stmt = conn
            .prepare(&format!("SELECT chat_id FROM {} ORDER BY chat_id", table))
            .map_err(db_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(db_err)?;
        rows.collect::<Result<Vec<i64>, _>>().map_err(db_err)
    }
}

fn db_err(e: rusqlite::Error) -> RepositoryError {
    RepositoryError::Database(e.to_string())
}

impl ItemRepository for SqliteItemRepository {
    fn crawl_offset(&self) -> Result<u64, RepositoryError> {
        let conn = self.conn()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE name = ?1",
                params![CRAWL_OFFSET_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        match value {
            Some(v) => v.parse::<u64>().map_err(|e| {
                RepositoryError::Database(format!("corrupt crawl offset {:?}: {}", v, e))
            }),
            None => Ok(0),
        }
    }

    fn set_crawl_offset(&self, offset: u64) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO settings (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            params![CRAWL_OFFSET_KEY, offset.to_string()],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn find_item_by_name(&self, name: &str) -> Result<Option<Item>, RepositoryError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, feed_offset, created_at FROM items WHERE name = ?1",
            params![name],
            Self::row_to_item,
        )
        .optional()
        .map_err(db_err)
    }

    fn get_item(&self, id: i64) -> Result<Option<Item>, RepositoryError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, name, feed_offset, created_at FROM items WHERE id = ?1",
            params![id],
            Self::row_to_item,
        )
        .optional()
        .map_err(db_err)
    }

    fn add_item(&self, name: &str, offset: u64, files: &[String]) -> Result<i64, RepositoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;

        tx.execute(
            "INSERT OR IGNORE INTO items (name, feed_offset, created_at) VALUES (?1, ?2, ?3)",
            params![name, offset as i64, Utc::now().to_rfc3339()],
        )
        .map_err(db_err)?;

        let id: i64 = tx
            .query_row(
                "SELECT id FROM items WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        {
            let mut stmt = tx
                .prepare("INSERT OR IGNORE INTO item_files (item_id, name, status) VALUES (?1, ?2, ?3)")
                .map_err(db_err)?;
            for file in files {
                stmt.execute(params![id, file, FileStatus::Pending.code()])
                    .map_err(db_err)?;
            }
        }

        tx.commit().map_err(db_err)?;
        Ok(id)
    }

    fn item_files(&self, item_id: i64) -> Result<Vec<ItemFile>, RepositoryError> {
        let conn = self.conn()?;
        Self::query_files(
            &conn,
            "SELECT id, item_id, name, entry_id, status FROM item_files WHERE item_id = ?1 ORDER BY name",
            &[&item_id],
        )
    }

    fn item_meta(&self, item_id: i64) -> Result<ItemMeta, RepositoryError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT name, value FROM item_meta WHERE item_id = ?1")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![item_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(db_err)?;
        rows.collect::<Result<ItemMeta, _>>().map_err(db_err)
    }

    fn set_item_meta(&self, item_id: i64, meta: &ItemMeta) -> Result<(), RepositoryError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM item_meta WHERE item_id = ?1", params![item_id])
            .map_err(db_err)?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO item_meta (item_id, name, value) VALUES (?1, ?2, ?3)")
                .map_err(db_err)?;
            for (name, value) in meta {
                stmt.execute(params![item_id, name, value]).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    fn files_not_ready(&self) -> Result<Vec<ItemFile>, RepositoryError> {
        let conn = self.conn()?;
        Self::query_files(
            &conn,
            "SELECT id, item_id, name, entry_id, status FROM item_files WHERE status <> ?1 ORDER BY id",
            &[&FileStatus::Ready.code()],
        )
    }

    fn get_file(&self, id: i64) -> Result<Option<ItemFile>, RepositoryError> {
        let conn = self.conn()?;
        let mut files = Self::query_files(
            &conn,
            "SELECT id, item_id, name, entry_id, status FROM item_files WHERE id = ?1",
            &[&id],
        )?;
        Ok(files.pop())
    }

    fn set_file_status(&self, id: i64, status: FileStatus) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE item_files SET status = ?1 WHERE id = ?2",
                params![status.code(), id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("file {}", id)));
        }
        Ok(())
    }

    fn set_file_entry_id(&self, id: i64, entry_id: &str) -> Result<(), RepositoryError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE item_files SET entry_id = ?1 WHERE id = ?2",
                params![entry_id, id],
            )
            .map_err(db_err)?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("file {}", id)));
        }
        Ok(())
    }

    fn file_ordinal(&self, id: i64) -> Result<Option<u32>, RepositoryError> {
        let conn = self.conn()?;
        let ordinal: Option<i64> = conn
            .query_row(
                "SELECT ordinal FROM (
                    SELECT id, ROW_NUMBER() OVER (ORDER BY name) AS ordinal
                    FROM item_files
                    WHERE item_id = (SELECT item_id FROM item_files WHERE id = ?1)
                 ) WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(ordinal.map(|n| n as u32))
    }

    fn add_admin(&self, chat: i64) -> Result<(), RepositoryError> {
        Self::add_member("admins", &*self.conn()?, chat)
    }

    fn remove_admin(&self, chat: i64) -> Result<(), RepositoryError> {
        Self::remove_member("admins", &*self.conn()?, chat)
    }

    fn is_admin(&self, chat: i64) -> Result<bool, RepositoryError> {
        Self::has_member("admins", &*self.conn()?, chat)
    }

    fn admins(&self) -> Result<Vec<i64>, RepositoryError> {
        Self::list_members("admins", &*self.conn()?)
    }

    fn add_chat(&self, chat: i64) -> Result<(), RepositoryError> {
        Self::add_member("chats", &*self.conn()?, chat)
    }

    fn remove_chat(&self, chat: i64) -> Result<(), RepositoryError> {
        Self::remove_member("chats", &*self.conn()?, chat)
    }

    fn is_chat(&self, chat: i64) -> Result<bool, RepositoryError> {
        Self::has_member("chats", &*self.conn()?, chat)
    }

    fn chats(&self) -> Result<Vec<i64>, RepositoryError> {
        Self::list_members("chats", &*self.conn()?)
    }
}
