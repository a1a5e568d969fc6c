//! User store: the trait the auth service depends on and its SQLite implementation

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex, MutexGuard};

use super::models::{NewUser, User, UserLookup};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("username or email already exists")]
    Duplicate,

    #[error("store error: {0}")]
    Backend(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
            rusqlite::Error::SqliteFailure(ref err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Duplicate
            }
            other => StoreError::Backend(other.to_string()),
        }
    }
}

/// Single-table user persistence. Uniqueness of username and email is
/// enforced by the store.
pub trait UserStore: Send + Sync {
    fn create(&self, user: NewUser) -> Result<User, StoreError>;

    fn find(&self, lookup: &UserLookup) -> Result<User, StoreError>;

    fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError>;
}

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at, updated_at";

/// SQLite-backed [`UserStore`]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    /// Open (or create) the database file and initialize tables
    pub fn new(path: &str) -> SqliteResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create in-memory database (for testing)
    pub fn in_memory() -> SqliteResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_tables(conn: &Connection) -> SqliteResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
            CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))
    }

    fn row_to_user(row: &Row<'_>) -> SqliteResult<User> {
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl UserStore for SqliteUserStore {
    fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (username, email, password_hash, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.username, user.email, user.password_hash, now, now],
        )?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn find(&self, lookup: &UserLookup) -> Result<User, StoreError> {
        let conn = self.lock()?;
        let user = match lookup {
            UserLookup::Username(username) => conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                    params![username],
                    Self::row_to_user,
                )
                .optional()?,
            UserLookup::Email(email) => conn
                .query_row(
                    &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                    params![email],
                    Self::row_to_user,
                )
                .optional()?,
            UserLookup::UsernameAndEmail { username, email } => conn
                .query_row(
                    &format!(
                        "SELECT {} FROM users WHERE username = ?1 AND email = ?2",
                        USER_COLUMNS
                    ),
                    params![username, email],
                    Self::row_to_user,
                )
                .optional()?,
        };

        user.ok_or(StoreError::NotFound)
    }

    fn update_password(&self, id: i64, password_hash: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let now = chrono::Utc::now().to_rfc3339();
        let updated = conn.execute(
            "UPDATE users SET password_hash = ?1, updated_at = ?2 WHERE id = ?3",
            params![password_hash, now, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

impl Clone for SqliteUserStore {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}
