use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, Result, Row};
use rust_decimal::Decimal;

use crate::models::{Category, Expense, User};

pub type DbPool = Pool<SqliteConnectionManager>;

pub const DEFAULT_CATEGORIES: &[(&str, &str)] = &[
    ("Food", "#FF5733"),
    ("Transportation", "#33FF57"),
    ("Shopping", "#3357FF"),
    ("Entertainment", "#F033FF"),
    ("Bills", "#FF9933"),
    ("Other", "#33FFF9"),
];

pub fn init_db(path: &Path) -> DbPool {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    let pool = Pool::new(manager).expect("db pool");
    {
        let conn = pool.get().expect("db connection");
        run_migrations(&conn).expect("db migrations");
    }
    pool
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            token TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT '',
            FOREIGN KEY(owner_id) REFERENCES users(id)
        );

        CREATE TABLE IF NOT EXISTS expenses (
            id INTEGER PRIMARY KEY,
            owner_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL,
            amount TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            date TEXT NOT NULL,
            FOREIGN KEY(owner_id) REFERENCES users(id),
            FOREIGN KEY(category_id) REFERENCES categories(id)
        );

        CREATE INDEX IF NOT EXISTS idx_categories_owner ON categories(owner_id);
        CREATE INDEX IF NOT EXISTS idx_expenses_owner_date ON expenses(owner_id, date);
        CREATE INDEX IF NOT EXISTS idx_expenses_category ON expenses(category_id);
        ",
    )?;
    Ok(())
}

/// True when `err` is a UNIQUE constraint failure on `column`
/// (e.g. "users.email").
pub fn is_unique_violation(err: &rusqlite::Error, column: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(failure, Some(message)) => {
            failure.code == ErrorCode::ConstraintViolation && message.contains(column)
        }
        _ => false,
    }
}

// Users and sessions

pub fn insert_user(
    conn: &Connection,
    username: &str,
    email: &str,
    password_hash: &str,
    created_at: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO users (username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![username, email, password_hash, created_at],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn email_taken(conn: &Connection, email: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
        params![email],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

pub fn username_taken(conn: &Connection, username: &str) -> Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
        params![username],
        |row| row.get::<_, i64>(0),
    )
    .map(|value| value == 1)
}

pub fn user_credentials(conn: &Connection, email: &str) -> Result<Option<(User, String)>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, username, email, created_at, password_hash
        FROM users
        WHERE email = ?1
        ",
    )?;
    let mut rows = stmt.query(params![email])?;
    if let Some(row) = rows.next()? {
        Ok(Some((
            User {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                created_at: row.get(3)?,
            },
            row.get(4)?,
        )))
    } else {
        Ok(None)
    }
}

pub fn create_session(
    conn: &Connection,
    user_id: i64,
    token: &str,
    created_at: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (user_id, token, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, token, created_at],
    )?;
    Ok(())
}

/// Resolves a session token to its user plus the session's creation timestamp.
pub fn user_by_session(conn: &Connection, token: &str) -> Result<Option<(User, String)>> {
    let mut stmt = conn.prepare(
        "
        SELECT u.id, u.username, u.email, u.created_at, s.created_at
        FROM sessions s
        JOIN users u ON s.user_id = u.id
        WHERE s.token = ?1
        ",
    )?;
    let mut rows = stmt.query(params![token])?;
    if let Some(row) = rows.next()? {
        Ok(Some((
            User {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                created_at: row.get(3)?,
            },
            row.get(4)?,
        )))
    } else {
        Ok(None)
    }
}

pub fn delete_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

pub fn prune_sessions(conn: &Connection, user_id: i64, keep: i64) -> Result<()> {
    conn.execute(
        "
        DELETE FROM sessions
        WHERE user_id = ?1
          AND id NOT IN (
            SELECT id
            FROM sessions
            WHERE user_id = ?1
            ORDER BY created_at DESC, id DESC
            LIMIT ?2
          )
        ",
        params![user_id, keep],
    )?;
    Ok(())
}

// Categories

pub fn seed_default_categories(conn: &mut Connection, owner_id: i64) -> Result<()> {
    let tx = conn.transaction()?;
    for (name, color) in DEFAULT_CATEGORIES {
        tx.execute(
            "INSERT INTO categories (owner_id, name, color) VALUES (?1, ?2, ?3)",
            params![owner_id, name, color],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn list_categories(conn: &Connection, owner_id: i64) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, owner_id, name, color
        FROM categories
        WHERE owner_id = ?1
        ORDER BY name
        ",
    )?;
    let rows = stmt.query_map(params![owner_id], |row| category_from_row(row))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_category(conn: &Connection, owner_id: i64, id: i64) -> Result<Option<Category>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, owner_id, name, color
        FROM categories
        WHERE id = ?1 AND owner_id = ?2
        ",
    )?;
    let mut rows = stmt.query(params![id, owner_id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(category_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn insert_category(
    conn: &Connection,
    owner_id: i64,
    name: &str,
    color: &str,
) -> Result<Category> {
    conn.execute(
        "INSERT INTO categories (owner_id, name, color) VALUES (?1, ?2, ?3)",
        params![owner_id, name, color],
    )?;
    Ok(Category {
        id: conn.last_insert_rowid(),
        owner_id,
        name: name.to_string(),
        color: color.to_string(),
    })
}

pub fn update_category(
    conn: &Connection,
    owner_id: i64,
    id: i64,
    name: &str,
    color: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE categories SET name = ?1, color = ?2 WHERE id = ?3 AND owner_id = ?4",
        params![name, color, id, owner_id],
    )?;
    Ok(())
}

pub fn delete_category(conn: &Connection, owner_id: i64, id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM categories WHERE id = ?1 AND owner_id = ?2",
        params![id, owner_id],
    )?;
    Ok(())
}

/// Owner of a category row regardless of who is asking. Needed to tell
/// a missing row (404) apart from somebody else's row (403).
pub fn category_owner(conn: &Connection, id: i64) -> Result<Option<i64>> {
    let mut stmt = conn.prepare(
        "
        SELECT owner_id
        FROM categories
        WHERE id = ?1
        ",
    )?;
    let mut rows = stmt.query(params![id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row.get(0)?))
    } else {
        Ok(None)
    }
}

pub fn expense_count_for_category(conn: &Connection, category_id: i64) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM expenses WHERE category_id = ?1",
        params![category_id],
        |row| row.get(0),
    )
}

// Expenses

pub fn list_expenses(conn: &Connection, owner_id: i64) -> Result<Vec<Expense>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, owner_id, category_id, amount, description, date
        FROM expenses
        WHERE owner_id = ?1
        ORDER BY date DESC, id DESC
        ",
    )?;
    let rows = stmt.query_map(params![owner_id], |row| expense_from_row(row))?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn get_expense(conn: &Connection, owner_id: i64, id: i64) -> Result<Option<Expense>> {
    let mut stmt = conn.prepare(
        "
        SELECT id, owner_id, category_id, amount, description, date
        FROM expenses
        WHERE id = ?1 AND owner_id = ?2
        ",
    )?;
    let mut rows = stmt.query(params![id, owner_id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(expense_from_row(row)?))
    } else {
        Ok(None)
    }
}

pub fn insert_expense(
    conn: &Connection,
    owner_id: i64,
    category_id: i64,
    amount: Decimal,
    description: &str,
    date: NaiveDate,
) -> Result<Expense> {
    conn.execute(
        "
        INSERT INTO expenses (owner_id, category_id, amount, description, date)
        VALUES (?1, ?2, ?3, ?4, ?5)
        ",
        params![owner_id, category_id, amount.to_string(), description, date],
    )?;
    Ok(Expense {
        id: conn.last_insert_rowid(),
        owner_id,
        category_id,
        amount,
        description: description.to_string(),
        date,
    })
}

pub fn update_expense(
    conn: &Connection,
    owner_id: i64,
    id: i64,
    category_id: i64,
    amount: Decimal,
    description: &str,
    date: NaiveDate,
) -> Result<()> {
    conn.execute(
        "
        UPDATE expenses
        SET category_id = ?1, amount = ?2, description = ?3, date = ?4
        WHERE id = ?5 AND owner_id = ?6
        ",
        params![
            category_id,
            amount.to_string(),
            description,
            date,
            id,
            owner_id
        ],
    )?;
    Ok(())
}

pub fn delete_expense(conn: &Connection, owner_id: i64, id: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM expenses WHERE id = ?1 AND owner_id = ?2",
        params![id, owner_id],
    )?;
    Ok(())
}

/// Owner of an expense row regardless of who is asking. See [`category_owner`].
pub fn expense_owner(conn: &Connection, id: i64) -> Result<Option<i64>> {
    let mut stmt = conn.prepare(
        "
        SELECT owner_id
        FROM expenses
        WHERE id = ?1
        ",
    )?;
    let mut rows = stmt.query(params![id])?;
    if let Some(row) = rows.next()? {
        Ok(Some(row.get(0)?))
    } else {
        Ok(None)
    }
}

fn category_from_row(row: &Row<'_>) -> Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
    })
}

fn expense_from_row(row: &Row<'_>) -> Result<Expense> {
    let amount: String = row.get(3)?;
    Ok(Expense {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        category_id: row.get(2)?,
        amount: Decimal::from_str(&amount).unwrap_or_default(),
        description: row.get(4)?,
        date: row.get(5)?,
    })
}
