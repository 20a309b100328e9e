// Catalog store: embedded SQLite behind a bounded r2d2 connection pool.
// Replaces this system's original networked connection-pool design with the
// idiomatic single-process equivalent for an embedded store.

pub mod migrations;
pub mod schema;

use std::path::Path;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::Result;

pub type Pool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const POOL_MIN_IDLE: u32 = 1;
const POOL_MAX_SIZE: u32 = 20;

fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    conn.execute_batch("PRAGMA busy_timeout=5000;")?;
    Ok(())
}

/// Opens a bounded connection pool against `db_path`, creating the parent
/// directory if needed, and runs pending migrations on a seed connection
/// before handing the pool back.
pub fn open_pool(db_path: &Path) -> Result<Pool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
    });

    let pool = r2d2::Pool::builder()
        .min_idle(Some(POOL_MIN_IDLE))
        .max_size(POOL_MAX_SIZE)
        .build(manager)?;

    let conn = pool.get()?;
    configure(&conn)?;
    migrations::run(&conn)?;

    Ok(pool)
}

/// Opens an unpooled, single-use connection for short-lived tools (e.g.
/// `catalogctl`). Runs pragmas and migrations the same way `open_pool` does.
pub fn open_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}
