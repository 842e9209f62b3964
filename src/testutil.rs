//! Helpers shared by the unit tests.

use axum::Router;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::db::Store;

/// Serve `router` on an ephemeral local port.
pub async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// An address nothing is listening on.
pub async fn refused_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// A store backed by a temporary file. Keep the file alive with the store.
pub fn temp_store() -> (NamedTempFile, Store) {
    let tmp = NamedTempFile::new().unwrap();
    let store = Store::new(tmp.path()).unwrap();
    (tmp, store)
}

/// Make every UPDATE of row `id` in `table` fail, through a second
/// connection to the store's file.
pub fn fail_updates(db: &Path, table: &str, id: i64) {
    let conn = rusqlite::Connection::open(db).unwrap();
    conn.execute_batch(&format!(
        "CREATE TRIGGER fail_{table}_{id} BEFORE UPDATE ON {table}
         WHEN OLD.id = {id}
         BEGIN SELECT RAISE(ABORT, 'write refused'); END;"
    ))
    .unwrap();
}
