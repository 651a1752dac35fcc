use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS proveedores (
    id INTEGER PRIMARY KEY,
    nombre TEXT NOT NULL UNIQUE,
    cuit TEXT
);

CREATE TABLE IF NOT EXISTS reparticiones (
    id INTEGER PRIMARY KEY,
    nombre TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS compras (
    id INTEGER PRIMARY KEY,
    orden_compra INTEGER NOT NULL,
    importe TEXT NOT NULL,
    fecha TEXT NOT NULL,
    proveedor_id INTEGER NOT NULL,
    destino_id INTEGER NOT NULL,
    FOREIGN KEY (proveedor_id) REFERENCES proveedores(id),
    FOREIGN KEY (destino_id) REFERENCES reparticiones(id)
);

CREATE INDEX IF NOT EXISTS compras_orden_compra ON compras (orden_compra);

CREATE TABLE IF NOT EXISTS compra_linea_items (
    id INTEGER PRIMARY KEY,
    compra_id INTEGER NOT NULL,
    importe_unitario TEXT NOT NULL,
    cantidad INTEGER NOT NULL,
    detalle TEXT NOT NULL,
    FOREIGN KEY (compra_id) REFERENCES compras(id)
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    checksum TEXT NOT NULL,
    compras INTEGER NOT NULL,
    lineas INTEGER NOT NULL,
    proveedores INTEGER NOT NULL,
    failed INTEGER NOT NULL
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    init_db(&conn)?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Closes the connection, surfacing any error from finalizing it.
pub fn close(conn: Connection) -> Result<()> {
    conn.close().map_err(|(_, e)| e)?;
    Ok(())
}
