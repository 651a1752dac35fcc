//! Persistence boundary.
//!
//! Lookup-or-create is two explicit steps: `lookup_or_new_*` returns either the
//! stored row or a fresh record with `id: None`, and the caller persists it with
//! `save_*`. Nothing guards the gap between the two against a concurrent writer;
//! the `UNIQUE` constraint on `nombre` turns such a race into a per-record error.

use rusqlite::{Connection, OptionalExtension};

use crate::error::{ImportError, Result};
use crate::models::{NewCompra, NewCompraLinea, Proveedor, Reparticion};

// ---------------------------------------------------------------------------
// Proveedores
// ---------------------------------------------------------------------------

pub fn find_proveedor(conn: &Connection, nombre: &str) -> Result<Option<Proveedor>> {
    let mut stmt = conn.prepare_cached("SELECT id, nombre, cuit FROM proveedores WHERE nombre = ?1")?;
    let row = stmt
        .query_row([nombre], |row| {
            Ok(Proveedor {
                id: Some(row.get(0)?),
                nombre: row.get(1)?,
                cuit: row.get(2)?,
            })
        })
        .optional()?;
    Ok(row)
}

pub fn lookup_or_new_proveedor(conn: &Connection, nombre: &str) -> Result<Proveedor> {
    Ok(find_proveedor(conn, nombre)?.unwrap_or_else(|| Proveedor::new(nombre)))
}

/// Inserts a new supplier or overwrites the `cuit` of an existing one.
pub fn save_proveedor(conn: &Connection, proveedor: &mut Proveedor) -> Result<i64> {
    match proveedor.id {
        Some(id) => {
            conn.execute(
                "UPDATE proveedores SET cuit = ?1 WHERE id = ?2",
                rusqlite::params![proveedor.cuit, id],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO proveedores (nombre, cuit) VALUES (?1, ?2)",
                rusqlite::params![proveedor.nombre, proveedor.cuit],
            )?;
            let id = conn.last_insert_rowid();
            proveedor.id = Some(id);
            Ok(id)
        }
    }
}

// ---------------------------------------------------------------------------
// Reparticiones
// ---------------------------------------------------------------------------

pub fn find_reparticion(conn: &Connection, nombre: &str) -> Result<Option<Reparticion>> {
    let mut stmt = conn.prepare_cached("SELECT id, nombre FROM reparticiones WHERE nombre = ?1")?;
    let row = stmt
        .query_row([nombre], |row| {
            Ok(Reparticion {
                id: Some(row.get(0)?),
                nombre: row.get(1)?,
            })
        })
        .optional()?;
    Ok(row)
}

pub fn lookup_or_new_reparticion(conn: &Connection, nombre: &str) -> Result<Reparticion> {
    Ok(find_reparticion(conn, nombre)?.unwrap_or_else(|| Reparticion::new(nombre)))
}

/// Destinations are never updated; saving an already stored one is a no-op.
pub fn save_reparticion(conn: &Connection, reparticion: &mut Reparticion) -> Result<i64> {
    if let Some(id) = reparticion.id {
        return Ok(id);
    }
    conn.execute("INSERT INTO reparticiones (nombre) VALUES (?1)", [&reparticion.nombre])?;
    let id = conn.last_insert_rowid();
    reparticion.id = Some(id);
    Ok(id)
}

// ---------------------------------------------------------------------------
// Compras
// ---------------------------------------------------------------------------

/// Inserts a purchase, first inserting any supplier or destination that is not stored yet.
pub fn insert_compra(conn: &Connection, compra: &mut NewCompra) -> Result<i64> {
    let proveedor_id = match compra.proveedor.id {
        Some(id) => id,
        None => save_proveedor(conn, &mut compra.proveedor)?,
    };
    let destino_id = save_reparticion(conn, &mut compra.destino)?;
    conn.execute(
        "INSERT INTO compras (orden_compra, importe, fecha, proveedor_id, destino_id) VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![
            compra.orden_compra,
            compra.importe.to_string(),
            compra.fecha.format("%Y-%m-%d").to_string(),
            proveedor_id,
            destino_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds the id of the purchase with `orden_compra` dated in `year`.
///
/// More than one match is an error rather than an arbitrary pick.
pub fn find_compra_id(conn: &Connection, orden_compra: i64, year: i32) -> Result<Option<i64>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id FROM compras WHERE orden_compra = ?1 AND CAST(strftime('%Y', fecha) AS INTEGER) = ?2 LIMIT 2",
    )?;
    let ids: Vec<i64> = stmt
        .query_map(rusqlite::params![orden_compra, year], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match ids.as_slice() {
        [] => Ok(None),
        [id] => Ok(Some(*id)),
        _ => Err(ImportError::AmbiguousPurchase { orden_compra, year }),
    }
}

pub fn insert_compra_linea(conn: &Connection, linea: &NewCompraLinea) -> Result<i64> {
    conn.execute(
        "INSERT INTO compra_linea_items (compra_id, importe_unitario, cantidad, detalle) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![
            linea.compra_id,
            linea.importe_unitario.to_string(),
            linea.cantidad,
            linea.detalle,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

// ---------------------------------------------------------------------------
// Import ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ImportRecord<'a> {
    pub source: &'a str,
    pub checksum: &'a str,
    pub compras: usize,
    pub lineas: usize,
    pub proveedores: usize,
    pub failed: usize,
}

pub fn record_import(conn: &Connection, record: &ImportRecord<'_>) -> Result<i64> {
    conn.execute(
        "INSERT INTO imports (source, checksum, compras, lineas, proveedores, failed) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            record.source,
            record.checksum,
            record.compras as i64,
            record.lineas as i64,
            record.proveedores as i64,
            record.failed as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
