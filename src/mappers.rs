use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::Connection;

use crate::error::{ImportError, Result};
use crate::models::{CompraLineaPayload, CompraPayload, NewCompra, NewCompraLinea, Proveedor, ProveedorPayload};
use crate::store;

/// Why a line item was dropped without being treated as a failure.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    MissingField(&'static str),
    NonNumericQuantity(String),
    PurchaseNotFound { orden_compra: i64, year: i32 },
}

#[derive(Debug)]
pub enum Mapped<T> {
    Record(T),
    Skipped(SkipReason),
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parses `YYYY-MM-DD` by splitting on `-`; each part must be an integer.
pub fn parse_fecha(raw: &str) -> Result<NaiveDate> {
    let invalid = || ImportError::InvalidDate(raw.to_string());
    let parts: Vec<&str> = raw.split('-').collect();
    let [y, m, d] = parts.as_slice() else {
        return Err(invalid());
    };
    let y: i32 = y.trim().parse().map_err(|_| invalid())?;
    let m: u32 = m.trim().parse().map_err(|_| invalid())?;
    let d: u32 = d.trim().parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(invalid)
}

fn quantity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]+)").expect("quantity pattern is valid"))
}

/// Leading run of ASCII digits in a free-text quantity ("4 UNIDAD/ES" -> 4).
pub fn parse_cantidad(raw: &str) -> Option<i64> {
    quantity_re()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

// ---------------------------------------------------------------------------
// Mappers
// ---------------------------------------------------------------------------

pub fn to_compra(conn: &Connection, payload: &CompraPayload) -> Result<NewCompra> {
    let proveedor = store::lookup_or_new_proveedor(conn, &payload.proveedor)?;
    let destino = store::lookup_or_new_reparticion(conn, &payload.destino)?;
    let fecha = parse_fecha(&payload.fecha)?;

    Ok(NewCompra {
        orden_compra: payload.orden_compra.value()?,
        importe: payload.importe,
        fecha,
        proveedor,
        destino,
    })
}

pub fn to_compra_linea(conn: &Connection, payload: &CompraLineaPayload, year: i32) -> Result<Mapped<NewCompraLinea>> {
    let Some(importe) = payload.importe else {
        return Ok(Mapped::Skipped(SkipReason::MissingField("importe")));
    };
    let Some(cantidad) = payload.cantidad.as_deref() else {
        return Ok(Mapped::Skipped(SkipReason::MissingField("cantidad")));
    };
    let Some(cantidad) = parse_cantidad(cantidad) else {
        return Ok(Mapped::Skipped(SkipReason::NonNumericQuantity(cantidad.to_string())));
    };

    let orden_compra = payload
        .orden_compra
        .as_ref()
        .ok_or(ImportError::MissingField("orden_compra"))?
        .value()?;
    let Some(compra_id) = store::find_compra_id(conn, orden_compra, year)? else {
        return Ok(Mapped::Skipped(SkipReason::PurchaseNotFound { orden_compra, year }));
    };
    let detalle = payload.detalle.clone().ok_or(ImportError::MissingField("detalle"))?;

    Ok(Mapped::Record(NewCompraLinea {
        compra_id,
        importe_unitario: importe,
        cantidad,
        detalle,
    }))
}

/// Looks up or creates the supplier and overwrites its `cuit`; the caller saves it.
pub fn to_proveedor(conn: &Connection, payload: &ProveedorPayload) -> Result<Proveedor> {
    let mut proveedor = store::lookup_or_new_proveedor(conn, &payload.nombre)?;
    proveedor.cuit = payload.cuit.clone();
    Ok(proveedor)
}
