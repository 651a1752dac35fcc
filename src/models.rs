use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{ImportError, Result};

// ---------------------------------------------------------------------------
// Persisted entities
// ---------------------------------------------------------------------------

/// A supplier. `id` is `None` until the row has been inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Proveedor {
    pub id: Option<i64>,
    pub nombre: String,
    pub cuit: Option<String>,
}

impl Proveedor {
    pub fn new(nombre: &str) -> Self {
        Self {
            id: None,
            nombre: nombre.to_string(),
            cuit: None,
        }
    }
}

/// A destination department. `id` is `None` until the row has been inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct Reparticion {
    pub id: Option<i64>,
    pub nombre: String,
}

impl Reparticion {
    pub fn new(nombre: &str) -> Self {
        Self {
            id: None,
            nombre: nombre.to_string(),
        }
    }
}

/// A purchase ready to be inserted. Its references may themselves be unsaved.
#[derive(Debug, Clone)]
pub struct NewCompra {
    pub orden_compra: i64,
    pub importe: Decimal,
    pub fecha: NaiveDate,
    pub proveedor: Proveedor,
    pub destino: Reparticion,
}

#[derive(Debug, Clone)]
pub struct NewCompraLinea {
    pub compra_id: i64,
    pub importe_unitario: Decimal,
    pub cantidad: i64,
    pub detalle: String,
}

// ---------------------------------------------------------------------------
// Input payloads, one per jsonline type tag
// ---------------------------------------------------------------------------

/// Purchase order numbers arrive either as JSON numbers or as numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OrdenCompra {
    Number(i64),
    Float(f64),
    Text(String),
}

impl OrdenCompra {
    /// Floats are accepted only when integral (`10.0`, not `10.5`).
    pub fn value(&self) -> Result<i64> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Float(f) => {
                if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    Ok(*f as i64)
                } else {
                    Err(ImportError::InvalidOrderNumber(f.to_string()))
                }
            }
            Self::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| ImportError::InvalidOrderNumber(s.clone())),
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Deserialize)]
pub struct CompraPayload {
    pub proveedor: String,
    pub fecha: String,
    pub destino: String,
    pub tipo_compra: Option<String>,
    pub orden_compra: OrdenCompra,
    pub importe: Decimal,
    pub observaciones: Option<String>,
}

/// Every field is optional here. A line without `importe` or `cantidad` is
/// skipped; the mapper only requires `orden_compra` and `detalle` after that.
#[allow(dead_code)]
#[derive(Debug, Clone, Deserialize)]
pub struct CompraLineaPayload {
    pub importe: Option<Decimal>,
    pub cantidad: Option<String>,
    pub orden_compra: Option<OrdenCompra>,
    pub detalle: Option<String>,
    pub unidad_medida: Option<String>,
    pub importe_total: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProveedorPayload {
    pub nombre: String,
    pub cuit: Option<String>,
}
