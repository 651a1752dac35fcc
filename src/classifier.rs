use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::{ImportError, Result};
use crate::models::{CompraLineaPayload, CompraPayload, ProveedorPayload};

// ---------------------------------------------------------------------------
// Record kinds, one per jsonline type tag
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordKind {
    Compra,
    CompraLinea,
    Proveedor,
}

const ALL_KINDS: &[RecordKind] = &[RecordKind::Compra, RecordKind::CompraLinea, RecordKind::Proveedor];

impl RecordKind {
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Compra => "CompraItem",
            Self::CompraLinea => "CompraLineaItem",
            Self::Proveedor => "ProveedorItem",
        }
    }

    pub fn from_tag(tag: &str) -> Option<RecordKind> {
        ALL_KINDS.iter().find(|k| k.tag() == tag).copied()
    }
}

/// A decoded payload together with where it came from, for failure logs.
#[derive(Debug, Clone)]
pub struct Entry<P> {
    pub line_no: usize,
    pub raw: String,
    pub payload: P,
}

#[derive(Debug, Default)]
pub struct Buckets {
    pub compras: Vec<Entry<CompraPayload>>,
    pub lineas: Vec<Entry<CompraLineaPayload>>,
    pub proveedores: Vec<Entry<ProveedorPayload>>,
    pub unknown: usize,
    pub rejected: usize,
}

fn entry<P: DeserializeOwned>(line_no: usize, payload: Value) -> std::result::Result<Entry<P>, String> {
    let raw = payload.to_string();
    let payload = serde_json::from_value(payload).map_err(|e| e.to_string())?;
    Ok(Entry { line_no, raw, payload })
}

/// Routes one line into its bucket. `Ok(false)` means the tag is unknown.
///
/// The tag is checked before the payload, so an unknown tag is reported as
/// such whatever follows it.
fn classify_line(buckets: &mut Buckets, line_no: usize, line: &str) -> std::result::Result<bool, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
    let Value::Array(mut items) = value else {
        return Err("expected a [type, payload] array".to_string());
    };
    let Some(Value::String(tag)) = items.first() else {
        return Err("type tag is not a string".to_string());
    };
    let Some(kind) = RecordKind::from_tag(tag) else {
        return Ok(false);
    };
    if items.len() != 2 {
        return Err(format!("expected 2 elements, found {}", items.len()));
    }
    let payload = items.pop().unwrap_or(Value::Null);
    if !payload.is_object() {
        return Err("payload is not an object".to_string());
    }
    buckets.push(kind, line_no, payload)?;
    Ok(true)
}

impl Buckets {
    fn push(&mut self, kind: RecordKind, line_no: usize, payload: Value) -> std::result::Result<(), String> {
        match kind {
            RecordKind::Compra => self.compras.push(entry(line_no, payload)?),
            RecordKind::CompraLinea => self.lineas.push(entry(line_no, payload)?),
            RecordKind::Proveedor => self.proveedores.push(entry(line_no, payload)?),
        }
        Ok(())
    }

    pub fn total(&self) -> usize {
        self.compras.len() + self.lineas.len() + self.proveedores.len()
    }
}

/// Routes each jsonline into the bucket for its type tag.
///
/// Lines are raw bytes so that one undecodable line does not sink the source.
/// Unknown tags are warned about and dropped. Lines that are not valid UTF-8
/// or not a valid `[type, payload]` record are logged and dropped, or abort
/// with [`ImportError::MalformedLine`] when `strict` is set.
pub fn classify<'a, I>(lines: I, strict: bool) -> Result<Buckets>
where
    I: IntoIterator<Item = &'a [u8]>,
{
    let mut buckets = Buckets::default();

    for (idx, raw) in lines.into_iter().enumerate() {
        let line_no = idx + 1;
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let outcome = match std::str::from_utf8(raw) {
            Ok(text) => classify_line(&mut buckets, line_no, text.trim_end()),
            Err(e) => Err(format!("invalid UTF-8: {e}")),
        };

        match outcome {
            Ok(true) => {}
            Ok(false) => {
                warn!("Unknown object type in jsonline: {line}");
                buckets.unknown += 1;
            }
            Err(reason) if strict => {
                return Err(ImportError::MalformedLine { line_no, reason });
            }
            Err(reason) => {
                error!(line = line_no, "Malformed jsonline skipped: {line}: {reason}");
                buckets.rejected += 1;
            }
        }
    }

    debug!(
        compras = buckets.compras.len(),
        lineas = buckets.lineas.len(),
        proveedores = buckets.proveedores.len(),
        "Classified jsonlines"
    );
    Ok(buckets)
}
