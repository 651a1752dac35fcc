use std::collections::HashSet;
use std::io::Read;

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, error, info};

use crate::classifier::{classify, Entry, RecordKind};
use crate::error::Result;
use crate::mappers::{to_compra, to_compra_linea, to_proveedor, Mapped, SkipReason};
use crate::models::{CompraLineaPayload, CompraPayload, ProveedorPayload};
use crate::store::{self, ImportRecord};

// ---------------------------------------------------------------------------
// Batch reports
// ---------------------------------------------------------------------------

enum Outcome {
    Imported,
    Duplicate,
    Skipped(SkipReason),
}

/// Per-batch counts. `imported` counts committed rows; `distinct` counts the
/// keys claimed after a successful mapping, which is what purchases and
/// suppliers report even when the save that followed failed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub imported: usize,
    pub distinct: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record<P>(&mut self, kind: &str, entry: &Entry<P>, result: Result<Outcome>) {
        match result {
            Ok(Outcome::Imported) => self.imported += 1,
            Ok(Outcome::Duplicate) => self.duplicates += 1,
            Ok(Outcome::Skipped(reason)) => {
                debug!(line = entry.line_no, ?reason, "Skipped {kind}: {}", entry.raw);
                self.skipped += 1;
            }
            Err(e) => {
                error!(line = entry.line_no, "Failed to import {kind}: {}: {e}", entry.raw);
                self.failed += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-record import, one transaction each
// ---------------------------------------------------------------------------

fn import_compra(conn: &Connection, payload: &CompraPayload, seen: &mut HashSet<i64>) -> Result<Outcome> {
    let orden_compra = payload.orden_compra.value()?;
    if seen.contains(&orden_compra) {
        return Ok(Outcome::Duplicate);
    }
    let mut compra = to_compra(conn, payload)?;
    seen.insert(orden_compra);

    let tx = conn.unchecked_transaction()?;
    store::insert_compra(&tx, &mut compra)?;
    tx.commit()?;
    Ok(Outcome::Imported)
}

fn import_compra_linea(conn: &Connection, payload: &CompraLineaPayload, year: i32) -> Result<Outcome> {
    let linea = match to_compra_linea(conn, payload, year)? {
        Mapped::Record(linea) => linea,
        Mapped::Skipped(reason) => return Ok(Outcome::Skipped(reason)),
    };

    let tx = conn.unchecked_transaction()?;
    store::insert_compra_linea(&tx, &linea)?;
    tx.commit()?;
    Ok(Outcome::Imported)
}

fn import_proveedor(conn: &Connection, payload: &ProveedorPayload, seen: &mut HashSet<String>) -> Result<Outcome> {
    if seen.contains(&payload.nombre) {
        return Ok(Outcome::Duplicate);
    }
    let mut proveedor = to_proveedor(conn, payload)?;
    seen.insert(payload.nombre.clone());

    let tx = conn.unchecked_transaction()?;
    store::save_proveedor(&tx, &mut proveedor)?;
    tx.commit()?;
    Ok(Outcome::Imported)
}

// ---------------------------------------------------------------------------
// Batch importers
// ---------------------------------------------------------------------------

/// Imports purchases; only the first payload per `orden_compra` is mapped and saved.
pub fn import_compras(conn: &Connection, compras: &[Entry<CompraPayload>]) -> BatchReport {
    let mut report = BatchReport::default();
    let mut seen = HashSet::new();
    for entry in compras {
        let result = import_compra(conn, &entry.payload, &mut seen);
        report.record("compra", entry, result);
    }
    report.distinct = seen.len();
    info!("Successfully imported {} {}s", report.distinct, RecordKind::Compra.tag());
    report
}

/// Imports line items against purchases already stored for `year`.
pub fn import_compra_lineas(conn: &Connection, lineas: &[Entry<CompraLineaPayload>], year: i32) -> BatchReport {
    let mut report = BatchReport::default();
    for entry in lineas {
        let result = import_compra_linea(conn, &entry.payload, year);
        report.record("compralinea", entry, result);
    }
    report.distinct = report.imported;
    info!("Successfully imported {} {}s", report.imported, RecordKind::CompraLinea.tag());
    report
}

/// Imports suppliers; only the first payload per `nombre` is mapped and saved.
pub fn import_proveedores(conn: &Connection, proveedores: &[Entry<ProveedorPayload>]) -> BatchReport {
    let mut report = BatchReport::default();
    let mut seen = HashSet::new();
    for entry in proveedores {
        let result = import_proveedor(conn, &entry.payload, &mut seen);
        report.record("proveedor", entry, result);
    }
    report.distinct = seen.len();
    info!("Successfully imported {} {}s", report.distinct, RecordKind::Proveedor.tag());
    report
}

// ---------------------------------------------------------------------------
// import_jsonlines
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct ImportOptions {
    /// Year a line item's purchase must be dated in.
    pub year: i32,
    /// Abort on the first malformed line instead of logging and skipping it.
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub source: String,
    pub compras: BatchReport,
    pub lineas: BatchReport,
    pub proveedores: BatchReport,
    pub unknown: usize,
    pub rejected: usize,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.compras.failed + self.lineas.failed + self.proveedores.failed + self.rejected
    }
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Imports one jsonlines source: purchases, then line items, then suppliers.
///
/// Line items only see purchases committed before them, so the order is fixed.
pub fn import_jsonlines<R: Read>(
    conn: &Connection,
    mut reader: R,
    source: &str,
    options: &ImportOptions,
) -> Result<RunSummary> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;

    let buckets = classify(content.split(|b| *b == b'\n'), options.strict)?;
    info!(source, records = buckets.total(), year = options.year, "Importing jsonlines");

    let compras = import_compras(conn, &buckets.compras);
    let lineas = import_compra_lineas(conn, &buckets.lineas, options.year);
    let proveedores = import_proveedores(conn, &buckets.proveedores);

    let summary = RunSummary {
        source: source.to_string(),
        compras,
        lineas,
        proveedores,
        unknown: buckets.unknown,
        rejected: buckets.rejected,
    };

    store::record_import(conn, &ImportRecord {
        source,
        checksum: &compute_checksum(&content),
        compras: summary.compras.imported,
        lineas: summary.lineas.imported,
        proveedores: summary.proveedores.imported,
        failed: summary.failed(),
    })?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::get_connection;
    use crate::error::ImportError;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        (dir, conn)
    }

    fn options(year: i32) -> ImportOptions {
        ImportOptions { year, strict: false }
    }

    fn compra_line(orden_compra: &str, proveedor: &str, fecha: &str) -> String {
        format!(
            r#"["CompraItem", {{"proveedor":"{proveedor}","fecha":"{fecha}","destino":"Ministerio","tipo_compra":"CONC","orden_compra":"{orden_compra}","observaciones":"","importe":100.0}}]"#
        )
    }

    fn linea_line(orden_compra: &str, cantidad: &str) -> String {
        format!(
            r#"["CompraLineaItem", {{"importe":50.0,"cantidad":"{cantidad}","unidad_medida":"U","orden_compra":"{orden_compra}","detalle":"X"}}]"#
        )
    }

    fn proveedor_line(nombre: &str, cuit: &str) -> String {
        format!(r#"["ProveedorItem", {{"nombre":"{nombre}","cuit":"{cuit}"}}]"#)
    }

    fn run(conn: &Connection, lines: &[String], year: i32) -> RunSummary {
        let input = lines.join("\n");
        import_jsonlines(conn, input.as_bytes(), "test.jl", &options(year)).unwrap()
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn test_distinct_compras_all_imported() {
        let (_dir, conn) = test_db();
        let lines: Vec<String> = (1..=5).map(|n| compra_line(&n.to_string(), "ACME", "2020-01-05")).collect();
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.compras.imported, 5);
        assert_eq!(count(&conn, "compras"), 5);
        assert_eq!(count(&conn, "proveedores"), 1);
        assert_eq!(count(&conn, "reparticiones"), 1);
    }

    #[test]
    fn test_duplicate_orden_compra_first_wins() {
        let (_dir, conn) = test_db();
        let lines = vec![
            compra_line("10", "FIRST", "2020-01-05"),
            compra_line("10", "SECOND", "2020-02-05"),
            compra_line("11", "FIRST", "2020-01-05"),
        ];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.compras.imported, 2);
        assert_eq!(summary.compras.duplicates, 1);
        let proveedor: String = conn
            .query_row(
                "SELECT p.nombre FROM compras c JOIN proveedores p ON c.proveedor_id = p.id WHERE c.orden_compra = 10",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(proveedor, "FIRST");
        assert_eq!(count(&conn, "proveedores"), 1);
    }

    #[test]
    fn test_failed_compra_does_not_claim_its_key() {
        let (_dir, conn) = test_db();
        let lines = vec![
            compra_line("10", "ACME", "2020-99-05"),
            compra_line("10", "ACME", "2020-01-05"),
        ];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.compras.failed, 1);
        assert_eq!(summary.compras.imported, 1);
        assert_eq!(summary.compras.duplicates, 0);
    }

    #[test]
    fn test_failed_save_still_counts_claimed_key() {
        let (_dir, conn) = test_db();
        conn.execute_batch(
            "CREATE TRIGGER reject_99 BEFORE INSERT ON compras WHEN NEW.orden_compra = 99
             BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .unwrap();
        let lines = vec![
            compra_line("99", "ACME", "2020-01-05"),
            compra_line("99", "ACME", "2020-01-05"),
            compra_line("10", "ACME", "2020-01-05"),
        ];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(
            summary.compras,
            BatchReport { imported: 1, distinct: 2, duplicates: 1, skipped: 0, failed: 1 }
        );
        assert_eq!(count(&conn, "compras"), 1);
    }

    #[test]
    fn test_failed_compra_leaves_no_partial_rows() {
        let (_dir, conn) = test_db();
        let summary = run(&conn, &[compra_line("S/N", "ACME", "2020-01-05")], 2020);
        assert_eq!(summary.compras.failed, 1);
        assert_eq!(count(&conn, "compras"), 0);
        assert_eq!(count(&conn, "proveedores"), 0);
    }

    #[test]
    fn test_linea_without_purchase_is_skipped() {
        let (_dir, conn) = test_db();
        let summary = run(&conn, &[linea_line("10", "2")], 2020);
        assert_eq!(summary.lineas, BatchReport { skipped: 1, ..Default::default() });
        assert_eq!(count(&conn, "compra_linea_items"), 0);
    }

    #[test]
    fn test_linea_without_importe_is_skipped_not_rejected() {
        let (_dir, conn) = test_db();
        let lines = vec![r#"["CompraLineaItem", {"cantidad":"4","orden_compra":"10"}]"#.to_string()];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.lineas, BatchReport { skipped: 1, ..Default::default() });
        assert_eq!(summary.rejected, 0);

        let input = lines.join("\n");
        let strict = ImportOptions { year: 2020, strict: true };
        let summary = import_jsonlines(&conn, input.as_bytes(), "strict.jl", &strict).unwrap();
        assert_eq!(summary.lineas.skipped, 1);
        assert_eq!(summary.failed(), 0);
    }

    #[test]
    fn test_linea_quantity_parsing() {
        let (_dir, conn) = test_db();
        let lines = vec![
            compra_line("10", "ACME", "2020-01-05"),
            linea_line("10", "4 UNIDAD/ES"),
            linea_line("10", "UNIDAD/ES"),
        ];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.lineas.imported, 1);
        assert_eq!(summary.lineas.skipped, 1);
        let cantidad: i64 = conn.query_row("SELECT cantidad FROM compra_linea_items", [], |r| r.get(0)).unwrap();
        assert_eq!(cantidad, 4);
    }

    #[test]
    fn test_linea_year_filter() {
        let (_dir, conn) = test_db();
        let lines = vec![compra_line("10", "ACME", "2019-12-30"), linea_line("10", "1")];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.lineas.imported, 0);
        assert_eq!(summary.lineas.skipped, 1);
    }

    #[test]
    fn test_lineas_are_not_deduplicated() {
        let (_dir, conn) = test_db();
        let lines = vec![
            compra_line("10", "ACME", "2020-01-05"),
            linea_line("10", "1"),
            linea_line("10", "1"),
        ];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.lineas.imported, 2);
    }

    #[test]
    fn test_duplicate_proveedor_first_cuit_wins() {
        let (_dir, conn) = test_db();
        let lines = vec![proveedor_line("ALECO S.R.L.", "30-1"), proveedor_line("ALECO S.R.L.", "30-2")];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.proveedores.imported, 1);
        assert_eq!(summary.proveedores.duplicates, 1);
        let cuit: String = conn.query_row("SELECT cuit FROM proveedores", [], |r| r.get(0)).unwrap();
        assert_eq!(cuit, "30-1");
    }

    #[test]
    fn test_proveedor_cuit_overwritten_in_later_run() {
        let (_dir, conn) = test_db();
        run(&conn, &[proveedor_line("ACME", "30-1")], 2020);
        run(&conn, &[proveedor_line("ACME", "30-2")], 2020);
        let cuit: String = conn.query_row("SELECT cuit FROM proveedores", [], |r| r.get(0)).unwrap();
        assert_eq!(cuit, "30-2");
        assert_eq!(count(&conn, "proveedores"), 1);
    }

    #[test]
    fn test_proveedor_import_updates_supplier_created_by_compra() {
        let (_dir, conn) = test_db();
        let lines = vec![compra_line("10", "ACME", "2020-01-05"), proveedor_line("ACME", "30-9")];
        run(&conn, &lines, 2020);
        assert_eq!(count(&conn, "proveedores"), 1);
        let cuit: String = conn.query_row("SELECT cuit FROM proveedores", [], |r| r.get(0)).unwrap();
        assert_eq!(cuit, "30-9");
    }

    #[test]
    fn test_end_to_end_compra_and_linea() {
        let (_dir, conn) = test_db();
        let input = concat!(
            r#"["CompraItem", {"proveedor":"ACME","fecha":"2020-01-05","destino":"Ministerio","tipo_compra":"CONC","orden_compra":"10","observaciones":"","importe":100.0}]"#,
            "\n",
            r#"["CompraLineaItem", {"importe":50.0,"cantidad":"2","unidad_medida":"U","orden_compra":"10","detalle":"X"}]"#,
            "\n",
        );
        let summary = import_jsonlines(&conn, input.as_bytes(), "stdin", &options(2020)).unwrap();
        assert_eq!(summary.compras.imported, 1);
        assert_eq!(summary.lineas.imported, 1);

        let (orden_compra, cantidad, detalle): (i64, i64, String) = conn
            .query_row(
                "SELECT c.orden_compra, l.cantidad, l.detalle FROM compra_linea_items l JOIN compras c ON l.compra_id = c.id",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(orden_compra, 10);
        assert_eq!(cantidad, 2);
        assert_eq!(detalle, "X");
    }

    #[test]
    fn test_unknown_tag_counts_nowhere() {
        let (_dir, conn) = test_db();
        let summary = run(&conn, &[r#"["Unknown", {}]"#.to_string()], 2020);
        assert_eq!(summary.unknown, 1);
        assert_eq!(summary.compras, BatchReport::default());
        assert_eq!(summary.lineas, BatchReport::default());
        assert_eq!(summary.proveedores, BatchReport::default());
    }

    #[test]
    fn test_records_import_ledger_row() {
        let (_dir, conn) = test_db();
        let lines = vec![compra_line("10", "ACME", "2020-01-05"), "garbage".to_string()];
        let summary = run(&conn, &lines, 2020);
        assert_eq!(summary.rejected, 1);
        let (source, compras, failed, checksum): (String, i64, i64, String) = conn
            .query_row("SELECT source, compras, failed, checksum FROM imports", [], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
            })
            .unwrap();
        assert_eq!(source, "test.jl");
        assert_eq!(compras, 1);
        assert_eq!(failed, 1);
        assert_eq!(checksum.len(), 64);
    }

    #[test]
    fn test_invalid_utf8_line_does_not_sink_the_source() {
        let (_dir, conn) = test_db();
        let mut input = proveedor_line("ACME", "30-1").into_bytes();
        input.extend_from_slice(b"\n[\"ProveedorItem\", {\"nombre\":\"\xff\"}]\n");
        let summary = import_jsonlines(&conn, &input[..], "latin1.jl", &options(2020)).unwrap();
        assert_eq!(summary.proveedores.imported, 1);
        assert_eq!(summary.rejected, 1);

        let checksum: String = conn.query_row("SELECT checksum FROM imports", [], |r| r.get(0)).unwrap();
        assert_eq!(checksum, compute_checksum(&input));
    }

    #[test]
    fn test_strict_mode_aborts_before_importing() {
        let (_dir, conn) = test_db();
        let input = format!("{}\nnot json\n", compra_line("10", "ACME", "2020-01-05"));
        let err = import_jsonlines(&conn, input.as_bytes(), "bad.jl", &ImportOptions { year: 2020, strict: true })
            .unwrap_err();
        assert!(matches!(err, ImportError::MalformedLine { line_no: 2, .. }));
        assert_eq!(count(&conn, "compras"), 0);
        assert_eq!(count(&conn, "imports"), 0);
    }
}
