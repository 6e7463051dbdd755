//! Source-file reading for the historical payment spreadsheet. The header
//! shape is validated once, against the first row, not per row.

use serde::{Deserialize, Deserializer};
use std::io::Read;

use super::service::ImportError;

/// Columns the import cannot run without, under the historical sheet's
/// Spanish names.
pub(crate) const REQUIRED_COLUMNS: &[&str] = &[
    "carnet",
    "nombre",
    "banco",
    "no_boleta",
    "monto",
    "fecha_pago",
    "mensualidad_aprobada",
    "plan_estudios",
    "concepto",
];

/// One data row as it appears in the source. All cells arrive as text; the
/// normalizer turns them into typed values later.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SourceRow {
    #[serde(rename = "carnet", default)]
    pub(crate) student_code: String,
    #[serde(rename = "nombre", default)]
    pub(crate) student_name: String,
    #[serde(rename = "banco", default)]
    pub(crate) bank: String,
    #[serde(rename = "no_boleta", default)]
    pub(crate) receipt_number: String,
    #[serde(rename = "monto", default)]
    pub(crate) amount: String,
    #[serde(rename = "fecha_pago", default)]
    pub(crate) payment_date: String,
    #[serde(rename = "mensualidad_aprobada", default)]
    pub(crate) monthly_fee: String,
    #[serde(rename = "plan_estudios", default)]
    pub(crate) study_plan: String,
    #[serde(
        rename = "mes_inicio",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) start_month: Option<String>,
    #[serde(
        rename = "numero_cuotas",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    pub(crate) installment_count: Option<String>,
    /// The column must be present in the header; the cell itself may be
    /// blank.
    #[serde(rename = "concepto", default, deserialize_with = "empty_string_as_none")]
    pub(crate) concept: Option<String>,
    #[serde(rename = "email", default, deserialize_with = "empty_string_as_none")]
    pub(crate) email: Option<String>,
    #[serde(rename = "telefono", default, deserialize_with = "empty_string_as_none")]
    pub(crate) phone: Option<String>,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[derive(Debug)]
pub(crate) struct SourceReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> SourceReader<R> {
    /// Builds the reader and validates the header once. Every required
    /// column missing from the header is reported by name.
    pub(crate) fn new(source: R) -> Result<Self, ImportError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        let missing: Vec<String> = REQUIRED_COLUMNS
            .iter()
            .filter(|column| !headers.iter().any(|header| header == **column))
            .map(|column| (*column).to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ImportError::MissingColumns(missing));
        }

        Ok(Self { reader })
    }

    /// Streams `(row_number, row)` pairs, 1-based over data rows.
    pub(crate) fn rows(
        &mut self,
    ) -> impl Iterator<Item = (usize, Result<SourceRow, csv::Error>)> + '_ {
        self.reader
            .deserialize::<SourceRow>()
            .enumerate()
            .map(|(index, result)| (index + 1, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const HEADER: &str =
        "carnet,nombre,banco,no_boleta,monto,fecha_pago,mensualidad_aprobada,plan_estudios,concepto";

    #[test]
    fn reader_accepts_a_complete_header() {
        let source = format!("{HEADER},mes_inicio,numero_cuotas\n");
        assert!(SourceReader::new(Cursor::new(source)).is_ok());
    }

    #[test]
    fn reader_reports_every_missing_column_by_name() {
        let source = "carnet,nombre,banco,monto,plan_estudios,concepto\n";
        let error = SourceReader::new(Cursor::new(source)).expect_err("header is incomplete");
        match error {
            ImportError::MissingColumns(missing) => {
                assert_eq!(
                    missing,
                    vec![
                        "no_boleta".to_string(),
                        "fecha_pago".to_string(),
                        "mensualidad_aprobada".to_string(),
                    ]
                );
            }
            other => panic!("expected missing columns, got {other:?}"),
        }
    }

    #[test]
    fn rows_are_numbered_from_one_and_optional_cells_collapse_to_none() {
        let source = format!(
            "{HEADER},mes_inicio\n2018-0034,Ana,BI,545109,Q800,2022-01-05,Q800,MBA,Colegiatura enero,  \n"
        );
        let mut reader = SourceReader::new(Cursor::new(source)).expect("header is valid");
        let (row_number, row) = reader.rows().next().expect("one data row");
        let row = row.expect("row deserializes");

        assert_eq!(row_number, 1);
        assert_eq!(row.student_code, "2018-0034");
        assert_eq!(row.start_month, None);
        assert_eq!(row.concept.as_deref(), Some("Colegiatura enero"));
        assert_eq!(row.installment_count, None);
    }
}
