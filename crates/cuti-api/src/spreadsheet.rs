//! Spreadsheet input and output.
//!
//! Roster uploads are read into a grid of trimmed string cells, from `.xlsx`
//! (first worksheet) or `.csv`. Leave reports are written as `.xlsx` or
//! `.csv` with a fixed column layout.

use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use rust_xlsxwriter::{Format, FormatAlign, FormatBorder, Workbook, XlsxError};

use crate::error::AppError;
use crate::extractors::UploadedFile;

const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Supported upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Xlsx,
    Csv,
}

impl SheetFormat {
    /// Detect from the file name first, then the declared content type.
    pub fn detect(file: &UploadedFile) -> Option<Self> {
        let name = file.file_name.as_deref().unwrap_or_default().to_ascii_lowercase();
        if name.ends_with(".xlsx") {
            return Some(Self::Xlsx);
        }
        if name.ends_with(".csv") {
            return Some(Self::Csv);
        }
        match file.content_type.as_str() {
            XLSX_CONTENT_TYPE => Some(Self::Xlsx),
            "text/csv" | "application/csv" => Some(Self::Csv),
            _ => None,
        }
    }
}

/// Read an uploaded roster into a string grid.
pub fn read_grid(file: &UploadedFile) -> Result<Vec<Vec<String>>, AppError> {
    match SheetFormat::detect(file) {
        Some(SheetFormat::Xlsx) => read_xlsx(&file.bytes),
        Some(SheetFormat::Csv) => read_csv(&file.bytes),
        None => Err(AppError::BadRequest(
            "Unsupported file format. Upload an .xlsx or .csv file".into(),
        )),
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // Service numbers typed into numeric cells come back as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e18 => format!("{}", *f as i64),
        other => other.to_string().trim().to_string(),
    }
}

pub fn read_xlsx(bytes: &[u8]) -> Result<Vec<Vec<String>>, AppError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e| AppError::BadRequest(format!("could not open workbook: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::BadRequest("workbook has no worksheets".into()))?
        .map_err(|e| AppError::BadRequest(format!("could not read worksheet: {e}")))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

pub fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(|c| c.trim().to_string()).collect())
                .map_err(|e| AppError::BadRequest(format!("malformed CSV: {e}")))
        })
        .collect()
}

// ── Report output ───────────────────────────────────────────────────────────

pub const REPORT_HEADERS: [&str; 7] = [
    "NO",
    "NAMA",
    "PANGKAT",
    "NRP/NIP",
    "JABATAN",
    "JUMLAH CUTI / IJIN",
    "KETERANGAN",
];

/// One line of the leave report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub name: String,
    pub rank: String,
    pub nrp: String,
    pub position: String,
    /// e.g. `Cuti Tahunan (5 hari)`.
    pub leave: String,
    pub reason: String,
}

impl ReportRow {
    fn cells(&self, no: usize) -> [String; 7] {
        [
            no.to_string(),
            self.name.clone(),
            self.rank.clone(),
            self.nrp.clone(),
            self.position.clone(),
            self.leave.clone(),
            self.reason.clone(),
        ]
    }
}

pub fn write_report_xlsx(title: &str, rows: &[ReportRow]) -> Result<Vec<u8>, AppError> {
    build_xlsx(title, rows).map_err(|e| AppError::internal("failed to render report", e))
}

fn build_xlsx(title: &str, rows: &[ReportRow]) -> Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new()
        .set_bold()
        .set_border(FormatBorder::Thin)
        .set_align(FormatAlign::Center);
    let body = Format::new().set_border(FormatBorder::Thin);
    let heading = Format::new().set_bold().set_font_size(14);

    let sheet = workbook.add_worksheet();
    sheet.set_name("Laporan Izin")?;
    sheet.write_string_with_format(0, 0, title, &heading)?;
    for (col, text) in REPORT_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(2, col as u16, *text, &header)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let line = 3 + i as u32;
        sheet.write_number_with_format(line, 0, (i + 1) as f64, &body)?;
        for (col, text) in row.cells(i + 1).iter().enumerate().skip(1) {
            sheet.write_string_with_format(line, col as u16, text.as_str(), &body)?;
        }
    }
    for (col, width) in [6.0, 30.0, 14.0, 20.0, 30.0, 26.0, 40.0].iter().enumerate() {
        sheet.set_column_width(col as u16, *width)?;
    }
    workbook.save_to_buffer()
}

pub fn write_report_csv(rows: &[ReportRow]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let fail = |e: csv::Error| AppError::internal("failed to render report", e);
    writer.write_record(REPORT_HEADERS).map_err(fail)?;
    for (i, row) in rows.iter().enumerate() {
        writer.write_record(row.cells(i + 1)).map_err(fail)?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::internal("failed to render report", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str) -> ReportRow {
        ReportRow {
            name: name.into(),
            rank: "BRIPKA".into(),
            nrp: "85011001".into(),
            position: "BA SIUM".into(),
            leave: "Cuti Tahunan (5 hari)".into(),
            reason: "keluarga".into(),
        }
    }

    #[test]
    fn csv_round_trips_through_reader() {
        let bytes = write_report_csv(&[row("Budi"), row("Sari")]).unwrap();
        let grid = read_csv(&bytes).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[0][5], "JUMLAH CUTI / IJIN");
        assert_eq!(grid[2][0], "2");
        assert_eq!(grid[2][1], "Sari");
    }

    #[test]
    fn xlsx_report_is_readable() {
        let bytes = write_report_xlsx("LAPORAN", &[row("Budi")]).unwrap();
        let grid = read_xlsx(&bytes).unwrap();
        assert_eq!(grid[0][0], "LAPORAN");
        assert_eq!(grid[2][3], "NRP/NIP");
        assert_eq!(grid[3][0], "1");
        assert_eq!(grid[3][3], "85011001");
    }

    #[test]
    fn format_detection() {
        let file = |name: Option<&str>, ct: &str| UploadedFile {
            file_name: name.map(str::to_string),
            content_type: ct.into(),
            bytes: Vec::new(),
        };
        assert_eq!(
            SheetFormat::detect(&file(Some("Roster.XLSX"), "application/octet-stream")),
            Some(SheetFormat::Xlsx)
        );
        assert_eq!(SheetFormat::detect(&file(None, "text/csv")), Some(SheetFormat::Csv));
        assert_eq!(
            SheetFormat::detect(&file(Some("roster.pdf"), "application/pdf")),
            None
        );
        assert!(read_grid(&file(Some("roster.doc"), "application/msword")).is_err());
    }
}
