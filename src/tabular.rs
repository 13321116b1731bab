//! Tabular uploads: csv and the first worksheet of an xlsx workbook.
//!
//! A [`Table`] feeds two consumers: the upload preview renders it as an
//! HTML table, and ingestion flattens csv files into aligned text.

use std::io::Read;

use quick_xml::events::Event;

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Cells beyond this count are ignored.
const MAX_CELLS: usize = 1_000_000;
/// Widest sheet a workbook may declare (column `XFD`).
const MAX_COLUMNS: usize = 16_384;

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("CSV parse failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("XLSX parse failed: {0}")]
    Xlsx(String),
}

/// Header plus rows. Rows are padded to the header width.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table from raw records; the first record is the header.
    fn from_records(mut records: Vec<Vec<String>>) -> Self {
        if records.is_empty() {
            return Self::default();
        }
        let mut columns = records.remove(0);
        let width = records.iter().map(Vec::len).chain([columns.len()]).max().unwrap_or(0);
        for (i, col) in columns.iter_mut().enumerate() {
            if col.is_empty() {
                *col = format!("Unnamed: {}", i);
            }
        }
        while columns.len() < width {
            columns.push(format!("Unnamed: {}", columns.len()));
        }
        for row in &mut records {
            row.resize(width, String::new());
        }
        Self {
            columns,
            rows: records,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names joined by spaces, a newline, then the rows with each
    /// column right-aligned to its widest cell.
    pub fn to_text(&self) -> String {
        let widths: Vec<usize> = (0..self.columns.len())
            .map(|i| {
                self.rows
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain([self.columns[i].chars().count()])
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let render = |cells: &[String]| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:>width$}", c, width = *w))
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut out = self.columns.join(" ");
        out.push('\n');
        out.push_str(&render(&self.columns));
        for row in &self.rows {
            out.push('\n');
            out.push_str(&render(row));
        }
        out
    }

    /// HTML rendering with a leading index column and numbered rows.
    pub fn to_html(&self) -> String {
        let mut html = String::from(
            "<table border=\"1\" class=\"dataframe table table-striped table-bordered\">\n",
        );
        html.push_str("  <thead>\n    <tr style=\"text-align: right;\">\n      <th></th>\n");
        for col in &self.columns {
            html.push_str(&format!("      <th>{}</th>\n", escape_html(col)));
        }
        html.push_str("    </tr>\n  </thead>\n  <tbody>\n");
        for (i, row) in self.rows.iter().enumerate() {
            html.push_str(&format!("    <tr>\n      <th>{}</th>\n", i));
            for cell in row {
                html.push_str(&format!("      <td>{}</td>\n", escape_html(cell)));
            }
            html.push_str("    </tr>\n");
        }
        html.push_str("  </tbody>\n</table>");
        html
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

pub fn read_csv(bytes: &[u8]) -> Result<Table, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cells: Vec<String> = record.iter().map(|c| c.trim().to_string()).collect();
        if cells.iter().all(String::is_empty) {
            continue;
        }
        records.push(cells);
    }
    Ok(Table::from_records(records))
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn read_zip_entry(archive: &mut Archive<'_>, name: &str) -> Result<Option<Vec<u8>>, TableError> {
    let entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(TableError::Xlsx(e.to_string())),
    };
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| TableError::Xlsx(e.to_string()))?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(TableError::Xlsx(format!("{} exceeds size limit", name)));
    }
    Ok(Some(out))
}

/// Reads the first worksheet of an xlsx workbook.
pub fn read_xlsx(bytes: &[u8]) -> Result<Table, TableError> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| TableError::Xlsx(e.to_string()))?;

    let shared = match read_zip_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => shared_strings(&xml)?,
        None => Vec::new(),
    };

    let first = match workbook_first_sheet(&mut archive)? {
        Some(path) => path,
        None => lowest_numbered_sheet(&archive)?,
    };
    let xml = read_zip_entry(&mut archive, &first)?
        .ok_or_else(|| TableError::Xlsx(format!("{} not found", first)))?;
    table_within_budget(sheet_rows(&xml, &shared)?)
}

/// Part name of the first sheet in workbook order, resolved through the
/// workbook relationships. `None` when either part is absent.
fn workbook_first_sheet(archive: &mut Archive<'_>) -> Result<Option<String>, TableError> {
    let Some(workbook) = read_zip_entry(archive, "xl/workbook.xml")? else {
        return Ok(None);
    };
    let Some(rels) = read_zip_entry(archive, "xl/_rels/workbook.xml.rels")? else {
        return Ok(None);
    };
    let Some(rel_id) = first_element_attr(&workbook, b"sheet", b"id")? else {
        return Ok(None);
    };

    let mut reader = quick_xml::Reader::from_reader(rels.as_slice());
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    match attr.key.local_name().as_ref() {
                        b"Id" => id = Some(value),
                        b"Target" => target = Some(value),
                        _ => {}
                    }
                }
                if id.as_deref() == Some(rel_id.as_str()) {
                    return Ok(target.map(|t| match t.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", t),
                    }));
                }
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(TableError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

/// Value of attribute `attr` (by local name) on the first `element`.
fn first_element_attr(xml: &[u8], element: &[u8], attr: &[u8]) -> Result<Option<String>, TableError> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.local_name().as_ref() == element => {
                return Ok(e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == attr)
                    .map(|a| String::from_utf8_lossy(&a.value).into_owned()));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(TableError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
}

/// Fallback for workbooks without relationship parts.
fn lowest_numbered_sheet(archive: &Archive<'_>) -> Result<String, TableError> {
    archive
        .file_names()
        .filter(|n| n.starts_with("xl/worksheets/sheet") && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches("xl/worksheets/sheet")
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(str::to_string)
        .ok_or_else(|| TableError::Xlsx("workbook has no worksheets".to_string()))
}

/// Builds the padded table unless it would exceed the cell budget.
fn table_within_budget(records: Vec<Vec<String>>) -> Result<Table, TableError> {
    let width = records.iter().map(Vec::len).max().unwrap_or(0);
    if width.saturating_mul(records.len()) > MAX_CELLS {
        return Err(TableError::Xlsx(format!(
            "sheet of {} rows by {} columns exceeds {} cells",
            records.len(),
            width,
            MAX_CELLS
        )));
    }
    Ok(Table::from_records(records))
}

/// Rich-text runs of one `<si>` are concatenated.
fn shared_strings(xml: &[u8]) -> Result<Vec<String>, TableError> {
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => strings.push(current.take().unwrap_or_default()),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(TableError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Zero-based column index of a cell reference such as `"C7"`.
///
/// `None` when the reference has no column letters. Columns past `XFD`
/// are rejected.
fn column_index(cell_ref: &str) -> Result<Option<usize>, TableError> {
    let letters = cell_ref.bytes().take_while(u8::is_ascii_alphabetic);
    let mut n = 0usize;
    let mut any = false;
    for b in letters {
        any = true;
        n = n
            .checked_mul(26)
            .and_then(|n| n.checked_add((b.to_ascii_uppercase() - b'A' + 1) as usize))
            .filter(|&n| n <= MAX_COLUMNS)
            .ok_or_else(|| TableError::Xlsx(format!("cell reference out of range: {}", cell_ref)))?;
    }
    Ok(any.then(|| n - 1))
}

#[derive(Default)]
struct CellState {
    col: Option<usize>,
    kind: Vec<u8>,
    text: String,
}

fn sheet_rows(xml: &[u8], shared: &[String]) -> Result<Vec<Vec<String>>, TableError> {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut row: Option<Vec<String>> = None;
    let mut cell: Option<CellState> = None;
    let mut capture = false;
    let mut cells_seen = 0usize;
    let mut allocated = 0usize;

    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        if cells_seen >= MAX_CELLS {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => row = Some(Vec::new()),
                b"c" => {
                    let mut state = CellState::default();
                    for attr in e.attributes().flatten() {
                        match attr.key.local_name().as_ref() {
                            b"r" => state.col = column_index(&String::from_utf8_lossy(&attr.value))?,
                            b"t" => state.kind = attr.value.to_vec(),
                            _ => {}
                        }
                    }
                    cell = Some(state);
                }
                b"v" | b"t" => capture = cell.is_some(),
                _ => {}
            },
            Ok(Event::Text(te)) if capture => {
                if let Some(c) = cell.as_mut() {
                    c.text.push_str(&te.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => capture = false,
                b"c" => {
                    if let (Some(c), Some(r)) = (cell.take(), row.as_mut()) {
                        let value = match c.kind.as_slice() {
                            b"s" => c
                                .text
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|i| shared.get(i).cloned())
                                .unwrap_or_default(),
                            b"b" => (if c.text.trim() == "1" { "True" } else { "False" }).to_string(),
                            _ => c.text,
                        };
                        let idx = c.col.unwrap_or(r.len());
                        if r.len() <= idx {
                            allocated += idx + 1 - r.len();
                            if allocated > MAX_CELLS {
                                return Err(TableError::Xlsx(format!(
                                    "sheet exceeds {} cells",
                                    MAX_CELLS
                                )));
                            }
                            r.resize(idx + 1, String::new());
                        }
                        r[idx] = value;
                        cells_seen += 1;
                    }
                }
                b"row" => {
                    if let Some(r) = row.take() {
                        if r.iter().any(|v| !v.is_empty()) {
                            rows.push(r);
                        }
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(TableError::Xlsx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(rows)
}
