//! # Roster Spreadsheet Import
//!
//! Turns a grid of string cells (read from `.xlsx`, `.csv` or JSON by the
//! caller) into roster rows, then plans an upsert-by-`nrp` against the
//! existing roster.
//!
//! ## Layout tolerance
//!
//! Unit rosters are typed by hand, so the header row is searched for rather
//! than assumed: the first row with a `NO` cell, a cell containing `NAMA`
//! and a cell containing `NRP` or `PANGKAT` is the header. Rank and service
//! number frequently share one cell (`"BRIPDA / 01020304"` or
//! `"AKP NRP 75030512"`); see [`parse_rank_nrp`].
//!
//! ## Outcomes
//!
//! - new `nrp` → added;
//! - known `nrp` whose fields differ → updated, with a field diff;
//! - known `nrp` without differences, or an `nrp` repeated in the file
//!   (first occurrence wins) → skipped;
//! - no resolvable `nrp` → unresolved.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::DomainError;
use crate::model::{Gender, Personnel};

// ─── Header detection ───────────────────────────────────────────────────────

/// Column indices resolved from the header row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    pub no: Option<usize>,
    pub name: Option<usize>,
    /// A single column holding rank and service number together.
    pub rank_nrp: Option<usize>,
    pub rank: Option<usize>,
    pub nrp: Option<usize>,
    pub position: Option<usize>,
    pub department: Option<usize>,
    pub gender: Option<usize>,
}

impl ColumnMap {
    /// Map header cells to fields. The first matching cell wins per field.
    pub fn from_header(cells: &[String]) -> Self {
        let mut map = Self::default();
        for (idx, raw) in cells.iter().enumerate() {
            let c = raw.trim().to_uppercase();
            let has_id = c.contains("NRP") || c.contains("NIP");
            let slot = if c == "NO" || c == "NO." {
                &mut map.no
            } else if c.contains("NAMA") {
                &mut map.name
            } else if c.contains("PANGKAT") && has_id {
                &mut map.rank_nrp
            } else if c.contains("PANGKAT") {
                &mut map.rank
            } else if has_id {
                &mut map.nrp
            } else if c.contains("JABATAN") {
                &mut map.position
            } else if c.contains("BAG") || c.contains("SATKER") {
                &mut map.department
            } else if c.contains("KELAMIN") || c == "JK" || c == "L/P" {
                &mut map.gender
            } else {
                continue;
            };
            slot.get_or_insert(idx);
        }
        map
    }

    fn identifies_personnel(&self) -> bool {
        self.name.is_some()
            && (self.nrp.is_some() || self.rank_nrp.is_some() || self.rank.is_some())
    }
}

/// Find the header row and its column map.
pub fn locate_header(grid: &[Vec<String>]) -> Option<(usize, ColumnMap)> {
    grid.iter().enumerate().find_map(|(i, row)| {
        let upper: Vec<String> = row.iter().map(|c| c.trim().to_uppercase()).collect();
        let has_no = upper.iter().any(|c| c == "NO" || c == "NO.");
        let has_name = upper.iter().any(|c| c.contains("NAMA"));
        let has_id = upper.iter().any(|c| c.contains("NRP") || c.contains("PANGKAT"));
        if !(has_no && has_name && has_id) {
            return None;
        }
        let map = ColumnMap::from_header(row);
        map.identifies_personnel().then_some((i, map))
    })
}

// ─── Cell parsing ───────────────────────────────────────────────────────────

fn digits_of(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// First run of at least `min` digits, truncated to `max`.
fn find_digit_run(value: &str, min: usize, max: usize) -> Option<String> {
    let mut run = String::new();
    for ch in value.chars().chain(std::iter::once(' ')) {
        if ch.is_ascii_digit() {
            run.push(ch);
            continue;
        }
        if run.len() >= min {
            run.truncate(max);
            return Some(run);
        }
        run.clear();
    }
    None
}

/// Strip `NRP`/`NIP` tokens, digits and line breaks from a rank cell.
fn clean_rank(raw: &str) -> String {
    let chars: Vec<char> = raw.chars().collect();
    let mut kept = String::with_capacity(raw.len());
    let mut i = 0;
    while i < chars.len() {
        if i + 3 <= chars.len() {
            let token: String = chars[i..i + 3].iter().collect::<String>().to_uppercase();
            if token == "NRP" || token == "NIP" {
                i += 3;
                continue;
            }
        }
        let ch = chars[i];
        if !ch.is_ascii_digit() {
            kept.push(if ch == '\n' || ch == '\r' { ' ' } else { ch });
        }
        i += 1;
    }
    let collapsed = kept.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| matches!(c, '.' | '/' | ',' | ':') || c.is_whitespace())
        .trim_start_matches(|c: char| matches!(c, '/' | ':') || c.is_whitespace())
        .to_string()
}

/// Split a combined rank/service-number cell.
///
/// 1. `"RANK / 12345678"`: left of the first `/` is the rank, the digits on
///    the right are the service number.
/// 2. Otherwise the first run of 8 to 18 digits is the service number and
///    the rest, cleaned, is the rank.
/// 3. Otherwise the whole cell is rank and the number is unresolved.
pub fn parse_rank_nrp(value: &str) -> (String, Option<String>) {
    let value = value.trim();
    if let Some((left, right)) = value.split_once('/') {
        let nrp = digits_of(right);
        if !nrp.is_empty() {
            return (clean_rank(left), Some(nrp));
        }
    }
    match find_digit_run(value, 8, 18) {
        Some(nrp) => (clean_rank(value), Some(nrp)),
        None => (clean_rank(value), None),
    }
}

// ─── Row extraction ─────────────────────────────────────────────────────────

/// A roster row with a resolved service number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    /// 1-based row number in the source sheet.
    pub line: usize,
    pub nrp: String,
    pub name: String,
    pub rank: String,
    pub position: String,
    pub department: Option<String>,
    pub gender: Option<Gender>,
}

/// One data row of the sheet, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEntry {
    Row(RosterRow),
    /// Service number already seen earlier in the file.
    Duplicate { line: usize, nrp: String, name: String },
    /// No service number could be resolved.
    Unresolved { line: usize, name: String },
}

/// Parse a grid into roster entries.
pub fn parse_roster(grid: &[Vec<String>]) -> Result<Vec<RosterEntry>, DomainError> {
    let (header_idx, map) = locate_header(grid).ok_or_else(|| {
        DomainError::Validation("could not find a header row with 'NO', 'NAMA' and 'NRP'".into())
    })?;

    let cell = |row: &[String], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i))
            .map(|c| c.trim().to_string())
            .unwrap_or_default()
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for (offset, row) in grid.iter().enumerate().skip(header_idx + 1) {
        let line = offset + 1;
        let name = cell(row, map.name);
        let id_cells = [map.rank_nrp, map.nrp, map.rank].map(|idx| cell(row, idx));
        if name.is_empty() && id_cells.iter().all(String::is_empty) {
            continue;
        }

        let mut rank = String::new();
        let mut nrp = None;
        if map.rank_nrp.is_some() {
            (rank, nrp) = parse_rank_nrp(&id_cells[0]);
        }
        if map.nrp.is_some() {
            let digits = digits_of(&id_cells[1]);
            if !digits.is_empty() {
                nrp = Some(digits);
            }
        }
        if map.rank.is_some() {
            if map.nrp.is_none() && map.rank_nrp.is_none() {
                (rank, nrp) = parse_rank_nrp(&id_cells[2]);
            } else if !id_cells[2].is_empty() {
                rank = id_cells[2].clone();
            }
        }

        let Some(nrp) = nrp else {
            entries.push(RosterEntry::Unresolved { line, name });
            continue;
        };
        if !seen.insert(nrp.clone()) {
            entries.push(RosterEntry::Duplicate { line, nrp, name });
            continue;
        }

        let department = Some(cell(row, map.department)).filter(|d| !d.is_empty());
        let gender = Gender::parse(&cell(row, map.gender));
        entries.push(RosterEntry::Row(RosterRow {
            line,
            nrp,
            name,
            rank,
            position: cell(row, map.position),
            department,
            gender,
        }));
    }

    Ok(entries)
}

// ─── Planning ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Added,
    Updated,
    Skipped,
    Unresolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportDetail {
    pub row: usize,
    pub status: ImportStatus,
    pub nrp: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
    pub unresolved: usize,
    pub total: usize,
    pub details: Vec<ImportDetail>,
}

/// A write the caller must perform to realize the plan.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportAction {
    Insert(RosterRow),
    Update { id: Uuid, row: RosterRow },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    pub summary: ImportSummary,
    pub actions: Vec<ImportAction>,
}

/// Field differences an import row would apply. Department and gender are
/// only compared when the sheet provides them.
pub fn diff_personnel(existing: &Personnel, row: &RosterRow) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    let mut push = |field: &str, old: Option<String>, new: Option<String>| {
        if old != new {
            changes.push(FieldChange {
                field: field.to_string(),
                old,
                new,
            });
        }
    };
    push("Nama", Some(existing.name.clone()), Some(row.name.clone()));
    push("Pangkat", Some(existing.rank.clone()), Some(row.rank.clone()));
    push("Jabatan", Some(existing.position.clone()), Some(row.position.clone()));
    if row.department.is_some() {
        push("Bagian", existing.department.clone(), row.department.clone());
    }
    if let Some(gender) = row.gender {
        push(
            "Jenis Kelamin",
            existing.gender.map(|g| g.code().to_string()),
            Some(gender.code().to_string()),
        );
    }
    changes
}

/// Overwrite `person` with the row's values, keeping department and gender
/// when the sheet leaves them blank.
pub fn apply_row(person: &mut Personnel, row: &RosterRow) {
    person.name = row.name.clone();
    person.rank = row.rank.clone();
    person.position = row.position.clone();
    if row.department.is_some() {
        person.department = row.department.clone();
    }
    if row.gender.is_some() {
        person.gender = row.gender;
    }
}

/// Plan the upsert of `entries` against the roster visible through `existing`.
pub fn plan_import<F>(entries: Vec<RosterEntry>, existing: F) -> ImportPlan
where
    F: Fn(&str) -> Option<Personnel>,
{
    let mut summary = ImportSummary::default();
    let mut actions = Vec::new();

    for entry in entries {
        summary.total += 1;
        match entry {
            RosterEntry::Unresolved { line, name } => {
                summary.unresolved += 1;
                summary.details.push(ImportDetail {
                    row: line,
                    status: ImportStatus::Unresolved,
                    nrp: None,
                    name,
                    changes: Vec::new(),
                    note: Some("no service number".into()),
                });
            }
            RosterEntry::Duplicate { line, nrp, name } => {
                summary.skipped += 1;
                summary.details.push(ImportDetail {
                    row: line,
                    status: ImportStatus::Skipped,
                    nrp: Some(nrp),
                    name,
                    changes: Vec::new(),
                    note: Some("duplicate service number in file".into()),
                });
            }
            RosterEntry::Row(row) => match existing(&row.nrp) {
                None => {
                    summary.added += 1;
                    summary.details.push(ImportDetail {
                        row: row.line,
                        status: ImportStatus::Added,
                        nrp: Some(row.nrp.clone()),
                        name: row.name.clone(),
                        changes: Vec::new(),
                        note: None,
                    });
                    actions.push(ImportAction::Insert(row));
                }
                Some(person) => {
                    let changes = diff_personnel(&person, &row);
                    if changes.is_empty() {
                        summary.skipped += 1;
                        summary.details.push(ImportDetail {
                            row: row.line,
                            status: ImportStatus::Skipped,
                            nrp: Some(row.nrp.clone()),
                            name: row.name.clone(),
                            changes,
                            note: Some("unchanged".into()),
                        });
                    } else {
                        summary.updated += 1;
                        summary.details.push(ImportDetail {
                            row: row.line,
                            status: ImportStatus::Updated,
                            nrp: Some(row.nrp.clone()),
                            name: row.name.clone(),
                            changes,
                            note: None,
                        });
                        actions.push(ImportAction::Update { id: person.id, row });
                    }
                }
            },
        }
    }

    ImportPlan { summary, actions }
}
