use std::collections::{HashMap, HashSet};

use anyhow::Context;
use serde::Serialize;

/// Upper bound on the number of natural-key values per existence query or
/// insert batch, so backends with parameter/array limits stay happy.
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Separator for composite keys. Two characters that never appear in a
/// legal name or grade.
pub const KEY_SEP: &str = "||";

pub const MISSING_FIELDS_ERROR: &str =
    "Missing required fields (parent_name, parent_phone_number, student_name, student_grade)";
pub const UNRESOLVED_ID_ERROR: &str = "Failed to resolve parent or student ID after insert";

pub const ROSTER_COLUMNS: [&str; 7] = [
    "parent_name",
    "parent_phone_number",
    "parent_email",
    "parent_relationship",
    "student_name",
    "student_grade",
    "student_date_of_birth",
];

/// Untyped row as it comes off the CSV decoder. Only exists at the parse
/// boundary; everything downstream works on [`RosterRow`].
pub type RawRow = HashMap<String, String>;

/// One normalized input line: every field trimmed, relationship defaulted,
/// optionals as empty strings so comparisons stay simple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRow {
    pub parent_name: String,
    pub parent_phone_number: String,
    pub parent_email: String,
    pub parent_relationship: String,
    pub student_name: String,
    pub student_grade: String,
    pub student_date_of_birth: String,
}

impl RosterRow {
    pub fn is_valid(&self) -> bool {
        !self.parent_name.is_empty()
            && !self.parent_phone_number.is_empty()
            && !self.student_name.is_empty()
            && !self.student_grade.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewParent {
    pub parent_name: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub relationship: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
    pub student_name: String,
    pub grade: String,
    pub date_of_birth: Option<String>,
}

/// Tenant-scoped persistence collaborator. Handed to the importer
/// explicitly so tests can swap in a fake; key sets arrive pre-chunked.
pub trait RosterStore {
    /// Returns (phone_number, id) for parents whose phone is in `phones`.
    fn parents_by_phone(
        &mut self,
        school_id: &str,
        phones: &[String],
    ) -> anyhow::Result<Vec<(String, String)>>;

    /// Inserts new parents, returning (phone_number, id) with generated ids.
    fn insert_parents(
        &mut self,
        school_id: &str,
        parents: &[NewParent],
    ) -> anyhow::Result<Vec<(String, String)>>;

    /// Returns (student_name, grade, id) for students matching any of the
    /// given names and any of the given grades.
    fn students_by_name_grade(
        &mut self,
        school_id: &str,
        names: &[String],
        grades: &[String],
    ) -> anyhow::Result<Vec<(String, String, String)>>;

    /// Inserts new students, returning (student_name, grade, id).
    fn insert_students(
        &mut self,
        school_id: &str,
        students: &[NewStudent],
    ) -> anyhow::Result<Vec<(String, String, String)>>;

    /// Returns (parent_id, student_id) pairs already linked.
    fn links_by_ids(
        &mut self,
        school_id: &str,
        parent_ids: &[String],
        student_ids: &[String],
    ) -> anyhow::Result<Vec<(String, String)>>;

    fn insert_links(&mut self, school_id: &str, pairs: &[(String, String)]) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowOutcome {
    pub row: usize,
    pub data: RosterRow,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub parent_created: bool,
    pub student_created: bool,
    pub link_created: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub parents_created: usize,
    pub students_created: usize,
    pub links_created: usize,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub rows: Vec<RowOutcome>,
    pub summary: ImportSummary,
}

fn normalize_header(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Decodes CSV text into untyped rows. Header names are lower-cased with
/// internal whitespace collapsed to underscores so minor variations are
/// tolerated. Any structural decode error fails the whole parse.
pub fn parse_roster_csv(text: &str) -> anyhow::Result<Vec<RawRow>> {
    let mut reader = csv::Reader::from_reader(text.as_bytes());
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV header row")?
        .iter()
        .map(normalize_header)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.context("malformed CSV record")?;
        let mut row = RawRow::new();
        for (i, field) in record.iter().enumerate() {
            if let Some(name) = headers.get(i) {
                row.insert(name.clone(), field.to_string());
            }
        }
        rows.push(row);
    }
    Ok(rows)
}

pub fn normalize_row(raw: &RawRow) -> RosterRow {
    let get = |key: &str| raw.get(key).map(|v| v.trim()).unwrap_or("").to_string();
    let relationship = get("parent_relationship");
    RosterRow {
        parent_name: get("parent_name"),
        parent_phone_number: get("parent_phone_number"),
        parent_email: get("parent_email"),
        parent_relationship: if relationship.is_empty() {
            "Parent".to_string()
        } else {
            relationship
        },
        student_name: get("student_name"),
        student_grade: get("student_grade"),
        student_date_of_birth: get("student_date_of_birth"),
    }
}

/// Parses and normalizes in one step; this is the whole pre-persistence
/// phase, so a structural error here aborts before any store I/O.
pub fn parse_rows(text: &str) -> anyhow::Result<Vec<RosterRow>> {
    Ok(parse_roster_csv(text)?.iter().map(normalize_row).collect())
}

pub fn student_key(name: &str, grade: &str) -> String {
    format!("{}{}{}", name, KEY_SEP, grade)
}

pub fn link_key(parent_id: &str, student_id: &str) -> String {
    format!("{}{}{}", parent_id, KEY_SEP, student_id)
}

fn opt(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Collects unique values in first-occurrence order.
fn unique<I: Iterator<Item = String>>(iter: I) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in iter {
        if seen.insert(v.clone()) {
            out.push(v);
        }
    }
    out
}

/// Single-pass batch reconciliation of a normalized roster against the
/// store: resolve existing parents/students/links by natural key, insert
/// only the missing subset (parents, then students, then links), and report
/// a per-row outcome in input order.
pub struct RosterImporter<'a, S: RosterStore> {
    store: &'a mut S,
    chunk_size: usize,
}

impl<'a, S: RosterStore> RosterImporter<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(store: &'a mut S, chunk_size: usize) -> Self {
        Self {
            store,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn reconcile(
        &mut self,
        school_id: &str,
        rows: &[RosterRow],
    ) -> anyhow::Result<ImportOutcome> {
        // Only rows that pass required-field validation contribute dedup
        // keys; invalid rows are reported at result-building time and must
        // not create entities.
        let valid: Vec<&RosterRow> = rows.iter().filter(|r| r.is_valid()).collect();

        let phones = unique(valid.iter().map(|r| r.parent_phone_number.clone()));
        let names = unique(valid.iter().map(|r| r.student_name.clone()));
        let grades = unique(valid.iter().map(|r| r.student_grade.clone()));

        // 1) Existing parents, phone -> id. chunks() yields nothing for an
        // empty set, so the degenerate query is skipped naturally.
        let mut parent_ids: HashMap<String, String> = HashMap::new();
        for chunk in phones.chunks(self.chunk_size) {
            for (phone, id) in self.store.parents_by_phone(school_id, chunk)? {
                parent_ids.insert(phone, id);
            }
        }

        // 2) Insert missing parents, first occurrence of a phone wins.
        let mut missing_parents = Vec::new();
        let mut queued_phones = HashSet::new();
        for r in &valid {
            if parent_ids.contains_key(&r.parent_phone_number)
                || !queued_phones.insert(r.parent_phone_number.clone())
            {
                continue;
            }
            missing_parents.push(NewParent {
                parent_name: r.parent_name.clone(),
                phone_number: r.parent_phone_number.clone(),
                email: opt(&r.parent_email),
                relationship: r.parent_relationship.clone(),
            });
        }
        let mut created_parents: HashSet<String> = HashSet::new();
        for chunk in missing_parents.chunks(self.chunk_size) {
            for (phone, id) in self.store.insert_parents(school_id, chunk)? {
                created_parents.insert(phone.clone());
                parent_ids.insert(phone, id);
            }
        }

        // 3) Existing students, name||grade -> id.
        let mut student_ids: HashMap<String, String> = HashMap::new();
        for name_chunk in names.chunks(self.chunk_size) {
            for grade_chunk in grades.chunks(self.chunk_size) {
                for (name, grade, id) in
                    self.store
                        .students_by_name_grade(school_id, name_chunk, grade_chunk)?
                {
                    student_ids.insert(student_key(&name, &grade), id);
                }
            }
        }

        // 4) Insert missing students.
        let mut missing_students = Vec::new();
        let mut queued_students = HashSet::new();
        for r in &valid {
            let key = student_key(&r.student_name, &r.student_grade);
            if student_ids.contains_key(&key) || !queued_students.insert(key) {
                continue;
            }
            missing_students.push(NewStudent {
                student_name: r.student_name.clone(),
                grade: r.student_grade.clone(),
                date_of_birth: opt(&r.student_date_of_birth),
            });
        }
        let mut created_students: HashSet<String> = HashSet::new();
        for chunk in missing_students.chunks(self.chunk_size) {
            for (name, grade, id) in self.store.insert_students(school_id, chunk)? {
                let key = student_key(&name, &grade);
                created_students.insert(key.clone());
                student_ids.insert(key, id);
            }
        }

        // 5) Existing links between the ids this batch touches.
        let batch_parent_ids = unique(
            valid
                .iter()
                .filter_map(|r| parent_ids.get(&r.parent_phone_number).cloned()),
        );
        let batch_student_ids = unique(valid.iter().filter_map(|r| {
            student_ids
                .get(&student_key(&r.student_name, &r.student_grade))
                .cloned()
        }));
        let mut existing_links: HashSet<String> = HashSet::new();
        for parent_chunk in batch_parent_ids.chunks(self.chunk_size) {
            for student_chunk in batch_student_ids.chunks(self.chunk_size) {
                for (pid, sid) in self
                    .store
                    .links_by_ids(school_id, parent_chunk, student_chunk)?
                {
                    existing_links.insert(link_key(&pid, &sid));
                }
            }
        }

        // 6) Insert missing links, once per unique pair.
        let mut created_links: HashSet<String> = HashSet::new();
        let mut missing_links = Vec::new();
        for r in &valid {
            let Some(pid) = parent_ids.get(&r.parent_phone_number) else {
                continue;
            };
            let Some(sid) = student_ids.get(&student_key(&r.student_name, &r.student_grade)) else {
                continue;
            };
            let key = link_key(pid, sid);
            if !existing_links.insert(key.clone()) {
                continue;
            }
            created_links.insert(key);
            missing_links.push((pid.clone(), sid.clone()));
        }
        for chunk in missing_links.chunks(self.chunk_size) {
            self.store.insert_links(school_id, chunk)?;
        }

        // 7) Per-row outcomes in input order. Creation flags go to the
        // first row that caused the entity to exist; later rows sharing the
        // key reuse it.
        let mut flagged_parents: HashSet<String> = HashSet::new();
        let mut flagged_students: HashSet<String> = HashSet::new();
        let mut flagged_links: HashSet<String> = HashSet::new();
        let mut outcomes = Vec::with_capacity(rows.len());
        for (i, r) in rows.iter().enumerate() {
            let mut outcome = RowOutcome {
                row: i + 1,
                data: r.clone(),
                success: false,
                error: None,
                parent_created: false,
                student_created: false,
                link_created: false,
            };
            if !r.is_valid() {
                outcome.error = Some(MISSING_FIELDS_ERROR.to_string());
            } else {
                let pid = parent_ids.get(&r.parent_phone_number);
                let skey = student_key(&r.student_name, &r.student_grade);
                let sid = student_ids.get(&skey);
                match (pid, sid) {
                    (Some(pid), Some(sid)) => {
                        let lkey = link_key(pid, sid);
                        outcome.parent_created = created_parents
                            .contains(&r.parent_phone_number)
                            && flagged_parents.insert(r.parent_phone_number.clone());
                        outcome.student_created =
                            created_students.contains(&skey) && flagged_students.insert(skey);
                        outcome.link_created =
                            created_links.contains(&lkey) && flagged_links.insert(lkey);
                        outcome.success = true;
                    }
                    _ => {
                        // Internal consistency failure; recorded per row,
                        // never a panic.
                        outcome.error = Some(UNRESOLVED_ID_ERROR.to_string());
                    }
                }
            }
            outcomes.push(outcome);
        }

        let summary = ImportSummary {
            total: outcomes.len(),
            successful: outcomes.iter().filter(|o| o.success).count(),
            failed: outcomes.iter().filter(|o| !o.success).count(),
            parents_created: created_parents.len(),
            students_created: created_students.len(),
            links_created: created_links.len(),
        };

        Ok(ImportOutcome {
            rows: outcomes,
            summary,
        })
    }
}

/// Example file with the exact column set recognized by the importer.
pub fn template_csv() -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(ROSTER_COLUMNS)?;
    writer.write_record([
        "John Doe",
        "+233123456789",
        "john.doe@email.com",
        "Parent",
        "Jane Doe",
        "P1",
        "2015-05-15",
    ])?;
    writer.write_record([
        "Mary Smith",
        "+233987654321",
        "",
        "Guardian",
        "Michael Smith",
        "JHS2",
        "2010-08-22",
    ])?;
    writer.flush()?;
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("finishing template CSV: {}", e))?;
    Ok(String::from_utf8(bytes)?)
}
