//! Guest list import and export in the semicolon-separated spreadsheet format:
//! `first_name;last_name;party;is_child`.

use std::{fs, path::Path};

use clap::ValueEnum;
use sea_orm::{ConnectionTrait, DbErr};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{error::AppError, store};

const REQUIRED_COLUMNS: [&str; 4] = ["first_name", "last_name", "party", "is_child"];
const NBSP: char = '\u{a0}';

#[derive(Debug, thiserror::Error)]
pub enum CsvError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("File is not valid UTF-8")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Missing column in header: {0}")]
    MissingColumn(&'static str),

    #[error(transparent)]
    Store(#[from] AppError),

    #[error(transparent)]
    Seaorm(#[from] DbErr),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Encoding {
    /// ISO-8859-1, what spreadsheet exports usually produce.
    #[default]
    Latin1,
    Utf8,
}

impl Encoding {
    pub fn decode(self, bytes: Vec<u8>) -> Result<String, CsvError> {
        let text = match self {
            Encoding::Latin1 => bytes.iter().copied().map(char::from).collect(),
            Encoding::Utf8 => String::from_utf8(bytes)?,
        };
        Ok(match text.strip_prefix('\u{feff}') {
            Some(rest) => rest.to_string(),
            None => text,
        })
    }
}

/// One data line of the import file, as read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImportRow {
    #[serde(skip)]
    pub line: u64,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "party")]
    pub household_name: String,
    pub is_child: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Created,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowOutcome {
    pub line: u64,
    pub guest_id: i32,
    pub name: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub rows: Vec<RowOutcome>,
    pub skipped: Vec<SkippedRow>,
    pub households_created: usize,
}

impl ImportReport {
    pub fn created(&self) -> usize {
        self.count(Outcome::Created)
    }

    pub fn updated(&self) -> usize {
        self.count(Outcome::Updated)
    }

    fn count(&self, outcome: Outcome) -> usize {
        self.rows.iter().filter(|r| r.outcome == outcome).count()
    }
}

/// Collapses Excel's non-breaking spaces and trims.
pub fn normalize_household_name(raw: &str) -> String {
    raw.trim().replace(NBSP, " ")
}

pub fn parse_is_child(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("yes")
}

/// Splits the file into rows. Records the reader cannot make sense of are
/// returned as skipped rather than failing the whole file; a header without
/// the required columns does fail it.
pub fn parse_rows(text: &str) -> Result<(Vec<ImportRow>, Vec<SkippedRow>), CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(CsvError::MissingColumn(column));
        }
    }

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or_default();
                skipped.push(SkippedRow {
                    line,
                    reason: err.to_string(),
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        match record.deserialize::<ImportRow>(Some(&headers)) {
            Ok(row) => rows.push(ImportRow { line, ..row }),
            Err(err) => skipped.push(SkippedRow {
                line,
                reason: err.to_string(),
            }),
        }
    }
    Ok((rows, skipped))
}

/// Upserts every row in order. Later rows see the households earlier rows
/// created, so running the same rows twice only ever updates.
pub async fn import<C: ConnectionTrait>(
    db: &C,
    rows: Vec<ImportRow>,
) -> Result<ImportReport, CsvError> {
    let mut report = ImportReport::default();

    for row in rows {
        let first_name = row.first_name.trim();
        let last_name = row.last_name.trim();
        let household_name = normalize_household_name(&row.household_name);
        let is_child = parse_is_child(&row.is_child);

        if first_name.is_empty() {
            warn!(line = row.line, "Skipping row without first name");
            report.skipped.push(SkippedRow {
                line: row.line,
                reason: "first_name is empty".to_string(),
            });
            continue;
        }

        let household_id = if household_name.is_empty() {
            None
        } else {
            let household = match store::find_household_by_name_ci(db, &household_name).await? {
                Some(existing) => existing,
                None => {
                    report.households_created += 1;
                    info!("Creating household {household_name}");
                    store::create_household(db, &household_name).await?
                }
            };
            Some(household.id)
        };

        let last = (!last_name.is_empty()).then_some(last_name);
        let upsert = store::upsert_guest(db, first_name, last, household_id, is_child).await?;
        let guest = upsert.guest();
        let outcome = match upsert {
            store::Upsert::Created(_) => {
                info!("+ Created {}", guest.name());
                Outcome::Created
            }
            store::Upsert::Updated(_) => {
                info!("~ Updated {}", guest.name());
                Outcome::Updated
            }
        };
        report.rows.push(RowOutcome {
            line: row.line,
            guest_id: guest.id,
            name: guest.name(),
            outcome,
        });
    }

    Ok(report)
}

pub async fn import_file<C: ConnectionTrait>(
    db: &C,
    path: &Path,
    encoding: Encoding,
) -> Result<ImportReport, CsvError> {
    info!("Importing from {}...", path.display());
    let text = encoding.decode(fs::read(path)?)?;
    let (rows, unreadable) = parse_rows(&text)?;
    for row in &unreadable {
        warn!(line = row.line, "Skipping unreadable row: {}", row.reason);
    }

    let mut report = import(db, rows).await?;
    report.skipped.extend(unreadable);
    report.skipped.sort_by_key(|row| row.line);

    info!(
        created = report.created(),
        updated = report.updated(),
        skipped = report.skipped.len(),
        households_created = report.households_created,
        "Import finished"
    );
    Ok(report)
}

/// Dumps every guest in the import layout, plus attendance and comments.
pub async fn export_guests<C: ConnectionTrait>(db: &C, delimiter: u8) -> Result<String, CsvError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(REQUIRED_COLUMNS.iter().chain(&["is_attending", "comments"]))?;

    for (guest, household) in store::all_guests_with_household(db).await? {
        let is_attending = match guest.is_attending {
            Some(true) => "yes",
            Some(false) => "no",
            None => "",
        };
        writer.write_record([
            guest.first_name.as_str(),
            guest.last_name.as_deref().unwrap_or(""),
            household.as_ref().map(|h| h.name.as_str()).unwrap_or(""),
            if guest.is_child { "yes" } else { "no" },
            is_attending,
            guest.comments.as_deref().unwrap_or(""),
        ])?;
    }

    let bytes = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{database::tests::test_db, entities::household, store::guests_of};
    use sea_orm::{EntityTrait, PaginatorTrait};
    use std::io::Write;

    const HEADER: &str = "first_name;last_name;party;is_child\n";

    fn row(line: u64, first: &str, last: &str, party: &str, child: &str) -> ImportRow {
        ImportRow {
            line,
            first_name: first.into(),
            last_name: last.into(),
            household_name: party.into(),
            is_child: child.into(),
        }
    }

    #[test]
    fn household_names_are_normalized() {
        assert_eq!(normalize_household_name("  Smith\u{a0}Family "), "Smith Family");
        assert_eq!(normalize_household_name("\u{a0}"), "");
    }

    #[test]
    fn only_yes_means_child() {
        assert!(parse_is_child("yes"));
        assert!(parse_is_child(" YES "));
        assert!(!parse_is_child("y"));
        assert!(!parse_is_child("true"));
        assert!(!parse_is_child(""));
    }

    #[test]
    fn latin1_is_decoded_byte_for_byte() {
        let bytes = b"first_name;last_name;party;is_child\nJos\xe9;M\xfcller;F\xeate;no\n".to_vec();
        let text = Encoding::Latin1.decode(bytes).unwrap();
        assert!(text.contains("José;Müller;Fête"));

        let utf8 = "\u{feff}a;b".as_bytes().to_vec();
        assert_eq!(Encoding::Utf8.decode(utf8).unwrap(), "a;b");
        assert!(Encoding::Utf8.decode(vec![0xff, 0xfe, 0x41]).is_err());
    }

    #[test]
    fn header_columns_may_be_padded_and_reordered() {
        let text = "is_child ; party ; last_name ; first_name; email\nyes;Smith;Doe;John;x@y\n";
        let (rows, skipped) = parse_rows(text).unwrap();
        assert!(skipped.is_empty());
        assert_eq!(rows, vec![row(2, "John", "Doe", "Smith", "yes")]);
    }

    #[test]
    fn missing_column_aborts() {
        let err = parse_rows("first_name;last_name;is_child\nJohn;Doe;no\n").unwrap_err();
        assert!(matches!(err, CsvError::MissingColumn("party")));
    }

    #[test]
    fn short_rows_are_skipped_with_their_line() {
        let text = format!("{HEADER}John;Doe;Smith;no\nbroken;row\nJane;Doe;Smith;no\n");
        let (rows, skipped) = parse_rows(&text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].line, 3);
    }

    #[tokio::test]
    async fn import_twice_only_updates() {
        let db = test_db().await;
        let rows = vec![row(2, "John", "Doe", "Smith Family", "yes")];

        let first = import(&db, rows.clone()).await.unwrap();
        assert_eq!(first.created(), 1);
        assert_eq!(first.households_created, 1);

        let second = import(&db, rows).await.unwrap();
        assert_eq!(second.created(), 0);
        assert_eq!(second.updated(), 1);
        assert_eq!(second.households_created, 0);
        assert_eq!(second.rows[0].guest_id, first.rows[0].guest_id);

        assert_eq!(household::Entity::find().count(&db).await.unwrap(), 1);
        let household = household::Entity::find().one(&db).await.unwrap().unwrap();
        assert_eq!(household.name, "Smith Family");
        let guests = guests_of(&db, household.id).await.unwrap();
        assert_eq!(guests.len(), 1);
        assert!(guests[0].is_child);
        assert_eq!(guests[0].is_attending, None);
    }

    #[tokio::test]
    async fn households_match_case_insensitively_and_keep_first_casing() {
        let db = test_db().await;
        let rows = vec![
            row(2, "John", "Smith", "Smith Family", "no"),
            row(3, "Jane", "Smith", "smith family", "no"),
            row(4, "Baby", "Smith", "SMITH\u{a0}FAMILY", "yes"),
        ];

        let report = import(&db, rows).await.unwrap();
        assert_eq!(report.created(), 3);
        assert_eq!(report.households_created, 1);

        let households = household::Entity::find().all(&db).await.unwrap();
        assert_eq!(households.len(), 1);
        assert_eq!(households[0].name, "Smith Family");
        assert_eq!(guests_of(&db, households[0].id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn reimport_updates_child_flag_in_place() {
        let db = test_db().await;
        import(&db, vec![row(2, "Léa", "", "Martin", "no")]).await.unwrap();
        let report = import(&db, vec![row(2, " Léa ", " ", "Martin", "Yes")])
            .await
            .unwrap();

        assert_eq!(report.updated(), 1);
        let household = household::Entity::find().one(&db).await.unwrap().unwrap();
        let guests = guests_of(&db, household.id).await.unwrap();
        assert_eq!(guests.len(), 1);
        assert!(guests[0].is_child);
        assert_eq!(guests[0].last_name, None);
    }

    #[tokio::test]
    async fn rows_without_first_name_are_skipped_and_the_rest_imported() {
        let db = test_db().await;
        let rows = vec![
            row(2, "", "Doe", "Doe", "no"),
            row(3, "Jane", "Doe", "Doe", "no"),
        ];

        let report = import(&db, rows).await.unwrap();
        assert_eq!(report.created(), 1);
        assert_eq!(report.skipped, vec![SkippedRow {
            line: 2,
            reason: "first_name is empty".into()
        }]);
    }

    #[tokio::test]
    async fn empty_household_leaves_guest_unassigned() {
        let db = test_db().await;
        let report = import(&db, vec![row(2, "Solo", "Traveller", "  ", "no")])
            .await
            .unwrap();

        assert_eq!(report.created(), 1);
        assert_eq!(report.households_created, 0);
        assert_eq!(store::unassigned_guests(&db).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn import_file_reads_latin1_and_reports_bad_lines() {
        let db = test_db().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"first_name;last_name;party;is_child\n").unwrap();
        file.write_all(b"Ren\xe9;Dupr\xe9;Famille Dupr\xe9;no\n").unwrap();
        file.write_all(b"oops\n").unwrap();
        file.write_all(b";Nobody;Famille Dupr\xe9;no\n").unwrap();

        let report = import_file(&db, file.path(), Encoding::Latin1).await.unwrap();
        assert_eq!(report.created(), 1);
        assert_eq!(report.rows[0].name, "René Dupré");
        let lines: Vec<u64> = report.skipped.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![3, 4]);

        let household = household::Entity::find().one(&db).await.unwrap().unwrap();
        assert_eq!(household.name, "Famille Dupré");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let db = test_db().await;
        let dir = tempfile::tempdir().unwrap();
        let err = import_file(&db, &dir.path().join("nope.csv"), Encoding::Utf8)
            .await
            .unwrap_err();
        assert!(matches!(err, CsvError::Io(_)));
    }

    #[tokio::test]
    async fn export_mirrors_the_import_layout() {
        let db = test_db().await;
        import(
            &db,
            vec![
                row(2, "John", "Doe", "Smith Family", "yes"),
                row(3, "Ann", "", "Abbott", "no"),
            ],
        )
        .await
        .unwrap();

        let csv = export_guests(&db, b';').await.unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "first_name;last_name;party;is_child;is_attending;comments",
                "Ann;;Abbott;no;;",
                "John;Doe;Smith Family;yes;;",
            ]
        );

        // Feeding the export back in changes nothing.
        let (rows, skipped) = parse_rows(&csv).unwrap();
        assert!(skipped.is_empty());
        let report = import(&db, rows).await.unwrap();
        assert_eq!(report.created(), 0);
        assert_eq!(report.updated(), 2);
    }
}
