use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use tracing::debug;

use crate::error::LoadError;
use crate::models::{NormalizedTable, TaskRecord};

pub const SPRINT_LENGTH_DAYS: i64 = 14;

const SECONDS_PER_DAY: i64 = 86_400;

pub const REQUIRED_COLUMNS: [&str; 12] = [
    "Task_ID",
    "Task_Type",
    "Status",
    "Resource",
    "Story_Points",
    "Estimated_Hours",
    "Actual_Hours",
    "Defects_Reported",
    "Rework_Hours",
    "Date",
    "Start_Date",
    "End_Date",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Where the dataset lives: an http(s) URL or a path on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Url(String),
    File(PathBuf),
}

impl Source {
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.starts_with("http://") || value.starts_with("https://") {
            Source::Url(value.to_string())
        } else {
            Source::File(PathBuf::from(value))
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Url(url) => write!(f, "{url}"),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

#[derive(Deserialize)]
struct CsvRow {
    #[serde(rename = "Task_ID")]
    task_id: String,
    #[serde(rename = "Task_Type")]
    task_type: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "Resource")]
    resource: String,
    #[serde(rename = "Story_Points")]
    story_points: Option<f64>,
    #[serde(rename = "Estimated_Hours")]
    estimated_hours: Option<f64>,
    #[serde(rename = "Actual_Hours")]
    actual_hours: Option<f64>,
    #[serde(rename = "Defects_Reported")]
    defects_reported: Option<i64>,
    #[serde(rename = "Rework_Hours")]
    rework_hours: Option<f64>,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Start_Date")]
    start_date: String,
    #[serde(rename = "End_Date")]
    end_date: String,
}

/// Fetches and normalizes the dataset. The fetch is bounded by `timeout`.
pub async fn load(source: &Source, timeout: Duration) -> Result<NormalizedTable, LoadError> {
    let body = fetch(source, timeout).await?;
    let table = normalize(&body, &source.to_string())?;
    debug!(source = %source, rows = table.len(), "dataset normalized");
    Ok(table)
}

pub async fn fetch(source: &Source, timeout: Duration) -> Result<String, LoadError> {
    match tokio::time::timeout(timeout, fetch_body(source)).await {
        Ok(body) => body,
        Err(_) => Err(LoadError::unavailable(
            source.to_string(),
            format!("fetch timed out after {}s", timeout.as_secs()),
        )),
    }
}

async fn fetch_body(source: &Source) -> Result<String, LoadError> {
    let location = source.to_string();
    match source {
        Source::Url(url) => {
            let response = reqwest::Client::new()
                .get(url)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(|e| LoadError::unavailable(&location, e))?;
            response
                .text()
                .await
                .map_err(|e| LoadError::unavailable(&location, e))
        }
        Source::File(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|e| LoadError::unavailable(&location, e)),
    }
}

/// Parses delimited text into a table and derives `cycle_time` and `sprint`.
///
/// Any unparseable date rejects the whole load. Blank numeric cells load as
/// `None`; non-blank ones that do not parse are malformed data.
pub fn normalize(body: &str, location: &str) -> Result<NormalizedTable, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| LoadError::unavailable(location, e))?
        .clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::SchemaMismatch { missing });
    }

    let mut rows = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let raw = result.map_err(|e| LoadError::unavailable(location, e))?;
        let row = index + 1;
        let date = parse_timestamp(row, "Date", &raw.date)?;
        let start_date = parse_timestamp(row, "Start_Date", &raw.start_date)?;
        let end_date = parse_timestamp(row, "End_Date", &raw.end_date)?;

        rows.push(TaskRecord {
            task_id: raw.task_id,
            task_type: raw.task_type,
            status: raw.status,
            resource: raw.resource,
            story_points: raw.story_points,
            estimated_hours: raw.estimated_hours,
            actual_hours: raw.actual_hours,
            defects_reported: raw.defects_reported,
            rework_hours: raw.rework_hours,
            date,
            start_date,
            end_date,
            cycle_time: whole_days(start_date, end_date),
            sprint: 0,
        });
    }

    assign_sprints(&mut rows);
    Ok(NormalizedTable { rows })
}

fn assign_sprints(rows: &mut [TaskRecord]) {
    let Some(first) = rows.iter().map(|row| row.date).min() else {
        return;
    };
    for row in rows.iter_mut() {
        row.sprint = sprint_for(first, row.date);
    }
}

/// Floor of the elapsed days, so `-1 day +2h` counts as -1.
pub fn whole_days(from: NaiveDateTime, to: NaiveDateTime) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

pub fn sprint_for(first: NaiveDateTime, date: NaiveDateTime) -> u32 {
    let elapsed = (date - first).num_seconds().max(0);
    (elapsed / (SPRINT_LENGTH_DAYS * SECONDS_PER_DAY)) as u32 + 1
}

/// Accepts calendar dates (read as midnight) and timestamps. Offsets are
/// converted to UTC.
pub fn parse_timestamp(
    row: usize,
    column: &'static str,
    value: &str,
) -> Result<NaiveDateTime, LoadError> {
    let trimmed = value.trim();
    let parsed = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|datetime| datetime.naive_utc())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        });

    parsed.ok_or_else(|| LoadError::DateParse {
        row,
        column,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::SocketAddr;
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const HEADER: &str = "Task_ID,Task_Type,Status,Resource,Story_Points,Estimated_Hours,\
                          Actual_Hours,Defects_Reported,Rework_Hours,Date,Start_Date,End_Date";

    fn csv_with(rows: &[&str]) -> String {
        let mut body = String::from(HEADER);
        for row in rows {
            body.push('\n');
            body.push_str(row);
        }
        body.push('\n');
        body
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    /// Serves `response` verbatim to the first connection, after reading its request.
    async fn serve_once(response: String) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = vec![0u8; 4096];
            let _ = socket.read(&mut request).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        addr
    }

    #[test]
    fn derives_cycle_time_and_sprint() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-01,2024-01-04",
            "T2,Bug,In Progress,Jules,3,4,3.5,0,0,2024-01-20,2024-01-18,2024-01-21",
        ]);
        let table = normalize(&body, "inline").unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].cycle_time, 3);
        assert_eq!(table.rows[0].sprint, 1);
        assert_eq!(table.rows[1].cycle_time, 3);
        assert_eq!(table.rows[1].sprint, 2);
        assert_eq!(table.rows[1].time_slippage(), Some(-0.5));
    }

    #[test]
    fn negative_cycle_time_passes_through() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,2,2024-01-05,2024-01-10,2024-01-07",
        ]);
        let table = normalize(&body, "inline").unwrap();
        assert_eq!(table.rows[0].cycle_time, -3);
    }

    #[test]
    fn cycle_time_floors_partial_days() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-01 20:00:00,2024-01-05 08:00:00",
            "T2,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-05 08:00:00,2024-01-04 10:00:00",
        ]);
        let table = normalize(&body, "inline").unwrap();
        assert_eq!(table.rows[0].cycle_time, 3);
        assert_eq!(table.rows[1].cycle_time, -1);
    }

    #[test]
    fn sprints_use_time_of_day() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01 12:00:00,2024-01-01,2024-01-02",
            "T2,Feature,Done,Avery,5,10,12,1,2,2024-01-15 06:00:00,2024-01-15,2024-01-16",
            "T3,Feature,Done,Avery,5,10,12,1,2,2024-01-15 12:00:00,2024-01-15,2024-01-16",
        ]);
        let table = normalize(&body, "inline").unwrap();
        let sprints: Vec<u32> = table.rows.iter().map(|row| row.sprint).collect();
        assert_eq!(sprints, vec![1, 1, 2]);
    }

    #[test]
    fn sprints_step_every_fourteen_days() {
        let first = at(2024, 1, 1, 0, 0);
        assert_eq!(sprint_for(first, at(2024, 1, 1, 0, 0)), 1);
        assert_eq!(sprint_for(first, at(2024, 1, 14, 23, 59)), 1);
        assert_eq!(sprint_for(first, at(2024, 1, 15, 0, 0)), 2);
        assert_eq!(sprint_for(first, at(2024, 1, 28, 0, 0)), 2);
        assert_eq!(sprint_for(first, at(2024, 1, 29, 0, 0)), 3);
    }

    #[test]
    fn sprints_are_relative_to_minimum_date_not_row_order() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,2,2024-02-01,2024-02-01,2024-02-02",
            "T2,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-01,2024-01-02",
        ]);
        let table = normalize(&body, "inline").unwrap();
        assert_eq!(table.rows[0].sprint, 3);
        assert_eq!(table.rows[1].sprint, 1);
    }

    #[test]
    fn reports_every_missing_column() {
        let body = "Task_ID,Task_Type,Status,Resource,Story_Points,Estimated_Hours,\
                    Actual_Hours,Defects_Reported,Rework_Hours,Date\n\
                    T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01\n";
        let err = normalize(body, "inline").unwrap_err();
        assert_eq!(
            err,
            LoadError::SchemaMismatch {
                missing: vec!["Start_Date".to_string(), "End_Date".to_string()],
            }
        );
    }

    #[test]
    fn unparseable_date_rejects_load() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-01,2024-01-04",
            "T2,Feature,Done,Avery,5,10,12,1,2,2024-01-02,not-a-date,2024-01-04",
        ]);
        let err = normalize(&body, "inline").unwrap_err();
        assert_eq!(
            err,
            LoadError::DateParse {
                row: 2,
                column: "Start_Date",
                value: "not-a-date".to_string(),
            }
        );
    }

    #[test]
    fn empty_date_rejects_load() {
        let body = csv_with(&["T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-01,"]);
        let err = normalize(&body, "inline").unwrap_err();
        assert!(matches!(err, LoadError::DateParse { column: "End_Date", .. }));
    }

    #[test]
    fn blank_numeric_cells_load_as_missing() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,,2024-01-01,2024-01-01,2024-01-04",
            "T2,Bug,Done,Jules,,,6, ,1,2024-01-02,2024-01-01,2024-01-03",
        ]);
        let table = normalize(&body, "inline").unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0].rework_hours, None);
        assert_eq!(table.rows[0].story_points, Some(5.0));
        assert_eq!(table.rows[1].story_points, None);
        assert_eq!(table.rows[1].defects_reported, None);
        assert_eq!(table.rows[1].actual_hours, Some(6.0));
        assert_eq!(table.rows[1].time_slippage(), None);
    }

    #[test]
    fn non_numeric_cell_is_source_unavailable() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,five,10,12,1,2,2024-01-01,2024-01-01,2024-01-04",
        ]);
        let err = normalize(&body, "inline").unwrap_err();
        assert!(matches!(err, LoadError::SourceUnavailable { .. }));
    }

    #[test]
    fn accepts_timestamps_and_extra_columns() {
        let body = "Task_ID,Task_Type,Status,Resource,Story_Points,Estimated_Hours,\
                    Actual_Hours,Defects_Reported,Rework_Hours,Date,Start_Date,End_Date,Notes\n\
                    T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01 09:30:00,01/02/2024,\
                    2024-01-05T17:00:00+02:00,ignored\n";
        let table = normalize(body, "inline").unwrap();
        assert_eq!(table.rows[0].date, at(2024, 1, 1, 9, 30));
        assert_eq!(table.rows[0].start_date, at(2024, 1, 2, 0, 0));
        assert_eq!(table.rows[0].end_date, at(2024, 1, 5, 15, 0));
        assert_eq!(table.rows[0].cycle_time, 3);
    }

    #[test]
    fn header_only_yields_empty_table() {
        let table = normalize(&csv_with(&[]), "inline").unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn source_parse_distinguishes_urls_from_paths() {
        assert_eq!(
            Source::parse("https://example.com/data.csv"),
            Source::Url("https://example.com/data.csv".to_string())
        );
        assert_eq!(
            Source::parse("data/tasks.csv"),
            Source::File(PathBuf::from("data/tasks.csv"))
        );
    }

    #[tokio::test]
    async fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            csv_with(&["T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-01,2024-01-04"])
        )
        .unwrap();

        let source = Source::File(file.path().to_path_buf());
        let table = load(&source, Duration::from_secs(5)).await.unwrap();
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = Source::File(dir.path().join("absent.csv"));
        let err = load(&source, Duration::from_secs(5)).await.unwrap_err();
        assert!(matches!(err, LoadError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn loads_from_url() {
        let body = csv_with(&[
            "T1,Feature,Done,Avery,5,10,12,1,2,2024-01-01,2024-01-01,2024-01-04",
        ]);
        let addr = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/csv\r\nContent-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        ))
        .await;

        let source = Source::Url(format!("http://{addr}/tasks.csv"));
        let table = load(&source, Duration::from_secs(5)).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].task_id, "T1");
    }

    #[tokio::test]
    async fn error_status_is_source_unavailable() {
        let addr = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                .to_string(),
        )
        .await;

        let source = Source::Url(format!("http://{addr}/tasks.csv"));
        match load(&source, Duration::from_secs(5)).await {
            Err(LoadError::SourceUnavailable { reason, .. }) => assert!(reason.contains("404")),
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let source = Source::Url(format!("http://{addr}/tasks.csv"));
        let started = Instant::now();
        let err = load(&source, Duration::from_secs(1)).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            LoadError::SourceUnavailable { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected SourceUnavailable, got {other:?}"),
        }
    }
}
