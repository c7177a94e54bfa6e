use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

pub const IN_PROGRESS: &str = "In Progress";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub task_type: String,
    pub status: String,
    pub resource: String,
    /// Numeric cells left blank in the source are `None`.
    pub story_points: Option<f64>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub defects_reported: Option<i64>,
    pub rework_hours: Option<f64>,
    pub date: NaiveDateTime,
    pub start_date: NaiveDateTime,
    pub end_date: NaiveDateTime,
    /// Whole days from start to end, floored, so it may be negative.
    pub cycle_time: i64,
    pub sprint: u32,
}

impl TaskRecord {
    pub fn time_slippage(&self) -> Option<f64> {
        Some(self.actual_hours? - self.estimated_hours?)
    }

    /// Calendar day of the event, the key burndown and flow charts group by.
    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }
}

/// Every row of one load, with derived columns filled in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub rows: Vec<TaskRecord>,
}

impl NormalizedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Area,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskValue {
    pub task_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: String,
    pub value: f64,
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatedCount {
    pub date: NaiveDate,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowRow {
    pub date: NaiveDate,
    /// Running totals, aligned with `CumulativeFlow::statuses`.
    pub counts: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CumulativeFlow {
    pub statuses: Vec<String>,
    pub rows: Vec<FlowRow>,
}

impl CumulativeFlow {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart<T> {
    pub title: String,
    pub kind: ChartKind,
    pub data: T,
}

impl<T> Chart<T> {
    pub fn new(title: impl Into<String>, kind: ChartKind, data: T) -> Self {
        Self {
            title: title.into(),
            kind,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageOne {
    pub sprint: u32,
    pub velocity: Chart<Vec<TaskValue>>,
    pub cycle_time: Chart<Vec<TaskValue>>,
    pub defect_rate: Chart<Vec<TaskValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageTwo {
    pub sprint: u32,
    pub time_slippage: Chart<Vec<TaskValue>>,
    pub burndown: Chart<Vec<DatedCount>>,
    pub lead_time: Chart<Vec<TaskValue>>,
    pub resource_utilization: Chart<Vec<CategoryShare>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageThree {
    pub sprint: u32,
    pub rework: Chart<Vec<TaskValue>>,
    pub task_distribution: Chart<Vec<CategoryShare>>,
    pub cumulative_flow: Chart<CumulativeFlow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum PageView {
    One(PageOne),
    Two(PageTwo),
    Three(PageThree),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SprintOption {
    pub sprint: u32,
    pub label: String,
    pub task_count: usize,
}
