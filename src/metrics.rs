use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::models::{
    CategoryShare, Chart, ChartKind, CumulativeFlow, DatedCount, FlowRow, NormalizedTable,
    PageOne, PageThree, PageTwo, PageView, SprintOption, TaskRecord, TaskValue, IN_PROGRESS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageId {
    One,
    Two,
    Three,
}

impl PageId {
    pub const ALL: [PageId; 3] = [PageId::One, PageId::Two, PageId::Three];
}

impl FromStr for PageId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "page-1" | "page1" => Ok(PageId::One),
            "2" | "page-2" | "page2" => Ok(PageId::Two),
            "3" | "page-3" | "page3" => Ok(PageId::Three),
            other => Err(format!("unknown page {other:?}, expected 1, 2 or 3")),
        }
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let number = match self {
            PageId::One => 1,
            PageId::Two => 2,
            PageId::Three => 3,
        };
        write!(f, "Page {number}")
    }
}

/// Distinct sprint numbers in the table, ascending.
pub fn sprints(table: &NormalizedTable) -> Vec<u32> {
    let set: BTreeSet<u32> = table.rows.iter().map(|row| row.sprint).collect();
    set.into_iter().collect()
}

pub fn sprint_options(table: &NormalizedTable) -> Vec<SprintOption> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for row in &table.rows {
        *counts.entry(row.sprint).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(sprint, task_count)| SprintOption {
            sprint,
            label: format!("Sprint {sprint}"),
            task_count,
        })
        .collect()
}

pub fn default_sprint(table: &NormalizedTable) -> Option<u32> {
    table.rows.iter().map(|row| row.sprint).min()
}

pub fn filter_sprint(table: &NormalizedTable, sprint: u32) -> Vec<&TaskRecord> {
    table.rows.iter().filter(|row| row.sprint == sprint).collect()
}

pub fn aggregate(table: &NormalizedTable, sprint: u32, page: PageId) -> PageView {
    match page {
        PageId::One => PageView::One(page_one(table, sprint)),
        PageId::Two => PageView::Two(page_two(table, sprint)),
        PageId::Three => PageView::Three(page_three(table, sprint)),
    }
}

pub fn page_one(table: &NormalizedTable, sprint: u32) -> PageOne {
    let rows = filter_sprint(table, sprint);
    PageOne {
        sprint,
        velocity: Chart::new(
            format!("Velocity - Sprint {sprint}"),
            ChartKind::Bar,
            per_task(&rows, |row| row.story_points),
        ),
        cycle_time: Chart::new(
            format!("Cycle Time - Sprint {sprint}"),
            ChartKind::Line,
            per_task(&rows, |row| Some(row.cycle_time as f64)),
        ),
        defect_rate: Chart::new(
            format!("Defect Rate - Sprint {sprint}"),
            ChartKind::Bar,
            per_task(&rows, |row| row.defects_reported.map(|count| count as f64)),
        ),
    }
}

pub fn page_two(table: &NormalizedTable, sprint: u32) -> PageTwo {
    let rows = filter_sprint(table, sprint);
    PageTwo {
        sprint,
        time_slippage: Chart::new(
            "Time Slippage",
            ChartKind::Bar,
            per_task(&rows, TaskRecord::time_slippage),
        ),
        burndown: Chart::new("Sprint Burndown", ChartKind::Line, burndown(&rows)),
        lead_time: Chart::new(
            "Lead Time",
            ChartKind::Line,
            per_task(&rows, |row| Some(row.cycle_time as f64)),
        ),
        resource_utilization: Chart::new(
            "Resource Utilization",
            ChartKind::Pie,
            resource_utilization(&rows),
        ),
    }
}

pub fn page_three(table: &NormalizedTable, sprint: u32) -> PageThree {
    let rows = filter_sprint(table, sprint);
    PageThree {
        sprint,
        rework: Chart::new(
            "Rework",
            ChartKind::Bar,
            per_task(&rows, |row| row.rework_hours),
        ),
        task_distribution: Chart::new(
            "Task Distribution",
            ChartKind::Pie,
            task_distribution(&rows),
        ),
        cumulative_flow: Chart::new(
            "Cumulative Flow Diagram",
            ChartKind::Area,
            cumulative_flow(&rows),
        ),
    }
}

/// One point per task, in row order. Tasks with no value are left out.
fn per_task(
    rows: &[&TaskRecord],
    value: impl Fn(&TaskRecord) -> Option<f64>,
) -> Vec<TaskValue> {
    rows.iter()
        .filter_map(|&row| {
            Some(TaskValue {
                task_id: row.task_id.clone(),
                value: value(row)?,
            })
        })
        .collect()
}

/// Running count of "In Progress" rows per date, oldest first.
pub fn burndown(rows: &[&TaskRecord]) -> Vec<DatedCount> {
    let mut per_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for row in rows.iter().filter(|row| row.status == IN_PROGRESS) {
        *per_date.entry(row.day()).or_insert(0) += 1;
    }

    let mut remaining = 0;
    per_date
        .into_iter()
        .map(|(date, count)| {
            remaining += count;
            DatedCount {
                date,
                count: remaining,
            }
        })
        .collect()
}

/// Actual hours per resource, ordered by resource name. Blank hours count as 0.
pub fn resource_utilization(rows: &[&TaskRecord]) -> Vec<CategoryShare> {
    let mut hours: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        *hours.entry(row.resource.as_str()).or_insert(0.0) += row.actual_hours.unwrap_or(0.0);
    }
    with_shares(hours)
}

/// Task count per task type, ordered by type name.
pub fn task_distribution(rows: &[&TaskRecord]) -> Vec<CategoryShare> {
    let mut counts: BTreeMap<&str, f64> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.task_type.as_str()).or_insert(0.0) += 1.0;
    }
    with_shares(counts)
}

fn with_shares(values: BTreeMap<&str, f64>) -> Vec<CategoryShare> {
    let total: f64 = values.values().sum();
    values
        .into_iter()
        .map(|(category, value)| CategoryShare {
            category: category.to_string(),
            value,
            share: if total == 0.0 { 0.0 } else { value / total },
        })
        .collect()
}

/// Per-status running counts by date. Statuses absent on a date count as 0
/// for that date and carry the previous total forward.
pub fn cumulative_flow(rows: &[&TaskRecord]) -> CumulativeFlow {
    let statuses: Vec<String> = rows
        .iter()
        .map(|row| row.status.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut per_date: BTreeMap<NaiveDate, Vec<u64>> = BTreeMap::new();
    for row in rows {
        let counts = per_date
            .entry(row.day())
            .or_insert_with(|| vec![0; statuses.len()]);
        if let Ok(column) = statuses.binary_search(&row.status) {
            counts[column] += 1;
        }
    }

    let mut totals = vec![0; statuses.len()];
    let rows = per_date
        .into_iter()
        .map(|(date, counts)| {
            for (total, count) in totals.iter_mut().zip(counts) {
                *total += count;
            }
            FlowRow {
                date,
                counts: totals.clone(),
            }
        })
        .collect();

    CumulativeFlow { statuses, rows }
}
