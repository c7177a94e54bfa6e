use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::metrics::{self, PageId};
use crate::models::{CategoryShare, Chart, DatedCount, NormalizedTable, PageView, TaskValue};

pub fn render_page(view: &PageView) -> String {
    let mut output = String::new();

    match view {
        PageView::One(page) => {
            let _ = writeln!(output, "## Page 1 (Sprint {})", page.sprint);
            write_task_chart(&mut output, &page.velocity);
            write_task_chart(&mut output, &page.cycle_time);
            write_task_chart(&mut output, &page.defect_rate);
        }
        PageView::Two(page) => {
            let _ = writeln!(output, "## Page 2 (Sprint {})", page.sprint);
            write_task_chart(&mut output, &page.time_slippage);
            write_dated_chart(&mut output, &page.burndown);
            write_task_chart(&mut output, &page.lead_time);
            write_share_chart(&mut output, &page.resource_utilization);
        }
        PageView::Three(page) => {
            let _ = writeln!(output, "## Page 3 (Sprint {})", page.sprint);
            write_task_chart(&mut output, &page.rework);
            write_share_chart(&mut output, &page.task_distribution);

            let flow = &page.cumulative_flow;
            let _ = writeln!(output);
            let _ = writeln!(output, "### {}", flow.title);
            if flow.data.is_empty() {
                let _ = writeln!(output, "No tasks in this sprint.");
            } else {
                let _ = writeln!(output, "| Date | {} |", flow.data.statuses.join(" | "));
                let _ = writeln!(output, "|---{}|", "|---".repeat(flow.data.statuses.len()));
                for row in &flow.data.rows {
                    let counts: Vec<String> = row.counts.iter().map(u64::to_string).collect();
                    let _ = writeln!(output, "| {} | {} |", row.date, counts.join(" | "));
                }
            }
        }
    }

    output
}

/// All three pages for one sprint, as a standalone markdown document.
pub fn build_report(
    table: &NormalizedTable,
    sprint: u32,
    source: &str,
    loaded_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let options = metrics::sprint_options(table);

    let _ = writeln!(output, "# Software Development Metrics Dashboard");
    let _ = writeln!(
        output,
        "Generated from {} (loaded {}, {} tasks)",
        source,
        loaded_at.format("%Y-%m-%d %H:%M:%S UTC"),
        table.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Sprints");

    if options.is_empty() {
        let _ = writeln!(output, "No sprints in this dataset.");
    } else {
        for option in &options {
            let marker = if option.sprint == sprint { " (selected)" } else { "" };
            let _ = writeln!(output, "- {}: {} tasks{}", option.label, option.task_count, marker);
        }
    }

    for page in PageId::ALL {
        let _ = writeln!(output);
        output.push_str(&render_page(&metrics::aggregate(table, sprint, page)));
    }

    output
}

fn write_task_chart(output: &mut String, chart: &Chart<Vec<TaskValue>>) {
    let _ = writeln!(output);
    let _ = writeln!(output, "### {}", chart.title);
    if chart.data.is_empty() {
        let _ = writeln!(output, "No tasks in this sprint.");
        return;
    }
    for point in &chart.data {
        let _ = writeln!(output, "- {}: {:.1}", point.task_id, point.value);
    }
}

fn write_dated_chart(output: &mut String, chart: &Chart<Vec<DatedCount>>) {
    let _ = writeln!(output);
    let _ = writeln!(output, "### {}", chart.title);
    if chart.data.is_empty() {
        let _ = writeln!(output, "No tasks in progress.");
        return;
    }
    for point in &chart.data {
        let _ = writeln!(output, "- {}: {}", point.date, point.count);
    }
}

fn write_share_chart(output: &mut String, chart: &Chart<Vec<CategoryShare>>) {
    let _ = writeln!(output);
    let _ = writeln!(output, "### {}", chart.title);
    if chart.data.is_empty() {
        let _ = writeln!(output, "No tasks in this sprint.");
        return;
    }
    for slice in &chart.data {
        let _ = writeln!(
            output,
            "- {}: {:.1} ({:.1}%)",
            slice.category,
            slice.value,
            slice.share * 100.0
        );
    }
}
