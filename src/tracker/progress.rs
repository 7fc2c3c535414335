//! Markdown progress table returned alongside most tracker responses.

use std::collections::HashMap;
use std::fmt::Write;

use super::types::{Request, Task};

const DESCRIPTION_PREVIEW_CHARS: usize = 50;

/// Render one row per task of `request`, in creation order.
pub(crate) fn render_progress_table(request: &Request, tasks: &HashMap<String, Task>) -> String {
    let mut table = String::from("Progress Status:\n");
    table.push_str("| Task ID | Title | Description | Status | Approval |\n");
    table.push_str("|----------|----------|------|------|----------|\n");

    for task in request.tasks.iter().filter_map(|id| tasks.get(id)) {
        let approval = if task.resolution.approved {
            "✓ Approved"
        } else {
            "⏳ Pending"
        };
        let _ = writeln!(
            table,
            "| {} | {} | {} | {} | {} |",
            task.id,
            task.title,
            preview(&task.description),
            task.status.label(),
            approval
        );
    }

    table
}

fn preview(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        let head: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        description.to_string()
    }
}
