//! HTML rendering of upload task status.

use serde::Serialize;

use crate::salesforce::{row_failed, UploadResult};
use crate::storage::{TaskState, UploadTask};

const SUCCESS_BANNER: &str = "Upload succeeded.";
const PARTIAL_FAILURE_BANNER: &str = "Upload failed for one or more rows.";

/// Status query answer. `rendering` is only present once the task finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendering: Option<String>,
}

impl StatusPayload {
    fn pending() -> Self {
        Self {
            completed: false,
            rendering: None,
        }
    }

    fn done(html: String) -> Self {
        Self {
            completed: true,
            rendering: Some(html),
        }
    }
}

/// Renders the status of a task.
///
/// A missing task renders as not completed; callers that need to tell an
/// unknown id apart check for `None` first.
pub fn render_status(task: Option<&UploadTask>) -> StatusPayload {
    let Some(task) = task else {
        return StatusPayload::pending();
    };

    match task.state {
        TaskState::Pending | TaskState::Running => StatusPayload::pending(),
        TaskState::Succeeded => match &task.result {
            Some(result) => StatusPayload::done(render_result(result)),
            None => StatusPayload::done(render_error("no result was recorded")),
        },
        TaskState::Failed => StatusPayload::done(render_error(
            task.error.as_deref().unwrap_or("unknown error"),
        )),
    }
}

/// Banner, summary and per-row table for a finished upload.
pub fn render_result(result: &UploadResult) -> String {
    let mut html = String::new();

    if result.has_failures() {
        html.push_str(&banner("alert-danger", PARTIAL_FAILURE_BANNER));
    } else {
        html.push_str(&banner("alert-success", SUCCESS_BANNER));
    }

    let processed = result.data_rows().len();
    html.push_str(&format!(
        "<p class=\"upload-summary\">Processed: {}, Failed: {}, Remaining: {}</p>\n",
        processed, result.failed, result.remaining
    ));

    html.push_str("<table class=\"table\">\n<thead><tr>");
    for name in result.header() {
        html.push_str(&format!("<th>{}</th>", escape_html(name)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for row in result.data_rows() {
        if row_failed(row) {
            html.push_str("<tr class=\"danger\">");
        } else {
            html.push_str("<tr>");
        }
        for cell in row {
            html.push_str(&format!("<td>{}</td>", escape_html(cell)));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n");
    html
}

/// Failure banner carrying the error text.
pub fn render_error(message: &str) -> String {
    banner("alert-danger", &format!("Upload failed: {}", message))
}

fn banner(class: &str, message: &str) -> String {
    format!(
        "<div class=\"alert {}\">{}</div>\n",
        class,
        escape_html(message)
    )
}

/// Escapes text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn task(state: TaskState, result: Option<UploadResult>, error: Option<&str>) -> UploadTask {
        UploadTask {
            task_id: "t-1".into(),
            table: "public.accounts".into(),
            object: "Accounts".into(),
            state,
            result,
            error: error.map(str::to_string),
            created_at: 1,
            updated_at: 2,
        }
    }

    fn header() -> Vec<String> {
        strings(&["Id", "Success", "Created", "name", "email", "Error"])
    }

    #[test]
    fn unfinished_tasks_are_not_completed() {
        for state in [TaskState::Pending, TaskState::Running] {
            let payload = render_status(Some(&task(state, None, None)));
            assert_eq!(payload, StatusPayload::pending());
        }
        assert_eq!(render_status(None), StatusPayload::pending());
    }

    #[test]
    fn pending_payload_omits_rendering() {
        let json = serde_json::to_value(StatusPayload::pending()).unwrap();
        assert_eq!(json, serde_json::json!({"completed": false}));
    }

    #[test]
    fn all_rows_succeeded() {
        let result = UploadResult {
            rows: vec![header(), strings(&["001A", "true", "true", "Acme", "a@b.com", ""])],
            failed: 0,
            remaining: 0,
        };
        let html = render_status(Some(&task(TaskState::Succeeded, Some(result), None)))
            .rendering
            .unwrap();

        assert!(html.contains("alert-success"));
        assert!(html.contains(SUCCESS_BANNER));
        assert!(!html.contains("class=\"danger\""));
        assert!(html.contains("<td>Acme</td>"));
        assert!(html.contains("Processed: 1, Failed: 0, Remaining: 0"));
    }

    #[test]
    fn failed_row_is_flagged() {
        let result = UploadResult {
            rows: vec![
                header(),
                strings(&["001A", "true", "true", "Acme", "a@b.com", ""]),
                strings(&["", "false", "false", "Bolt", "", "REQUIRED_FIELD_MISSING"]),
            ],
            failed: 1,
            remaining: 0,
        };
        let html = render_status(Some(&task(TaskState::Succeeded, Some(result), None)))
            .rendering
            .unwrap();

        assert!(html.contains(PARTIAL_FAILURE_BANNER));
        assert!(html.contains("alert-danger"));
        assert_eq!(html.matches("<tr class=\"danger\">").count(), 1);
        assert!(html.contains("<td>REQUIRED_FIELD_MISSING</td>"));
    }

    #[test]
    fn failed_task_shows_error_text() {
        let payload = render_status(Some(&task(
            TaskState::Failed,
            None,
            Some("Connection failed: could not connect to server"),
        )));

        assert!(payload.completed);
        let html = payload.rendering.unwrap();
        assert!(html.contains("alert-danger"));
        assert!(html.contains("Upload failed: Connection failed: could not connect to server"));
    }

    #[test]
    fn cells_and_messages_are_escaped() {
        let result = UploadResult {
            rows: vec![header(), strings(&["1", "true", "true", "<b>A&B</b>", "\"q\"", ""])],
            failed: 0,
            remaining: 0,
        };
        let html = render_result(&result);
        assert!(html.contains("<td>&lt;b&gt;A&amp;B&lt;/b&gt;</td>"));
        assert!(html.contains("<td>&quot;q&quot;</td>"));

        let error = render_error("<script>alert(1)</script>");
        assert!(!error.contains("<script>"));
    }
}
