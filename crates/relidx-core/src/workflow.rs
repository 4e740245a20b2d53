//! CI workflow outputs for a merged release.

use std::fmt::Write;

/// Escape a value so it survives a single `::set-output` line.
pub fn escape_output(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\n', "%0A")
        .replace('\r', "%0D")
}

/// `::set-output name=<key>::<value>` with the value escaped.
pub fn set_output_line(key: &str, value: &str) -> String {
    format!("::set-output name={key}::{}", escape_output(value))
}

/// Commit and pull request texts describing an index change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOutputs {
    pub commit_message: String,
    pub pr_title: String,
    pub pr_body: String,
}

impl ReleaseOutputs {
    /// `created` is whether the package was new to the index.
    pub fn new(name: &str, details: &str, body: &str, created: bool) -> Self {
        let title = if created {
            format!("Add {name}")
        } else {
            format!("Update {name}")
        };
        Self {
            commit_message: format!("{title}\n\n{body}"),
            pr_body: format!("## Repo link\n{details}\n\n## Release body\n{body}"),
            pr_title: title,
        }
    }

    /// The three outputs as workflow command lines, newline terminated.
    pub fn to_workflow_commands(&self) -> String {
        let mut out = String::new();
        for (key, value) in [
            ("commit_message", &self.commit_message),
            ("pr_title", &self.pr_title),
            ("pr_body", &self.pr_body),
        ] {
            let _ = writeln!(out, "{}", set_output_line(key, value));
        }
        out
    }
}
