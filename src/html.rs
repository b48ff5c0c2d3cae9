//! HTML rendering for `/__health`'s non-JSON branch.
//!
//! spec.md §1 treats this as a pure template external to the tested core;
//! this is a direct port of `original_source/handlers.go`'s `htmlHandler`
//! to a `format!`-based function so the `Accept` branch in
//! [`crate::handlers`] has something real to call and test.

use crate::domain::HealthResult;

const PAGE: &str = "<!DOCTYPE html><head><title>Coco</title></head><body><h2>{title}</h2><dl><dt>Services:</dt>{rows}</dl></body></html>";

pub fn render(title: &str, result: &HealthResult) -> String {
    let mut rows = String::new();
    for check in &result.checks {
        let url = format!("/health/{}/__health", check.name);
        let status = if check.ok { "OK" } else { "CRITICAL" };
        rows.push_str(&format!(
            "<dd>- <a href=\"{url}\">{}</a>  : {status}</dd>",
            check.name
        ));
    }
    PAGE.replace("{title}", title).replace("{rows}", &rows)
}
