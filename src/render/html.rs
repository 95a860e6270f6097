use crate::aggregate::{format_percentage, ModuleSummary, Report, StatementCounts};
use crate::consts;

use super::assets::{SCRIPT_FILE, STYLE_FILE};

fn escape_html(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Progress bar color class for a coverage percentage.
pub fn progress_class(percentage: u32) -> &'static str {
    if percentage < 30 {
        "bg-danger"
    } else if percentage < 70 {
        "bg-warning"
    } else {
        "bg-success"
    }
}

fn render_head(out: &mut String, title: &str) {
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    out.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
    );
    out.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    out.push_str(&format!(
        "<link rel=\"stylesheet\" href=\"{STYLE_FILE}\">\n<script src=\"{SCRIPT_FILE}\" defer></script>\n"
    ));
    out.push_str("</head>\n<body>\n");
}

fn render_footer(out: &mut String, created_at: &str) {
    out.push_str(&format!(
        "<footer><p class=\"muted\">created at {}</p></footer>\n</body>\n</html>\n",
        escape_html(created_at)
    ));
}

fn render_progress(out: &mut String, counts: &StatementCounts) {
    out.push_str(&format!(
        "<div class=\"progress\" title=\"{}%\"><div class=\"progress-bar {}\" style=\"width: {}%\">{}%</div></div>",
        format_percentage(counts.reached, counts.statements, 1),
        progress_class(counts.percentage),
        counts.percentage,
        counts.percentage
    ));
}

fn render_counts_row(out: &mut String, label: &str, counts: &StatementCounts) {
    out.push_str(&format!(
        "<td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td><td class=\"coverage\">",
        label, counts.statements, counts.reached, counts.missed
    ));
    render_progress(out, counts);
    out.push_str("</td>");
}

pub(crate) fn index_page(report: &Report, created_at: &str) -> String {
    let mut out = String::new();
    render_head(&mut out, "Coverage report");

    out.push_str("<header>\n<h1>Coverage report</h1>\n");
    out.push_str(&format!(
        "<p>mode: <code>{}</code></p>\n</header>\n<main>\n",
        escape_html(&report.mode)
    ));

    out.push_str("<table class=\"index\">\n<thead><tr><th>File</th><th>Statements</th><th>Reached</th><th>Missed</th><th>Coverage</th></tr></thead>\n<tbody>\n");
    for module in &report.modules {
        out.push_str("<tr>");
        let label = format!(
            "<a href=\"{}\">{}</a>",
            escape_html(&module.html_link),
            escape_html(&module.display_file)
        );
        render_counts_row(&mut out, &label, &module.counts);
        out.push_str("</tr>\n");
    }
    out.push_str("</tbody>\n<tfoot><tr class=\"total\">");
    render_counts_row(&mut out, "Total", &report.totals);
    out.push_str("</tr></tfoot>\n</table>\n</main>\n");

    render_footer(&mut out, created_at);
    out
}

pub(crate) fn file_page(summary: &ModuleSummary, lines: &[String], created_at: &str) -> String {
    let mut out = String::new();
    render_head(&mut out, &summary.display_file);

    out.push_str(&format!(
        "<header>\n<p><a href=\"{}\">&larr; index</a></p>\n<h1>{}</h1>\n",
        consts::INDEX_FILE,
        escape_html(&summary.display_file)
    ));
    out.push_str(&format!(
        "<p>{} statements, {} reached, {} missed</p>\n",
        summary.counts.statements, summary.counts.reached, summary.counts.missed
    ));
    render_progress(&mut out, &summary.counts);
    out.push_str(
        "\n<p><button type=\"button\" id=\"toggle-missed\">toggle missed</button></p>\n</header>\n",
    );

    out.push_str("<main>\n<table class=\"source\">\n");
    for (idx, line) in lines.iter().enumerate() {
        let number = u32::try_from(idx + 1).unwrap_or(u32::MAX);
        out.push_str(&format!(
            "<tr class=\"{}\"><td class=\"num\">{}</td><td class=\"src\"><pre>{}</pre></td></tr>\n",
            summary.classify(number).css_class(),
            number,
            escape_html(line)
        ));
    }
    out.push_str("</table>\n</main>\n");

    render_footer(&mut out, created_at);
    out
}
