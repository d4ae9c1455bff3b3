//! HTML rendering for the emailed report and the sign-in result page.

use crate::report::Report;

/// Escape text for use inside HTML element content or attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// The report as a bordered HTML table, header first.
pub fn report_table(report: &Report) -> String {
    let mut html = String::from(
        "<table border=\"1\" style=\"border-collapse: collapse; width: 100%;\">\n<thead>\n<tr>",
    );
    for column in report.header() {
        html.push_str(&format!(
            "<th style=\"padding: 8px; text-align: left;\">{}</th>",
            escape(column)
        ));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");

    for cells in report.cell_rows() {
        html.push_str("<tr>");
        for cell in cells {
            html.push_str(&format!(
                "<td style=\"padding: 8px;\">{}</td>",
                escape(cell)
            ));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>");
    html
}

/// Complete message body: greeting, table and signature.
pub fn mail_body(report: &Report) -> String {
    format!(
        "<p>Dear Administrator,</p>\n\
         <p>Please find below the user report generated by the M365 User Management Tool:</p>\n\
         {}\n\
         <p>Regards,<br>M365 User Management Team</p>",
        report_table(report)
    )
}
