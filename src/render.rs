//! Display surfaces for shaped sessions
//!
//! A surface receives session views in query order, or a single notice when
//! there is nothing to show. Three surfaces are provided: an aligned terminal
//! table, a standalone HTML page and a JSON document.

use std::io::{self, Write};

use owo_colors::OwoColorize;
use serde::Serialize;

use crate::classify::StateCategory;
use crate::fetch::FetchOutcome;
use crate::shape::{ReadingRow, SessionBody, SessionShaper, SessionView, READING_COLUMNS};

pub const NO_DATA_MESSAGE: &str = "No data available.";
pub const LOAD_ERROR_MESSAGE: &str = "Error loading data. Please try again later.";

/// Status messages shown instead of sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    NoData,
    LoadError,
}

impl Notice {
    pub fn message(self) -> &'static str {
        match self {
            Notice::NoData => NO_DATA_MESSAGE,
            Notice::LoadError => LOAD_ERROR_MESSAGE,
        }
    }
}

/// Append-only rendering target
pub trait DisplaySurface {
    fn append_session(&mut self, view: &SessionView) -> io::Result<()>;
    fn show_message(&mut self, notice: Notice) -> io::Result<()>;
}

/// Shape each fetched session and hand it to the surface in fetch order.
/// Returns the number of sessions shown.
pub fn present<S: DisplaySurface + ?Sized>(
    outcome: FetchOutcome,
    shaper: &SessionShaper,
    surface: &mut S,
) -> io::Result<usize> {
    match outcome {
        FetchOutcome::Loaded(sessions) => {
            for session in &sessions {
                surface.append_session(&shaper.shape_session(session))?;
            }
            Ok(sessions.len())
        }
        FetchOutcome::NoData => {
            surface.show_message(Notice::NoData)?;
            Ok(0)
        }
        FetchOutcome::LoadError(_) => {
            surface.show_message(Notice::LoadError)?;
            Ok(0)
        }
    }
}

// ============= Terminal =============

/// Plain-text tables, optionally with colored state cells
pub struct TextSurface<W: Write> {
    out: W,
    color: bool,
    sessions_written: usize,
}

impl<W: Write> TextSurface<W> {
    pub fn new(out: W, color: bool) -> Self {
        Self {
            out,
            color,
            sessions_written: 0,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, category: StateCategory) -> String {
        if !self.color {
            return text.to_string();
        }
        match category {
            StateCategory::SevereHypoglycemia => text.red().to_string(),
            StateCategory::MildHypoglycemia => text.yellow().to_string(),
            StateCategory::Hyperglycemia => text.magenta().to_string(),
            StateCategory::Normal => text.green().to_string(),
            StateCategory::Uncategorized => text.to_string(),
        }
    }
}

fn row_cells(row: &ReadingRow) -> [&str; 5] {
    [&row.time, &row.glucose, &row.prediction, &row.state, &row.protocol]
}

impl<W: Write> DisplaySurface for TextSurface<W> {
    fn append_session(&mut self, view: &SessionView) -> io::Result<()> {
        if self.sessions_written > 0 {
            writeln!(self.out)?;
        }
        self.sessions_written += 1;

        writeln!(
            self.out,
            "Session {}: {}, started {} {}",
            view.id, view.device_type, view.date, view.time
        )?;

        let mut widths = READING_COLUMNS.map(str::len);
        for row in view.body.rows() {
            for (width, cell) in widths.iter_mut().zip(row_cells(row)) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let header: Vec<String> = READING_COLUMNS
            .iter()
            .zip(widths)
            .map(|(name, width)| format!("{:<width$}", name, width = width))
            .collect();
        writeln!(self.out, "{}", header.join("  ").trim_end())?;

        match &view.body {
            SessionBody::Rows { rows } => {
                for row in rows {
                    let cells: Vec<String> = row_cells(row)
                        .iter()
                        .zip(widths)
                        .enumerate()
                        .map(|(column, (cell, width))| {
                            let padded = format!("{:<width$}", cell, width = width);
                            // State column
                            if column == 3 {
                                self.paint(&padded, row.category)
                            } else {
                                padded
                            }
                        })
                        .collect();
                    writeln!(self.out, "{}", cells.join("  ").trim_end())?;
                }
            }
            SessionBody::Empty { message, .. } => {
                writeln!(self.out, "{}", message)?;
            }
        }

        writeln!(self.out, "{}", view.summary.describe())
    }

    fn show_message(&mut self, notice: Notice) -> io::Result<()> {
        writeln!(self.out, "{}", notice.message())
    }
}

// ============= HTML =============

const HTML_STYLE: &str = "\
body { font-family: sans-serif; margin: 2em; }
table { border-collapse: collapse; margin-bottom: 2em; width: 100%; }
th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; }
.hyperglycemia { background: #ffe0b2; }
.mild-hypoglycemia { background: #fff9c4; }
.severe-hypoglycemia { background: #ffcdd2; }
.normal { background: #c8e6c9; }
.notice { font-style: italic; }
";

/// Builds a standalone HTML page
#[derive(Debug, Default)]
pub struct HtmlSurface {
    body: String,
}

impl HtmlSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// The complete page
    pub fn finish(self) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Glucose Session History</title>\n<style>\n{}</style>\n</head>\n\
             <body>\n<h1>Glucose Session History</h1>\n{}</body>\n</html>\n",
            HTML_STYLE, self.body
        )
    }
}

impl DisplaySurface for HtmlSurface {
    fn append_session(&mut self, view: &SessionView) -> io::Result<()> {
        let body = &mut self.body;
        body.push_str("<section class=\"session\">\n");
        body.push_str(&format!(
            "<h2>{}</h2>\n<p>Date: {} &middot; Time: {}</p>\n",
            escape_html(&view.device_type),
            escape_html(&view.date),
            escape_html(&view.time)
        ));

        body.push_str("<table>\n<thead><tr>");
        for name in READING_COLUMNS {
            body.push_str(&format!("<th>{}</th>", escape_html(name)));
        }
        body.push_str("</tr></thead>\n<tbody>\n");

        match &view.body {
            SessionBody::Rows { rows } => {
                for row in rows {
                    let state_cell = match row.category.class_name() {
                        Some(class) => format!("<td class=\"{}\">{}</td>", class, escape_html(&row.state)),
                        None => format!("<td>{}</td>", escape_html(&row.state)),
                    };
                    body.push_str(&format!(
                        "<tr><td>{}</td><td>{}</td><td>{}</td>{}<td>{}</td></tr>\n",
                        escape_html(&row.time),
                        escape_html(&row.glucose),
                        escape_html(&row.prediction),
                        state_cell,
                        escape_html(&row.protocol)
                    ));
                }
            }
            SessionBody::Empty { message, colspan } => {
                body.push_str(&format!(
                    "<tr><td colspan=\"{}\">{}</td></tr>\n",
                    colspan,
                    escape_html(message)
                ));
            }
        }

        body.push_str("</tbody>\n</table>\n");
        body.push_str(&format!("<p>{}</p>\n</section>\n", escape_html(&view.summary.describe())));
        Ok(())
    }

    fn show_message(&mut self, notice: Notice) -> io::Result<()> {
        self.body
            .push_str(&format!("<p class=\"notice\">{}</p>\n", escape_html(notice.message())));
        Ok(())
    }
}

fn escape_html(text: &str) -> String {
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

// ============= JSON =============

#[derive(Debug, Serialize)]
struct JsonPage<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    sessions: &'a [SessionView],
}

/// Collects views and writes them as one JSON document
#[derive(Debug, Default)]
pub struct JsonSurface {
    sessions: Vec<SessionView>,
    notice: Option<Notice>,
}

impl JsonSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(&self) -> Result<String, serde_json::Error> {
        let status = match self.notice {
            Some(Notice::NoData) => "no_data",
            Some(Notice::LoadError) => "error",
            None => "loaded",
        };
        serde_json::to_string_pretty(&JsonPage {
            status,
            message: self.notice.map(Notice::message),
            sessions: &self.sessions,
        })
    }
}

impl DisplaySurface for JsonSurface {
    fn append_session(&mut self, view: &SessionView) -> io::Result<()> {
        self.sessions.push(view.clone());
        Ok(())
    }

    fn show_message(&mut self, notice: Notice) -> io::Result<()> {
        self.notice = Some(notice);
        Ok(())
    }
}
