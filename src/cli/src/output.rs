//! Terminal rendering for the Warden CLI.
//!
//! Commands hand their results to a [`Printer`]. Machine formats (JSON and
//! YAML) always receive the raw API payload so scripts see exactly what the
//! server sent; the table format gets rows or a labelled [`Card`] instead.

use std::fmt::Display;

use anyhow::Result;
use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use tabled::{
    settings::{object::Rows, Modify, Style, Width},
    Table, Tabled,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable tables and cards
    #[default]
    Table,
    Json,
    Yaml,
}

/// Severity of a one-line note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Done,
    Hint,
    Failure,
}

impl Tone {
    fn tag(self) -> ColoredString {
        match self {
            Self::Done => "✔".green().bold(),
            Self::Hint => "›".blue().bold(),
            Self::Failure => "✘".red().bold(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cards
// ═══════════════════════════════════════════════════════════════════════════════

/// A titled block of aligned `label  value` lines.
#[derive(Debug, Default)]
pub struct Card {
    title: String,
    fields: Vec<(&'static str, String)>,
}

impl Card {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, label: &'static str, value: impl Display) -> Self {
        self.fields.push((label, value.to_string()));
        self
    }

    /// Absent values are left off the card entirely.
    pub fn maybe<V: Display>(self, label: &'static str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.field(label, value),
            None => self,
        }
    }

    pub fn list<S: AsRef<str>>(self, label: &'static str, values: &[S]) -> Self {
        let joined = if values.is_empty() {
            "-".to_string()
        } else {
            values.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
        };
        self.field(label, joined)
    }

    fn render(&self) -> String {
        let width = self.fields.iter().map(|(l, _)| l.len()).max().unwrap_or(0);
        let mut out = format!("{}\n", self.title.bold());
        for (label, value) in &self.fields {
            out.push_str(&format!(
                "  {}  {}\n",
                format!("{:<width$}", label, width = width).cyan(),
                value
            ));
        }
        out
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Printer
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
pub struct Printer {
    format: OutputFormat,
}

impl Printer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_table(&self) -> bool {
        self.format == OutputFormat::Table
    }

    /// Tabulate `rows`, or emit `payload` for machine formats.
    pub fn rows<R: Tabled, P: Serialize + ?Sized>(&self, rows: Vec<R>, payload: &P) -> Result<()> {
        match self.encode(payload)? {
            Some(text) => print!("{}", text),
            None if rows.is_empty() => println!("{}", "(nothing to show)".dimmed()),
            None => println!("{}", tabulate(rows)),
        }
        Ok(())
    }

    pub fn card<P: Serialize + ?Sized>(&self, card: Card, payload: &P) -> Result<()> {
        match self.encode(payload)? {
            Some(text) => print!("{}", text),
            None => print!("{}", card.render()),
        }
        Ok(())
    }

    /// Confirm a mutation: a single line for humans, the payload otherwise.
    pub fn done<P: Serialize + ?Sized>(&self, message: &str, payload: &P) -> Result<()> {
        match self.encode(payload)? {
            Some(text) => print!("{}", text),
            None => self.note(Tone::Done, message),
        }
        Ok(())
    }

    /// Notes never pollute machine-readable stdout.
    pub fn note(&self, tone: Tone, message: &str) {
        if self.is_table() && tone != Tone::Failure {
            println!("{} {}", tone.tag(), message);
        } else {
            eprintln!("{} {}", tone.tag(), message);
        }
    }

    fn encode<P: Serialize + ?Sized>(&self, payload: &P) -> Result<Option<String>> {
        Ok(match self.format {
            OutputFormat::Table => None,
            OutputFormat::Json => Some(format!("{}\n", serde_json::to_string_pretty(payload)?)),
            OutputFormat::Yaml => Some(serde_yaml::to_string(payload)?),
        })
    }
}

fn tabulate<R: Tabled>(rows: Vec<R>) -> String {
    Table::new(rows)
        .with(Style::sharp())
        .with(Modify::new(Rows::new(1..)).with(Width::truncate(60).suffix("…")))
        .to_string()
}

/// Report a fatal command error on stderr.
pub fn report_failure(err: &anyhow::Error) {
    eprintln!("{} {:#}", Tone::Failure.tag(), err);
}

/// Audit outcomes colored by severity.
pub fn paint_status(status: &str) -> String {
    match status {
        "success" => status.green().to_string(),
        "failed" => status.yellow().to_string(),
        "denied" => status.red().bold().to_string(),
        other => other.to_string(),
    }
}

/// First eight characters of an identifier, enough to tell rows apart.
pub fn short_id(id: impl Display) -> String {
    id.to_string().chars().take(8).collect()
}
