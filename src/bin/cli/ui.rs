use indicatif::{ProgressBar, ProgressStyle};
use nu_ansi_term::{Color, Style};
use sombra_consistency::{CheckSummary, Inconsistency, Severity};
use std::fmt::Display;
use std::io::IsTerminal;
use std::time::Duration;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Theme {
    Auto,
    Light,
    Dark,
    Plain,
}

/// Terminal output of the checker binary. Everything but the progress bar
/// goes to stdout.
pub struct Ui {
    palette: Palette,
    paint: bool,
    quiet: bool,
}

impl Ui {
    pub fn new(theme: Theme, quiet: bool) -> Self {
        let paint = !quiet && theme != Theme::Plain && std::io::stdout().is_terminal();

        #[cfg(windows)]
        if paint {
            let _ = nu_ansi_term::enable_ansi_support();
        }

        let palette = match theme {
            Theme::Plain => Palette::plain(),
            Theme::Light => Palette::light(),
            Theme::Dark | Theme::Auto => Palette::dark(),
        };
        Self {
            palette,
            paint,
            quiet,
        }
    }

    /// Record-count bar on stderr; hidden when quiet or not on a terminal.
    pub fn progress_bar(&self) -> ProgressBar {
        if self.quiet || !std::io::stderr().is_terminal() {
            return ProgressBar::hidden();
        }
        let style = ProgressStyle::with_template("{prefix} [{bar:32}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");
        let bar = ProgressBar::new(0).with_style(style);
        bar.set_prefix(self.paint_with(self.palette.accent, PROGRESS_ICON));
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    }

    /// Aligned `key: value` rows under a heading; nothing when `rows` is empty.
    pub fn table<K, V>(&self, title: &str, rows: impl IntoIterator<Item = (K, V)>)
    where
        K: Display,
        V: Display,
    {
        let rows: Vec<(String, String)> = rows
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        if rows.is_empty() {
            return;
        }
        self.heading(title);
        let width = rows.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
        for (key, value) in rows {
            let key = format!("{key:>width$}:");
            println!("  {} {value}", self.paint_with(self.palette.key, &key));
        }
    }

    /// Retained findings, marked by severity, with a note when the summary
    /// kept fewer than were reported.
    pub fn findings(&self, summary: &CheckSummary) {
        if summary.findings.is_empty() {
            return;
        }
        let shown = summary.findings.len() as u64;
        let total = summary.total();
        if shown < total {
            self.heading(&format!("Findings (lowest {shown} of {total})"));
        } else {
            self.heading("Findings");
        }
        for finding in &summary.findings {
            println!("  {} {finding}", self.severity_mark(finding));
        }
    }

    pub fn success(&self, message: &str) {
        self.status(self.palette.ok, SUCCESS_ICON, message);
    }

    pub fn warn(&self, message: &str) {
        self.status(self.palette.error, WARNING_ICON, message);
    }

    fn severity_mark(&self, finding: &Inconsistency) -> String {
        match finding.severity {
            Severity::Error => self.paint_with(self.palette.error, ERROR_MARK),
            Severity::Warning => self.paint_with(self.palette.warning, WARNING_MARK),
        }
    }

    fn status(&self, style: Style, icon: &str, message: &str) {
        if self.quiet {
            println!("{message}");
        } else {
            println!("{} {message}", self.paint_with(style, icon));
        }
    }

    fn heading(&self, title: &str) {
        if self.quiet {
            println!("{title}");
        } else {
            let text = format!("{HEADING_ICON} {title}");
            println!("{}", self.paint_with(self.palette.heading, &text));
        }
    }

    fn paint_with(&self, style: Style, text: &str) -> String {
        if self.paint {
            style.paint(text).to_string()
        } else {
            text.to_owned()
        }
    }
}

struct Palette {
    heading: Style,
    key: Style,
    accent: Style,
    ok: Style,
    warning: Style,
    error: Style,
}

impl Palette {
    fn dark() -> Self {
        Self {
            heading: Style::new().fg(Color::Purple).bold(),
            key: Style::new().fg(Color::LightBlue).bold(),
            accent: Style::new().fg(Color::LightCyan),
            ok: Style::new().fg(Color::LightGreen).bold(),
            warning: Style::new().fg(Color::Yellow),
            error: Style::new().fg(Color::LightRed).bold(),
        }
    }

    fn light() -> Self {
        Self {
            heading: Style::new().fg(Color::Blue).bold(),
            key: Style::new().fg(Color::Black).bold(),
            accent: Style::new().fg(Color::Purple),
            ok: Style::new().fg(Color::Green).bold(),
            warning: Style::new().fg(Color::Yellow),
            error: Style::new().fg(Color::Red).bold(),
        }
    }

    fn plain() -> Self {
        Self {
            heading: Style::new(),
            key: Style::new(),
            accent: Style::new(),
            ok: Style::new(),
            warning: Style::new(),
            error: Style::new(),
        }
    }
}

const HEADING_ICON: &str = "▸";
const SUCCESS_ICON: &str = "✔";
const WARNING_ICON: &str = "⚠";
const PROGRESS_ICON: &str = "▶";
const ERROR_MARK: &str = "E";
const WARNING_MARK: &str = "W";
