//! Terminal rendering with markdown support

use crossterm::style::{Color, Stylize};
use std::io::Write;
use std::time::Duration;
use termimad::MadSkin;

use super::theme::Theme;
use crate::api::{ProgressEvent, ProgressKind};
use crate::metrics::MetricsSummary;
use crate::research::ResearchStatus;

/// Terminal renderer with markdown and styled output
pub struct TerminalRenderer {
    theme: Theme,
    skin: MadSkin,
    /// Streamed text left the cursor mid-line
    mid_line: bool,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        let theme = Theme::default();
        let skin = Self::build_skin(&theme);
        Self {
            theme,
            skin,
            mid_line: false,
        }
    }

    fn build_skin(theme: &Theme) -> MadSkin {
        let mut skin = MadSkin::default();
        skin.set_headers_fg(to_termimad_color(theme.title));
        skin.bold.set_fg(to_termimad_color(Color::White));
        skin.italic.set_fg(to_termimad_color(Color::DarkYellow));
        skin.inline_code.set_fg(to_termimad_color(Color::Green));
        skin.code_block.set_fg(to_termimad_color(Color::Green));
        skin
    }

    /// Render the banner for a research run
    pub fn render_banner(&self, version: &str, mode: &str, query: &str) {
        println!();
        println!("{}", "  Deep Research".with(self.theme.title));
        println!(
            "  {} {}  {} {}",
            "v".with(self.theme.dim),
            version.with(self.theme.dim),
            "mode:".with(self.theme.dim),
            mode.with(self.theme.stats),
        );
        println!(
            "  {} {}",
            "Query:".with(self.theme.dim),
            query.with(self.theme.content)
        );
        println!();
    }

    /// Render one progress event as it arrives
    pub fn render_event(&mut self, event: &ProgressEvent, show_thoughts: bool) {
        match event.kind {
            ProgressKind::Start => {
                let id = event.interaction_id.as_deref().unwrap_or("?");
                self.render_system(&format!("{} ({})", event.content, id));
            }
            ProgressKind::Thought => {
                if show_thoughts {
                    self.end_line();
                    for line in event.content.lines().filter(|l| !l.trim().is_empty()) {
                        println!(
                            "  {} {}",
                            "~".with(self.theme.thought),
                            line.with(self.theme.thought).italic()
                        );
                    }
                }
            }
            ProgressKind::Content => self.render_delta(&event.content),
            ProgressKind::Complete => {
                self.end_line();
                self.render_success(&event.content);
            }
            ProgressKind::Error => {
                self.end_line();
                self.render_error(&event.content);
            }
        }
    }

    /// Render a streaming text delta (raw, no markdown processing)
    pub fn render_delta(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        print!("{}", text.with(self.theme.content));
        let _ = std::io::stdout().flush();
        self.mid_line = !text.ends_with('\n');
    }

    fn end_line(&mut self) {
        if self.mid_line {
            println!();
            self.mid_line = false;
        }
    }

    /// Render a complete report with markdown formatting
    pub fn render_markdown(&mut self, content: &str) {
        self.end_line();
        if has_markdown_elements(content) {
            println!();
            self.skin.print_text(content);
        } else {
            println!();
            println!("{}", content.with(self.theme.content));
        }
    }

    /// Render the sources found in a report
    pub fn render_citations(&self, citations: &[String]) {
        if citations.is_empty() {
            return;
        }
        println!();
        println!("{}", "  Sources".with(self.theme.title));
        for (i, url) in citations.iter().enumerate() {
            println!(
                "  {} {}",
                format!("[{}]", i + 1).with(self.theme.dim),
                url.as_str().with(self.theme.link)
            );
        }
    }

    /// Status line for poll-based research
    pub fn status_message(&self, status: ResearchStatus, elapsed: Duration) -> String {
        let secs = elapsed.as_secs();
        format!("[{:02}:{:02}] {}", secs / 60, secs % 60, status)
    }

    /// Render the stream summary after a run
    pub fn render_summary(&self, summary: &MetricsSummary) {
        println!();
        println!(
            "  {} {} events, {} connection(s), {} reconnect(s), {:.1}s",
            "\u{2022}".with(self.theme.dim),
            format!("{}", summary.events_forwarded).with(self.theme.stats),
            format!("{}", summary.connections_opened).with(self.theme.stats),
            format!("{}", summary.reconnects).with(self.theme.stats),
            summary.elapsed.as_secs_f64(),
        );
    }

    /// Render a system message
    pub fn render_system(&self, msg: &str) {
        println!(
            "  {} {}",
            "\u{25b6}".with(self.theme.status),
            msg.with(self.theme.status)
        );
    }

    /// Render an error message
    pub fn render_error(&self, msg: &str) {
        println!(
            "  {} {}",
            "\u{2717}".with(self.theme.error),
            msg.with(self.theme.error)
        );
    }

    /// Render a success message
    pub fn render_success(&self, msg: &str) {
        println!(
            "  {} {}",
            "\u{2713}".with(self.theme.success),
            msg.with(self.theme.success)
        );
    }

    /// Render info text
    pub fn render_info(&self, msg: &str) {
        println!("  {}", msg.with(self.theme.dim));
    }
}

impl Default for TerminalRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if content has markdown elements worth re-rendering
fn has_markdown_elements(content: &str) -> bool {
    content.contains("```")
        || content.contains("## ")
        || content.contains("# ")
        || content.contains("**")
        || content.contains("| ")
        || content.contains("- [")
}

/// Convert crossterm Color to termimad color
fn to_termimad_color(color: Color) -> termimad::crossterm::style::Color {
    match color {
        Color::Black => termimad::crossterm::style::Color::Black,
        Color::DarkGrey => termimad::crossterm::style::Color::DarkGrey,
        Color::Red => termimad::crossterm::style::Color::Red,
        Color::DarkRed => termimad::crossterm::style::Color::DarkRed,
        Color::Green => termimad::crossterm::style::Color::Green,
        Color::DarkGreen => termimad::crossterm::style::Color::DarkGreen,
        Color::Yellow => termimad::crossterm::style::Color::Yellow,
        Color::DarkYellow => termimad::crossterm::style::Color::DarkYellow,
        Color::Blue => termimad::crossterm::style::Color::Blue,
        Color::DarkBlue => termimad::crossterm::style::Color::DarkBlue,
        Color::Magenta => termimad::crossterm::style::Color::Magenta,
        Color::DarkMagenta => termimad::crossterm::style::Color::DarkMagenta,
        Color::Cyan => termimad::crossterm::style::Color::Cyan,
        Color::DarkCyan => termimad::crossterm::style::Color::DarkCyan,
        Color::White => termimad::crossterm::style::Color::White,
        Color::Grey => termimad::crossterm::style::Color::Grey,
        _ => termimad::crossterm::style::Color::Reset,
    }
}
