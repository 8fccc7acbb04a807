//! Terminal theme and color definitions

use crossterm::style::Color;

/// Colors for research output
pub struct Theme {
    /// Thought summaries
    pub thought: Color,
    /// Streamed report text
    pub content: Color,
    /// Lifecycle messages (started, reconnecting, polling)
    pub status: Color,
    pub error: Color,
    /// Dim/secondary info
    pub dim: Color,
    pub success: Color,
    /// Banner and headings
    pub title: Color,
    /// Numbers in summaries
    pub stats: Color,
    /// Citation URLs
    pub link: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            thought: Color::DarkGrey,
            content: Color::White,
            status: Color::DarkYellow,
            error: Color::Red,
            dim: Color::DarkGrey,
            success: Color::Green,
            title: Color::Magenta,
            stats: Color::Blue,
            link: Color::Cyan,
        }
    }
}
