//! Colors for the terminal UI

use ratatui::style::Color;

#[derive(Debug, Clone)]
pub struct Theme {
    pub accent: Color,      // Enabled controls, key hints
    pub danger: Color,      // Error status
    pub success: Color,     // Running indicator, success status
    pub warning: Color,     // Transitional states
    pub text: Color,
    pub text_dim: Color,    // Disabled controls, secondary text
    pub bg_selected: Color, // Selected log row
    pub inactive: Color,    // Borders
    pub header: Color,      // Table headers, help headings
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            accent: Color::Rgb(137, 180, 250),
            danger: Color::Rgb(243, 139, 168),
            success: Color::Rgb(166, 218, 149),
            warning: Color::Rgb(250, 179, 135),
            text: Color::Rgb(205, 214, 244),
            text_dim: Color::Rgb(108, 112, 134),
            bg_selected: Color::Rgb(69, 71, 90),
            inactive: Color::Rgb(88, 91, 112),
            header: Color::Rgb(203, 166, 247),
        }
    }
}

impl Theme {
    /// Default palette, or the terminal's own colors when `NO_COLOR` is set
    pub fn load() -> Self {
        match std::env::var_os("NO_COLOR") {
            Some(v) if !v.is_empty() => Self::plain(),
            _ => Self::default(),
        }
    }

    fn plain() -> Self {
        Self {
            accent: Color::Reset,
            danger: Color::Reset,
            success: Color::Reset,
            warning: Color::Reset,
            text: Color::Reset,
            text_dim: Color::DarkGray,
            bg_selected: Color::DarkGray,
            inactive: Color::Reset,
            header: Color::Reset,
        }
    }

    /// Color for the status line, keyed off the message text
    pub fn status_color(&self, message: &str) -> Color {
        if message.starts_with("Error") {
            self.danger
        } else if message.ends_with("successfully!") {
            self.success
        } else {
            self.warning
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_color() {
        let theme = Theme::default();
        assert_eq!(theme.status_color("Error: agent is not running"), theme.danger);
        assert_eq!(theme.status_color("Error fetching logs: boom"), theme.danger);
        assert_eq!(theme.status_color("App started successfully!"), theme.success);
        assert_eq!(theme.status_color("Fetching…"), theme.warning);
    }

    #[test]
    fn test_plain_theme_has_no_rgb() {
        let theme = Theme::plain();
        assert!(!matches!(theme.accent, Color::Rgb(..)));
        assert!(!matches!(theme.header, Color::Rgb(..)));
    }
}
