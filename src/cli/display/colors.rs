//! Color theme for CLI output

use comfy_table::Color as TableColor;

/// Color theme for terminal output
#[derive(Debug, Clone)]
pub struct ColorTheme {
    pub success: TableColor,
    pub warning: TableColor,
    pub error: TableColor,
    pub info: TableColor,
    pub muted: TableColor,
}

impl Default for ColorTheme {
    fn default() -> Self {
        Self {
            success: TableColor::Green,
            warning: TableColor::Yellow,
            error: TableColor::Red,
            info: TableColor::Cyan,
            muted: TableColor::DarkGrey,
        }
    }
}

impl ColorTheme {
    /// Get color based on how many nodes report Ready
    pub fn get_ready_color(&self, ready: usize, total: usize) -> TableColor {
        if total == 0 {
            self.muted
        } else if ready == total {
            self.success
        } else if ready > 0 {
            self.warning
        } else {
            self.error
        }
    }

    pub fn get_flag_color(&self, enabled: bool) -> TableColor {
        if enabled {
            self.info
        } else {
            self.muted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_theme() {
        let theme = ColorTheme::default();
        assert_eq!(theme.success, TableColor::Green);
        assert_eq!(theme.warning, TableColor::Yellow);
        assert_eq!(theme.error, TableColor::Red);
    }

    #[test]
    fn test_get_ready_color() {
        let theme = ColorTheme::default();
        assert_eq!(theme.get_ready_color(3, 3), TableColor::Green);
        assert_eq!(theme.get_ready_color(2, 3), TableColor::Yellow);
        assert_eq!(theme.get_ready_color(0, 3), TableColor::Red);
        assert_eq!(theme.get_ready_color(0, 0), TableColor::DarkGrey);
    }

    #[test]
    fn test_get_flag_color() {
        let theme = ColorTheme::default();
        assert_eq!(theme.get_flag_color(true), TableColor::Cyan);
        assert_eq!(theme.get_flag_color(false), TableColor::DarkGrey);
    }
}
