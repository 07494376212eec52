use crate::preview::PreviewStyles;
use ratatui::style::{Color, Modifier, Style};

pub const THEME_NAMES: [&str; 2] = ["dark", "light"];

#[derive(Debug, Clone, Copy)]
pub struct UiPalette {
    pub base_fg: Color,
    pub base_bg: Option<Color>,
    pub accent: Color,
    pub muted: Color,
    pub border: Color,
    pub image: Color,
    pub error: Color,
}

const DARK: UiPalette = UiPalette {
    base_fg: Color::Rgb(0xc0, 0xc5, 0xce),
    base_bg: None,
    accent: Color::Rgb(0x8f, 0xa1, 0xb3),
    muted: Color::Rgb(0x65, 0x73, 0x7e),
    border: Color::Rgb(0x4f, 0x5b, 0x66),
    image: Color::Rgb(0xa3, 0xbe, 0x8c),
    error: Color::Rgb(0xbf, 0x61, 0x6a),
};

const LIGHT: UiPalette = UiPalette {
    base_fg: Color::Rgb(0x2b, 0x30, 0x3b),
    base_bg: Some(Color::Rgb(0xef, 0xf1, 0xf5)),
    accent: Color::Rgb(0x1e, 0x66, 0xf5),
    muted: Color::Rgb(0x8c, 0x8f, 0xa1),
    border: Color::Rgb(0xac, 0xb0, 0xbe),
    image: Color::Rgb(0x40, 0xa0, 0x2b),
    error: Color::Rgb(0xd2, 0x0f, 0x39),
};

impl UiPalette {
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "dark" => Some(DARK),
            "light" => Some(LIGHT),
            _ => None,
        }
    }

    pub fn resolve(name: &str) -> Self {
        Self::named(name).unwrap_or_else(|| {
            tracing::warn!(theme = name, known = ?THEME_NAMES, "unknown theme, using dark");
            DARK
        })
    }

    pub fn base_style(&self) -> Style {
        let style = Style::default().fg(self.base_fg);
        match self.base_bg {
            Some(bg) => style.bg(bg),
            None => style,
        }
    }

    pub fn preview_styles(&self) -> PreviewStyles {
        let base = self.base_style();
        PreviewStyles {
            base,
            heading: base.fg(self.accent).add_modifier(Modifier::BOLD),
            link: base.fg(self.accent).add_modifier(Modifier::UNDERLINED),
            code: base.fg(self.muted),
            quote: base.fg(self.muted),
            rule: base.fg(self.border),
            image: base.fg(self.image).add_modifier(Modifier::BOLD),
            caption: base.fg(self.muted).add_modifier(Modifier::ITALIC),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{THEME_NAMES, UiPalette};

    #[test]
    fn every_listed_theme_resolves() {
        for name in THEME_NAMES {
            assert!(UiPalette::named(name).is_some(), "{name}");
        }
        assert!(UiPalette::named("solarized").is_none());
    }
}
