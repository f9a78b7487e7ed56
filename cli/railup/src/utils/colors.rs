/// The 16 basic ANSI colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl BasicColor {
    pub fn to_inquire(self) -> inquire::ui::Color {
        match self {
            BasicColor::Black => inquire::ui::Color::Black,
            BasicColor::Red => inquire::ui::Color::DarkRed,
            BasicColor::Green => inquire::ui::Color::DarkGreen,
            BasicColor::Yellow => inquire::ui::Color::DarkYellow,
            BasicColor::Blue => inquire::ui::Color::DarkBlue,
            BasicColor::Magenta => inquire::ui::Color::DarkMagenta,
            BasicColor::Cyan => inquire::ui::Color::DarkCyan,
            BasicColor::White => inquire::ui::Color::Grey,
            BasicColor::BrightBlack => inquire::ui::Color::DarkGrey,
            BasicColor::BrightRed => inquire::ui::Color::LightRed,
            BasicColor::BrightGreen => inquire::ui::Color::LightGreen,
            BasicColor::BrightYellow => inquire::ui::Color::LightYellow,
            BasicColor::BrightBlue => inquire::ui::Color::LightBlue,
            BasicColor::BrightMagenta => inquire::ui::Color::LightMagenta,
            BasicColor::BrightCyan => inquire::ui::Color::LightCyan,
            BasicColor::BrightWhite => inquire::ui::Color::White,
        }
    }
}

/// A color from the railup palette with fallbacks for terminals that support
/// fewer colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RailupColor {
    ansi256: u8,
    rgb: (u8, u8, u8),
    basic: BasicColor,
}

impl RailupColor {
    pub fn to_inquire(&self) -> Option<inquire::ui::Color> {
        match supports_color::on(supports_color::Stream::Stderr) {
            Some(supports_color::ColorLevel { has_16m: true, .. }) => {
                Some(inquire::ui::Color::Rgb {
                    r: self.rgb.0,
                    g: self.rgb.1,
                    b: self.rgb.2,
                })
            },
            Some(supports_color::ColorLevel { has_256: true, .. }) => {
                Some(inquire::ui::Color::AnsiValue(self.ansi256))
            },
            Some(supports_color::ColorLevel {
                has_basic: true, ..
            }) => Some(self.basic.to_inquire()),
            _ => None,
        }
    }
}

pub const SKY_300: RailupColor = RailupColor {
    ansi256: 117,
    rgb: (125, 211, 252),
    basic: BasicColor::Cyan,
};

pub const SKY_400: RailupColor = RailupColor {
    ansi256: 81,
    rgb: (56, 189, 248),
    basic: BasicColor::Blue,
};
