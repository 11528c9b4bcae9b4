//! Colors on both sides of the host boundary.
//!
//! The engine speaks in sixteen named console colors, the surface in ARGB
//! values. [`to_surface_color`] and [`to_console_color`] translate between the
//! two through one fixed table.

use serde::Deserialize;

/// An ARGB color as stored on the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub a: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const CYAN: Color = Color::rgb(0, 255, 255);
    pub const DARK_BLUE: Color = Color::rgb(0, 0, 139);
    pub const DARK_GRAY: Color = Color::rgb(169, 169, 169);
    pub const DARK_GREEN: Color = Color::rgb(0, 100, 0);
    pub const DARK_MAGENTA: Color = Color::rgb(139, 0, 139);
    pub const DARK_RED: Color = Color::rgb(139, 0, 0);
    /// Not a standard named color: alpha 255, red 128, green 128, blue 0.
    pub const DARK_YELLOW: Color = Color::argb(255, 128, 128, 0);
    pub const GRAY: Color = Color::rgb(128, 128, 128);
    pub const GREEN: Color = Color::rgb(0, 128, 0);
    pub const MAGENTA: Color = Color::rgb(255, 0, 255);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const YELLOW: Color = Color::rgb(255, 255, 0);

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self { a, r, g, b }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::argb(255, r, g, b)
    }
}

/// The engine-native color names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleColor {
    Black,
    DarkBlue,
    DarkGreen,
    DarkCyan,
    DarkRed,
    DarkMagenta,
    DarkYellow,
    Gray,
    DarkGray,
    Blue,
    Green,
    Cyan,
    Red,
    Magenta,
    Yellow,
    White,
}

const COLOR_TABLE: [(ConsoleColor, Color); 14] = [
    (ConsoleColor::Black, Color::BLACK),
    (ConsoleColor::Blue, Color::BLUE),
    (ConsoleColor::Cyan, Color::CYAN),
    (ConsoleColor::DarkBlue, Color::DARK_BLUE),
    (ConsoleColor::DarkGray, Color::DARK_GRAY),
    (ConsoleColor::DarkGreen, Color::DARK_GREEN),
    (ConsoleColor::DarkMagenta, Color::DARK_MAGENTA),
    (ConsoleColor::DarkRed, Color::DARK_RED),
    (ConsoleColor::DarkYellow, Color::DARK_YELLOW),
    (ConsoleColor::Gray, Color::GRAY),
    (ConsoleColor::Green, Color::GREEN),
    (ConsoleColor::Magenta, Color::MAGENTA),
    (ConsoleColor::Red, Color::RED),
    (ConsoleColor::White, Color::WHITE),
];

/// Maps an engine color onto the surface. Anything outside the table is yellow.
pub fn to_surface_color(color: ConsoleColor) -> Color {
    COLOR_TABLE
        .iter()
        .find(|(console, _)| *console == color)
        .map_or(Color::YELLOW, |(_, surface)| *surface)
}

/// Maps a surface color back to the engine. Anything outside the table is yellow.
pub fn to_console_color(color: Color) -> ConsoleColor {
    COLOR_TABLE
        .iter()
        .find(|(_, surface)| *surface == color)
        .map_or(ConsoleColor::Yellow, |(console, _)| *console)
}
