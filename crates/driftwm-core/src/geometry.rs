//! Rectangles, window gravity and X-style geometry strings.
//!
//! Sizes are signed: a shaded window's client height goes negative so that
//! the frame collapses to the title bar, and the arithmetic relies on it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rectangle in screen (or virtual) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub const fn right(&self) -> i32 {
        self.x + self.width
    }

    pub const fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// Check if a point is inside this rectangle.
    pub const fn contains(&self, px: i32, py: i32) -> bool {
        px >= self.x && px < self.right() && py >= self.y && py < self.bottom()
    }

    /// Check if two rectangles overlap.
    pub const fn intersects(&self, other: &Self) -> bool {
        self.x < other.right()
            && self.right() > other.x
            && self.y < other.bottom()
            && self.bottom() > other.y
    }

    /// Whether any part of the rectangle lies on a `width`×`height` screen
    /// anchored at the origin.
    pub const fn visible_on(&self, width: i32, height: i32) -> bool {
        self.right() > 0 && self.x < width && self.bottom() > 0 && self.y < height
    }

    #[must_use]
    pub const fn translated(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

/// Window gravity as carried in the size hints of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gravity {
    #[default]
    NorthWest,
    North,
    NorthEast,
    West,
    Center,
    East,
    SouthWest,
    South,
    SouthEast,
    Static,
}

impl Gravity {
    /// Decode the protocol's numeric gravity. Unknown values (including
    /// "forget" = 0) fall back to north-west.
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            2 => Self::North,
            3 => Self::NorthEast,
            4 => Self::West,
            5 => Self::Center,
            6 => Self::East,
            7 => Self::SouthWest,
            8 => Self::South,
            9 => Self::SouthEast,
            10 => Self::Static,
            _ => Self::NorthWest,
        }
    }
}

/// Geometry string parse failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryParseError {
    #[error("empty geometry string")]
    Empty,
    #[error("unexpected character {found:?} at offset {offset} in {input:?}")]
    Unexpected {
        input: String,
        offset: usize,
        found: char,
    },
}

/// One parsed offset of a geometry string.
///
/// `from_end` is set when the offset was written with a leading `-`, in
/// which case `value` is negative (or zero for `-0`) and is measured back
/// from the far edge of whatever area it is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Offset {
    pub value: i32,
    pub from_end: bool,
}

impl Offset {
    /// Resolve against an area whose far edge is at `end`.
    pub const fn resolve(self, end: i32) -> i32 {
        if self.from_end {
            end + self.value
        } else {
            self.value
        }
    }
}

/// A parsed `[=][W[xH]][{+-}X[{+-}Y]]` geometry string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeometrySpec {
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub x: Option<Offset>,
    pub y: Option<Offset>,
}

impl GeometrySpec {
    pub fn parse(input: &str) -> Result<Self, GeometryParseError> {
        let s = input.trim();
        let s = s.strip_prefix('=').unwrap_or(s);
        if s.is_empty() {
            return Err(GeometryParseError::Empty);
        }

        let mut cursor = Cursor {
            input,
            bytes: s.as_bytes(),
            pos: 0,
            base: input.len() - s.len(),
        };
        let mut spec = Self::default();

        if cursor.peek().is_some_and(|c| c.is_ascii_digit()) {
            spec.width = Some(cursor.digits()?);
        }
        if matches!(cursor.peek(), Some('x' | 'X')) {
            cursor.pos += 1;
            spec.height = Some(cursor.digits()?);
        }
        if matches!(cursor.peek(), Some('+' | '-')) {
            spec.x = Some(cursor.offset()?);
            if matches!(cursor.peek(), Some('+' | '-')) {
                spec.y = Some(cursor.offset()?);
            }
        }

        match cursor.peek() {
            None => Ok(spec),
            Some(found) => Err(cursor.unexpected(found)),
        }
    }
}

struct Cursor<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    base: usize,
}

impl Cursor<'_> {
    fn peek(&self) -> Option<char> {
        self.bytes.get(self.pos).map(|&b| b as char)
    }

    fn unexpected(&self, found: char) -> GeometryParseError {
        GeometryParseError::Unexpected {
            input: self.input.to_string(),
            offset: self.base + self.pos,
            found,
        }
    }

    fn digits(&mut self) -> Result<i32, GeometryParseError> {
        let start = self.pos;
        let mut value: i32 = 0;
        while let Some(c) = self.peek().filter(char::is_ascii_digit) {
            value = value
                .saturating_mul(10)
                .saturating_add(i32::from(c as u8 - b'0'));
            self.pos += 1;
        }
        if self.pos == start {
            return Err(match self.peek() {
                Some(found) => self.unexpected(found),
                None => GeometryParseError::Empty,
            });
        }
        Ok(value)
    }

    /// `+N`, `-N`, and the `+-N` form where the sign follows the separator.
    fn offset(&mut self) -> Result<Offset, GeometryParseError> {
        let from_end = self.peek() == Some('-');
        self.pos += 1;
        let mut negative = from_end;
        match self.peek() {
            Some('-') => {
                negative = !negative;
                self.pos += 1;
            },
            Some('+') => self.pos += 1,
            _ => {},
        }
        let magnitude = self.digits()?;
        Ok(Offset {
            value: if negative { -magnitude } else { magnitude },
            from_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_visibility() {
        let screen = (800, 600);
        assert!(Geometry::new(-50, 10, 100, 100).visible_on(screen.0, screen.1));
        assert!(!Geometry::new(-100, 10, 100, 100).visible_on(screen.0, screen.1));
        assert!(!Geometry::new(800, 0, 10, 10).visible_on(screen.0, screen.1));
        assert!(Geometry::new(799, 599, 10, 10).visible_on(screen.0, screen.1));
    }

    #[test]
    fn test_geometry_intersects() {
        let a = Geometry::new(0, 0, 100, 100);
        assert!(a.intersects(&Geometry::new(50, 50, 100, 100)));
        assert!(!a.intersects(&Geometry::new(100, 0, 10, 10)));
    }

    #[test]
    fn test_parse_full_geometry() {
        let spec = GeometrySpec::parse("640x480+10-20").unwrap();
        assert_eq!(spec.width, Some(640));
        assert_eq!(spec.height, Some(480));
        assert_eq!(
            spec.x,
            Some(Offset {
                value: 10,
                from_end: false
            })
        );
        assert_eq!(
            spec.y,
            Some(Offset {
                value: -20,
                from_end: true
            })
        );
    }

    #[test]
    fn test_parse_offsets_only() {
        let spec = GeometrySpec::parse("-0+800").unwrap();
        assert_eq!(spec.width, None);
        let x = spec.x.unwrap();
        assert!(x.from_end);
        assert_eq!(x.resolve(1600), 1600);
        assert_eq!(spec.y.unwrap().resolve(1600), 800);
    }

    #[test]
    fn test_parse_sign_after_separator() {
        let spec = GeometrySpec::parse("+-100+0").unwrap();
        let x = spec.x.unwrap();
        assert_eq!(x.value, -100);
        assert!(!x.from_end);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            GeometrySpec::parse("10x"),
            Err(GeometryParseError::Empty)
        ));
        assert!(matches!(
            GeometrySpec::parse("10y20"),
            Err(GeometryParseError::Unexpected { found: 'y', .. })
        ));
        assert_eq!(GeometrySpec::parse("  "), Err(GeometryParseError::Empty));
    }

    #[test]
    fn test_gravity_from_raw() {
        assert_eq!(Gravity::from_raw(0), Gravity::NorthWest);
        assert_eq!(Gravity::from_raw(5), Gravity::Center);
        assert_eq!(Gravity::from_raw(10), Gravity::Static);
    }
}
