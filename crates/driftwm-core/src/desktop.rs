//! Virtual desktops and desktop membership masks.

use std::fmt;

use crate::geometry::Geometry;

/// Bit set of desktops a window belongs to; bit `n` is desktop `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DesktopMask(pub u32);

impl DesktopMask {
    /// Highest number of desktops a mask can address.
    pub const MAX_DESKTOPS: u32 = 16;
    /// Membership in every desktop.
    pub const ALL: Self = Self((1 << Self::MAX_DESKTOPS) - 1);
    /// Wire value clients use to ask for "all desktops".
    pub const ALL_WIRE: u32 = 0xffff_ffff;

    pub const fn single(desktop: u32) -> Self {
        if desktop < Self::MAX_DESKTOPS {
            Self(1 << desktop)
        } else {
            Self(0)
        }
    }

    pub const fn contains(self, desktop: u32) -> bool {
        desktop < Self::MAX_DESKTOPS && self.0 & (1 << desktop) != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn is_all(self) -> bool {
        self.0 & Self::ALL.0 == Self::ALL.0
    }

    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Restrict to the first `count` desktops.
    #[must_use]
    pub const fn limit(self, count: u32) -> Self {
        if count >= Self::MAX_DESKTOPS {
            Self(self.0 & Self::ALL.0)
        } else {
            Self(self.0 & ((1 << count) - 1))
        }
    }

    /// Desktop number to publish for a window: the lowest member, or the
    /// wire "all" value for windows on every desktop.
    pub fn wire_desktop(self) -> u32 {
        if self.is_all() {
            Self::ALL_WIRE
        } else {
            self.0.trailing_zeros().min(Self::MAX_DESKTOPS - 1)
        }
    }

    /// Parse `"all"` or a list of desktop numbers separated by spaces or
    /// commas. Numbers outside `0..count` are ignored.
    pub fn parse(s: &str, count: u32) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Some(Self::ALL);
        }
        let mut mask = Self::default();
        for part in s.split(|c: char| c == ' ' || c == ',').filter(|p| !p.is_empty()) {
            let n: u32 = part.parse().ok()?;
            if n < count {
                mask = mask.union(Self::single(n));
            }
        }
        Some(mask)
    }

    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..Self::MAX_DESKTOPS).filter(move |&n| self.contains(n))
    }
}

impl fmt::Display for DesktopMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("all");
        }
        let list: Vec<String> = self.iter().map(|n| n.to_string()).collect();
        f.write_str(&list.join(","))
    }
}

/// A numbered virtual desktop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Desktop {
    pub number: u32,
    pub name: String,
    pub workarea: Geometry,
}

impl Desktop {
    pub fn new(number: u32, name: impl Into<String>, workarea: Geometry) -> Self {
        Self {
            number,
            name: name.into(),
            workarea,
        }
    }

    pub const fn mask(&self) -> DesktopMask {
        DesktopMask::single(self.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_membership() {
        let m = DesktopMask::single(0).union(DesktopMask::single(3));
        assert!(m.contains(0));
        assert!(m.contains(3));
        assert!(!m.contains(1));
        assert!(!m.contains(40));
        assert_eq!(m.difference(DesktopMask::single(0)), DesktopMask::single(3));
        assert_eq!(DesktopMask::single(16), DesktopMask(0));
    }

    #[test]
    fn test_mask_parse() {
        assert_eq!(DesktopMask::parse("all", 4), Some(DesktopMask::ALL));
        assert_eq!(DesktopMask::parse("0, 2", 4), Some(DesktopMask(0b101)));
        assert_eq!(DesktopMask::parse("1 7", 4), Some(DesktopMask(0b10)));
        assert_eq!(DesktopMask::parse("x", 4), None);
    }

    #[test]
    fn test_wire_desktop() {
        assert_eq!(DesktopMask::ALL.wire_desktop(), DesktopMask::ALL_WIRE);
        assert_eq!(DesktopMask(0b100).wire_desktop(), 2);
        assert_eq!(DesktopMask(0b1010).to_string(), "1,3");
    }
}
