use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Selects which monitor(s) should display the wallpaper.
#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub enum WallpaperTargetMonitor {
    /// Every configured output.
    #[default]
    All,
    /// The output at this position in enumeration order.
    Index(usize),
    /// The output whose connector name (e.g. `DP-1`) or model matches.
    Named(String),
}

impl WallpaperTargetMonitor {
    /// Whether the output at `index` with the given identity is targeted.
    pub fn selects(&self, index: usize, name: &str, model: Option<&str>) -> bool {
        match self {
            Self::All => true,
            Self::Index(n) => *n == index,
            Self::Named(wanted) => wanted == name || model.is_some_and(|m| m == wanted),
        }
    }
}

impl FromStr for WallpaperTargetMonitor {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s == "*" {
            return Ok(Self::All);
        }
        Ok(s.parse::<usize>()
            .map_or_else(|_| Self::Named(s.to_string()), Self::Index))
    }
}

impl fmt::Display for WallpaperTargetMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all outputs"),
            Self::Index(n) => write!(f, "output #{n}"),
            Self::Named(name) => write!(f, "output '{name}'"),
        }
    }
}
