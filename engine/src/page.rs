use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Provenance index of the document that was opened first.
pub const HOST_SOURCE: usize = 0;

/// Stable identity of a page: its index in the source document it came from.
///
/// `source` is `HOST_SOURCE` for pages of the opened document and the
/// registration index of the inserted document otherwise. Identities are
/// never renumbered when pages are deleted or moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "PageIdRepr", into = "PageIdRepr")]
pub struct PageId {
    pub source: usize,
    pub page: usize,
}

impl PageId {
    pub fn new(source: usize, page: usize) -> Self {
        Self { source, page }
    }

    pub fn host(page: usize) -> Self {
        Self::new(HOST_SOURCE, page)
    }

    pub fn is_inserted(&self) -> bool {
        self.source != HOST_SOURCE
    }
}

impl Display for PageId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_inserted() {
            write!(f, "{}:{}", self.source, self.page)
        } else {
            write!(f, "{}", self.page)
        }
    }
}

impl FromStr for PageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("Invalid page identity '{}'", s))
        };

        match s.split_once(':') {
            Some((source, page)) => Ok(Self::new(parse(source)?, parse(page)?)),
            None => Ok(Self::host(parse(s)?)),
        }
    }
}

// Host pages serialize as a bare number, inserted pages as "source:page".
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PageIdRepr {
    Host(usize),
    Tagged(String),
}

impl TryFrom<PageIdRepr> for PageId {
    type Error = String;

    fn try_from(repr: PageIdRepr) -> Result<Self, Self::Error> {
        match repr {
            PageIdRepr::Host(page) => Ok(PageId::host(page)),
            PageIdRepr::Tagged(text) => text.parse(),
        }
    }
}

impl From<PageId> for PageIdRepr {
    fn from(id: PageId) -> Self {
        if id.is_inserted() {
            PageIdRepr::Tagged(id.to_string())
        } else {
            PageIdRepr::Host(id.page)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum Rotation {
    // serialize as just "0"
    #[default]
    #[serde(rename = "0")]
    R0,
    #[serde(rename = "90")]
    R90,
    #[serde(rename = "180")]
    R180,
    #[serde(rename = "270")]
    R270,
}

impl Rotation {
    /// Normalizes any multiple of 90 (negative included) into a quarter turn.
    pub fn from_degrees(degrees: i64) -> Option<Self> {
        if degrees % 90 != 0 {
            return None;
        }

        match degrees.rem_euclid(360) {
            0 => Some(Rotation::R0),
            90 => Some(Rotation::R90),
            180 => Some(Rotation::R180),
            _ => Some(Rotation::R270),
        }
    }

    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// Value for a `/Rotate` entry, `None` when the page is upright.
    pub fn as_rotation(&self) -> Option<u32> {
        match self {
            Rotation::R0 => None,
            other => Some(other.degrees() as u32),
        }
    }

    pub fn add(self, other: Rotation) -> Rotation {
        Self::quarter_turns((self.degrees() + other.degrees()) as i64 / 90)
    }

    pub fn is_upright(&self) -> bool {
        *self == Rotation::R0
    }

    fn quarter_turns(turns: i64) -> Rotation {
        match turns.rem_euclid(4) {
            0 => Rotation::R0,
            1 => Rotation::R90,
            2 => Rotation::R180,
            _ => Rotation::R270,
        }
    }
}

impl Display for Rotation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Width and height of a page's media box, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    pub const A4: PageSize = PageSize {
        width: 595.0,
        height: 842.0,
    };

    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}
