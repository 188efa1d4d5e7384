use std::fmt;

pub mod adjacency;
pub mod engine;
pub mod hint;
pub mod model;
#[cfg(target_arch = "wasm32")]
pub mod wasm_api;

pub use hint::{
    compute_hint, get_hint, hint_with_options, HintOptions, HintReport, OpeningRule, Strategy,
};

/// Tile color, in canonical group order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Color {
    Red = 0,
    Blue = 1,
    Green = 2,
    Black = 3,
}

impl Color {
    pub const ALL: [Color; 4] = [Color::Red, Color::Blue, Color::Green, Color::Black];

    fn from_bits(bits: u8) -> Self {
        Self::ALL[(bits & 0b11) as usize]
    }

    /// Position in the canonical color order (0-3)
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'r' => Some(Color::Red),
            'b' => Some(Color::Blue),
            'g' => Some(Color::Green),
            'z' => Some(Color::Black),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Color::Red => 'r',
            Color::Blue => 'b',
            Color::Green => 'g',
            Color::Black => 'z',
        }
    }
}

/// A tile in Rummikub represented as a u8.
/// - Bits 0-3: Number (1-13)
/// - Bits 4-5: Color (00 = Red, 01 = Blue, 10 = Green, 11 = Black)
/// - All 1s (0xFF): Joker
///
/// The layout makes the derived ordering lexicographic by (color, number),
/// with jokers sorting after every concrete tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tile(u8);

impl Tile {
    const NUMBER_MASK: u8 = 0b0000_1111;
    const COLOR_SHIFT: u8 = 4;
    const JOKER: u8 = 0xFF;

    /// Create a new tile from a color and number (1-13)
    pub fn new(color: Color, number: u8) -> Self {
        assert!((1..=13).contains(&number), "Number must be 1-13");
        Tile((color.rank() << Self::COLOR_SHIFT) | number)
    }

    /// Create a joker tile
    pub fn joker() -> Self {
        Tile(Self::JOKER)
    }

    /// Get the color, or None for a joker
    pub fn color(&self) -> Option<Color> {
        if self.is_joker() {
            None
        } else {
            Some(Color::from_bits(self.0 >> Self::COLOR_SHIFT))
        }
    }

    /// Get the number (1-13), or None for a joker
    pub fn number(&self) -> Option<u8> {
        if self.is_joker() {
            None
        } else {
            Some(self.0 & Self::NUMBER_MASK)
        }
    }

    pub fn is_joker(&self) -> bool {
        self.0 == Self::JOKER
    }

    /// Score contribution of the tile; jokers count for nothing.
    pub fn face_value(&self) -> u32 {
        self.number().map_or(0, u32::from)
    }

    /// Parse a tile from a string representation
    /// Format: "r13" (red 13), "b1" (blue 1), "g7" (green 7), "z9" (black 9), "?" or "j" (joker)
    pub fn from_string(s: &str) -> Result<Self, String> {
        if s == "?" || s == "j" {
            return Ok(Tile::joker());
        }

        let mut chars = s.chars();
        let color_char = chars
            .next()
            .ok_or_else(|| "Empty tile string".to_string())?;
        let color =
            Color::from_char(color_char).ok_or_else(|| format!("Invalid color: {}", color_char))?;

        let number_str = chars.as_str();
        let number: u8 = number_str
            .parse()
            .map_err(|_| format!("Invalid number in tile '{}': {}", s, number_str))?;

        if !(1..=13).contains(&number) {
            return Err(format!("Number must be 1-13, got {}", number));
        }

        Ok(Tile::new(color, number))
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.color(), self.number()) {
            (Some(color), Some(number)) => write!(f, "{}{}", color.to_char(), number),
            _ => write!(f, "?"),
        }
    }
}

/// Parse a whitespace-separated list of tiles, e.g. "r1 r2 ? b13"
pub fn parse_tiles(input: &str) -> Result<Vec<Tile>, String> {
    input.split_whitespace().map(Tile::from_string).collect()
}

/// Sum of face values, as used by the opening rule.
pub fn score(tiles: &[Tile]) -> u32 {
    tiles.iter().map(Tile::face_value).sum()
}

/// Type of meld in Rummikub
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MeldType {
    /// A group: same number, different colors
    Group,
    /// A run: consecutive numbers, same color
    Run,
}

/// A meld (set of tiles) on the table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Meld {
    pub meld_type: MeldType,
    pub tiles: Vec<Tile>,
}

impl Meld {
    pub fn new(meld_type: MeldType, tiles: Vec<Tile>) -> Self {
        Meld { meld_type, tiles }
    }

    /// Check that the tiles can be arranged as a meld of this type, with
    /// jokers standing in for whatever tiles are missing.
    pub fn is_valid(&self) -> bool {
        if self.tiles.len() < 3 {
            return false;
        }

        let concrete: Vec<(Color, u8)> = self
            .tiles
            .iter()
            .filter_map(|t| Some((t.color()?, t.number()?)))
            .collect();
        let jokers = self.tiles.len() - concrete.len();

        match self.meld_type {
            MeldType::Group => {
                if self.tiles.len() > Color::ALL.len() {
                    return false;
                }
                let same_number = concrete.windows(2).all(|w| w[0].1 == w[1].1);
                let mut colors: Vec<Color> = concrete.iter().map(|&(c, _)| c).collect();
                colors.sort();
                colors.dedup();
                same_number && colors.len() == concrete.len()
            }
            MeldType::Run => {
                if self.tiles.len() > 13 {
                    return false;
                }
                let Some(&(color, _)) = concrete.first() else {
                    return true;
                };
                if concrete.iter().any(|&(c, _)| c != color) {
                    return false;
                }
                let mut numbers: Vec<u8> = concrete.iter().map(|&(_, n)| n).collect();
                numbers.sort();
                if numbers.windows(2).any(|w| w[0] == w[1]) {
                    return false;
                }
                let span = (numbers[numbers.len() - 1] - numbers[0] + 1) as usize;
                span - numbers.len() <= jokers
            }
        }
    }
}

impl fmt::Display for Meld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tiles: Vec<String> = self.tiles.iter().map(Tile::to_string).collect();
        write!(f, "{}", tiles.join(" "))
    }
}

/// The tiles visible to one player: the shared table and their own rack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardState {
    /// Tiles already melded on the table
    pub table: Vec<Tile>,
    /// Tiles owned by the player
    pub rack: Vec<Tile>,
    /// The player has not opened yet; the table is out of reach
    pub first_turn: bool,
}

impl BoardState {
    pub fn new(table: Vec<Tile>, rack: Vec<Tile>, first_turn: bool) -> Self {
        BoardState {
            table,
            rack,
            first_turn,
        }
    }

    /// Build a state from tile lists such as "r1 r2 r4"
    pub fn from_strings(table: &str, rack: &str, first_turn: bool) -> Result<Self, String> {
        Ok(BoardState::new(parse_tiles(table)?, parse_tiles(rack)?, first_turn))
    }

    /// Whether the combined (table then rack) position belongs to the rack
    pub fn is_rack_index(&self, index: usize) -> bool {
        index >= self.table.len()
    }

    /// Put a tile on the table
    pub fn lay(&mut self, tile: Tile) {
        self.table.push(tile);
    }

    /// Add a tile to the rack
    pub fn draw(&mut self, tile: Tile) {
        self.rack.push(tile);
    }

    /// Move a tile from the rack onto the table
    pub fn play(&mut self, tile: Tile) -> Result<(), String> {
        self.take_from_rack(tile)?;
        self.table.push(tile);
        Ok(())
    }

    pub fn take_from_table(&mut self, tile: Tile) -> Result<(), String> {
        take(&mut self.table, tile).ok_or_else(|| format!("Tile {} is not on the table", tile))
    }

    pub fn take_from_rack(&mut self, tile: Tile) -> Result<(), String> {
        take(&mut self.rack, tile).ok_or_else(|| format!("Tile {} is not on the rack", tile))
    }
}

fn take(tiles: &mut Vec<Tile>, tile: Tile) -> Option<()> {
    let pos = tiles.iter().position(|&t| t == tile)?;
    tiles.remove(pos);
    Some(())
}

/// The recommendation for one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hint {
    /// Rack tiles that can be played, sorted
    pub playable: Vec<Tile>,
    /// Resulting table layout
    pub sequences: Vec<Meld>,
}

impl Hint {
    /// At least one rack tile can be played; otherwise the player draws,
    /// even when `sequences` still describes the table.
    pub fn has_play(&self) -> bool {
        !self.playable.is_empty()
    }
}
