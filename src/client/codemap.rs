use crate::common::{Result, Vector2};
use std::fs;
use std::path::Path;

/// Width of one character cell on the map.
pub const COLUMN_WIDTH: f32 = 32.0;
/// Height of one text line on the map.
pub const ROW_HEIGHT: f32 = 64.0;

/// Read-only text painted across the map, used for word motions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CodeMap {
    lines: Vec<String>,
}

impl CodeMap {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_text(&fs::read_to_string(path)?))
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    /// x of the first word after the one under `at`, or `at.x` if none.
    pub fn next_word_start(&self, at: Vector2) -> f32 {
        self.locate(at)
            .and_then(|(line, col)| {
                let gap = col + line[col..].iter().position(|&c| c == b' ')?;
                let word = gap + line[gap..].iter().position(|&c| c != b' ')?;
                Some(column_x(word))
            })
            .unwrap_or(at.x)
    }

    /// x of the last character of the next word, or `at.x` if none.
    pub fn next_word_end(&self, at: Vector2) -> f32 {
        self.locate(at)
            .and_then(|(line, col)| {
                let gap = col + line[col..].iter().position(|&c| c == b' ')?;
                let word = gap + line[gap..].iter().position(|&c| c != b' ')?;
                let end = line[word..]
                    .iter()
                    .position(|&c| c == b' ')
                    .map_or(line.len(), |len| word + len);
                Some(column_x(end - 1))
            })
            .unwrap_or(at.x)
    }

    /// x of the first character of the previous word, or `at.x` if none.
    pub fn previous_word_start(&self, at: Vector2) -> f32 {
        self.locate(at)
            .and_then(|(line, col)| {
                let gap = line[..=col].iter().rposition(|&c| c == b' ')?;
                let end = line[..gap].iter().rposition(|&c| c != b' ')?;
                let start = line[..end]
                    .iter()
                    .rposition(|&c| c == b' ')
                    .map_or(0, |space| space + 1);
                Some(column_x(start))
            })
            .unwrap_or(at.x)
    }

    fn locate(&self, at: Vector2) -> Option<(&[u8], usize)> {
        if at.x < 0.0 || at.y < 0.0 {
            return None;
        }
        let line = self.lines.get((at.y / ROW_HEIGHT) as usize)?.as_bytes();
        let col = (at.x / COLUMN_WIDTH) as usize;
        (col < line.len()).then_some((line, col))
    }
}

fn column_x(col: usize) -> f32 {
    col as f32 * COLUMN_WIDTH
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map() -> CodeMap {
        CodeMap::from_text("fn main() {\n    let  x = 1;\n}\n")
    }

    fn at(col: usize, row: usize) -> Vector2 {
        Vector2::new(column_x(col), row as f32 * ROW_HEIGHT + 32.0)
    }

    #[test]
    fn test_next_word_start() {
        let map = map();
        assert_eq!(map.next_word_start(at(0, 0)), column_x(3));
        assert_eq!(map.next_word_start(at(4, 0)), column_x(10));
        // Runs of spaces are skipped.
        assert_eq!(map.next_word_start(at(5, 1)), column_x(9));
        // Last word: stay put.
        assert_eq!(map.next_word_start(at(10, 0)), column_x(10));
    }

    #[test]
    fn test_next_word_end() {
        let map = map();
        assert_eq!(map.next_word_end(at(0, 0)), column_x(8));
        assert_eq!(map.next_word_end(at(4, 1)), column_x(9));
        assert_eq!(map.next_word_end(at(13, 1)), column_x(13));
    }

    #[test]
    fn test_previous_word_start() {
        let map = map();
        assert_eq!(map.previous_word_start(at(10, 0)), column_x(3));
        assert_eq!(map.previous_word_start(at(9, 1)), column_x(4));
        assert_eq!(map.previous_word_start(at(1, 0)), column_x(1));
        // Leading indentation has no word before it.
        assert_eq!(map.previous_word_start(at(5, 1)), column_x(5));
    }

    #[test]
    fn test_positions_off_the_text_stay_put() {
        let map = map();
        assert_eq!(map.next_word_start(Vector2::new(5000.0, 32.0)), 5000.0);
        assert_eq!(map.next_word_end(Vector2::new(32.0, 5000.0)), 32.0);
        assert_eq!(map.previous_word_start(Vector2::new(-1.0, 32.0)), -1.0);
        assert_eq!(CodeMap::default().next_word_start(at(0, 0)), 0.0);
    }
}
