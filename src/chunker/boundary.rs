use regex::Regex;
use std::sync::OnceLock;

/// Cut-point categories, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoundaryKind {
    Heading,
    Paragraph,
    Sentence,
    Word,
}

impl BoundaryKind {
    pub const ALL: [BoundaryKind; 4] = [
        BoundaryKind::Heading,
        BoundaryKind::Paragraph,
        BoundaryKind::Sentence,
        BoundaryKind::Word,
    ];
}

struct BoundaryPatterns {
    heading: Regex,
    paragraph: Regex,
    sentence: Regex,
    word: Regex,
}

fn patterns() -> &'static BoundaryPatterns {
    static PATTERNS: OnceLock<BoundaryPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| BoundaryPatterns {
        heading: Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+\S").expect("heading pattern is valid"),
        paragraph: Regex::new(r"\n[ \t]*\n\s*").expect("paragraph pattern is valid"),
        sentence: Regex::new(r#"[.!?]["')\]]*\s+"#).expect("sentence pattern is valid"),
        word: Regex::new(r"\s+").expect("word pattern is valid"),
    })
}

/// Maps between byte offsets and character offsets of one text.
pub struct CharIndex {
    // Byte offset of every char, followed by the text length.
    byte_offsets: Vec<usize>,
}

impl CharIndex {
    pub fn new(text: &str) -> Self {
        let mut byte_offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        byte_offsets.push(text.len());
        Self { byte_offsets }
    }

    /// Number of chars in the text.
    pub fn len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_byte(&self, char_offset: usize) -> usize {
        self.byte_offsets[char_offset.min(self.len())]
    }

    /// `byte` must lie on a char boundary.
    pub fn to_char(&self, byte: usize) -> usize {
        self.byte_offsets.partition_point(|&b| b < byte)
    }
}

/// Candidate cut positions of a text, grouped by kind.
///
/// A position `p` means "a chunk may end before char `p` and the next one
/// may start at it". Only positions strictly inside the text are kept.
pub struct Boundaries {
    positions: [Vec<usize>; 4],
}

impl Boundaries {
    /// `known_headings` are char offsets of heading lines recorded by the
    /// parser. When given they replace the `#` scan, since a parsed body only
    /// keeps `#` lines inside code blocks.
    pub fn detect(text: &str, index: &CharIndex, known_headings: Option<&[usize]>) -> Self {
        let p = patterns();
        let len = index.len();
        let inside = |pos: &usize| *pos > 0 && *pos < len;

        let mut headings: Vec<usize> = match known_headings {
            Some(offsets) => offsets.iter().copied().filter(inside).collect(),
            None => p
                .heading
                .find_iter(text)
                .map(|m| index.to_char(m.start()))
                .filter(inside)
                .collect(),
        };
        headings.sort_unstable();
        headings.dedup();

        let ends = |re: &Regex| -> Vec<usize> {
            re.find_iter(text)
                .map(|m| index.to_char(m.end()))
                .filter(inside)
                .collect()
        };

        Self {
            positions: [headings, ends(&p.paragraph), ends(&p.sentence), ends(&p.word)],
        }
    }

    pub fn of_kind(&self, kind: BoundaryKind) -> &[usize] {
        &self.positions[kind as usize]
    }

    /// Best cut in `[lo, hi]`: the strongest kind with any candidate wins,
    /// then the candidate closest to `ideal` (earlier on ties).
    pub fn best_cut(&self, lo: usize, hi: usize, ideal: usize) -> Option<(usize, BoundaryKind)> {
        BoundaryKind::ALL.into_iter().find_map(|kind| {
            let positions = self.of_kind(kind);
            let from = positions.partition_point(|&p| p < lo);
            let to = positions.partition_point(|&p| p <= hi);
            positions[from..to]
                .iter()
                .copied()
                .min_by_key(|&p| (p.abs_diff(ideal), p))
                .map(|p| (p, kind))
        })
    }

    /// Earliest boundary of any kind in `[from, before)`.
    pub fn first_in(&self, from: usize, before: usize) -> Option<usize> {
        self.positions
            .iter()
            .filter_map(|positions| {
                let i = positions.partition_point(|&p| p < from);
                positions.get(i).copied().filter(|&p| p < before)
            })
            .min()
    }
}
