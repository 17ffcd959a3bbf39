//! Simplified bidirectional text ordering for left-to-right paragraphs.
//!
//! This is not the full Unicode Bidirectional Algorithm. It resolves each char to
//! left-to-right, right-to-left or number, lets neutrals take the direction of their
//! surroundings, and produces the runs of a line in visual order.

/// A run of chars `[from, to)` at embedding `level` (0 LTR, 1 RTL, 2 number inside RTL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidiSpan {
    /// First char column.
    pub from: usize,
    /// End char column (exclusive).
    pub to: usize,
    /// Embedding level.
    pub level: u8,
}

impl BidiSpan {
    /// Whether chars of this span are laid out right to left.
    pub fn is_rtl(&self) -> bool {
        self.level % 2 == 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharType {
    L,
    R,
    EuropeanNumber,
    ArabicNumber,
    Neutral,
}

fn char_type(ch: char) -> CharType {
    match ch as u32 {
        0x30..=0x39 => CharType::EuropeanNumber,
        0x660..=0x669 | 0x6F0..=0x6F9 => CharType::ArabicNumber,
        0x590..=0x5FF | 0x600..=0x6FF | 0x700..=0x8FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF => {
            CharType::R
        }
        _ if ch.is_alphabetic() => CharType::L,
        _ => CharType::Neutral,
    }
}

fn is_number(t: CharType) -> bool {
    matches!(t, CharType::EuropeanNumber | CharType::ArabicNumber)
}

/// Visual ordering of `text`, or `None` when the whole line is left to right.
pub fn bidi_ordering(text: &str) -> Option<Vec<BidiSpan>> {
    let mut types: Vec<CharType> = text.chars().map(char_type).collect();
    if !types
        .iter()
        .any(|t| matches!(t, CharType::R | CharType::ArabicNumber))
    {
        return None;
    }
    let len = types.len();

    // European numbers after left-to-right text read as left-to-right text.
    let mut prev_strong = CharType::L;
    for t in types.iter_mut() {
        match *t {
            CharType::L | CharType::R => prev_strong = *t,
            CharType::EuropeanNumber if prev_strong == CharType::L => *t = CharType::L,
            _ => {}
        }
    }

    // Neutrals between two runs of the same direction take that direction, otherwise LTR.
    let mut i = 0;
    while i < len {
        if types[i] != CharType::Neutral {
            i += 1;
            continue;
        }
        let start = i;
        while i < len && types[i] == CharType::Neutral {
            i += 1;
        }
        let before = if start > 0 { types[start - 1] } else { CharType::L };
        let after = if i < len { types[i] } else { CharType::L };
        let rtl = |t: CharType| t == CharType::R || is_number(t);
        let resolved = if rtl(before) && rtl(after) {
            CharType::R
        } else {
            CharType::L
        };
        for t in &mut types[start..i] {
            *t = resolved;
        }
    }

    let mut order: Vec<BidiSpan> = Vec::new();
    let mut i = 0;
    while i < len {
        if types[i] == CharType::L {
            let start = i;
            while i < len && types[i] == CharType::L {
                i += 1;
            }
            order.push(BidiSpan {
                from: start,
                to: i,
                level: 0,
            });
            continue;
        }
        // A right-to-left stretch: its pieces are inserted in reverse visual order.
        let mut pos = i;
        let at = order.len();
        while i < len && types[i] != CharType::L {
            i += 1;
        }
        let mut j = pos;
        while j < i {
            if is_number(types[j]) {
                if pos < j {
                    order.insert(at, BidiSpan { from: pos, to: j, level: 1 });
                }
                let nstart = j;
                while j < i && is_number(types[j]) {
                    j += 1;
                }
                order.insert(at, BidiSpan { from: nstart, to: j, level: 2 });
                pos = j;
            } else {
                j += 1;
            }
        }
        if pos < i {
            order.insert(at, BidiSpan { from: pos, to: i, level: 1 });
        }
    }
    Some(order)
}

/// Visual index (0-based, left to right) of the char at logical `column`.
pub fn visual_index(order: &[BidiSpan], column: usize) -> usize {
    let mut offset = 0;
    for span in order {
        if column >= span.from && column < span.to {
            return if span.is_rtl() {
                offset + (span.to - 1 - column)
            } else {
                offset + (column - span.from)
            };
        }
        offset += span.to - span.from;
    }
    offset
}

/// Index of the span containing logical `column`.
pub fn span_at(order: &[BidiSpan], column: usize) -> Option<usize> {
    order.iter().position(|s| column >= s.from && column < s.to)
}
