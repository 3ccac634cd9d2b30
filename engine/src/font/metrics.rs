//! Advance widths for the standard PDF fonts the menu uses.
//!
//! Widths are in 1/1000 em, taken from the Adobe AFM files for the printable
//! ASCII range (0x20..=0x7E). Accented Latin-1 letters borrow the width of
//! their base letter, which matches the AFM data for every glyph we emit.

use super::StandardFont;

pub struct StandardFontMetrics {
    widths: &'static [u16; 95],
    default_width: u16,
}

#[rustfmt::skip]
const HELVETICA: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

#[rustfmt::skip]
const TIMES_ROMAN: [u16; 95] = [
    250, 333, 408, 500, 500, 833, 778, 180, 333, 333, 500, 564, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 278, 278, 564, 564, 564, 444,
    921, 722, 667, 667, 722, 611, 556, 722, 722, 333, 389, 722, 611, 889, 722, 722,
    556, 722, 667, 556, 611, 722, 722, 944, 722, 722, 611, 333, 278, 333, 469, 500,
    333, 444, 500, 444, 500, 444, 333, 500, 500, 278, 278, 500, 278, 778, 500, 500,
    500, 500, 333, 389, 278, 500, 500, 722, 500, 500, 444, 480, 200, 480, 541,
];

#[rustfmt::skip]
const TIMES_BOLD: [u16; 95] = [
    250, 333, 555, 500, 500, 1000, 833, 278, 333, 333, 500, 570, 250, 333, 250, 278,
    500, 500, 500, 500, 500, 500, 500, 500, 500, 500, 333, 333, 570, 570, 570, 500,
    930, 722, 667, 722, 722, 667, 611, 778, 778, 389, 500, 778, 667, 944, 722, 778,
    611, 778, 722, 556, 667, 722, 722, 1000, 722, 722, 667, 333, 278, 333, 581, 500,
    333, 500, 556, 444, 556, 444, 333, 500, 556, 278, 333, 556, 278, 833, 556, 500,
    556, 556, 444, 389, 333, 556, 500, 722, 500, 500, 444, 394, 220, 394, 520,
];

impl StandardFont {
    pub fn metrics(&self) -> StandardFontMetrics {
        match self {
            StandardFont::Helvetica => StandardFontMetrics {
                widths: &HELVETICA,
                default_width: 556,
            },
            StandardFont::TimesRoman => StandardFontMetrics {
                widths: &TIMES_ROMAN,
                default_width: 500,
            },
            StandardFont::TimesBold => StandardFontMetrics {
                widths: &TIMES_BOLD,
                default_width: 500,
            },
        }
    }
}

impl StandardFontMetrics {
    /// Width of one character in points.
    pub fn char_width(&self, ch: char, font_size: f64) -> f64 {
        let units = self.units(ch);
        units as f64 / 1000.0 * font_size
    }

    /// Width of a whole string in points.
    pub fn measure_string(&self, text: &str, font_size: f64) -> f64 {
        let units: u32 = text.chars().map(|ch| self.units(ch) as u32).sum();
        units as f64 / 1000.0 * font_size
    }

    fn units(&self, ch: char) -> u16 {
        let base = latin_base_letter(ch).unwrap_or(ch);
        let cp = base as u32;
        if (0x20..=0x7E).contains(&cp) {
            self.widths[(cp - 0x20) as usize]
        } else {
            match ch {
                '\u{2014}' => 1000,
                '\u{2013}' => 500,
                '\u{2026}' => 1000,
                '\u{00A0}' => self.widths[0],
                _ => self.default_width,
            }
        }
    }
}

/// Map an accented Latin-1 letter to its unaccented base letter.
fn latin_base_letter(ch: char) -> Option<char> {
    let base = match ch {
        'À'..='Å' => 'A',
        'Ç' => 'C',
        'È'..='Ë' => 'E',
        'Ì'..='Ï' => 'I',
        'Ñ' => 'N',
        'Ò'..='Ö' => 'O',
        'Ù'..='Ü' => 'U',
        'Ý' => 'Y',
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => return None,
    };
    Some(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helvetica_space() {
        let m = StandardFont::Helvetica.metrics();
        assert!((m.char_width(' ', 12.0) - 3.336).abs() < 0.001);
    }

    #[test]
    fn test_times_narrower_than_helvetica() {
        let times = StandardFont::TimesRoman.metrics().measure_string("Caipirinha", 12.0);
        let helv = StandardFont::Helvetica.metrics().measure_string("Caipirinha", 12.0);
        assert!(times < helv);
    }

    #[test]
    fn test_accented_letter_uses_base_width() {
        let m = StandardFont::TimesRoman.metrics();
        assert_eq!(m.char_width('ã', 10.0), m.char_width('a', 10.0));
        assert_eq!(m.char_width('Ç', 10.0), m.char_width('C', 10.0));
    }

    #[test]
    fn test_unknown_char_uses_default() {
        let m = StandardFont::Helvetica.metrics();
        assert!((m.char_width('\u{4E2D}', 10.0) - 5.56).abs() < 0.001);
    }
}
