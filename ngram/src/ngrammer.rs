use crate::normalize::{classify, normalize, CharClass, NormalizeOptions};

/// Splits normalized text into overlapping fixed-width ngrams, one width per
/// character-class run (spec §4.1). `w_ascii` governs Latin/Kana runs,
/// `w_cjk` governs CJK runs (0 meaning "use w_ascii" is resolved by the
/// caller via `TableConfig::effective_w_cjk`). Runs shorter than their width
/// emit nothing; "Other" characters break runs and are never themselves
/// emitted.
#[derive(Debug, Clone, Copy)]
pub struct Ngrammer {
    pub w_ascii: usize,
    pub w_cjk: usize,
    pub normalize_opts: NormalizeOptions,
}

impl Ngrammer {
    pub fn new(w_ascii: usize, w_cjk: usize, normalize_opts: NormalizeOptions) -> Self {
        Ngrammer { w_ascii: w_ascii.max(1), w_cjk: w_cjk.max(1), normalize_opts }
    }

    /// Produces the ordered ngram sequence for `text`. Ngrams are returned as
    /// owned `String`s (the UTF-8 bytes of the window) — the opaque byte key
    /// named in spec §3.
    pub fn ngrams(&self, text: &str) -> Vec<String> {
        let chars = normalize(text, self.normalize_opts);
        self.ngrams_from_chars(&chars)
    }

    fn ngrams_from_chars(&self, chars: &[char]) -> Vec<String> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            let class = classify(chars[i]);
            let start = i;
            let mut end = i + 1;
            while end < chars.len() && classify(chars[end]) == class {
                end += 1;
            }
            if class != CharClass::Other {
                let width = self.width_for(class);
                let run = &chars[start..end];
                if run.len() >= width {
                    for w in run.windows(width) {
                        out.push(w.iter().collect());
                    }
                }
            }
            i = end;
        }
        out
    }

    fn width_for(&self, class: CharClass) -> usize {
        match class {
            CharClass::Cjk => self.w_cjk,
            _ => self.w_ascii,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn default_ngrammer() -> Ngrammer {
        Ngrammer::new(2, 1, NormalizeOptions::default())
    }

    #[test]
    fn ascii_bigrams() {
        let g = default_ngrammer();
        assert_eq!(g.ngrams("hello"), vec!["he", "el", "ll", "lo"]);
    }

    #[test]
    fn short_run_emits_nothing() {
        let g = default_ngrammer();
        assert!(g.ngrams("h").is_empty());
    }

    #[test]
    fn script_boundary_breaks_run() {
        let g = Ngrammer::new(2, 1, NormalizeOptions::default());
        // "東京タワー" mixes CJK ideographs with katakana; each run ngrams
        // independently.
        let grams = g.ngrams("東京タワー");
        assert!(grams.contains(&"東".to_string()));
        assert!(grams.contains(&"京".to_string()));
        assert!(!grams.contains(&"東京".to_string()));
    }

    #[test]
    fn space_separates_runs() {
        let g = default_ngrammer();
        assert_eq!(g.ngrams("hi there"), vec!["th", "he", "er", "re"]);
    }

    #[test]
    fn deterministic_across_calls() {
        let g = default_ngrammer();
        assert_eq!(g.ngrams("machine learning"), g.ngrams("machine learning"));
    }
}
