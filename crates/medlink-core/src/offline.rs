//! Last-resort free-text order parser (English, Hindi, Hinglish).
//!
//! "2 patta dolo aur crocin 650 ek box" → [Dolo × 30, Crocin 650 × 10]

use std::collections::HashMap;

use crate::models::BillItem;

/// Numbers at or above this directly after a name are read as strength.
const STRENGTH_MIN: u32 = 100;

pub struct OfflineParser {
    numbers: HashMap<&'static str, u32>,
    units: HashMap<&'static str, u32>,
    separators: &'static [&'static str],
    noise: &'static [&'static str],
}

impl Default for OfflineParser {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Run {
    name: Vec<String>,
    quantity: u32,
    explicit: bool,
    last_was_name: bool,
}

impl Run {
    fn fresh() -> Self {
        Self { quantity: 1, ..Default::default() }
    }
}

impl OfflineParser {
    pub fn new() -> Self {
        Self {
            numbers: Self::default_numbers(),
            units: Self::default_units(),
            separators: &["and", "aur", ",", "&", "plus", "then", "phir", "also", "or"],
            noise: &[
                "a", "an", "the", "of", "please", "plz", "pls", "de", "dedo", "dena", "do", "give",
                "me", "mujhe", "add", "bill", "karo", "kar", "chahiye", "ka", "ki", "ke", "wala",
                "wali", "hai", "bhi", "i", "need", "want", "stock", "check", "search", "sell", "we",
                "have", "is", "there", "any", "how", "many", "much", "left", "available", "kya",
                "kitna", "kitne",
            ],
        }
    }

    /// Parse free text into (name, quantity) pairs. At most one pair per run
    /// between separators. A run with a quantity but no name sets the
    /// quantity of the previous item if that item had none
    /// ("taxim-o 200, 1 box"); otherwise it carries into the next run.
    pub fn parse(&self, text: &str) -> Vec<BillItem> {
        let tokens = tokenize(text);
        let mut items = Vec::new();
        let mut last_explicit = true;
        let mut run = Run::fresh();

        for (i, token) in tokens.iter().enumerate() {
            let token = token.as_str();

            if self.separators.contains(&token) {
                Self::flush(&mut run, &mut items, &mut last_explicit);
                continue;
            }

            if let Some(n) = self.number(token, tokens.get(i + 1).map(String::as_str)) {
                if !run.name.is_empty() {
                    if run.last_was_name && n >= STRENGTH_MIN {
                        run.name.push(token.to_string());
                        continue;
                    }
                    if self.ends_run(&tokens[i + 1..]) {
                        if run.explicit {
                            // "teen pan 40": quantity already spoken
                            run.name.push(token.to_string());
                        } else {
                            run.quantity = n.max(1);
                            run.explicit = true;
                            run.last_was_name = false;
                        }
                        continue;
                    }
                    Self::flush(&mut run, &mut items, &mut last_explicit);
                }
                run.quantity = n.max(1);
                run.explicit = true;
                run.last_was_name = false;
                continue;
            }

            if let Some(&per_unit) = self.units.get(token) {
                run.quantity = run.quantity.saturating_mul(per_unit);
                run.explicit = true;
                run.last_was_name = false;
                continue;
            }

            if self.noise.contains(&token) {
                continue;
            }

            run.name.push(token.to_string());
            run.last_was_name = true;
        }
        Self::flush(&mut run, &mut items, &mut last_explicit);
        items
    }

    fn flush(run: &mut Run, items: &mut Vec<BillItem>, last_explicit: &mut bool) {
        if run.name.is_empty() {
            match items.last_mut() {
                Some(previous) if run.explicit && !*last_explicit => {
                    previous.quantity = run.quantity;
                    *last_explicit = true;
                    *run = Run::fresh();
                }
                _ => run.last_was_name = false,
            }
            return;
        }
        let name = run.name.iter().map(|t| title_case(t)).collect::<Vec<_>>().join(" ");
        items.push(BillItem::new(name, run.quantity));
        *last_explicit = run.explicit;
        *run = Run::fresh();
    }

    /// True when only unit words remain before the end or a separator.
    fn ends_run(&self, rest: &[String]) -> bool {
        rest.iter()
            .find(|t| !self.units.contains_key(t.as_str()))
            .map_or(true, |t| self.separators.contains(&t.as_str()))
    }

    fn number(&self, token: &str, next: Option<&str>) -> Option<u32> {
        if let Ok(n) = token.parse::<u32>() {
            return Some(n);
        }
        // "do" is "two" only before a unit ("do patta"), otherwise "give".
        if token == "do" {
            return next.filter(|n| self.units.contains_key(*n)).map(|_| 2);
        }
        self.numbers.get(token).copied()
    }

    fn default_numbers() -> HashMap<&'static str, u32> {
        let mut map = HashMap::new();
        for (words, n) in [
            (&["one", "ek"][..], 1),
            (&["two"][..], 2),
            (&["three", "teen"][..], 3),
            (&["four", "char", "chaar"][..], 4),
            (&["five", "paanch", "panch"][..], 5),
            (&["six", "chhe", "chhah"][..], 6),
            (&["seven", "saat"][..], 7),
            (&["eight", "aath"][..], 8),
            (&["nine", "nau"][..], 9),
            (&["ten", "das"][..], 10),
            (&["eleven", "gyarah"][..], 11),
            (&["twelve", "barah"][..], 12),
            (&["thirteen"][..], 13),
            (&["fourteen"][..], 14),
            (&["fifteen", "pandrah"][..], 15),
            (&["sixteen"][..], 16),
            (&["seventeen"][..], 17),
            (&["eighteen"][..], 18),
            (&["nineteen"][..], 19),
            (&["twenty", "bees"][..], 20),
        ] {
            for word in words {
                map.insert(*word, n);
            }
        }
        map
    }

    fn default_units() -> HashMap<&'static str, u32> {
        let mut map = HashMap::new();
        for strip in ["strip", "strips", "patta", "patte", "patti", "pattas"] {
            map.insert(strip, 15);
        }
        for boxed in ["box", "boxes", "dabba", "dabbe", "dibba"] {
            map.insert(boxed, 10);
        }
        for single in ["tablet", "tablets", "tab", "tabs", "goli", "goliyan", "capsule", "capsules", "bottle", "bottles"] {
            map.insert(single, 1);
        }
        map
    }
}

/// Lowercase, split commas into their own token, drop other punctuation.
fn tokenize(text: &str) -> Vec<String> {
    let mut spaced = String::with_capacity(text.len() + 8);
    for c in text.to_lowercase().chars() {
        match c {
            ',' | '&' => {
                spaced.push(' ');
                spaced.push(c);
                spaced.push(' ');
            }
            c if c.is_alphanumeric() || c == '-' => spaced.push(c),
            _ => spaced.push(' '),
        }
    }
    spaced.split_whitespace().map(str::to_string).collect()
}

fn title_case(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<(String, u32)> {
        OfflineParser::new()
            .parse(text)
            .into_iter()
            .map(|i| (i.name, i.quantity))
            .collect()
    }

    #[test]
    fn test_strip_multiplier() {
        assert_eq!(parse("2 patta dolo"), vec![("Dolo".to_string(), 30)]);
    }

    #[test]
    fn test_default_quantity() {
        assert_eq!(parse("crocin"), vec![("Crocin".to_string(), 1)]);
    }

    #[test]
    fn test_strength_stays_in_name() {
        assert_eq!(parse("dolo 650"), vec![("Dolo 650".to_string(), 1)]);
    }

    #[test]
    fn test_postfix_quantity() {
        assert_eq!(parse("azithral 3"), vec![("Azithral".to_string(), 3)]);
        assert_eq!(parse("dolo 650 2 strips"), vec![("Dolo 650".to_string(), 30)]);
    }

    #[test]
    fn test_multiple_runs() {
        assert_eq!(
            parse("do patta dolo aur crocin ek box, teen pan 40"),
            vec![
                ("Dolo".to_string(), 30),
                ("Crocin".to_string(), 10),
                ("Pan 40".to_string(), 3),
            ]
        );
    }

    #[test]
    fn test_do_as_verb() {
        assert_eq!(parse("dolo de do"), vec![("Dolo".to_string(), 1)]);
    }

    #[test]
    fn test_number_starts_new_run() {
        assert_eq!(
            parse("dolo 2 crocin"),
            vec![("Dolo".to_string(), 1), ("Crocin".to_string(), 2)]
        );
    }

    #[test]
    fn test_empty_and_nameless() {
        assert!(parse("").is_empty());
        assert!(parse("2 strips please").is_empty());
    }

    #[test]
    fn test_hyphenated_brand() {
        assert_eq!(parse("Taxim-O 200, 1 box"), vec![("Taxim-o 200".to_string(), 10)]);
    }

    #[test]
    fn test_trailing_quantity_attaches_once() {
        assert_eq!(
            parse("dolo, 2 strips, crocin"),
            vec![("Dolo".to_string(), 30), ("Crocin".to_string(), 1)]
        );
        // An item that already has a quantity keeps it.
        assert_eq!(
            parse("azithral 3, 2 strips crocin"),
            vec![("Azithral".to_string(), 3), ("Crocin".to_string(), 30)]
        );
    }
}
