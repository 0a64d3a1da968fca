//! Canonicalises player input before classification.
//!
//! Three dictionaries are consulted at each token position, in order:
//! multi-word compound phrases (longest match first), single-token club and
//! number abbreviations, then generic slang. Output is lower-cased with
//! whitespace collapsed. A replacement can form a new phrase with the token
//! before it ("duck duck hook"), so passes repeat until the text is stable,
//! which keeps `normalize` idempotent.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Upper bound on rewrite passes. Every pass that changes the text either
/// merges tokens or replaces them with fixed points, so real input settles
/// in two or three.
const MAX_PASSES: usize = 16;

const UNITS: [&str; 9] = ["one", "two", "three", "four", "five", "six", "seven", "eight", "nine"];
const TEENS: [&str; 10] = [
    "ten",
    "eleven",
    "twelve",
    "thirteen",
    "fourteen",
    "fifteen",
    "sixteen",
    "seventeen",
    "eighteen",
    "nineteen",
];
const TENS: [&str; 8] = ["twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety"];

const CLUB_ABBREVIATIONS: &[(&str, &str)] = &[
    ("dr", "driver"),
    ("drvr", "driver"),
    ("pw", "pitching wedge"),
    ("gw", "gap wedge"),
    ("aw", "gap wedge"),
    ("sw", "sand wedge"),
    ("lw", "lob wedge"),
    ("pt", "putter"),
    ("putr", "putter"),
    ("yd", "yards"),
    ("yds", "yards"),
    ("yrds", "yards"),
    ("hcp", "handicap"),
    ("hdcp", "handicap"),
];

const SLANG: &[(&str, &str)] = &[
    ("gimme", "give me"),
    ("lemme", "let me"),
    ("wanna", "want to"),
    ("gonna", "going to"),
    ("gotta", "got to"),
    ("dunno", "do not know"),
    ("pls", "please"),
    ("plz", "please"),
    ("thx", "thanks"),
    ("u", "you"),
    ("ur", "your"),
    ("whats", "what is"),
    ("hows", "how is"),
    ("skulled", "thin"),
    ("bladed", "thin"),
    ("chunked", "fat"),
    ("duffed", "fat"),
    ("chili-dipped", "fat"),
    ("pured", "solid"),
    ("bogie", "bogey"),
    ("birdy", "birdie"),
];

const SLANG_PHRASES: &[(&str, &str)] = &[
    ("duck hook", "hook"),
    ("snap hook", "hook"),
    ("banana ball", "slice"),
    ("worm burner", "topped"),
    ("up and down", "up-and-down"),
];

#[derive(Clone, Debug)]
pub struct InputNormalizer {
    compounds: HashMap<String, String>,
    max_compound_words: usize,
    abbreviations: HashMap<String, String>,
    slang: HashMap<String, String>,
}

impl Default for InputNormalizer {
    fn default() -> Self {
        let compounds = build_compounds();
        let max_compound_words =
            compounds.keys().map(|phrase| phrase.split(' ').count()).max().unwrap_or(1);
        Self {
            compounds,
            max_compound_words,
            abbreviations: build_abbreviations(),
            slang: SLANG.iter().map(|(from, to)| (from.to_string(), to.to_string())).collect(),
        }
    }
}

/// Normalises with the shared default dictionaries.
pub fn normalize(text: &str) -> String {
    static NORMALIZER: OnceLock<InputNormalizer> = OnceLock::new();
    NORMALIZER.get_or_init(InputNormalizer::default).normalize(text)
}

impl InputNormalizer {
    pub fn normalize(&self, text: &str) -> String {
        let mut current = self.rewrite(&text.to_lowercase());
        for _ in 1..MAX_PASSES {
            let next = self.rewrite(&current);
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    fn rewrite(&self, lowered: &str) -> String {
        let tokens = lowered.split_whitespace().map(Token::split).collect::<Vec<_>>();
        let mut output = Vec::with_capacity(tokens.len());
        let mut index = 0;

        while index < tokens.len() {
            if let Some((consumed, replacement)) = self.match_compound(&tokens[index..]) {
                let first = &tokens[index];
                let last = &tokens[index + consumed - 1];
                output.push(format!("{}{}{}", first.prefix, replacement, last.suffix));
                index += consumed;
                continue;
            }

            let token = &tokens[index];
            let replacement = self
                .abbreviations
                .get(token.core)
                .or_else(|| self.slang.get(token.core))
                .map(String::as_str)
                .unwrap_or(token.core);
            output.push(format!("{}{}{}", token.prefix, replacement, token.suffix));
            index += 1;
        }

        output.join(" ")
    }

    fn match_compound(&self, tokens: &[Token<'_>]) -> Option<(usize, &str)> {
        let longest = self.max_compound_words.min(tokens.len());
        (2..=longest).rev().find_map(|length| {
            let window = &tokens[..length];
            let joinable = window.iter().enumerate().all(|(position, token)| {
                !token.core.is_empty()
                    && (position == 0 || token.prefix.is_empty())
                    && (position + 1 == length || token.suffix.is_empty())
            });
            if !joinable {
                return None;
            }
            let phrase = window.iter().map(|token| token.core).collect::<Vec<_>>().join(" ");
            self.compounds.get(&phrase).map(|replacement| (length, replacement.as_str()))
        })
    }

    pub fn dictionary_outputs(&self) -> impl Iterator<Item = &str> {
        self.compounds
            .values()
            .chain(self.abbreviations.values())
            .chain(self.slang.values())
            .map(String::as_str)
    }
}

#[derive(Debug)]
struct Token<'a> {
    prefix: &'a str,
    core: &'a str,
    suffix: &'a str,
}

impl<'a> Token<'a> {
    fn split(raw: &'a str) -> Self {
        let is_leading = |ch: char| matches!(ch, '"' | '\'' | '(' | '[');
        let is_trailing =
            |ch: char| matches!(ch, ',' | '.' | '!' | '?' | ';' | ':' | '"' | '\'' | ')' | ']');

        let without_prefix = raw.trim_start_matches(is_leading);
        let prefix = &raw[..raw.len() - without_prefix.len()];
        let core = without_prefix.trim_end_matches(is_trailing);
        let suffix = &without_prefix[core.len()..];
        Self { prefix, core, suffix }
    }
}

fn number_words() -> Vec<(String, u32)> {
    let mut words = Vec::new();
    for (offset, unit) in UNITS.iter().enumerate() {
        words.push((unit.to_string(), offset as u32 + 1));
    }
    for (offset, teen) in TEENS.iter().enumerate() {
        words.push((teen.to_string(), offset as u32 + 10));
    }
    for (offset, ten) in TENS.iter().enumerate() {
        let base = (offset as u32 + 2) * 10;
        words.push((ten.to_string(), base));
        for (unit_offset, unit) in UNITS.iter().enumerate() {
            let value = base + unit_offset as u32 + 1;
            words.push((format!("{ten} {unit}"), value));
            words.push((format!("{ten}-{unit}"), value));
        }
    }
    words
}

fn build_abbreviations() -> HashMap<String, String> {
    let mut map = CLUB_ABBREVIATIONS
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect::<HashMap<_, _>>();

    for number in 2..=9 {
        map.insert(format!("{number}i"), format!("{number}-iron"));
    }
    for number in [3, 5, 7] {
        map.insert(format!("{number}w"), format!("{number}-wood"));
    }
    for number in 2..=6 {
        map.insert(format!("{number}h"), format!("{number}-hybrid"));
    }
    for (word, value) in number_words() {
        if !word.contains(' ') {
            map.insert(word, value.to_string());
        }
    }
    map
}

fn build_compounds() -> HashMap<String, String> {
    let mut map = SLANG_PHRASES
        .iter()
        .map(|(from, to)| (from.to_string(), to.to_string()))
        .collect::<HashMap<_, _>>();

    let clubs: [(&str, &[u32]); 3] =
        [("iron", &[2, 3, 4, 5, 6, 7, 8, 9]), ("wood", &[3, 5, 7]), ("hybrid", &[2, 3, 4, 5, 6])];
    for (kind, numbers) in clubs {
        for &number in numbers {
            let canonical = format!("{number}-{kind}");
            map.insert(format!("{number} {kind}"), canonical.clone());
            map.insert(format!("{} {kind}", UNITS[number as usize - 1]), canonical);
        }
    }

    let words = number_words();
    for (word, value) in &words {
        if word.contains(' ') {
            map.insert(word.clone(), value.to_string());
        }
    }

    let hundreds = [("a", 1u32), ("one", 1), ("two", 2), ("three", 3)];
    for (hundred_word, hundred) in hundreds {
        let base = hundred * 100;
        map.insert(format!("{hundred_word} hundred"), base.to_string());
        for (word, value) in &words {
            let total = (base + value).to_string();
            map.insert(format!("{hundred_word} hundred {word}"), total.clone());
            map.insert(format!("{hundred_word} hundred and {word}"), total.clone());
            // "one fifty" style yardages skip the word "hundred".
            if *value >= 10 && hundred_word != "a" {
                map.insert(format!("{hundred_word} {word}"), total);
            }
        }
        if hundred_word != "a" {
            for (offset, unit) in UNITS.iter().enumerate() {
                let total = (base + offset as u32 + 1).to_string();
                map.insert(format!("{hundred_word} oh {unit}"), total);
            }
        }
    }
    map
}
