use regex::Regex;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TokenizerError};

/// Splits raw text into word tokens.
pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Vec<String>;

    /// Short identifier recorded in dataset attributes.
    fn name(&self) -> &str;
}

/// Whitespace tokenizer.
#[derive(Debug, Clone, Default)]
pub struct SimpleTokenizer {
    lowercase: bool,
}

impl SimpleTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }
}

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| if self.lowercase { w.to_lowercase() } else { w.to_string() })
            .collect()
    }

    fn name(&self) -> &str {
        "simple"
    }
}

const RULE_PATTERN: &str = concat!(
    r"-[LR][RSC]B-",
    r"|\p{N}+(?:[.,:/]\p{N}+)+",
    r"|(?i:'(?:s|re|ve|m|ll|d|t))\b",
    r"|[\p{L}\p{N}]+(?:-[\p{L}\p{N}]+)*",
    r"|\.\.\.",
    r"|[^\s\p{L}\p{N}]",
);

/// Rule-based English tokenizer.
///
/// Splits punctuation and clitics off words the way treebank-style
/// tokenizers do (`don't` -> `do n't`, `it's` -> `it 's`), while keeping
/// hyphenated words, numbers with separators and treebank bracket tokens
/// such as `-LRB-` intact.
#[derive(Debug, Clone)]
pub struct RuleTokenizer {
    regex: Regex,
    lowercase: bool,
}

impl RuleTokenizer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            regex: Regex::new(RULE_PATTERN)?,
            lowercase: false,
        })
    }

    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }
}

impl Tokenizer for RuleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens: Vec<String> = Vec::new();
        // end offset of the previous match, to detect `n't` split across matches
        let mut prev_end = usize::MAX;

        for mat in self.regex.find_iter(text) {
            let piece = mat.as_str();
            let adjacent = mat.start() == prev_end;
            prev_end = mat.end();

            if adjacent && piece.eq_ignore_ascii_case("'t") {
                if let Some(last) = tokens.last_mut() {
                    if last.ends_with(['n', 'N']) {
                        let split_at = last.len() - 1;
                        let negation = format!("{}{}", &last[split_at..], piece);
                        last.truncate(split_at);
                        if last.is_empty() {
                            *last = negation;
                        } else {
                            tokens.push(negation);
                        }
                        continue;
                    }
                }
            }
            tokens.push(piece.to_string());
        }

        if self.lowercase {
            for token in tokens.iter_mut() {
                *token = token.to_lowercase();
            }
        }
        tokens
    }

    fn name(&self) -> &str {
        "rule"
    }
}

/// Named tokenizer choices, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenizerKind {
    #[default]
    Rule,
    Simple,
}

impl TokenizerKind {
    pub fn build(self) -> Result<Box<dyn Tokenizer>> {
        Ok(match self {
            TokenizerKind::Rule => Box::new(RuleTokenizer::new()?),
            TokenizerKind::Simple => Box::new(SimpleTokenizer::new()),
        })
    }
}

impl FromStr for TokenizerKind {
    type Err = TokenizerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            // "spacy" is accepted as a synonym
            "rule" | "spacy" => Ok(TokenizerKind::Rule),
            "simple" => Ok(TokenizerKind::Simple),
            other => Err(TokenizerError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for TokenizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenizerKind::Rule => write!(f, "rule"),
            TokenizerKind::Simple => write!(f, "simple"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(text: &str) -> Vec<String> {
        RuleTokenizer::new().unwrap().tokenize(text)
    }

    #[test]
    fn test_simple_splits_on_whitespace() {
        let tok = SimpleTokenizer::new();
        assert_eq!(tok.tokenize("  a  fine\tfilm\n"), vec!["a", "fine", "film"]);
        assert!(tok.tokenize("   ").is_empty());
    }

    #[test]
    fn test_simple_lowercase() {
        let tok = SimpleTokenizer::new().lowercase();
        assert_eq!(tok.tokenize("Great Movie"), vec!["great", "movie"]);
    }

    #[test]
    fn test_rule_splits_punctuation() {
        assert_eq!(rule("Great, fun film!"), vec!["Great", ",", "fun", "film", "!"]);
    }

    #[test]
    fn test_rule_splits_clitics() {
        assert_eq!(rule("it's good"), vec!["it", "'s", "good"]);
        assert_eq!(rule("we've seen"), vec!["we", "'ve", "seen"]);
        assert_eq!(rule("don't"), vec!["do", "n't"]);
        assert_eq!(rule("Can't"), vec!["Ca", "n't"]);
    }

    #[test]
    fn test_rule_keeps_pretokenized_negation() {
        // treebank text already separates the clitic
        assert_eq!(rule("does n't work"), vec!["does", "n't", "work"]);
    }

    #[test]
    fn test_rule_keeps_compounds_and_numbers() {
        assert_eq!(rule("a well-made 3.5 hour epic"), vec!["a", "well-made", "3.5", "hour", "epic"]);
        assert_eq!(rule("-LRB- aside -RRB-"), vec!["-LRB-", "aside", "-RRB-"]);
        assert_eq!(rule("wait..."), vec!["wait", "..."]);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("rule".parse::<TokenizerKind>().unwrap(), TokenizerKind::Rule);
        assert_eq!("spacy".parse::<TokenizerKind>().unwrap(), TokenizerKind::Rule);
        assert_eq!("Simple".parse::<TokenizerKind>().unwrap(), TokenizerKind::Simple);
        assert!(matches!("bpe".parse::<TokenizerKind>(), Err(TokenizerError::UnknownKind(_))));
    }

    #[test]
    fn test_kind_build_names() {
        assert_eq!(TokenizerKind::Rule.build().unwrap().name(), "rule");
        assert_eq!(TokenizerKind::Simple.build().unwrap().name(), "simple");
    }
}
