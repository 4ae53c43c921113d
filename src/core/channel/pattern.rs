// src/core/channel/pattern.rs

//! Glob matching for channel topic patterns.
//!
//! Supports `*` (any run of characters, including the `.` level separator), `?` (one
//! character), `[abc]`, `[a-z]`, `[^...]` and `\` escapes. Matching works on Unicode
//! scalar values, never on bytes. Patterns are compiled once at subscribe time and
//! matched iteratively, so hostile patterns cannot exhaust the stack.

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyOne,
    AnyRun,
    Class {
        items: Vec<(char, char)>,
        negated: bool,
    },
}

impl Token {
    fn matches(&self, c: char) -> bool {
        match self {
            Token::Literal(l) => *l == c,
            Token::AnyOne => true,
            Token::AnyRun => false,
            Token::Class { items, negated } => {
                items.iter().any(|(lo, hi)| (*lo..=*hi).contains(&c)) != *negated
            }
        }
    }
}

/// A compiled glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    source: String,
    tokens: Vec<Token>,
}

impl TopicPattern {
    pub fn compile(source: &str) -> Self {
        let chars: Vec<char> = source.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '*' => {
                    // Consecutive stars are equivalent to one.
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                    i += 1;
                }
                '?' => {
                    tokens.push(Token::AnyOne);
                    i += 1;
                }
                '\\' if i + 1 < chars.len() => {
                    tokens.push(Token::Literal(chars[i + 1]));
                    i += 2;
                }
                '[' => match compile_class(&chars[i..]) {
                    Some((token, used)) => {
                        tokens.push(token);
                        i += used;
                    }
                    // An unterminated class is taken literally.
                    None => {
                        tokens.push(Token::Literal('['));
                        i += 1;
                    }
                },
                c => {
                    tokens.push(Token::Literal(c));
                    i += 1;
                }
            }
        }
        Self {
            source: source.to_owned(),
            tokens,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, topic: &str) -> bool {
        let text: Vec<char> = topic.chars().collect();
        let (mut t, mut s) = (0usize, 0usize);
        // Position after the last `*` and the text position it is currently absorbing up to.
        let mut backtrack: Option<(usize, usize)> = None;

        while s < text.len() {
            match self.tokens.get(t) {
                Some(Token::AnyRun) => {
                    backtrack = Some((t + 1, s));
                    t += 1;
                }
                Some(token) if token.matches(text[s]) => {
                    t += 1;
                    s += 1;
                }
                _ => match backtrack {
                    Some((bt, bs)) => {
                        t = bt;
                        s = bs + 1;
                        backtrack = Some((bt, bs + 1));
                    }
                    None => return false,
                },
            }
        }
        self.tokens[t..].iter().all(|tok| *tok == Token::AnyRun)
    }
}

/// Parses `[...]` at the start of `chars`, returning the class and the characters consumed.
fn compile_class(chars: &[char]) -> Option<(Token, usize)> {
    let mut i = 1;
    let negated = chars.get(i) == Some(&'^');
    if negated {
        i += 1;
    }
    let mut items = Vec::new();
    while i < chars.len() && chars[i] != ']' {
        let mut lo = chars[i];
        if lo == '\\' && i + 1 < chars.len() {
            i += 1;
            lo = chars[i];
        }
        if i + 2 < chars.len() && chars[i + 1] == '-' && chars[i + 2] != ']' {
            let hi = chars[i + 2];
            items.push((lo.min(hi), lo.max(hi)));
            i += 3;
        } else {
            items.push((lo, lo));
            i += 1;
        }
    }
    if i >= chars.len() {
        return None;
    }
    Some((Token::Class { items, negated }, i + 1))
}
