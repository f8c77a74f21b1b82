//! Path lookup into a node's JSON state.
//!
//! Paths look like property accesses: `abc.xyz`, `.abc.xyz[0]. omn`,
//! `["xyz.123\n"].abc`. Whitespace between accesses is ignored. A malformed
//! quoted segment resolves to the empty key rather than failing.

use serde_json::Value;

/// Follows `path` through `value`, returning `None` as soon as a step is
/// missing. An empty path yields `value` itself.
pub fn resolve_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    parse_path(path)
        .iter()
        .try_fold(value, |current, key| match current {
            Value::Object(map) => map.get(key),
            Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Splits a path into its keys.
pub fn parse_path(path: &str) -> Vec<String> {
    PathParser::new(path).parse()
}

struct PathParser {
    chars: Vec<char>,
    pos: usize,
}

impl PathParser {
    fn new(path: &str) -> Self {
        Self {
            chars: path.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Vec<String> {
        let mut keys = Vec::new();
        loop {
            self.skip_spaces();
            if self.at_end() {
                break;
            }
            let start = self.pos;
            let key = self.parse_access();
            if self.pos == start {
                // stray `]`
                self.pos += 1;
                continue;
            }
            keys.push(key);
        }
        keys
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_spaces(&mut self) {
        while matches!(self.peek(), Some(c) if is_space(c)) {
            self.pos += 1;
        }
    }

    fn parse_access(&mut self) -> String {
        match self.peek() {
            Some('[') => self.parse_bracket(),
            Some('.') => {
                self.pos += 1;
                self.parse_property()
            }
            _ => self.parse_property(),
        }
    }

    fn parse_property(&mut self) -> String {
        self.skip_spaces();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '.' || c == '[' || c == ']' || is_space(c) {
                break;
            }
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn parse_bracket(&mut self) -> String {
        self.pos += 1;
        self.skip_spaces();
        let key = match self.peek() {
            Some('\'') | Some('"') => self.parse_string(),
            _ => self.parse_property(),
        };
        self.skip_spaces();
        self.pos += 1;
        key
    }

    fn parse_string(&mut self) -> String {
        let Some(quote) = self.peek() else {
            return String::new();
        };
        self.pos += 1;
        let mut result = String::new();
        loop {
            let Some(c) = self.peek() else {
                // unterminated literal
                return String::new();
            };
            if c == quote {
                self.pos += 1;
                return result;
            }
            match c {
                '\\' => {
                    if let Some(escaped) = self.scan_escape() {
                        result.push(escaped);
                    }
                }
                '\n' | '\r' => return String::new(),
                _ => {
                    result.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    /// Consumes `\x` and returns the escaped character, or `None` for an
    /// unknown escape or a path ending right after the backslash.
    fn scan_escape(&mut self) -> Option<char> {
        self.pos += 1;
        let c = self.peek()?;
        self.pos += 1;
        match c {
            '0' => Some('\0'),
            'b' => Some('\u{8}'),
            't' => Some('\t'),
            'n' => Some('\n'),
            'v' => Some('\u{b}'),
            'f' => Some('\u{c}'),
            'r' => Some('\r'),
            '\'' => Some('\''),
            '"' => Some('"'),
            _ => None,
        }
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\n' | '\r' | '\t')
}
