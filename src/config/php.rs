//! Reader for PHP config files of the form `<?php return [ ... ];`.
//!
//! Only literal values are understood: short (`[...]`) and long (`array(...)`) arrays, quoted
//! strings, integers, floats, booleans and `null`. The file is never executed, so any other
//! expression (constants, function calls, string concatenation) is reported as an error.
//!
//! Arrays whose keys are exactly `0..n` become JSON arrays, every other array becomes a JSON
//! object with stringified keys. Empty arrays become empty objects since the config files only
//! use arrays as maps.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("line {line}: {message}")]
pub(crate) struct PhpParseError {
    pub(crate) line: usize,
    pub(crate) message: String,
}

type ParseResult<T> = Result<T, PhpParseError>;

/// Parses the array returned by a PHP config file.
pub(crate) fn parse_return_value(src: &str) -> ParseResult<Value> {
    let mut parser = Parser { src, pos: 0 };

    parser.skip_trivia();
    if parser.src[parser.pos..].starts_with("<?php") {
        parser.pos += "<?php".len();
    }
    parser.skip_trivia();

    // `declare(strict_types=1);` carries no data
    if parser.peek_ident().eq_ignore_ascii_case("declare") {
        parser.skip_statement()?;
        parser.skip_trivia();
    }

    let keyword = parser.peek_ident();
    if !keyword.eq_ignore_ascii_case("return") {
        return Err(parser.error(format!("expected 'return', found '{}'", parser.snippet())));
    }
    parser.pos += keyword.len();

    let value = parser.parse_value()?;

    parser.skip_trivia();
    if parser.eat(';') {
        parser.skip_trivia();
    }
    if parser.src[parser.pos..].starts_with("?>") {
        parser.pos += 2;
        parser.skip_trivia();
    }
    if parser.pos < parser.src.len() {
        return Err(parser.error(format!("unexpected trailing input '{}'", parser.snippet())));
    }

    Ok(value)
}

#[derive(Debug)]
enum Key {
    Index(i64),
    Name(String),
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, message: String) -> PhpParseError {
        PhpParseError {
            line: self.src[..self.pos].matches('\n').count() + 1,
            message,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: char) -> ParseResult<()> {
        self.skip_trivia();
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found '{}'", expected, self.snippet())))
        }
    }

    /// Short excerpt of the remaining input for error messages.
    fn snippet(&self) -> String {
        let rest = &self.src[self.pos..];
        if rest.is_empty() {
            return "end of file".to_string();
        }
        rest.chars().take_while(|c| *c != '\n').take(20).collect()
    }

    fn peek_ident(&self) -> &'a str {
        let rest = &self.src[self.pos..];
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        &rest[..end]
    }

    /// Skips whitespace and `//`, `#` and `/* */` comments.
    fn skip_trivia(&mut self) {
        loop {
            let rest = &self.src[self.pos..];
            let trimmed = rest.trim_start();
            self.pos += rest.len() - trimmed.len();

            if trimmed.starts_with("//") || trimmed.starts_with('#') {
                self.pos += trimmed.find('\n').unwrap_or(trimmed.len());
            } else if let Some(body) = trimmed.strip_prefix("/*") {
                self.pos += match body.find("*/") {
                    Some(end) => 2 + end + 2,
                    None => trimmed.len(),
                };
            } else {
                break;
            }
        }
    }

    fn skip_statement(&mut self) -> ParseResult<()> {
        match self.src[self.pos..].find(';') {
            Some(end) => {
                self.pos += end + 1;
                Ok(())
            }
            None => Err(self.error("unterminated statement".to_string())),
        }
    }

    fn parse_value(&mut self) -> ParseResult<Value> {
        self.skip_trivia();
        match self.peek() {
            Some('[') => {
                self.pos += 1;
                self.parse_array_items(']')
            }
            Some('\'') => Ok(Value::String(self.parse_single_quoted()?)),
            Some('"') => Ok(Value::String(self.parse_double_quoted()?)),
            Some(c) if c == '-' || c == '+' || c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let ident = self.peek_ident();
                match ident.to_ascii_lowercase().as_str() {
                    "true" => {
                        self.pos += ident.len();
                        Ok(Value::Bool(true))
                    }
                    "false" => {
                        self.pos += ident.len();
                        Ok(Value::Bool(false))
                    }
                    "null" => {
                        self.pos += ident.len();
                        Ok(Value::Null)
                    }
                    "array" => {
                        self.pos += ident.len();
                        self.expect('(')?;
                        self.parse_array_items(')')
                    }
                    _ => Err(self.error(format!("unsupported expression '{}'", self.snippet()))),
                }
            }
            _ => Err(self.error(format!("expected a value, found '{}'", self.snippet()))),
        }
    }

    /// Parses `item, item, ...` up to and including `close`. The opening bracket is consumed by
    /// the caller.
    fn parse_array_items(&mut self, close: char) -> ParseResult<Value> {
        let mut entries: Vec<(Key, Value)> = Vec::new();
        let mut next_index: i64 = 0;

        loop {
            self.skip_trivia();
            if self.eat(close) {
                break;
            }

            let first = self.parse_value()?;
            self.skip_trivia();

            let (key, value) = if self.src[self.pos..].starts_with("=>") {
                self.pos += 2;
                let key = match first {
                    Value::String(s) => match s.parse::<i64>() {
                        // PHP casts decimal integer strings to integer keys
                        Ok(i) if i.to_string() == s => Key::Index(i),
                        _ => Key::Name(s),
                    },
                    Value::Number(n) if n.is_i64() => Key::Index(n.as_i64().unwrap_or_default()),
                    Value::Bool(b) => Key::Index(i64::from(b)),
                    other => {
                        return Err(self.error(format!("unsupported array key {}", other)));
                    }
                };
                (key, self.parse_value()?)
            } else {
                (Key::Index(next_index), first)
            };

            if let Key::Index(i) = key {
                let following = i
                    .checked_add(1)
                    .ok_or_else(|| self.error(format!("array key {} is too large", i)))?;
                next_index = next_index.max(following);
            }

            // Later duplicates overwrite earlier ones, as in PHP
            match entries.iter_mut().find(|(k, _)| same_key(k, &key)) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }

            self.skip_trivia();
            if self.eat(',') {
                continue;
            }
            self.skip_trivia();
            if self.eat(close) {
                break;
            }
            return Err(self.error(format!(
                "expected ',' or '{}', found '{}'",
                close,
                self.snippet()
            )));
        }

        Ok(into_json(entries))
    }

    fn parse_single_quoted(&mut self) -> ParseResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => match self.peek() {
                    Some(c @ ('\'' | '\\')) => {
                        self.pos += 1;
                        out.push(c);
                    }
                    _ => out.push('\\'),
                },
                Some('\'') => return Ok(out),
                Some(c) => out.push(c),
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string".to_string()));
                }
            }
        }
    }

    fn parse_double_quoted(&mut self) -> ParseResult<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\\') => {
                    let escaped = match self.peek() {
                        Some('n') => Some('\n'),
                        Some('t') => Some('\t'),
                        Some('r') => Some('\r'),
                        Some('v') => Some('\x0B'),
                        Some('e') => Some('\x1B'),
                        Some('f') => Some('\x0C'),
                        Some(c @ ('\\' | '$' | '"')) => Some(c),
                        _ => None,
                    };
                    match escaped {
                        Some(c) => {
                            self.pos += 1;
                            out.push(c);
                        }
                        // Unknown escapes are kept verbatim
                        None => out.push('\\'),
                    }
                }
                Some('"') => return Ok(out),
                Some(c) => out.push(c),
                None => {
                    self.pos = start;
                    return Err(self.error("unterminated string".to_string()));
                }
            }
        }
    }

    fn parse_number(&mut self) -> ParseResult<Value> {
        let rest = &self.src[self.pos..];
        let mut end = 0;
        let bytes = rest.as_bytes();
        if matches!(bytes.first(), Some(b'-' | b'+')) {
            end += 1;
        }
        let mut is_float = false;
        while end < bytes.len() {
            match bytes[end] {
                b'0'..=b'9' | b'_' => end += 1,
                b'.' | b'e' | b'E' => {
                    is_float = true;
                    end += 1;
                    if matches!(bytes.get(end), Some(b'-' | b'+')) && bytes[end - 1] != b'.' {
                        end += 1;
                    }
                }
                _ => break,
            }
        }

        let literal: String = rest[..end].chars().filter(|c| *c != '_').collect();
        let literal = literal.trim_start_matches('+');

        let number = if is_float {
            literal
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
        } else {
            literal.parse::<i64>().ok().map(Number::from)
        };

        match number {
            Some(n) => {
                self.pos += end;
                Ok(Value::Number(n))
            }
            None => Err(self.error(format!("invalid number '{}'", &rest[..end]))),
        }
    }
}

fn same_key(a: &Key, b: &Key) -> bool {
    match (a, b) {
        (Key::Index(x), Key::Index(y)) => x == y,
        (Key::Name(x), Key::Name(y)) => x == y,
        _ => false,
    }
}

fn into_json(entries: Vec<(Key, Value)>) -> Value {
    let is_list = !entries.is_empty()
        && entries
            .iter()
            .enumerate()
            .all(|(i, (k, _))| matches!(k, Key::Index(idx) if *idx == i as i64));

    if is_list {
        Value::Array(entries.into_iter().map(|(_, v)| v).collect())
    } else {
        let map: Map<String, Value> = entries
            .into_iter()
            .map(|(k, v)| {
                let key = match k {
                    Key::Index(i) => i.to_string(),
                    Key::Name(s) => s,
                };
                (key, v)
            })
            .collect();
        Value::Object(map)
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pimcore_system_config() {
        let src = r#"<?php

return [
    "database" => [
        "params" => [
            "host" => "db.internal",
            "username" => 'pimcore',
            "password" => "s3cr\"et",
            "dbname" => "shop",
            "port" => 3307,
        ]
    ],
    // unrelated settings
    "general" => [
        "timezone" => "Europe/Berlin",
        "debug" => false,
        "ratio" => 0.5,
        "fallback" => NULL,
    ],
];
"#;
        let value = parse_return_value(src).unwrap();
        assert_eq!(
            value,
            json!({
                "database": {
                    "params": {
                        "host": "db.internal",
                        "username": "pimcore",
                        "password": "s3cr\"et",
                        "dbname": "shop",
                        "port": 3307
                    }
                },
                "general": {
                    "timezone": "Europe/Berlin",
                    "debug": false,
                    "ratio": 0.5,
                    "fallback": null
                }
            })
        );
    }

    #[test]
    fn test_parse_long_array_syntax_and_comments() {
        let src = "<?php\n/* generated */\n# host config\nreturn array(\n  'hostname' => '',\n  'hostalias' => array('ip-10-0-0-1' => 'web01'),\n  'path' => '/chilicon-it/{host}'\n)\n?>\n";
        let value = parse_return_value(src).unwrap();
        assert_eq!(
            value,
            json!({
                "hostname": "",
                "hostalias": { "ip-10-0-0-1": "web01" },
                "path": "/chilicon-it/{host}"
            })
        );
    }

    #[test]
    fn test_parse_lists_and_keys() {
        let value = parse_return_value("<?php return ['a', 'b', 'c'];").unwrap();
        assert_eq!(value, json!(["a", "b", "c"]));

        let value = parse_return_value("<?php return [1 => 'a', 'b'];").unwrap();
        assert_eq!(
            value,
            json!({ "1": "a", "2": "b" }),
            "Arrays not starting at 0 are maps"
        );

        let value = parse_return_value("<?php return ['0' => 'a', 'x' => 'b', 'c'];").unwrap();
        assert_eq!(value, json!({ "0": "a", "x": "b", "1": "c" }));

        let value = parse_return_value("<?php return ['k' => 1, 'k' => 2];").unwrap();
        assert_eq!(value, json!({ "k": 2 }), "Later duplicates win");

        let value = parse_return_value("<?php return [];").unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_largest_index_key() {
        let value = parse_return_value("<?php return [-3 => 'a', 'b'];").unwrap();
        assert_eq!(value, json!({ "-3": "a", "0": "b" }));

        let err = parse_return_value("<?php return [9223372036854775807 => 'a'];").unwrap_err();
        assert!(err.message.contains("too large"), "{}", err);
        assert_eq!(err.to_string(), format!("line 1: {}", err.message));
    }

    #[test]
    fn test_parse_strings() {
        let value = parse_return_value(r#"<?php return ['a\'b\\c\n', "tab\there \$x \q"];"#)
            .unwrap();
        assert_eq!(value, json!(["a'b\\c\\n", "tab\there $x \\q"]));
    }

    #[test]
    fn test_parse_numbers() {
        let value = parse_return_value("<?php return [-5, 1_000, 2.5e3, +7];").unwrap();
        assert_eq!(value, json!([-5, 1000, 2500.0, 7]));
    }

    #[test]
    fn test_declare_is_skipped() {
        let value =
            parse_return_value("<?php\ndeclare(strict_types=1);\n\nreturn ['a' => true];").unwrap();
        assert_eq!(value, json!({ "a": true }));
    }

    #[test]
    fn test_rejects_expressions() {
        let err = parse_return_value("<?php\nreturn [\n  'password' => getenv('DB_PASS'),\n];")
            .unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("unsupported expression"), "{}", err);

        let err = parse_return_value("<?php return ['a' . 'b'];").unwrap_err();
        assert!(err.message.contains("expected ','"), "{}", err);

        let err = parse_return_value("<?php $config = [];").unwrap_err();
        assert!(err.message.contains("expected 'return'"), "{}", err);

        let err = parse_return_value("<?php return ['open").unwrap_err();
        assert!(err.message.contains("unterminated string"), "{}", err);

        let err = parse_return_value("<?php return [1, 2").unwrap_err();
        assert!(err.message.contains("end of file"), "{}", err);
    }
}
