//! Best-effort reading of printable object representations
//!
//! Some engine objects only serialize as their printable form, e.g.
//! `Bedrock(client=<...>, model_id='m', model_kwargs={'temperature': 0.1})`.
//! Nothing here is required to succeed: every entry point returns `Option`
//! and callers prefer structured fields whenever they exist.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Number, Value};

lazy_static! {
    static ref RETRIEVER_NAME: Regex = Regex::new(r"retriever=(\w+)\(").unwrap();
    static ref INDEX_ID: Regex = Regex::new(r"index_id='(.+?)'").unwrap();
    static ref TAGS: Regex = Regex::new(r"tags=\[(.+?)\]").unwrap();
    static ref IDENT: Regex = Regex::new(r"^\w+$").unwrap();
}

/// Constructor arguments read from `TypeName(key=value, ...)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprKwargs {
    pub type_name: String,
    /// Raw argument text in declaration order
    pub kwargs: Vec<(String, String)>,
}

impl ReprKwargs {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.kwargs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Arguments as field values. `verbose` comes first; object handles
    /// (`<...>`) are skipped; values that parse as literals are converted,
    /// anything else stays raw text.
    pub fn to_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        let ordered = self
            .kwargs
            .iter()
            .filter(|(k, _)| k == "verbose")
            .chain(self.kwargs.iter().filter(|(k, _)| k != "verbose"));
        for (key, raw) in ordered {
            if raw.starts_with('<') {
                continue;
            }
            let value = parse_literal(raw).unwrap_or_else(|| Value::String(raw.clone()));
            fields.insert(key.clone(), value);
        }
        fields
    }
}

/// Split `TypeName(a=1, b='x')` into its type name and top-level arguments.
pub fn parse_repr_kwargs(repr: &str) -> Option<ReprKwargs> {
    let open = repr.find('(')?;
    let close = repr.rfind(')')?;
    if close <= open {
        return None;
    }
    let type_name = repr[..open].trim();
    if !IDENT.is_match(type_name) {
        return None;
    }

    let kwargs = split_top_level(&repr[open + 1..close])
        .into_iter()
        .filter_map(|piece| {
            let (key, value) = piece.split_once('=')?;
            let key = key.trim();
            if !IDENT.is_match(key) {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect();

    Some(ReprKwargs {
        type_name: type_name.to_string(),
        kwargs,
    })
}

/// Split on commas that are not nested in brackets or quotes.
fn split_top_level(body: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in body.chars() {
        if let Some(q) = quote {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' | '{' | '<' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' | '>' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                pieces.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Retriever details read from a chain representation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReprRetriever {
    pub name: String,
    pub index_id: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Find the `retriever=Name(...)` argument in a chain representation.
pub fn parse_retriever(repr: &str) -> Option<ReprRetriever> {
    let caps = RETRIEVER_NAME.captures(repr)?;
    let whole = caps.get(0)?;
    let tail = &repr[whole.start()..];

    let index_id = INDEX_ID
        .captures(tail)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let tags = TAGS
        .captures(tail)
        .and_then(|c| c.get(1))
        .and_then(|raw| match parse_literal(&format!("[{}]", raw.as_str()))? {
            Value::Array(items) => items
                .into_iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => None,
        });

    Some(ReprRetriever {
        name: caps.get(1)?.as_str().to_string(),
        index_id,
        tags,
    })
}

/// Parse a literal (mapping, list, tuple, string, number, `True`, `False`,
/// `None`) in printable form into a JSON value.
pub fn parse_literal(text: &str) -> Option<Value> {
    let mut parser = LiteralParser {
        chars: text.chars().collect(),
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos == parser.chars.len() {
        Some(value)
    } else {
        None
    }
}

/// Deepest container nesting accepted in a literal
const MAX_LITERAL_DEPTH: usize = 64;

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
    /// Containers currently open
    depth: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            '{' => self.nested(Self::mapping),
            '[' => self.nested(|p| p.sequence('[', ']')),
            '(' => self.nested(|p| p.sequence('(', ')')),
            '\'' | '"' => self.string().map(Value::String),
            c if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' => self.number(),
            _ => self.keyword(),
        }
    }

    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Option<Value>) -> Option<Value> {
        if self.depth >= MAX_LITERAL_DEPTH {
            return None;
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn mapping(&mut self) -> Option<Value> {
        self.eat('{');
        let mut map = Map::new();
        if self.eat('}') {
            return Some(Value::Object(map));
        }
        loop {
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            if !self.eat(':') {
                return None;
            }
            let value = self.value()?;
            map.insert(key, value);
            if self.eat(',') {
                if self.eat('}') {
                    break;
                }
                continue;
            }
            if self.eat('}') {
                break;
            }
            return None;
        }
        Some(Value::Object(map))
    }

    fn sequence(&mut self, open: char, close: char) -> Option<Value> {
        self.eat(open);
        let mut items = Vec::new();
        if self.eat(close) {
            return Some(Value::Array(items));
        }
        loop {
            items.push(self.value()?);
            if self.eat(',') {
                if self.eat(close) {
                    break;
                }
                continue;
            }
            if self.eat(close) {
                break;
            }
            return None;
        }
        Some(Value::Array(items))
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.peek()?;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self.peek()?;
            self.pos += 1;
            match c {
                '\\' => {
                    let escaped = self.peek()?;
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E' | '_'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        if let Ok(i) = text.parse::<i64>() {
            return Some(Value::Number(i.into()));
        }
        let f = text.parse::<f64>().ok()?;
        Number::from_f64(f).map(Value::Number)
    }

    fn keyword(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            "None" | "null" => Some(Value::Null),
            _ => None,
        }
    }
}
