//! Best-effort completion of truncated JSON, used for streamed tool-call args.
//!
//! The repair never validates: it only closes what is open so that a standard
//! JSON parser can read the prefix. The parser still decides success.

use serde::Serialize;
use serde_json::Value;
use smallvec::SmallVec;

/// Turns a truncated JSON fragment into text that is hopefully valid JSON.
pub trait JsonRepair: Send + Sync {
    fn repair(&self, text: &str) -> String;
}

/// Default single-pass scanner repair.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixJson;

impl JsonRepair for FixJson {
    fn repair(&self, text: &str) -> String {
        fix_json(text)
    }
}

/// Outcome category of [`parse_partial_json`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialJsonState {
    UndefinedInput,
    SuccessfulParse,
    RepairedParse,
    FailedParse,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartialJson {
    pub value: Option<Value>,
    pub state: PartialJsonState,
}

/// Parse `text` as JSON, falling back to the default repair.
#[must_use]
pub fn parse_partial_json(text: Option<&str>) -> PartialJson {
    parse_partial_json_with(text, &FixJson)
}

/// Parse `text` as JSON, falling back to `repair` when it is truncated.
#[must_use]
pub fn parse_partial_json_with(text: Option<&str>, repair: &dyn JsonRepair) -> PartialJson {
    let Some(text) = text else {
        return PartialJson {
            value: None,
            state: PartialJsonState::UndefinedInput,
        };
    };

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return PartialJson {
            value: Some(value),
            state: PartialJsonState::SuccessfulParse,
        };
    }

    match serde_json::from_str::<Value>(&repair.repair(text)) {
        Ok(value) => PartialJson {
            value: Some(value),
            state: PartialJsonState::RepairedParse,
        },
        Err(_) => PartialJson {
            value: None,
            state: PartialJsonState::FailedParse,
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Root,
    Finish,
    InsideString,
    InsideStringEscape,
    InsideLiteral,
    InsideNumber,
    InsideObjectStart,
    InsideObjectKey,
    InsideObjectAfterKey,
    InsideObjectBeforeValue,
    InsideObjectAfterValue,
    InsideObjectAfterComma,
    InsideArrayStart,
    InsideArrayAfterValue,
    InsideArrayAfterComma,
}

const LITERALS: [&[u8]; 3] = [b"true", b"false", b"null"];

fn is_literal_prefix(partial: &[u8]) -> bool {
    LITERALS.iter().any(|literal| literal.starts_with(partial))
}

struct Scanner<'a> {
    input: &'a [u8],
    stack: SmallVec<[ScanState; 16]>,
    last_valid: Option<usize>,
    literal_start: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        let mut stack = SmallVec::new();
        stack.push(ScanState::Root);
        Self {
            input: input.as_bytes(),
            stack,
            last_valid: None,
            literal_start: 0,
        }
    }

    fn top(&self) -> Option<ScanState> {
        self.stack.last().copied()
    }

    fn swap_top(&mut self, state: ScanState) {
        self.stack.pop();
        self.stack.push(state);
    }

    fn value_start(&mut self, byte: u8, i: usize, swap_state: ScanState) {
        match byte {
            b'"' => {
                self.last_valid = Some(i);
                self.swap_top(swap_state);
                self.stack.push(ScanState::InsideString);
            }
            b'f' | b't' | b'n' => {
                self.last_valid = Some(i);
                self.literal_start = i;
                self.swap_top(swap_state);
                self.stack.push(ScanState::InsideLiteral);
            }
            b'-' => {
                self.swap_top(swap_state);
                self.stack.push(ScanState::InsideNumber);
            }
            b'0'..=b'9' => {
                self.last_valid = Some(i);
                self.swap_top(swap_state);
                self.stack.push(ScanState::InsideNumber);
            }
            b'{' => {
                self.last_valid = Some(i);
                self.swap_top(swap_state);
                self.stack.push(ScanState::InsideObjectStart);
            }
            b'[' => {
                self.last_valid = Some(i);
                self.swap_top(swap_state);
                self.stack.push(ScanState::InsideArrayStart);
            }
            _ => {}
        }
    }

    fn after_object_value(&mut self, byte: u8, i: usize) {
        match byte {
            b',' => self.swap_top(ScanState::InsideObjectAfterComma),
            b'}' => {
                self.last_valid = Some(i);
                self.stack.pop();
            }
            _ => {}
        }
    }

    fn after_array_value(&mut self, byte: u8, i: usize) {
        match byte {
            b',' => self.swap_top(ScanState::InsideArrayAfterComma),
            b']' => {
                self.last_valid = Some(i);
                self.stack.pop();
            }
            _ => {}
        }
    }

    fn step(&mut self, byte: u8, i: usize) {
        let Some(state) = self.top() else {
            return;
        };
        match state {
            ScanState::Root => self.value_start(byte, i, ScanState::Finish),
            ScanState::Finish => {}
            ScanState::InsideObjectStart => match byte {
                b'"' => self.swap_top(ScanState::InsideObjectKey),
                b'}' => {
                    self.last_valid = Some(i);
                    self.stack.pop();
                }
                _ => {}
            },
            ScanState::InsideObjectAfterComma => {
                if byte == b'"' {
                    self.swap_top(ScanState::InsideObjectKey);
                }
            }
            ScanState::InsideObjectKey => {
                if byte == b'"' {
                    self.swap_top(ScanState::InsideObjectAfterKey);
                }
            }
            ScanState::InsideObjectAfterKey => {
                if byte == b':' {
                    self.swap_top(ScanState::InsideObjectBeforeValue);
                }
            }
            ScanState::InsideObjectBeforeValue => {
                self.value_start(byte, i, ScanState::InsideObjectAfterValue);
            }
            ScanState::InsideObjectAfterValue => self.after_object_value(byte, i),
            ScanState::InsideString => match byte {
                b'"' => {
                    self.stack.pop();
                    self.last_valid = Some(i);
                }
                b'\\' => self.stack.push(ScanState::InsideStringEscape),
                _ => self.last_valid = Some(i),
            },
            ScanState::InsideArrayStart => {
                if byte == b']' {
                    self.last_valid = Some(i);
                    self.stack.pop();
                } else {
                    self.last_valid = Some(i);
                    self.value_start(byte, i, ScanState::InsideArrayAfterValue);
                }
            }
            ScanState::InsideArrayAfterValue => match byte {
                b',' => self.swap_top(ScanState::InsideArrayAfterComma),
                b']' => {
                    self.last_valid = Some(i);
                    self.stack.pop();
                }
                _ => self.last_valid = Some(i),
            },
            ScanState::InsideArrayAfterComma => {
                self.value_start(byte, i, ScanState::InsideArrayAfterValue);
            }
            ScanState::InsideStringEscape => {
                self.stack.pop();
                self.last_valid = Some(i);
            }
            ScanState::InsideNumber => self.number(byte, i),
            ScanState::InsideLiteral => {
                let partial = &self.input[self.literal_start..=i];
                if is_literal_prefix(partial) {
                    self.last_valid = Some(i);
                } else {
                    self.stack.pop();
                    match self.top() {
                        Some(ScanState::InsideObjectAfterValue) => self.after_object_value(byte, i),
                        Some(ScanState::InsideArrayAfterValue) => self.after_array_value(byte, i),
                        _ => {}
                    }
                }
            }
        }
    }

    fn number(&mut self, byte: u8, i: usize) {
        match byte {
            b'0'..=b'9' => self.last_valid = Some(i),
            b'e' | b'E' | b'-' | b'.' => {}
            b',' => {
                self.stack.pop();
                match self.top() {
                    Some(ScanState::InsideArrayAfterValue) => self.after_array_value(byte, i),
                    Some(ScanState::InsideObjectAfterValue) => self.after_object_value(byte, i),
                    _ => {}
                }
            }
            b'}' => {
                self.stack.pop();
                if self.top() == Some(ScanState::InsideObjectAfterValue) {
                    self.after_object_value(byte, i);
                }
            }
            b']' => {
                self.stack.pop();
                if self.top() == Some(ScanState::InsideArrayAfterValue) {
                    self.after_array_value(byte, i);
                }
            }
            _ => {
                self.stack.pop();
            }
        }
    }

    fn finish(self, text: &str) -> String {
        let mut end = self.last_valid.map_or(0, |i| i + 1);
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        let mut result = String::with_capacity(end + self.stack.len());
        result.push_str(&text[..end]);

        for state in self.stack.iter().rev() {
            match state {
                ScanState::InsideString => result.push('"'),
                ScanState::InsideObjectKey
                | ScanState::InsideObjectAfterKey
                | ScanState::InsideObjectAfterComma
                | ScanState::InsideObjectStart
                | ScanState::InsideObjectBeforeValue
                | ScanState::InsideObjectAfterValue => result.push('}'),
                ScanState::InsideArrayStart
                | ScanState::InsideArrayAfterComma
                | ScanState::InsideArrayAfterValue => result.push(']'),
                ScanState::InsideLiteral => {
                    let partial = &text[self.literal_start..];
                    for literal in ["true", "false", "null"] {
                        if literal.starts_with(partial) {
                            result.push_str(&literal[partial.len()..]);
                            break;
                        }
                    }
                }
                _ => {}
            }
        }

        result
    }
}

/// Close open strings, objects, arrays and literal prefixes in `input`,
/// dropping any trailing token that cannot be completed.
#[must_use]
pub fn fix_json(input: &str) -> String {
    let mut scanner = Scanner::new(input);
    for (i, &byte) in input.as_bytes().iter().enumerate() {
        scanner.step(byte, i);
    }
    scanner.finish(input)
}
