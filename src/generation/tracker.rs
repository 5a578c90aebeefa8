//! Structural scanner that spots the end of the first top-level JSON object
//! in a stream of characters.
//!
//! The scanner only tracks string literals, escapes and brace depth. It does
//! not validate the document; that is left to the repair pipeline.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Nothing kept yet; waiting for the first `{`.
    Seeking,
    InObject,
    InString,
    /// The previous character was a backslash. `in_string` is the state to
    /// resume once the escaped character has been consumed.
    Escaped { in_string: bool },
    /// The first object has closed. Further input is ignored.
    Complete,
}

/// Per-call reconstruction state fed one character at a time.
#[derive(Debug)]
pub struct DepthTracker {
    state: ScanState,
    depth: usize,
    buffer: String,
}

impl Default for DepthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthTracker {
    pub fn new() -> Self {
        Self {
            state: ScanState::Seeking,
            depth: 0,
            buffer: String::new(),
        }
    }

    /// Feeds one character. Returns the completed document when this character
    /// closes the first top-level object.
    pub fn feed(&mut self, character: char) -> Option<String> {
        let (next, completed) = self.transition(character);
        self.state = next;
        if completed {
            return Some(std::mem::take(&mut self.buffer));
        }
        None
    }

    /// Feeds a whole fragment, stopping at the first completion.
    pub fn feed_str(&mut self, piece: &str) -> Option<String> {
        piece.chars().find_map(|character| self.feed(character))
    }

    /// Text accumulated so far, from the first `{` onward.
    pub fn partial(&self) -> &str {
        &self.buffer
    }

    pub fn has_started(&self) -> bool {
        self.state != ScanState::Seeking
    }

    pub fn is_complete(&self) -> bool {
        self.state == ScanState::Complete
    }

    pub fn into_partial(self) -> String {
        self.buffer
    }

    fn transition(&mut self, character: char) -> (ScanState, bool) {
        match self.state {
            ScanState::Complete => (ScanState::Complete, false),
            ScanState::Seeking if character == '{' => {
                self.depth = 1;
                self.buffer.push(character);
                (ScanState::InObject, false)
            }
            ScanState::Seeking => (ScanState::Seeking, false),
            ScanState::Escaped { in_string } => {
                self.buffer.push(character);
                if in_string {
                    (ScanState::InString, false)
                } else {
                    (ScanState::InObject, false)
                }
            }
            ScanState::InString => {
                self.buffer.push(character);
                match character {
                    '\\' => (ScanState::Escaped { in_string: true }, false),
                    '"' => (ScanState::InObject, false),
                    _ => (ScanState::InString, false),
                }
            }
            ScanState::InObject => {
                self.buffer.push(character);
                match character {
                    '\\' => (ScanState::Escaped { in_string: false }, false),
                    '"' => (ScanState::InString, false),
                    '{' => {
                        self.depth += 1;
                        (ScanState::InObject, false)
                    }
                    '}' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            (ScanState::Complete, true)
                        } else {
                            (ScanState::InObject, false)
                        }
                    }
                    _ => (ScanState::InObject, false),
                }
            }
        }
    }
}
