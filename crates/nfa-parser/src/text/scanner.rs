// Splits nft text into located block and statement events.

/// Keywords that open a nested block when followed by `{`
const BLOCK_KEYWORDS: &[&str] = &["table", "chain", "set", "map", "flowtable"];

/// Blocks whose statements may spread an inline `{ ... }` over several lines
const MULTILINE_BLOCKS: &[&str] = &["set", "map", "flowtable"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A block header followed by `{`
    Open { header: String, line: usize },
    /// One statement, terminated by newline or `;`
    Statement { text: String, line: usize },
    /// A `}` closing a block
    Close { line: usize },
    /// A statement whose inline `{` was never closed on its line
    Unbalanced { text: String, line: usize },
}

/// `elements = {` and friends: a bare key followed by `=`.
fn is_assignment(text: &str) -> bool {
    text.split_once('=').is_some_and(|(key, _)| {
        let key = key.trim();
        !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    })
}

pub fn is_block_header(text: &str) -> bool {
    let mut words = text.split_whitespace();
    match (words.next(), words.next()) {
        (Some(keyword), Some(_)) => BLOCK_KEYWORDS.contains(&keyword),
        _ => false,
    }
}

#[derive(Default)]
struct Scanner {
    events: Vec<Event>,
    buf: String,
    start_line: Option<usize>,
    inline_depth: usize,
    in_quote: bool,
    /// Keywords of the braced blocks currently open
    blocks: Vec<String>,
}

impl Scanner {
    fn push_char(&mut self, ch: char, line: usize) {
        if self.start_line.is_none() && !ch.is_whitespace() {
            self.start_line = Some(line);
        }
        self.buf.push(ch);
    }

    fn flush(&mut self, line: usize) {
        let text = self.buf.trim();
        if !text.is_empty() {
            self.events.push(Event::Statement {
                text: text.to_string(),
                line: self.start_line.unwrap_or(line),
            });
        }
        self.buf.clear();
        self.start_line = None;
    }

    fn open_block(&mut self, header: String, line: usize) {
        let keyword = header.split_whitespace().next().unwrap_or_default().to_string();
        self.blocks.push(keyword);
        self.events.push(Event::Open { header, line });
    }

    fn open_brace(&mut self, line: usize) {
        if self.inline_depth == 0 {
            let pending = self.buf.trim();
            if is_block_header(pending) {
                let header = pending.to_string();
                let start = self.start_line.unwrap_or(line);
                self.buf.clear();
                self.start_line = None;
                self.open_block(header, start);
                return;
            }

            // `table inet filter` on one line, `{` on the next
            if pending.is_empty() {
                if let Some(Event::Statement { text, line }) = self.events.last() {
                    if is_block_header(text) {
                        let (header, start) = (text.clone(), *line);
                        self.events.pop();
                        self.open_block(header, start);
                        return;
                    }
                }
            }
        }

        self.inline_depth += 1;
        self.push_char('{', line);
    }

    fn close_brace(&mut self, line: usize) {
        if self.inline_depth > 0 {
            self.inline_depth -= 1;
            self.push_char('}', line);
        } else {
            self.flush(line);
            self.blocks.pop();
            self.events.push(Event::Close { line });
        }
    }

    /// Whether an open inline `{` may continue on the next line.
    fn carries_over(&self) -> bool {
        let in_multiline_block = self
            .blocks
            .last()
            .is_some_and(|kind| MULTILINE_BLOCKS.contains(&kind.as_str()));
        in_multiline_block || is_assignment(self.buf.trim_start())
    }

    /// Drop the pending statement and its open braces.
    fn abandon(&mut self, line: usize) {
        let text = self.buf.trim().to_string();
        self.events.push(Event::Unbalanced {
            text,
            line: self.start_line.unwrap_or(line),
        });
        self.buf.clear();
        self.start_line = None;
        self.inline_depth = 0;
    }

    fn scan_line(&mut self, raw: &str, line: usize) {
        let mut prev = ' ';
        for ch in raw.chars() {
            if self.in_quote {
                self.push_char(ch, line);
                if ch == '"' {
                    self.in_quote = false;
                }
                prev = ch;
                continue;
            }

            match ch {
                '"' => {
                    self.in_quote = true;
                    self.push_char(ch, line);
                }
                '#' if prev.is_whitespace() => break,
                '{' => self.open_brace(line),
                '}' => self.close_brace(line),
                ';' if self.inline_depth == 0 => self.flush(line),
                _ => self.push_char(ch, line),
            }
            prev = ch;
        }

        self.in_quote = false;
        if self.inline_depth == 0 {
            self.flush(line);
        } else if self.carries_over() {
            self.buf.push(' ');
        } else {
            self.abandon(line);
        }
    }
}

/// Scan `content` into events. Comment lines are dropped whole, braces
/// included.
pub fn scan(content: &str) -> Vec<Event> {
    let mut scanner = Scanner::default();

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        scanner.scan_line(raw, line);
    }

    let last_line = content.lines().count().max(1);
    if scanner.inline_depth > 0 {
        scanner.abandon(last_line);
    }
    scanner.flush(last_line);
    scanner.events
}
