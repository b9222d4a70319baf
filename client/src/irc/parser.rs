use std::collections::HashMap;

/// A message received from Twitch chat (tmi), per RFC 2812 plus the IRCv3
/// message-tags extension Twitch uses for chat metadata.
///
/// Wire format: `[@tags ][:prefix ]COMMAND [params...] [:trailing]\r\n`
///
/// Examples:
///   `:alice!alice@alice.tmi.twitch.tv JOIN #somechannel\r\n`
///   `@display-name=Alice;mod=0 :alice!alice@alice.tmi.twitch.tv PRIVMSG #somechannel :hi\r\n`
///   `PING :tmi.twitch.tv\r\n`
#[derive(Debug, Clone, PartialEq)]
pub struct IrcMessage {
    pub tags: HashMap<String, String>,
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Parse a single IRC line (trailing \r\n is tolerated and stripped).
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let line = line.trim_end_matches(['\r', '\n']);

        if line.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut remaining = line;
        let mut tags = HashMap::new();
        let mut prefix = None;

        // Parse optional tag segment
        if let Some(rest) = remaining.strip_prefix('@') {
            match rest.find(' ') {
                Some(idx) => {
                    tags = parse_tags(&rest[..idx]);
                    remaining = rest[idx..].trim_start();
                }
                None => return Err(ParseError::MissingCommand),
            }
        }

        // Parse optional prefix
        if let Some(rest) = remaining.strip_prefix(':') {
            match rest.find(' ') {
                Some(idx) => {
                    prefix = Some(rest[..idx].to_string());
                    remaining = rest[idx..].trim_start();
                }
                None => return Err(ParseError::MissingCommand),
            }
        }

        // Parse command
        let command;
        match remaining.find(' ') {
            Some(idx) => {
                command = remaining[..idx].to_uppercase();
                remaining = remaining[idx..].trim_start();
            }
            None => {
                command = remaining.to_uppercase();
                remaining = "";
            }
        }

        if command.is_empty() {
            return Err(ParseError::MissingCommand);
        }

        // Parse parameters. The trailing parameter is everything after a
        // colon, verbatim — chat text must survive untouched.
        let mut params = Vec::new();
        while !remaining.is_empty() {
            if let Some(trailing) = remaining.strip_prefix(':') {
                params.push(trailing.to_string());
                break;
            }

            match remaining.find(' ') {
                Some(idx) => {
                    params.push(remaining[..idx].to_string());
                    remaining = remaining[idx..].trim_start();
                }
                None => {
                    params.push(remaining.to_string());
                    break;
                }
            }
        }

        Ok(IrcMessage {
            tags,
            prefix,
            command,
            params,
        })
    }

    /// Value of a message tag, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Nickname portion of the prefix (`nick!user@host` -> `nick`).
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        Some(prefix.split('!').next().unwrap_or(prefix))
    }
}

/// Parse the `key=value;key2=value2` tag segment. Malformed entries (empty
/// keys, missing `=`, stray `;`) are dropped, not errors — Twitch adds tags
/// freely and partial traffic is expected.
fn parse_tags(segment: &str) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    for item in segment.split(';') {
        if item.is_empty() {
            continue;
        }
        let (key, value) = match item.split_once('=') {
            Some((key, value)) => (key, unescape_tag_value(value)),
            None => (item, String::new()),
        };
        if key.is_empty() {
            continue;
        }
        tags.insert(key.to_string(), value);
    }
    tags
}

/// IRCv3 tag-value unescaping: `\:` `\s` `\\` `\r` `\n`. An unknown escape
/// keeps the escaped character; a trailing lone backslash is dropped.
fn unescape_tag_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(':') => out.push(';'),
            Some('s') => out.push(' '),
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

#[derive(Debug, PartialEq)]
pub enum ParseError {
    Empty,
    MissingCommand,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Empty => write!(f, "empty message"),
            ParseError::MissingCommand => write!(f, "missing command"),
        }
    }
}

impl std::error::Error for ParseError {}
