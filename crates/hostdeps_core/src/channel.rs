//! Channel string grammar.
//!
//! A channel names a family of events on a source:
//!
//! ```text
//! <objType>[(<itemSpec>)][.<action>]
//! ```
//!
//! - `objType`: event family tag (`item`, `pane`, `textEditor`, `package`,
//!   `manager`, or any caller-defined tag).
//! - `itemSpec`: a literal prefix, or `/regex/flags` (`i m s x U`; `g` is
//!   accepted and ignored). Inside a literal, `\` makes the next character
//!   literal, so `\/srv` is the prefix `/srv` and `a\(b\)` is `a(b)`.
//! - `action`: variant-specific verb; absent means "all actions".
//!
//! The sentinel [`ANY_CHANNEL`] subscribes to every channel of a source.
//!
//! # Invariants
//! - Two channels are equal iff their raw strings are equal.
//! - `Channel::parse(c.as_str())` reproduces `c`.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter, Write as _};

/// Wildcard channel: dependents registered here hear every fire on a source.
pub const ANY_CHANNEL: &str = "*";

const SUPPORTED_REGEX_FLAGS: &str = "imsxUg";

/// Decoded channel string.
#[derive(Debug, Clone)]
pub struct Channel {
    raw: String,
    obj_type: String,
    item_spec: Option<ItemSpec>,
    action: Option<String>,
}

impl Channel {
    /// Parses and validates a channel string.
    pub fn parse(raw: &str) -> Result<Self, ChannelParseError> {
        if raw.trim().is_empty() {
            return Err(ChannelParseError::Empty);
        }
        if raw == ANY_CHANNEL {
            return Ok(Self {
                raw: raw.to_string(),
                obj_type: ANY_CHANNEL.to_string(),
                item_spec: None,
                action: None,
            });
        }

        let type_end = raw.find(['(', '.']).unwrap_or(raw.len());
        let obj_type = &raw[..type_end];
        if obj_type.is_empty() {
            return Err(ChannelParseError::MissingObjectType(raw.to_string()));
        }
        if obj_type.contains(')') {
            return Err(ChannelParseError::UnbalancedItemSpec(raw.to_string()));
        }

        let mut rest = &raw[type_end..];
        let mut item_spec = None;
        if let Some(after_open) = rest.strip_prefix('(') {
            let (spec, consumed) = parse_item_spec(raw, after_open)?;
            item_spec = Some(spec);
            rest = &after_open[consumed..];
        }

        let action = if rest.is_empty() {
            None
        } else if let Some(action) = rest.strip_prefix('.') {
            if action.is_empty() {
                return Err(ChannelParseError::EmptyAction(raw.to_string()));
            }
            if action.contains(['(', ')']) {
                return Err(ChannelParseError::TrailingInput(raw.to_string()));
            }
            Some(action.to_string())
        } else {
            return Err(ChannelParseError::TrailingInput(raw.to_string()));
        };

        Ok(Self {
            raw: raw.to_string(),
            obj_type: obj_type.to_string(),
            item_spec,
            action,
        })
    }

    /// Builds the canonical channel string from its parts.
    ///
    /// Literal prefixes are escaped, so parsing the result yields the same
    /// spec back.
    pub fn compose(obj_type: &str, item_spec: Option<&ItemSpec>, action: Option<&str>) -> String {
        let mut raw = obj_type.to_string();
        if let Some(spec) = item_spec {
            raw.push('(');
            raw.push_str(&spec.to_string());
            raw.push(')');
        }
        if let Some(action) = action {
            raw.push('.');
            raw.push_str(action);
        }
        raw
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn obj_type(&self) -> &str {
        &self.obj_type
    }

    pub fn item_spec(&self) -> Option<&ItemSpec> {
        self.item_spec.as_ref()
    }

    pub fn action(&self) -> Option<&str> {
        self.action.as_deref()
    }

    pub fn is_wildcard(&self) -> bool {
        self.raw == ANY_CHANNEL
    }

    /// True when the channel has no item spec or the spec matches `name`.
    pub fn matches_item(&self, name: &str) -> bool {
        self.item_spec
            .as_ref()
            .map_or(true, |spec| spec.matches(name))
    }
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Channel {}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Channel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

/// Filter selecting which named instances a channel covers.
#[derive(Debug, Clone)]
pub enum ItemSpec {
    /// Matches names starting with the literal.
    Prefix(String),
    /// Matches names the compiled expression finds a match in.
    Pattern {
        source: String,
        flags: String,
        regex: Regex,
    },
}

impl ItemSpec {
    /// Literal prefix spec.
    pub fn prefix(value: impl Into<String>) -> Self {
        Self::Prefix(value.into())
    }

    /// Regex spec; `flags` uses the `/.../flags` letters.
    pub fn pattern(source: &str, flags: &str) -> Result<Self, ChannelParseError> {
        compile_pattern(source, flags)
    }

    /// Parses `/source/flags` or a literal prefix in its escaped form.
    pub fn parse(value: &str) -> Result<Self, ChannelParseError> {
        if let Some(body) = value.strip_prefix('/') {
            let Some(close) = body.rfind('/') else {
                return Err(ChannelParseError::UnterminatedPattern(value.to_string()));
            };
            return compile_pattern(&body[..close], &body[close + 1..]);
        }
        let mut literal = String::with_capacity(value.len());
        let mut chars = value.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => literal.push(chars.next().unwrap_or('\\')),
                other => literal.push(other),
            }
        }
        Ok(Self::Prefix(literal))
    }

    pub fn matches(&self, name: &str) -> bool {
        match self {
            Self::Prefix(prefix) => name.starts_with(prefix.as_str()),
            Self::Pattern { regex, .. } => regex.is_match(name),
        }
    }

    /// Interprets a literal spec as a comma separated list of exact names.
    ///
    /// Pattern specs behave exactly like [`ItemSpec::matches`].
    pub fn matches_name_list(&self, name: &str) -> bool {
        match self {
            Self::Prefix(list) => list.split(',').any(|entry| entry.trim() == name),
            Self::Pattern { .. } => self.matches(name),
        }
    }
}

impl PartialEq for ItemSpec {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl Eq for ItemSpec {}

impl Display for ItemSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefix(prefix) => {
                for (index, c) in prefix.chars().enumerate() {
                    if matches!(c, '\\' | '(' | ')') || (index == 0 && c == '/') {
                        f.write_char('\\')?;
                    }
                    f.write_char(c)?;
                }
                Ok(())
            }
            Self::Pattern { source, flags, .. } => write!(f, "/{source}/{flags}"),
        }
    }
}

/// Parses the item spec that follows `(`; returns it with the number of
/// bytes consumed including the closing `)`.
fn parse_item_spec(raw: &str, input: &str) -> Result<(ItemSpec, usize), ChannelParseError> {
    if let Some(body) = input.strip_prefix('/') {
        let bytes = body.as_bytes();
        let mut index = 0;
        while index < bytes.len() {
            match bytes[index] {
                b'\\' => index += 2,
                b'/' => {
                    let tail = &body[index + 1..];
                    let flags_len = tail
                        .find(|c: char| !c.is_ascii_alphabetic())
                        .unwrap_or(tail.len());
                    if tail[flags_len..].starts_with(')') {
                        let spec = compile_pattern(&body[..index], &tail[..flags_len])?;
                        // leading '/' + pattern + '/' + flags + ')'
                        return Ok((spec, 1 + index + 1 + flags_len + 1));
                    }
                    index += 1;
                }
                _ => index += 1,
            }
        }
        return Err(ChannelParseError::UnterminatedPattern(raw.to_string()));
    }

    let mut literal = String::new();
    let mut chars = input.char_indices();
    while let Some((index, c)) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some((_, escaped)) => literal.push(escaped),
                None => break,
            },
            ')' => return Ok((ItemSpec::Prefix(literal), index + 1)),
            '(' => break,
            other => literal.push(other),
        }
    }
    Err(ChannelParseError::UnbalancedItemSpec(raw.to_string()))
}

fn compile_pattern(source: &str, flags: &str) -> Result<ItemSpec, ChannelParseError> {
    let mut inline = String::new();
    for flag in flags.chars() {
        if !SUPPORTED_REGEX_FLAGS.contains(flag) {
            return Err(ChannelParseError::UnsupportedFlag(flag));
        }
        if flag != 'g' && !inline.contains(flag) {
            inline.push(flag);
        }
    }
    let expression = if inline.is_empty() {
        source.to_string()
    } else {
        format!("(?{inline}){source}")
    };
    let regex = Regex::new(&expression).map_err(|err| ChannelParseError::InvalidPattern {
        pattern: source.to_string(),
        reason: err.to_string(),
    })?;
    Ok(ItemSpec::Pattern {
        source: source.to_string(),
        flags: flags.to_string(),
        regex,
    })
}

/// Channel grammar violations. These are programmer errors at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelParseError {
    Empty,
    MissingObjectType(String),
    UnbalancedItemSpec(String),
    UnterminatedPattern(String),
    UnsupportedFlag(char),
    InvalidPattern { pattern: String, reason: String },
    EmptyAction(String),
    TrailingInput(String),
    /// The channel parsed, but the variant wiring it does not support it.
    Unsupported { variant: &'static str, channel: String, reason: String },
}

impl Display for ChannelParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "channel must not be empty"),
            Self::MissingObjectType(value) => {
                write!(f, "channel is missing its object type: {value}")
            }
            Self::UnbalancedItemSpec(value) => {
                write!(f, "channel item spec is not closed with `)`: {value}")
            }
            Self::UnterminatedPattern(value) => {
                write!(f, "channel item pattern is not terminated with `/`: {value}")
            }
            Self::UnsupportedFlag(flag) => {
                write!(f, "channel item pattern flag is unsupported: {flag}")
            }
            Self::InvalidPattern { pattern, reason } => {
                write!(f, "channel item pattern `{pattern}` does not compile: {reason}")
            }
            Self::EmptyAction(value) => write!(f, "channel action must not be empty: {value}"),
            Self::TrailingInput(value) => {
                write!(f, "channel has unexpected trailing input: {value}")
            }
            Self::Unsupported {
                variant,
                channel,
                reason,
            } => write!(f, "channel `{channel}` is not valid for {variant}: {reason}"),
        }
    }
}

impl Error for ChannelParseError {}

#[cfg(test)]
mod tests {
    use super::{Channel, ChannelParseError, ItemSpec, ANY_CHANNEL};

    #[test]
    fn decodes_regex_item_spec_with_action() {
        let channel = Channel::parse("item(/^log:/).activated").expect("channel should parse");
        assert_eq!(channel.obj_type(), "item");
        assert_eq!(channel.action(), Some("activated"));
        let spec = channel.item_spec().expect("item spec");
        assert!(spec.matches("log:build"));
        assert!(!spec.matches("catalog:build"));
    }

    #[test]
    fn decodes_literal_prefix_spec() {
        let channel = Channel::parse("item(atom://config).opened").expect("channel should parse");
        let spec = channel.item_spec().expect("item spec");
        assert_eq!(spec, &ItemSpec::prefix("atom://config"));
        assert!(channel.matches_item("atom://config/packages"));
        assert!(!channel.matches_item("file:///tmp/a.txt"));
    }

    #[test]
    fn regex_spec_may_contain_parens_dots_and_slashes() {
        let channel =
            Channel::parse(r"textEditor(/^(src|lib)[/].*\.rs$/i).opened").expect("parse");
        assert_eq!(channel.obj_type(), "textEditor");
        assert_eq!(channel.action(), Some("opened"));
        assert!(channel.matches_item("SRC/main.RS"));
        assert!(!channel.matches_item("docs/main.rs"));
    }

    #[test]
    fn plain_dotted_key_parses_as_type_and_action() {
        let channel = Channel::parse("editor.fontSize").expect("parse");
        assert_eq!(channel.obj_type(), "editor");
        assert_eq!(channel.action(), Some("fontSize"));
        assert!(channel.item_spec().is_none());
        assert!(channel.matches_item("anything"));
    }

    #[test]
    fn bare_type_has_no_action() {
        let channel = Channel::parse("panes").expect("parse");
        assert_eq!(channel.obj_type(), "panes");
        assert_eq!(channel.action(), None);
    }

    #[test]
    fn wildcard_is_recognized() {
        let channel = Channel::parse(ANY_CHANNEL).expect("parse");
        assert!(channel.is_wildcard());
    }

    #[test]
    fn compose_round_trips_through_parse() {
        let spec = ItemSpec::pattern("^log:", "i").expect("pattern");
        let raw = Channel::compose("item", Some(&spec), Some("destroyed"));
        assert_eq!(raw, "item(/^log:/i).destroyed");
        let channel = Channel::parse(&raw).expect("parse");
        assert_eq!(channel.as_str(), raw);
        assert_eq!(channel.item_spec(), Some(&spec));
    }

    #[test]
    fn absolute_path_prefix_round_trips_as_a_literal() {
        let spec = ItemSpec::prefix("/srv/mi");
        let raw = Channel::compose("items", Some(&spec), Some("opened"));
        assert_eq!(raw, r"items(\/srv/mi).opened");

        let channel = Channel::parse(&raw).expect("parse");
        assert_eq!(channel.as_str(), raw);
        assert_eq!(channel.item_spec(), Some(&spec));
        assert!(channel.matches_item("/srv/mi/a.rs"));
        assert!(!channel.matches_item("/other/SRV/x"));

        let home = ItemSpec::prefix("/home/user/project");
        let channel = Channel::parse(&Channel::compose("items", Some(&home), None)).expect("parse");
        assert_eq!(channel.item_spec(), Some(&home));
        assert!(channel.matches_item("/home/user/project/src/main.rs"));
    }

    #[test]
    fn parens_and_backslashes_in_prefix_round_trip() {
        let spec = ItemSpec::prefix(r"a(b)\c");
        let raw = Channel::compose("items", Some(&spec), Some("destroyed"));
        assert_eq!(raw, r"items(a\(b\)\\c).destroyed");

        let channel = Channel::parse(&raw).expect("parse");
        assert_eq!(channel.as_str(), raw);
        assert_eq!(channel.action(), Some("destroyed"));
        assert!(matches!(channel.item_spec(), Some(ItemSpec::Prefix(p)) if p == r"a(b)\c"));
        assert!(channel.matches_item(r"a(b)\c/d"));
        assert!(!channel.matches_item("a(b)"));
    }

    #[test]
    fn standalone_parse_honours_literal_escapes() {
        assert_eq!(
            ItemSpec::parse(r"\/home/u/a").expect("literal"),
            ItemSpec::prefix("/home/u/a")
        );
        assert_eq!(
            ItemSpec::parse(&ItemSpec::prefix("/x(1)").to_string()).expect("literal"),
            ItemSpec::prefix("/x(1)")
        );
    }

    #[test]
    fn global_flag_is_ignored() {
        let spec = ItemSpec::parse("/^a/g").expect("pattern");
        assert!(spec.matches("abc"));
    }

    #[test]
    fn name_list_matches_exact_entries_only() {
        let spec = ItemSpec::prefix("tree-view, tabs");
        assert!(spec.matches_name_list("tabs"));
        assert!(spec.matches_name_list("tree-view"));
        assert!(!spec.matches_name_list("tree"));
    }

    #[test]
    fn rejects_malformed_channels() {
        assert_eq!(Channel::parse("  ").unwrap_err(), ChannelParseError::Empty);
        assert!(matches!(
            Channel::parse("(foo).opened").unwrap_err(),
            ChannelParseError::MissingObjectType(_)
        ));
        assert!(matches!(
            Channel::parse("item(foo.opened").unwrap_err(),
            ChannelParseError::UnbalancedItemSpec(_)
        ));
        assert!(matches!(
            Channel::parse("item(/foo).opened").unwrap_err(),
            ChannelParseError::UnterminatedPattern(_)
        ));
        assert!(matches!(
            Channel::parse("item(/foo/q)").unwrap_err(),
            ChannelParseError::UnsupportedFlag('q')
        ));
        assert!(matches!(
            Channel::parse("item(/fo(o/)").unwrap_err(),
            ChannelParseError::InvalidPattern { .. }
        ));
        assert!(matches!(
            Channel::parse("item.").unwrap_err(),
            ChannelParseError::EmptyAction(_)
        ));
        assert!(matches!(
            Channel::parse(r"item(foo\)").unwrap_err(),
            ChannelParseError::UnbalancedItemSpec(_)
        ));
        assert!(matches!(
            Channel::parse("item(foo)bar").unwrap_err(),
            ChannelParseError::TrailingInput(_)
        ));
    }

    #[test]
    fn equality_is_by_raw_string() {
        let a = Channel::parse("item(/^a/)").expect("parse");
        let b = Channel::parse("item(/^a/)").expect("parse");
        let c = Channel::parse("item(^a)").expect("parse");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
