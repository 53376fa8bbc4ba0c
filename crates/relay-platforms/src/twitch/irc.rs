//! Twitch IRC line parsing.

use chat_relay::{EntryMarker, RawEntry};
use chrono::DateTime;
use rustc_hash::FxHashMap;

/// `USERNOTICE` kinds relayed as subscriptions.
const SUBSCRIPTION_NOTICES: &[&str] = &[
    "sub",
    "resub",
    "subgift",
    "submysterygift",
    "primepaidupgrade",
];

/// One parsed IRC line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage<'a> {
    /// IRCv3 tags with escaped values decoded
    pub tags: FxHashMap<&'a str, String>,
    /// Source prefix without the leading colon
    pub prefix: Option<&'a str>,
    pub command: &'a str,
    /// Middle parameters
    pub params: Vec<&'a str>,
    /// Trailing parameter without the leading colon
    pub trailing: Option<&'a str>,
}

impl<'a> IrcMessage<'a> {
    /// Parse a single line: `[@tags] [:prefix] COMMAND [params] [:trailing]`.
    pub fn parse(line: &'a str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);
        let mut tags = FxHashMap::default();

        if let Some(stripped) = rest.strip_prefix('@') {
            let (tag_str, after) = stripped.split_once(' ')?;
            for tag in tag_str.split(';') {
                let (key, value) = tag.split_once('=').unwrap_or((tag, ""));
                if !key.is_empty() {
                    tags.insert(key, unescape_tag_value(value));
                }
            }
            rest = after;
        }

        let mut prefix = None;
        if let Some(stripped) = rest.strip_prefix(':') {
            let (p, after) = stripped.split_once(' ')?;
            prefix = Some(p);
            rest = after;
        }

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };
        let mut parts = head.split_whitespace();
        let command = parts.next()?;

        Some(Self {
            tags,
            prefix,
            command,
            params: parts.collect(),
            trailing,
        })
    }

    /// Non-empty tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Login name from the `nick!user@host` prefix.
    pub fn login(&self) -> Option<&'a str> {
        self.prefix
            .and_then(|p| p.split('!').next())
            .filter(|login| !login.is_empty() && !login.contains('.'))
    }

    pub fn channel(&self) -> Option<&'a str> {
        self.params.first().copied()
    }

    /// Convert a chat-bearing line into a raw entry.
    ///
    /// `PRIVMSG` becomes a chat line (a cheer when it carries bits) and
    /// subscription `USERNOTICE`s become subscription entries. Everything
    /// else is protocol noise.
    pub fn to_entry(&self) -> Option<RawEntry> {
        let mut entry = match self.command {
            "PRIVMSG" => {
                let mut entry = RawEntry {
                    author: self.display_name(),
                    body: self.trailing.map(|text| strip_action(text).to_string()),
                    ..Default::default()
                };
                if let Some(bits) = self.tag("bits").and_then(|b| b.parse::<u64>().ok()) {
                    entry = entry.with_marker(EntryMarker::Bits(bits));
                }
                entry
            }
            "USERNOTICE" => {
                let kind = self.tag("msg-id")?;
                if !SUBSCRIPTION_NOTICES.contains(&kind) {
                    return None;
                }
                RawEntry {
                    author: self.display_name(),
                    body: self.trailing.map(str::to_string),
                    ..Default::default()
                }
                .with_marker(EntryMarker::Subscription)
            }
            _ => return None,
        };

        entry.id = self.tag("id").map(str::to_string);
        if let Some(ts) = self
            .tag("tmi-sent-ts")
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis)
        {
            entry = entry.with_timestamp(ts);
        }
        Some(entry)
    }

    fn display_name(&self) -> Option<String> {
        self.tag("display-name")
            .or_else(|| self.tag("login"))
            .or_else(|| self.login())
            .map(str::to_string)
    }
}

/// Unwrap a CTCP `ACTION` (`/me`) message to its text.
pub fn strip_action(text: &str) -> &str {
    text.strip_prefix("\u{1}ACTION ")
        .map(|rest| rest.strip_suffix('\u{1}').unwrap_or(rest))
        .unwrap_or(text)
}

/// Decode an IRCv3 tag value.
pub fn unescape_tag_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
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

/// IRC channel name for a Twitch login.
pub fn normalize_channel(channel: &str) -> String {
    format!("#{}", channel.trim().trim_start_matches('#').to_lowercase())
}

/// Generate random anonymous username
pub fn generate_anonymous_nick() -> String {
    let random_num: u32 = rand::random::<u32>() % 100000;
    format!("justinfan{}", random_num)
}

/// Lines sent after the socket opens: capabilities, anonymous login, join.
pub fn handshake(channel: &str, nick: &str) -> Vec<String> {
    vec![
        "CAP REQ :twitch.tv/tags twitch.tv/commands".to_string(),
        "PASS oauth:".to_string(),
        format!("NICK {}", nick),
        format!("JOIN {}", normalize_channel(channel)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAT_LINE: &str = "@badge-info=;badges=broadcaster/1;color=#FF0000;display-name=TestUser;emotes=;id=abc123;mod=0;room-id=12345;subscriber=0;tmi-sent-ts=1700000000000;turbo=0;user-id=67890;user-type= :testuser!testuser@testuser.tmi.twitch.tv PRIVMSG #channel :Hello world!";

    #[test]
    fn test_parse_privmsg() {
        let msg = IrcMessage::parse(CHAT_LINE).unwrap();
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.channel(), Some("#channel"));
        assert_eq!(msg.login(), Some("testuser"));
        assert_eq!(msg.trailing, Some("Hello world!"));

        let entry = msg.to_entry().unwrap();
        assert_eq!(entry.author.as_deref(), Some("TestUser"));
        assert_eq!(entry.body.as_deref(), Some("Hello world!"));
        assert_eq!(entry.id.as_deref(), Some("abc123"));
        assert!(entry.markers.is_empty());
        assert_eq!(
            entry.observed_at.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn test_action_message_is_unwrapped() {
        let line = "@display-name=Waver;id=act1 :waver!waver@waver.tmi.twitch.tv PRIVMSG #c :\u{1}ACTION waves\u{1}";
        let entry = IrcMessage::parse(line).unwrap().to_entry().unwrap();
        assert_eq!(entry.body.as_deref(), Some("waves"));

        assert_eq!(strip_action("\u{1}ACTION dances"), "dances");
        assert_eq!(strip_action("no action here"), "no action here");
    }

    #[test]
    fn test_parse_ping() {
        let msg = IrcMessage::parse("PING :tmi.twitch.tv").unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.trailing, Some("tmi.twitch.tv"));
        assert!(msg.to_entry().is_none());
    }

    #[test]
    fn test_parse_bits_message() {
        let line = "@badges=bits/100;bits=100;display-name=Cheerer;id=def456;user-id=1 :cheerer!cheerer@cheerer.tmi.twitch.tv PRIVMSG #channel :cheer100 Great stream!";
        let entry = IrcMessage::parse(line).unwrap().to_entry().unwrap();
        assert_eq!(entry.markers, vec![EntryMarker::Bits(100)]);
        assert_eq!(entry.body.as_deref(), Some("cheer100 Great stream!"));
    }

    #[test]
    fn test_parse_resub_notice() {
        let line = r"@display-name=Loyal;login=loyal;msg-id=resub;msg-param-cumulative-months=6;system-msg=Loyal\ssubscribed\sfor\s6\smonths! :tmi.twitch.tv USERNOTICE #channel :six months already";
        let msg = IrcMessage::parse(line).unwrap();
        assert_eq!(msg.login(), None);
        assert_eq!(
            msg.tag("system-msg"),
            Some("Loyal subscribed for 6 months!")
        );

        let entry = msg.to_entry().unwrap();
        assert_eq!(entry.author.as_deref(), Some("Loyal"));
        assert_eq!(entry.markers, vec![EntryMarker::Subscription]);
        assert_eq!(entry.body.as_deref(), Some("six months already"));
    }

    #[test]
    fn test_gift_without_message() {
        let line = "@login=gifter;msg-id=submysterygift :tmi.twitch.tv USERNOTICE #channel";
        let entry = IrcMessage::parse(line).unwrap().to_entry().unwrap();
        assert_eq!(entry.author.as_deref(), Some("gifter"));
        assert!(entry.body.is_none());
    }

    #[test]
    fn test_other_notices_are_ignored() {
        let line = "@display-name=Raider;msg-id=raid :tmi.twitch.tv USERNOTICE #channel";
        assert!(IrcMessage::parse(line).unwrap().to_entry().is_none());

        let join = ":justinfan1!justinfan1@justinfan1.tmi.twitch.tv JOIN #channel";
        assert!(IrcMessage::parse(join).unwrap().to_entry().is_none());
    }

    #[test]
    fn test_unescape_tag_value() {
        assert_eq!(unescape_tag_value(r"a\sb\:c\\d"), r"a b;c\d");
        assert_eq!(unescape_tag_value(r"trailing\"), "trailing");
    }

    #[test]
    fn test_handshake() {
        let lines = handshake("SomeStreamer", "justinfan42");
        assert_eq!(lines[0], "CAP REQ :twitch.tv/tags twitch.tv/commands");
        assert_eq!(lines[2], "NICK justinfan42");
        assert_eq!(lines[3], "JOIN #somestreamer");
        assert_eq!(normalize_channel("#Chan"), "#chan");
    }

    #[test]
    fn test_generate_anonymous_nick() {
        let nick = generate_anonymous_nick();
        assert!(nick.starts_with("justinfan"));
        assert!(nick.len() > 9); // "justinfan" + at least 1 digit
    }
}
