use super::parser::IrcMessage;

/// End-of-roster numeric (RPL_ENDOFNAMES): the server finished announcing
/// who was already in the channel.
const RPL_ENDOFNAMES: &str = "366";

/// Twitch's service user; its presence lines are not real viewers.
const SERVICE_NICK: &str = "jtv";

/// A structured event extracted from one complete line of chat traffic.
///
/// Produced only by [`ChatEvent::from_line`]; immutable once created.
/// `Join`/`Part` carry normalized (lowercased) usernames. `Message` keeps the
/// sender's display casing and the text verbatim, with only trailing line
/// terminators stripped.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Server liveness probe; must be answered before anything else.
    Ping { token: Option<String> },
    /// A viewer entered the channel.
    Join { user: String },
    /// A viewer left the channel.
    Part { user: String },
    /// A chat message addressed to the channel.
    Message { user: String, text: String },
    /// The initial roster burst has been delivered.
    RosterComplete,
    /// Traffic the client does not act on.
    Unparsed,
}

impl ChatEvent {
    /// Classify one already-delimited line. Total: malformed or unrecognized
    /// traffic maps to [`ChatEvent::Unparsed`], never an error.
    pub fn from_line(line: &str) -> ChatEvent {
        let Ok(msg) = IrcMessage::parse(line) else {
            return ChatEvent::Unparsed;
        };

        match msg.command.as_str() {
            "PING" => ChatEvent::Ping {
                token: msg.params.first().cloned(),
            },
            RPL_ENDOFNAMES => ChatEvent::RosterComplete,
            "JOIN" => match presence_user(&msg) {
                Some(user) => ChatEvent::Join { user },
                None => ChatEvent::Unparsed,
            },
            "PART" => match presence_user(&msg) {
                Some(user) => ChatEvent::Part { user },
                None => ChatEvent::Unparsed,
            },
            "PRIVMSG" => match channel_message(&msg) {
                Some((user, text)) => ChatEvent::Message { user, text },
                None => ChatEvent::Unparsed,
            },
            _ => ChatEvent::Unparsed,
        }
    }
}

/// Actor of a JOIN/PART line: prefixed nick, lowercased, targeting a
/// channel. Service-user lines are ignored.
fn presence_user(msg: &IrcMessage) -> Option<String> {
    let nick = msg.nick()?;
    if nick == SERVICE_NICK {
        return None;
    }
    if !msg.params.first().is_some_and(|target| target.starts_with('#')) {
        return None;
    }
    Some(nick.to_lowercase())
}

/// Sender and body of a channel PRIVMSG. The sender is the `display-name`
/// tag when present and non-empty, else the prefix nick.
fn channel_message(msg: &IrcMessage) -> Option<(String, String)> {
    if !msg.params.first().is_some_and(|target| target.starts_with('#')) {
        return None;
    }
    let text = msg.params.get(1)?.clone();
    let user = match msg.tag("display-name") {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => msg.nick()?.to_string(),
    };
    Some((user, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ping_with_token() {
        assert_eq!(
            ChatEvent::from_line("PING :tmi.twitch.tv"),
            ChatEvent::Ping {
                token: Some("tmi.twitch.tv".into())
            }
        );
    }

    #[test]
    fn test_ping_without_token() {
        assert_eq!(ChatEvent::from_line("PING"), ChatEvent::Ping { token: None });
    }

    #[test]
    fn test_end_of_roster_numeric() {
        assert_eq!(
            ChatEvent::from_line(
                ":herald_bot.tmi.twitch.tv 366 herald_bot #somechannel :End of /NAMES list"
            ),
            ChatEvent::RosterComplete
        );
    }

    #[test]
    fn test_join_lowercases_user() {
        assert_eq!(
            ChatEvent::from_line(":Alice!alice@alice.tmi.twitch.tv JOIN #somechannel"),
            ChatEvent::Join {
                user: "alice".into()
            }
        );
    }

    #[test]
    fn test_part() {
        assert_eq!(
            ChatEvent::from_line(":alice!alice@alice.tmi.twitch.tv PART #somechannel"),
            ChatEvent::Part {
                user: "alice".into()
            }
        );
    }

    #[test]
    fn test_service_user_join_ignored() {
        assert_eq!(
            ChatEvent::from_line(":jtv!jtv@jtv.tmi.twitch.tv JOIN #somechannel"),
            ChatEvent::Unparsed
        );
    }

    #[test]
    fn test_join_without_channel_target_ignored() {
        assert_eq!(
            ChatEvent::from_line(":alice!alice@host JOIN nochannel"),
            ChatEvent::Unparsed
        );
        assert_eq!(ChatEvent::from_line("JOIN #somechannel"), ChatEvent::Unparsed);
    }

    #[test]
    fn test_message_uses_display_name() {
        let event = ChatEvent::from_line(
            "@badges=;color=#FF0000;display-name=Foo;mod=0 \
             :foo!foo@foo.tmi.twitch.tv PRIVMSG #chan :hello world",
        );
        assert_eq!(
            event,
            ChatEvent::Message {
                user: "Foo".into(),
                text: "hello world".into()
            }
        );
    }

    #[test]
    fn test_message_preserves_internal_spacing() {
        let event = ChatEvent::from_line(
            "@display-name=Bob :bob!bob@bob.tmi.twitch.tv PRIVMSG #chan :so...   much   space!?",
        );
        assert_eq!(
            event,
            ChatEvent::Message {
                user: "Bob".into(),
                text: "so...   much   space!?".into()
            }
        );
    }

    #[test]
    fn test_message_falls_back_to_prefix_nick() {
        let event =
            ChatEvent::from_line(":carol!carol@carol.tmi.twitch.tv PRIVMSG #chan :no tags here");
        assert_eq!(
            event,
            ChatEvent::Message {
                user: "carol".into(),
                text: "no tags here".into()
            }
        );
    }

    #[test]
    fn test_message_empty_display_name_falls_back() {
        let event = ChatEvent::from_line(
            "@display-name= :dave!dave@dave.tmi.twitch.tv PRIVMSG #chan :hi",
        );
        assert_eq!(
            event,
            ChatEvent::Message {
                user: "dave".into(),
                text: "hi".into()
            }
        );
    }

    #[test]
    fn test_message_without_body_ignored() {
        assert_eq!(
            ChatEvent::from_line(":a!a@a PRIVMSG #chan"),
            ChatEvent::Unparsed
        );
    }

    #[test]
    fn test_whisper_ignored() {
        // Direct messages have a plain-nick target, not a channel.
        assert_eq!(
            ChatEvent::from_line(":a!a@a PRIVMSG herald_bot :psst"),
            ChatEvent::Unparsed
        );
    }

    #[test]
    fn test_unrecognized_traffic() {
        assert_eq!(
            ChatEvent::from_line(":tmi.twitch.tv 001 herald_bot :Welcome, GLHF!"),
            ChatEvent::Unparsed
        );
        assert_eq!(
            ChatEvent::from_line(
                ":herald_bot.tmi.twitch.tv 353 herald_bot = #chan :alice bob"
            ),
            ChatEvent::Unparsed
        );
        assert_eq!(ChatEvent::from_line("garbage"), ChatEvent::Unparsed);
        assert_eq!(ChatEvent::from_line(""), ChatEvent::Unparsed);
    }
}
