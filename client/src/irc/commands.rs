//! Outbound command lines for the Twitch IRC handshake and keepalive.
//! All functions return formatted strings ready to send (caller appends
//! \r\n).

/// Capabilities needed for presence lines and message tags.
const CAPABILITIES: &str = "twitch.tv/membership twitch.tv/tags twitch.tv/commands";

/// Fallback PONG target when the PING carried no token.
const DEFAULT_PING_TOKEN: &str = "tmi.twitch.tv";

/// PASS oauth:token
pub fn pass(token: &str) -> String {
    format!("PASS {token}")
}

/// NICK username
pub fn nick(username: &str) -> String {
    format!("NICK {username}")
}

/// CAP REQ :twitch.tv/membership twitch.tv/tags twitch.tv/commands
pub fn cap_req() -> String {
    format!("CAP REQ :{CAPABILITIES}")
}

/// JOIN #channel (leading `#` added if missing)
pub fn join(channel: &str) -> String {
    format!("JOIN #{}", channel.trim_start_matches('#'))
}

/// PONG :token — echoes the PING token when one was given.
pub fn pong(token: Option<&str>) -> String {
    format!("PONG :{}", token.unwrap_or(DEFAULT_PING_TOKEN))
}
