//! Control vocabulary
//!
//! Every line a client sends after its name is either a control command or
//! ordinary chat content. A line is a control line when it starts with a
//! control keyword, ignoring ASCII case. `bye` only logs out when it is the
//! whole line.

/// Log out of the server
pub const BYE: &str = "bye";

/// Force another client out: `kick <name>` (privileged)
pub const KICK: &str = "kick";

/// Stop the server (privileged)
pub const KILL: &str = "kill";

/// All recognised control keywords
pub const COMMANDS: [&str; 3] = [BYE, KICK, KILL];

/// Suffix of the control message announcing a logout
pub const LOGGED_OUT: &str = "logged out";

/// Marker appended to an accepted privileged request
pub const GRANTED: &str = "[request granted by server]";

/// Marker appended to a refused privileged request
pub const DENIED: &str = "[request denied by server]";

/// A parsed client line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Leave the chat
    Bye,
    /// Stop the server
    Kill,
    /// Ban the named client (`None` when no name followed the keyword)
    Kick(Option<String>),
    /// Ordinary chat content, kept verbatim
    Say(String),
    /// Control line that names no action, e.g. `byebye`; nothing is broadcast
    Unrecognised(String),
}

impl Command {
    /// Classify one line received from a client
    ///
    /// The kick target is whatever follows `kick` and one separator, with
    /// trailing whitespace dropped: `kick bob` and `kickbob` both name `bob`.
    pub fn parse(line: &str) -> Self {
        let Some(keyword) = COMMANDS.into_iter().find(|kw| starts_with_keyword(line, kw)) else {
            return Command::Say(line.to_string());
        };

        match keyword {
            BYE if line.eq_ignore_ascii_case(BYE) => Command::Bye,
            KILL => Command::Kill,
            KICK => {
                let rest = &line[KICK.len()..];
                let rest = rest
                    .strip_prefix(|c: char| c.is_whitespace())
                    .unwrap_or(rest)
                    .trim_end();
                Command::Kick((!rest.is_empty()).then(|| rest.to_string()))
            }
            _ => Command::Unrecognised(line.to_string()),
        }
    }

    /// True for every line starting with a control keyword
    pub fn is_control(&self) -> bool {
        !matches!(self, Command::Say(_))
    }
}

fn starts_with_keyword(line: &str, keyword: &str) -> bool {
    line.get(..keyword.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(keyword))
}

/// `<name> logged out`
pub fn logged_out(name: &str) -> String {
    format!("{} {}", name, LOGGED_OUT)
}

/// `kick <target> [request granted by server] by <requester>`
pub fn kick_granted(target: &str, requester: &str) -> String {
    format!("{} {} {} by {}", KICK, target, GRANTED, requester)
}

/// `kick <target> [client <target> does not exist] by <requester>`
pub fn kick_unknown(target: &str, requester: &str) -> String {
    format!(
        "{} {} [client {} does not exist] by {}",
        KICK, target, target, requester
    )
}

/// `kick [no client name to kick] by <requester>`
pub fn kick_missing_target(requester: &str) -> String {
    format!("{} [no client name to kick] by {}", KICK, requester)
}

/// `<keyword> [<argument>] [request denied by server] by <requester>`
pub fn denied(keyword: &str, argument: Option<&str>, requester: &str) -> String {
    match argument {
        Some(argument) => format!("{} {} {} by {}", keyword, argument, DENIED, requester),
        None => format!("{} {} by {}", keyword, DENIED, requester),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keywords_case_insensitive() {
        assert_eq!(Command::parse("bye"), Command::Bye);
        assert_eq!(Command::parse("BYE"), Command::Bye);
        assert_eq!(Command::parse("Kill"), Command::Kill);
        assert_eq!(
            Command::parse("KICK bob"),
            Command::Kick(Some("bob".to_string()))
        );
    }

    #[test]
    fn test_parse_kick_target() {
        assert_eq!(
            Command::parse("kick mallory  "),
            Command::Kick(Some("mallory".to_string()))
        );
        assert_eq!(Command::parse("kick"), Command::Kick(None));
        assert_eq!(Command::parse("kick "), Command::Kick(None));
        assert_eq!(
            Command::parse("kickbob"),
            Command::Kick(Some("bob".to_string()))
        );
        // only one separator is consumed
        assert_eq!(
            Command::parse("kick  bob"),
            Command::Kick(Some(" bob".to_string()))
        );
    }

    #[test]
    fn test_parse_keyword_prefix() {
        assert_eq!(Command::parse("KILLALL"), Command::Kill);
        assert_eq!(Command::parse("killer whales"), Command::Kill);
        assert_eq!(
            Command::parse("Kicking off"),
            Command::Kick(Some("ing off".to_string()))
        );
    }

    #[test]
    fn test_parse_bye_needs_whole_line() {
        assert_eq!(Command::parse("bYe"), Command::Bye);
        assert_eq!(
            Command::parse("byebye"),
            Command::Unrecognised("byebye".to_string())
        );
        assert_eq!(
            Command::parse("bye now"),
            Command::Unrecognised("bye now".to_string())
        );
        assert!(Command::parse("bye now").is_control());
    }

    #[test]
    fn test_parse_ordinary_content() {
        assert_eq!(
            Command::parse("hello there"),
            Command::Say("hello there".to_string())
        );
        // keywords only count at the very start of the line
        assert_eq!(
            Command::parse("goodbye"),
            Command::Say("goodbye".to_string())
        );
        assert_eq!(Command::parse(" kill"), Command::Say(" kill".to_string()));
        assert_eq!(Command::parse("ki"), Command::Say("ki".to_string()));
        assert_eq!(Command::parse("éclair"), Command::Say("éclair".to_string()));
        assert!(!Command::parse("").is_control());
    }

    #[test]
    fn test_announcements() {
        assert_eq!(logged_out("alice"), "alice logged out");
        assert_eq!(
            kick_granted("bob", "root"),
            "kick bob [request granted by server] by root"
        );
        assert_eq!(
            kick_unknown("zed", "root"),
            "kick zed [client zed does not exist] by root"
        );
        assert_eq!(
            denied(KICK, Some("bob"), "eve"),
            "kick bob [request denied by server] by eve"
        );
        assert_eq!(denied(KILL, None, "eve"), "kill [request denied by server] by eve");
    }
}
