//! WhatsApp JID (Jabber ID) types.
//!
//! A JID addresses a user, group, device or service. The textual form is
//! `user[:agent][_device]@server`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Separator placed before the agent in the textual form.
pub const AGENT_SEPARATOR: char = ':';
/// Separator placed before the device in the textual form.
pub const DEVICE_SEPARATOR: char = '_';

/// Server part of a JID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Server {
    LegacyUser,
    Group,
    Broadcast,
    Call,
    User,
    Lid,
    Newsletter,
    Bot,
    Hosted,
    HostedLid,
    Messenger,
    Interop,
    Other(String),
}

impl Server {
    pub fn as_str(&self) -> &str {
        match self {
            Server::LegacyUser => "c.us",
            Server::Group => "g.us",
            Server::Broadcast => "broadcast",
            Server::Call => "call",
            Server::User => "s.whatsapp.net",
            Server::Lid => "lid",
            Server::Newsletter => "newsletter",
            Server::Bot => "bot",
            Server::Hosted => "hosted",
            Server::HostedLid => "hosted.lid",
            Server::Messenger => "msgr",
            Server::Interop => "interop",
            Server::Other(server) => server,
        }
    }

    /// Known server for `address`, if any.
    pub fn known(address: &str) -> Option<Server> {
        Some(match address {
            "c.us" => Server::LegacyUser,
            "g.us" => Server::Group,
            "broadcast" => Server::Broadcast,
            "call" => Server::Call,
            "s.whatsapp.net" => Server::User,
            "lid" => Server::Lid,
            "newsletter" => Server::Newsletter,
            "bot" => Server::Bot,
            "hosted" => Server::Hosted,
            "hosted.lid" => Server::HostedLid,
            "msgr" => Server::Messenger,
            "interop" => Server::Interop,
            _ => return None,
        })
    }
}

impl From<&str> for Server {
    fn from(address: &str) -> Self {
        Server::known(address).unwrap_or_else(|| Server::Other(address.to_string()))
    }
}

impl fmt::Display for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JID represents a WhatsApp address.
///
/// Device and agent are zero for plain user addresses. A JID with either set is an
/// "ad" JID and uses the dedicated wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Jid {
    pub user: Option<String>,
    pub server: Server,
    pub device: u8,
    pub agent: u8,
}

impl Jid {
    /// Creates a user JID on the given server.
    pub fn new(user: impl Into<String>, server: impl Into<Server>) -> Self {
        Self {
            user: Some(user.into()),
            server: server.into(),
            device: 0,
            agent: 0,
        }
    }

    /// Creates a JID naming only a server.
    pub fn of_server(server: impl Into<Server>) -> Self {
        Self {
            user: None,
            server: server.into(),
            device: 0,
            agent: 0,
        }
    }

    /// Creates a device JID on the default user server.
    pub fn new_ad(user: impl Into<String>, agent: u8, device: u8) -> Self {
        Self {
            user: Some(user.into()),
            server: Server::User,
            device,
            agent,
        }
    }

    /// Returns true when the JID carries an agent or device.
    pub fn is_ad(&self) -> bool {
        self.agent != 0 || self.device != 0
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(user) = &self.user else {
            return write!(f, "{}", self.server);
        };
        f.write_str(user)?;
        if self.agent != 0 {
            write!(f, "{AGENT_SEPARATOR}{}", self.agent)?;
        }
        if self.device != 0 {
            write!(f, "{DEVICE_SEPARATOR}{}", self.device)?;
        }
        write!(f, "@{}", self.server)
    }
}

/// Error type for JID parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to parse JID: {0}")]
pub struct ParseJidError(pub String);

impl FromStr for Jid {
    type Err = ParseJidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_prefix('+').unwrap_or(s);
        if s.is_empty() {
            return Err(ParseJidError("empty JID".to_string()));
        }

        let Some((user_part, server)) = s.rsplit_once('@') else {
            return Ok(match Server::known(s) {
                Some(server) => Jid::of_server(server),
                None => Jid::new(s, Server::User),
            });
        };
        if server.is_empty() {
            return Err(ParseJidError(format!("missing server in {s:?}")));
        }
        if user_part.is_empty() {
            return Ok(Jid::of_server(server));
        }

        let (rest, device) = match user_part.rsplit_once(DEVICE_SEPARATOR) {
            Some((rest, device)) => (rest, parse_component(device, "device")?),
            None => (user_part, 0),
        };
        let (user, agent) = match rest.split_once(AGENT_SEPARATOR) {
            Some((user, agent)) => (user, parse_component(agent, "agent")?),
            None => (rest, 0),
        };
        if user.is_empty() {
            return Err(ParseJidError(format!("missing user in {s:?}")));
        }

        Ok(Jid {
            user: Some(user.to_string()),
            server: server.into(),
            device,
            agent,
        })
    }
}

fn parse_component(value: &str, name: &str) -> Result<u8, ParseJidError> {
    value
        .parse()
        .map_err(|_| ParseJidError(format!("failed to parse {name} from {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_jid() {
        let jid: Jid = "1234567890@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user(), Some("1234567890"));
        assert_eq!(jid.server, Server::User);
        assert_eq!(jid.device, 0);
        assert_eq!(jid.agent, 0);
        assert!(!jid.is_ad());
    }

    #[test]
    fn test_parse_device_and_agent() {
        let jid: Jid = "1234567890:1_12@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.user(), Some("1234567890"));
        assert_eq!(jid.agent, 1);
        assert_eq!(jid.device, 12);
        assert!(jid.is_ad());
        assert_eq!(jid.to_string(), "1234567890:1_12@s.whatsapp.net");

        let device_only: Jid = "1234567890_3@s.whatsapp.net".parse().unwrap();
        assert_eq!(device_only.agent, 0);
        assert_eq!(device_only.device, 3);
    }

    #[test]
    fn test_plus_prefix_is_stripped() {
        let jid: Jid = "+391234567890@s.whatsapp.net".parse().unwrap();
        assert_eq!(jid.to_string(), "391234567890@s.whatsapp.net");
    }

    #[test]
    fn test_bare_values() {
        let server: Jid = "g.us".parse().unwrap();
        assert_eq!(server, Jid::of_server(Server::Group));
        assert_eq!(server.to_string(), "g.us");

        let phone: Jid = "391234567890".parse().unwrap();
        assert_eq!(phone, Jid::new("391234567890", Server::User));
    }

    #[test]
    fn test_unknown_server_kept() {
        let jid: Jid = "abc@example.org".parse().unwrap();
        assert_eq!(jid.server, Server::Other("example.org".to_string()));
        assert_eq!(jid.to_string(), "abc@example.org");
    }

    #[test]
    fn test_invalid_components() {
        assert!("1234:x@s.whatsapp.net".parse::<Jid>().is_err());
        assert!("1234_300@s.whatsapp.net".parse::<Jid>().is_err());
        assert!("1234@".parse::<Jid>().is_err());
        assert!("".parse::<Jid>().is_err());
    }

    #[test]
    fn test_group_jid() {
        let jid: Jid = "123456789-1234567890@g.us".parse().unwrap();
        assert_eq!(jid.user(), Some("123456789-1234567890"));
        assert_eq!(jid.server, Server::Group);
    }
}
