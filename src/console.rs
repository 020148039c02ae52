//! Line commands accepted on stdin by the `run` subcommand
//!
//! A bare `lat,lon` line is an own-ship fix, the way a GPS bridge would feed
//! the handler. Other lines are operator actions:
//!
//! ```text
//! 55.67,12.57      position fix
//! ack 12           acknowledge message 12
//! delete 12        delete message 12
//! activate 3       activate route 3
//! deactivate       deactivate the active route
//! show 3 | hide 3  toggle route display
//! poll             poll the shore now
//! list             print visible messages
//! status           print shore link status
//! ```

use crate::types::{MessageId, Position, RouteId};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsoleCommand {
    Position(Position),
    Acknowledge(MessageId),
    Delete(MessageId),
    Activate(RouteId),
    Deactivate,
    ShowRoute(RouteId),
    HideRoute(RouteId),
    Poll,
    List,
    Status,
}

impl std::str::FromStr for ConsoleCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
        let arg = parts.next();

        fn id<T: std::str::FromStr>(verb: &str, arg: Option<&str>) -> Result<T, String> {
            arg.ok_or_else(|| format!("'{verb}' needs an id"))?
                .parse()
                .map_err(|_| format!("'{verb}': invalid id"))
        }

        match verb.to_ascii_lowercase().as_str() {
            "ack" => Ok(Self::Acknowledge(id("ack", arg)?)),
            "delete" => Ok(Self::Delete(id("delete", arg)?)),
            "activate" => Ok(Self::Activate(id("activate", arg)?)),
            "deactivate" => Ok(Self::Deactivate),
            "show" => Ok(Self::ShowRoute(id("show", arg)?)),
            "hide" => Ok(Self::HideRoute(id("hide", arg)?)),
            "poll" => Ok(Self::Poll),
            "list" => Ok(Self::List),
            "status" => Ok(Self::Status),
            _ => line.parse::<Position>().map(Self::Position),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!("ack 12".parse(), Ok(ConsoleCommand::Acknowledge(12)));
        assert_eq!("DELETE 3".parse(), Ok(ConsoleCommand::Delete(3)));
        assert_eq!("activate 2".parse(), Ok(ConsoleCommand::Activate(2)));
        assert_eq!(" poll ".parse(), Ok(ConsoleCommand::Poll));
        assert_eq!(
            "55.5,12.25".parse(),
            Ok(ConsoleCommand::Position(Position::new(55.5, 12.25)))
        );
    }

    #[test]
    fn test_reject_bad_input() {
        assert!("ack".parse::<ConsoleCommand>().is_err());
        assert!("ack x".parse::<ConsoleCommand>().is_err());
        assert!("".parse::<ConsoleCommand>().is_err());
        assert!("sail north".parse::<ConsoleCommand>().is_err());
    }
}
