//! Operator console commands
//!
//! Lines starting with `:` are supervisor commands; anything else is passed
//! through to the server's own console.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    Status,
    Restart { delay: Duration },
    Console { page: usize },
    Stop,
    Start,
    Quit,
    Help,
    /// Forwarded to the server's stdin
    Server(String),
    /// Blank input
    Nothing,
}

impl OperatorCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Nothing);
        }
        let Some(command) = line.strip_prefix(':') else {
            return Ok(Self::Server(line.to_string()));
        };

        let mut words = command.split_whitespace();
        let name = words.next().unwrap_or_default();
        let argument = words.next();

        match name {
            "status" => Ok(Self::Status),
            "restart" => {
                let secs = match argument {
                    Some(raw) => raw
                        .parse::<u64>()
                        .map_err(|_| format!("invalid restart delay '{raw}', expected seconds"))?,
                    None => 0,
                };
                Ok(Self::Restart {
                    delay: Duration::from_secs(secs),
                })
            }
            "console" => {
                let page = match argument {
                    Some(raw) => raw
                        .parse::<usize>()
                        .map_err(|_| format!("invalid page '{raw}'"))?,
                    None => 1,
                };
                Ok(Self::Console { page })
            }
            "stop" => Ok(Self::Stop),
            "start" => Ok(Self::Start),
            "quit" | "exit" => Ok(Self::Quit),
            "help" => Ok(Self::Help),
            other => Err(format!("unknown command ':{other}', try :help")),
        }
    }
}

pub const HELP: &str = "\
:status            show supervisor status
:restart [secs]    restart the server, optionally waiting before the new start
:console [page]    show console output, newest first
:stop              terminate the server and stop restarting it
:start             allow the server to start again
:quit              terminate the server and exit
anything else is sent to the server console";
