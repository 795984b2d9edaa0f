//! Parsing of committed input lines.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Look up a typed place name.
    Lookup(String),
    /// Re-run recent search N (1-based).
    Select(usize),
    ShowHistory,
    Help,
    Quit,
}

pub const HELP: &str = "\
Type a place name and press Enter to look it up.
  :N     look up recent search N again
  :h     show recent searches
  :help  show this help
  :q     quit";

/// Lines starting with ':' are commands; anything else is a place name.
/// Unknown `:` commands yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(':') else {
        return Some(Command::Lookup(line.to_string()));
    };

    match rest.trim() {
        "q" | "quit" => Some(Command::Quit),
        "h" | "history" => Some(Command::ShowHistory),
        "help" | "?" => Some(Command::Help),
        n => n.parse::<usize>().ok().map(Command::Select),
    }
}
