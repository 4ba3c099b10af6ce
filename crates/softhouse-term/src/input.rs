/// One line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Send(String),
    Login,
    Token(String),
    Logout,
    Quit,
    Help,
    Blank,
}

pub fn parse(line: &str) -> Input {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Blank;
    }

    let mut words = trimmed.splitn(2, char::is_whitespace);
    match words.next() {
        Some("/login") => Input::Login,
        Some("/logout") => Input::Logout,
        Some("/quit") | Some("/exit") => Input::Quit,
        Some("/help") => Input::Help,
        Some("/token") => match words.next().map(str::trim) {
            Some(token) if !token.is_empty() => Input::Token(token.to_string()),
            _ => Input::Help,
        },
        _ => Input::Send(line.to_string()),
    }
}

pub const HELP: &str = "\
Commands:
  /login          sign in with Google
  /token <token>  finish sign-in with the access token from the redirect
  /logout         sign out
  /quit           exit
Anything else is sent as a message.";
