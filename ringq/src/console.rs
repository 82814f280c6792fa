//! Line commands understood by the receiver and sender consoles.

use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Read,
    /// `send` with the text on the same line, or `None` to prompt for it.
    Send(Option<String>),
    Status,
    Exit,
    Empty,
    Unknown(String),
}

pub fn parse(line: &str) -> Command {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (line, ""),
    };
    match word {
        "" => Command::Empty,
        "read" => Command::Read,
        "status" => Command::Status,
        "exit" | "quit" => Command::Exit,
        "send" if rest.is_empty() => Command::Send(None),
        "send" => Command::Send(Some(rest.to_string())),
        _ => Command::Unknown(line.to_string()),
    }
}

/// Message as a sender puts it on the queue.
pub fn tag(index: u32, text: &str) -> String {
    format!("[Sender {}] {}", index, text)
}

/// Prints `prompt` and reads one line without its line ending.
/// `None` at end of input.
pub fn prompt<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    prompt: &str,
) -> io::Result<Option<String>> {
    write!(output, "{}", prompt)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    let trimmed = line.trim_end_matches(&['\n', '\r'][..]);
    Ok(Some(trimmed.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse("read"), Command::Read);
        assert_eq!(parse("  status \n"), Command::Status);
        assert_eq!(parse("exit"), Command::Exit);
        assert_eq!(parse("quit"), Command::Exit);
        assert_eq!(parse(""), Command::Empty);
        assert_eq!(parse("   "), Command::Empty);
    }

    #[test]
    fn send_keeps_inner_whitespace() {
        assert_eq!(parse("send"), Command::Send(None));
        assert_eq!(
            parse("send  Hello   World"),
            Command::Send(Some("Hello   World".to_string()))
        );
    }

    #[test]
    fn unknown_input_is_reported_verbatim() {
        assert_eq!(parse("reed 3"), Command::Unknown("reed 3".to_string()));
        assert_eq!(parse("READ"), Command::Unknown("READ".to_string()));
    }

    #[test]
    fn tags_with_sender_index() {
        assert_eq!(tag(2, "hi"), "[Sender 2] hi");
    }

    #[test]
    fn prompt_reads_lines_until_eof() -> io::Result<()> {
        let mut input = Cursor::new("first\r\nsecond\n");
        let mut output = Vec::new();
        assert_eq!(prompt(&mut input, &mut output, "> ")?.as_deref(), Some("first"));
        assert_eq!(prompt(&mut input, &mut output, "> ")?.as_deref(), Some("second"));
        assert_eq!(prompt(&mut input, &mut output, "> ")?, None);
        assert_eq!(output, b"> > > ");
        Ok(())
    }
}
