use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;

/// Control commands accepted one per line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Play,
    Pause,
    Toggle,
    Stop,
    Static,
    Next,
    Channel(usize),
    Osd(String),
    Snapshot(PathBuf),
    Info,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(w, r)| (w, r.trim()));
        let needs_arg = |what: &str| {
            if rest.is_empty() {
                Err(format!("'{word}' needs {what}"))
            } else {
                Ok(rest)
            }
        };
        match word.to_ascii_lowercase().as_str() {
            "play" => Ok(Command::Play),
            "pause" => Ok(Command::Pause),
            "toggle" => Ok(Command::Toggle),
            "stop" => Ok(Command::Stop),
            "static" => Ok(Command::Static),
            "next" => Ok(Command::Next),
            "channel" | "ch" => needs_arg("a channel number")?
                .parse()
                .map(Command::Channel)
                .map_err(|e| format!("bad channel number: {e}")),
            "osd" => Ok(Command::Osd(needs_arg("text")?.to_string())),
            "snapshot" => Ok(Command::Snapshot(PathBuf::from(needs_arg("a path")?))),
            "info" => Ok(Command::Info),
            "quit" | "exit" => Ok(Command::Quit),
            "" => Err("empty command".to_string()),
            other => Err(format!("unknown command '{other}'")),
        }
    }
}

/// Forward parsed lines from `reader` to `tx` on a named thread. Unparseable
/// lines are logged and skipped; the thread ends at EOF or when the receiver
/// is gone.
pub fn spawn_reader<R>(reader: R, tx: Sender<Command>) -> std::io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("kinescope-control".into())
        .spawn(move || {
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::error!("Control input error: {e}");
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("{e}"),
                }
            }
            log::debug!("Control reader thread shutting down");
        })
}

pub fn spawn_stdin_reader(tx: Sender<Command>) -> std::io::Result<JoinHandle<()>> {
    spawn_reader(std::io::BufReader::new(std::io::stdin()), tx)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!("play".parse::<Command>().unwrap(), Command::Play);
        assert_eq!("  PAUSE ".parse::<Command>().unwrap(), Command::Pause);
        assert_eq!("channel 3".parse::<Command>().unwrap(), Command::Channel(3));
        assert_eq!(
            "osd hello  world".parse::<Command>().unwrap(),
            Command::Osd("hello  world".to_string())
        );
        assert_eq!(
            "snapshot /tmp/a.png".parse::<Command>().unwrap(),
            Command::Snapshot(PathBuf::from("/tmp/a.png"))
        );
        assert_eq!("exit".parse::<Command>().unwrap(), Command::Quit);
    }

    #[test]
    fn rejects_bad_input() {
        assert!("channel".parse::<Command>().is_err());
        assert!("channel two".parse::<Command>().is_err());
        assert!("rewind".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn reader_forwards_valid_lines() {
        let input = Cursor::new("play\nbogus\n\nnext\nquit\n");
        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = spawn_reader(input, tx).unwrap();
        handle.join().unwrap();
        let commands: Vec<Command> = rx.try_iter().collect();
        assert_eq!(commands, [Command::Play, Command::Next, Command::Quit]);
    }
}
