use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::Duration,
};

use clap::Parser;
use gesture_trainer_core::{
    AppConfig, Envelope, GestureId, HostTransport, Session, SessionClock, TemplateMatcherFactory,
    TrainerError,
};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

const IDLE_WAIT: Duration = Duration::from_secs(1);

fn main() -> gesture_trainer_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    run_bridge(&config)
}

fn run_bridge(config: &AppConfig) -> gesture_trainer_core::Result<()> {
    tracing::info!(ext_id = %config.sync.ext_id, "starting host bridge");

    let lines = spawn_stdin_reader();
    let clock = SessionClock::start();
    let factory = TemplateMatcherFactory::new(config.matcher.clone());
    let mut session = Session::new(config, Box::new(factory), StdoutTransport);
    session.start(clock.now())?;

    loop {
        let wait = session
            .next_deadline()
            .map(|deadline| deadline.saturating_sub(clock.now()))
            .unwrap_or(IDLE_WAIT);

        match lines.recv_timeout(wait) {
            Ok(line) if line.trim().is_empty() => {}
            Ok(line) => {
                if let Err(err) = handle_line(&mut session, &line, clock.now()) {
                    tracing::warn!(%err, "failed to handle input line");
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Err(err) = session.poll(clock.now()) {
            tracing::error!(%err, "host channel failed, shutting down");
            break;
        }
    }

    tracing::info!("bridge stopping");
    session.teardown(clock.now())
}

fn handle_line(
    session: &mut Session<StdoutTransport>,
    line: &str,
    now: Duration,
) -> gesture_trainer_core::Result<()> {
    match serde_json::from_str::<Input>(line)? {
        Input::Host(envelope) => session.handle_message(&envelope, now),
        Input::Command(command) => apply_command(session, command, now),
    }
}

fn apply_command(
    session: &mut Session<StdoutTransport>,
    command: Command,
    now: Duration,
) -> gesture_trainer_core::Result<()> {
    tracing::debug!(?command, "applying command");
    session.edit(now, |trainer| match command {
        Command::AddGesture => {
            let id = trainer.add_gesture();
            tracing::info!(%id, "gesture created");
            Ok(())
        }
        Command::SelectGesture { id } => trainer.set_current_gesture(GestureId(id)),
        Command::RenameGesture { id, name } => trainer.rename_gesture(GestureId(id), name),
        Command::DeleteGesture { id } => trainer.delete_gesture(GestureId(id)).map(|_| ()),
        Command::DiscardEmptyGesture => trainer.delete_if_gesture_empty().map(|_| ()),
        Command::DeleteSample { id, index } => {
            trainer.delete_sample(GestureId(id), index).map(|_| ())
        }
        Command::CropSample {
            id,
            index,
            start,
            end,
        } => trainer.crop_sample(GestureId(id), index, start, end),
        Command::StartRecording => trainer.start_recording(),
        Command::StopRecording => trainer.stop_recording().map(|_| ()),
    })
}

/// One line of bridge input: either a host envelope or a UI command.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Input {
    Command(Command),
    Host(Envelope),
}

/// Edits issued by the UI that drives the bridge.
#[derive(Debug, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
enum Command {
    AddGesture,
    SelectGesture { id: u32 },
    RenameGesture { id: u32, name: String },
    DeleteGesture { id: u32 },
    DiscardEmptyGesture,
    DeleteSample { id: u32, index: usize },
    CropSample { id: u32, index: usize, start: usize, end: usize },
    StartRecording,
    StopRecording,
}

/// Writes outbound envelopes to stdout, one JSON document per line.
struct StdoutTransport;

impl HostTransport for StdoutTransport {
    fn send(&mut self, envelope: &Envelope) -> gesture_trainer_core::Result<()> {
        let line = envelope.to_json()?;
        let mut out = io::stdout().lock();
        writeln!(out, "{line}").map_err(|err| TrainerError::Transport(err.to_string()))?;
        out.flush()?;
        Ok(())
    }
}

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if sender.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::error!(%err, "failed to read stdin");
                    break;
                }
            }
        }
    });
    receiver
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Host bridge for the gesture trainer", long_about = None)]
struct Cli {
    /// Optional JSON configuration file; defaults apply to missing fields.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_and_envelopes_share_the_input_stream() {
        let command: Input =
            serde_json::from_str(r#"{"command":"rename-gesture","id":2,"name":"wave"}"#).unwrap();
        assert!(matches!(
            command,
            Input::Command(Command::RenameGesture { id: 2, .. })
        ));

        let host: Input =
            serde_json::from_str(r#"{"type":"pxtpkgext","event":"shown"}"#).unwrap();
        assert!(matches!(host, Input::Host(_)));
    }
}
