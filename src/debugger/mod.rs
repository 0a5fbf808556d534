pub mod config;
pub mod data_store;

use config::Config;
use data_store::DataStore;

use super::cli::feedback_parser;
use super::commands::{command::Command, parser::Commands};

use anyhow::{anyhow, Context, Result};
use async_std::channel::{bounded, unbounded, Receiver, Sender};
use async_std::io::{BufRead, BufReader, Write};
use async_std::prelude::*;
use async_std::process::{self, Child, Stdio};
use async_std::task::{self, JoinHandle};
use log::{debug, error, info, trace, warn};
use serde_json::Value;
use std::path::PathBuf;

/// The in-flight slot. Holds a single token: the writer takes it before sending a
/// command and the response step hands it back on terminal feedback.
#[derive(Clone)]
pub struct Gate {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Gate {
    pub fn new() -> Gate {
        let (tx, rx) = bounded(1);
        // A fresh channel with room for one always accepts the first token.
        let _ = tx.try_send(());
        Gate { tx, rx }
    }

    /// Wait for the slot. False once the gate is closed.
    pub async fn acquire(&self) -> bool {
        self.rx.recv().await.is_ok()
    }

    /// Return the slot. False if the slot was not taken.
    pub fn release(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    pub fn close(&self) {
        self.tx.close();
    }
}

/// A line from the debugger's stderr.
#[derive(Debug, Clone, PartialEq)]
pub enum StderrLine {
    Structured(Value),
    Raw(String),
}

/// Owns the debugger process and everything that talks to it.
pub struct Supervisor {
    store: DataStore,
    commands: Commands,
    child: Option<Child>,
    debugger_path: Option<PathBuf>,
    gate: Gate,
    in_flight: bool,
    dispatch_tx: Sender<Command>,
    dispatch_rx: Receiver<Command>,
    sent_rx: Receiver<String>,
    output_rx: Receiver<String>,
    stderr_rx: Receiver<StderrLine>,
    feedback_rx: Receiver<Value>,
    notice_tx: Sender<String>,
    notice_rx: Receiver<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl Supervisor {
    /// Start the debugger and the tasks serving its pipes.
    pub fn spawn(config: &Config) -> Result<Supervisor> {
        info!("Starting debugger: {}", config.command_line());

        let mut child = process::Command::new(&config.debugger_path)
            .args(&config.debugger_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start debugger: {}", config.command_line()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("Debugger stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("Debugger stdout is not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("Debugger stderr is not piped"))?;

        let mut supervisor =
            Supervisor::from_streams(stdin, BufReader::new(stdout), BufReader::new(stderr));
        supervisor.child = Some(child);
        supervisor.debugger_path = Some(config.debugger_path.clone());
        Ok(supervisor)
    }

    /// Serve an already connected debugger. The streams play the part of the child's
    /// stdin, stdout and stderr.
    pub fn from_streams<W, O, E>(stdin: W, stdout: O, stderr: E) -> Supervisor
    where
        W: Write + Unpin + Send + 'static,
        O: BufRead + Unpin + Send + 'static,
        E: BufRead + Unpin + Send + 'static,
    {
        let gate = Gate::new();
        let (dispatch_tx, dispatch_rx) = unbounded();
        let (sent_tx, sent_rx) = unbounded();
        let (output_tx, output_rx) = unbounded();
        let (stderr_tx, stderr_rx) = unbounded();
        let (feedback_tx, feedback_rx) = unbounded();
        let (notice_tx, notice_rx) = unbounded();

        let tasks = vec![
            spawn_logged("stdout reader", read_stdout(stdout, feedback_tx, output_tx)),
            spawn_logged("stderr reader", read_stderr(stderr, stderr_tx)),
            spawn_logged(
                "command writer",
                write_commands(stdin, gate.clone(), dispatch_rx.clone(), sent_tx),
            ),
        ];

        Supervisor {
            store: DataStore::new(),
            commands: Commands::new(),
            child: None,
            debugger_path: None,
            gate,
            in_flight: false,
            dispatch_tx,
            dispatch_rx,
            sent_rx,
            output_rx,
            stderr_rx,
            feedback_rx,
            notice_tx,
            notice_rx,
            tasks,
        }
    }

    pub fn data_store(&self) -> &DataStore {
        &self.store
    }

    pub fn help_text(&self) -> String {
        self.commands.help_text()
    }

    /// Number of commands waiting behind the one in flight.
    pub fn pending(&self) -> usize {
        self.dispatch_rx.len()
    }

    /// Parse a user command line and queue the result.
    pub fn submit(&mut self, line: &str) {
        self.store.append_output(&format!("--> {}", line));

        let (outcome, reload_basic_info) = self.commands.parse(line);
        match outcome {
            Err(err) => self.store.append_output(&err.to_string()),
            Ok(Command::Version) => self.query_version(),
            Ok(command) => {
                self.enqueue(command);
                if reload_basic_info {
                    self.reload_basic_info();
                }
            }
        }
    }

    pub fn enqueue(&mut self, command: Command) {
        debug!("Queued {:?}", command);
        if let Err(err) = self.dispatch_tx.try_send(command) {
            error!("Dispatch queue is closed, dropped {:?}", err.into_inner());
        }
    }

    /// Queue a refresh of registers, stack and backtrace. The gate keeps them behind
    /// the command that triggered them.
    pub fn reload_basic_info(&mut self) {
        self.enqueue(Command::DumpRegisters);
        self.enqueue(Command::GetStack);
        self.enqueue(Command::Backtrace);
    }

    /// Consume whatever the debugger sent since the last call. Never blocks.
    ///
    /// Returns true when the display should be redrawn.
    pub fn get_response(&mut self) -> bool {
        let mut refresh = false;

        self.drain_sent();

        while let Ok(notice) = self.notice_rx.try_recv() {
            self.store.append_output(&notice);
            refresh = true;
        }

        while let Ok(line) = self.output_rx.try_recv() {
            self.store.append_output(&format!("[d]: {}", line));
            refresh = true;
        }

        while let Ok(line) = self.stderr_rx.try_recv() {
            let text = match line {
                StderrLine::Structured(value) => value.to_string(),
                StderrLine::Raw(text) => text,
            };
            self.store.append_output(&format!("[d][!]: {}", text));
            refresh = true;
        }

        if let Ok(message) = self.feedback_rx.try_recv() {
            // The writer may have sent another command since the drain above. Its record
            // is queued before the line is written, so it is visible by now.
            self.drain_sent();
            if feedback_parser::handle_message(&mut self.store, &message) {
                // Checked before the slot is handed back, the writer pops right after.
                let settled = self.dispatch_rx.is_empty();
                self.finish_command();
                refresh |= settled;
            } else {
                self.abort_batch();
                self.finish_command();
                refresh = true;
            }
        }

        refresh
    }

    fn drain_sent(&mut self) {
        while let Ok(line) = self.sent_rx.try_recv() {
            self.in_flight = true;
            self.store.append_command_log(&line);
        }
    }

    fn finish_command(&mut self) {
        if self.in_flight {
            self.in_flight = false;
            if !self.gate.release() {
                warn!("Gate was already idle");
            }
        } else {
            warn!("Feedback arrived with no command in flight");
        }
    }

    fn abort_batch(&mut self) {
        let mut dropped = 0;
        while self.dispatch_rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            warn!("Command failed, dropped {} queued commands", dropped);
            self.store
                .append_output(&format!("Discarded {} queued command(s)", dropped));
        }
    }

    fn query_version(&mut self) {
        self.store
            .append_output(&format!("cmdb {}", env!("CARGO_PKG_VERSION")));

        let path = match &self.debugger_path {
            Some(path) => path.clone(),
            None => return,
        };
        let notices = self.notice_tx.clone();
        task::spawn(async move {
            let notice = match process::Command::new(&path).arg("--version").output().await {
                Ok(out) => format!(
                    "Debugger version: {}",
                    String::from_utf8_lossy(&out.stdout).trim()
                ),
                Err(err) => format!("Could not query {} --version: {}", path.display(), err),
            };
            let _ = notices.send(notice).await;
        });
    }

    /// Kill the debugger and stop feeding it. Safe to call at any point, also twice.
    pub fn shutdown(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("Stopping debugger");
            if let Err(err) = child.kill() {
                warn!("Failed to kill debugger: {}", err);
            }
        }

        self.dispatch_tx.close();
        self.gate.close();
        while self.dispatch_rx.try_recv().is_ok() {}
        self.in_flight = false;
        // Dropping the handles detaches the tasks, they stop on closed channels or EOF.
        self.tasks.clear();
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_logged<F>(name: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    task::spawn(async move {
        match future.await {
            Ok(()) => debug!("{} stopped", name),
            Err(err) => error!("{} failed: {:#}", name, err),
        }
    })
}

/// Protocol messages are JSON objects carrying a `feedback` key.
fn decode_feedback(line: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(line) {
        Ok(value) if value.get("feedback").is_some() => Some(value),
        _ => None,
    }
}

async fn read_stdout<R>(reader: R, feedback: Sender<Value>, output: Sender<String>) -> Result<()>
where
    R: BufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next().await {
        let line = line.context("Failed to read debugger stdout")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let sent = match decode_feedback(line) {
            Some(message) => {
                debug!("< {}", line);
                feedback.send(message).await.is_ok()
            }
            None => {
                trace!("debuggee: {}", line);
                output.send(line.to_owned()).await.is_ok()
            }
        };
        if !sent {
            break;
        }
    }
    Ok(())
}

async fn read_stderr<R>(reader: R, stderr: Sender<StderrLine>) -> Result<()>
where
    R: BufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next().await {
        let line = line.context("Failed to read debugger stderr")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let classified = match serde_json::from_str::<Value>(line) {
            Ok(value) if value.is_object() => StderrLine::Structured(value),
            _ => StderrLine::Raw(line.to_owned()),
        };
        trace!("stderr: {:?}", classified);
        if stderr.send(classified).await.is_err() {
            break;
        }
    }
    Ok(())
}

/// The only writer of the debugger's stdin. Sends one line per gate token.
async fn write_commands<W>(
    mut writer: W,
    gate: Gate,
    commands: Receiver<Command>,
    sent: Sender<String>,
) -> Result<()>
where
    W: Write + Unpin,
{
    loop {
        if !gate.acquire().await {
            break;
        }
        let command = match commands.recv().await {
            Ok(command) => command,
            Err(_) => break,
        };

        let line = command.to_line();
        // Recorded before the write so the reply can never overtake it.
        if sent.send(line.clone()).await.is_err() {
            break;
        }

        debug!("> {}", line);
        writer
            .write_all(line.as_bytes())
            .await
            .context("Failed to write to debugger stdin")?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}
