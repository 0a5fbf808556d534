pub mod feedback_parser;

use crate::debugger::data_store::DataStore;

use anyhow::{Context, Result};
use async_std::io;
use std::io::Write;

/// One line of user input, sorted by who handles it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    Help,
    Empty,
    Line(String),
}

impl Input {
    pub fn classify(line: &str) -> Input {
        match line.trim() {
            "q" | "quit" | "exit" => Input::Quit,
            "h" | "help" => Input::Help,
            "" => Input::Empty,
            line => Input::Line(line.to_owned()),
        }
    }
}

/// Read the next line from stdin. End of input counts as quit.
pub async fn handle_input(stdin: &io::Stdin) -> Result<Input> {
    let mut line = String::new();
    let read = stdin
        .read_line(&mut line)
        .await
        .context("Failed to read stdin")?;

    if read == 0 {
        return Ok(Input::Quit);
    }
    Ok(Input::classify(&line))
}

/// Prints what changed in the data store since the previous draw.
#[derive(Debug, Default)]
pub struct Screen {
    printed_output: usize,
    registers: String,
    stack: String,
    backtrace: String,
    disassembly: String,
    rip: Option<u64>,
}

impl Screen {
    pub fn new() -> Screen {
        Screen::default()
    }

    pub fn draw<W: Write>(&mut self, out: &mut W, store: &DataStore) -> Result<()> {
        let output = store.output();
        if output.len() > self.printed_output {
            let fresh = output[self.printed_output..].trim_start_matches('\n');
            writeln!(out, "{}", fresh)?;
            self.printed_output = output.len();
        }

        draw_panel(out, "Registers", store.registers(), &mut self.registers)?;
        draw_panel(out, "Stack", store.stack(), &mut self.stack)?;
        draw_panel(out, "Backtrace", store.backtrace(), &mut self.backtrace)?;
        draw_panel(out, "Disassembly", store.disassembly(), &mut self.disassembly)?;

        if store.rip() != self.rip {
            self.rip = store.rip();
            if let Some(rip) = self.rip {
                writeln!(out, "rip: 0x{:016x}", rip)?;
            }
        }

        out.flush()?;
        Ok(())
    }
}

fn draw_panel<W: Write>(out: &mut W, title: &str, current: &str, shown: &mut String) -> Result<()> {
    if current != shown.as_str() {
        writeln!(out, "{}:", title)?;
        writeln!(out, "{}", current)?;
        *shown = current.to_owned();
    }
    Ok(())
}
