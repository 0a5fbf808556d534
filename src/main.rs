mod cli;
mod commands;
mod debugger;

use cli::{Input, Screen};
use debugger::{config::Config, Supervisor};

use anyhow::Result;
use async_std::{io, task};
use chrono::Local;
use env_logger::Builder;
use futures::{executor::block_on, future::FusedFuture, pin_mut, select, FutureExt};
use log::{debug, info, LevelFilter};
use structopt::StructOpt;

use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, StructOpt, Clone)]
#[structopt(
    name = "cmdb",
    about = "A terminal front-end for a JSON line debugger."
)]
pub struct Opt {
    /// Set log level
    #[structopt(short = "v", long = "verbosity", default_value = "Off")]
    verbosity: LevelFilter,

    /// Debugger binary to start
    #[structopt(
        short = "d",
        long = "debugger",
        default_value = "cmserve",
        parse(from_os_str)
    )]
    debugger: PathBuf,

    /// Log file handed to the debugger
    #[structopt(
        short = "l",
        long = "logfile",
        default_value = "/tmp/cmdb_cm.log",
        parse(from_os_str)
    )]
    logfile: PathBuf,

    /// Milliseconds between response polls
    #[structopt(short = "i", long = "interval", default_value = "100")]
    interval: u64,
}

fn main() -> Result<()> {
    let future = async_main();
    block_on(future)
}

async fn async_main() -> Result<()> {
    let opt = Opt::from_args();

    // Setup log
    let mut builder = Builder::from_default_env();
    builder
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {}:{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .filter(None, opt.verbosity)
        .init();

    cli_mode(Config::new(opt)).await
}

/*
 *  Run the debugger front-end as a CLI application.
 *
 *  1. Start the debugger process and the tasks serving its pipes.
 *  2. Create the stdin task and the heartbeat task.
 *  3. Event loop: queue user commands, and on every heartbeat consume the
 *  debugger's replies and print what changed.
 */
async fn cli_mode(config: Config) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = std::io::stdout();
    let interval = config.interval;

    let mut supervisor = Supervisor::spawn(&config)?;
    let mut screen = Screen::new();

    // Create the tasks
    let input_task = cli::handle_input(&stdin).fuse();
    let heartbeat_task = task::sleep(interval).fuse();
    pin_mut!(input_task, heartbeat_task);

    // Event loop
    let result = loop {
        select! {
            input = input_task => {
                match input {
                    Ok(Input::Quit) => break Ok(()),
                    Ok(Input::Help) => println!("{}", supervisor.help_text()),
                    Ok(Input::Empty) => (),
                    Ok(Input::Line(line)) => {
                        supervisor.submit(&line);
                        debug!("{} command(s) waiting", supervisor.pending());
                        screen.draw(&mut stdout, supervisor.data_store())?;
                    }
                    Err(err) => break Err(err),
                };

                // Restart the task
                if input_task.is_terminated() {
                    input_task.set(cli::handle_input(&stdin).fuse())
                }
            },
            () = heartbeat_task => {
                if supervisor.get_response() {
                    screen.draw(&mut stdout, supervisor.data_store())?;
                }

                // Restart the task
                if heartbeat_task.is_terminated() {
                    heartbeat_task.set(task::sleep(interval).fuse());
                }
            },
        }
    };

    supervisor.shutdown();
    info!("Front-end stopped");
    result
}
