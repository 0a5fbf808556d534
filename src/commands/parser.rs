use clap::{Arg, ArgAction, ArgMatches, ColorChoice, Command as ClapCommand};

use super::command::{Command, LocalError};

fn command(name: &'static str, about: &'static str, usage: &'static str) -> ClapCommand {
    ClapCommand::new(name)
        .about(about)
        .override_usage(usage)
        .disable_help_flag(true)
}

fn number_arg(name: &'static str, value_name: &'static str) -> Arg {
    Arg::new(name)
        .value_name(value_name)
        .required(true)
        .value_parser(parse_number)
}

fn text_arg(name: &'static str, value_name: &'static str) -> Arg {
    Arg::new(name).value_name(value_name).required(true)
}

pub fn procmap_command() -> ClapCommand {
    command("procmap", "Show the process memory map", "procmap").visible_alias("pm")
}

pub fn backtrace_command() -> ClapCommand {
    command("backtrace", "Show the backtrace", "backtrace").visible_alias("bt")
}

pub fn continue_command() -> ClapCommand {
    command("continue", "Continue the debuggee", "continue").visible_aliases(["cont", "c"])
}

pub fn step_over_command() -> ClapCommand {
    command("stepover", "Step over the function call", "stepover").visible_alias("sov")
}

pub fn step_out_command() -> ClapCommand {
    command("stepout", "Step out of the current function", "stepout").visible_alias("so")
}

pub fn step_into_command() -> ClapCommand {
    command("stepinto", "Step into the function call", "stepinto").visible_alias("si")
}

pub fn step_single_command() -> ClapCommand {
    command("step", "Step one instruction", "step")
        .visible_alias("s")
        .alias("stepsingle")
}

pub fn stack_command() -> ClapCommand {
    command("stack", "Show the current stack", "stack").alias("getstack")
}

pub fn run_command() -> ClapCommand {
    command("run", "Run the program at PATH with optional arguments", "run PATH [ARGS]...")
        .arg(text_arg("path", "PATH"))
        .arg(
            Arg::new("args")
                .value_name("ARGS")
                .num_args(0..)
                .action(ArgAction::Append)
                .trailing_var_arg(true)
                .allow_hyphen_values(true),
        )
}

pub fn break_command() -> ClapCommand {
    command("break", "Set a breakpoint at ADDR", "break ADDR")
        .visible_alias("bp")
        .alias("setbreakpoint")
        .arg(number_arg("addr", "ADDR"))
}

pub fn delbreak_command() -> ClapCommand {
    command("delbreak", "Delete the breakpoint at ADDR", "delbreak ADDR")
        .visible_alias("dbp")
        .alias("delbreakpoint")
        .arg(number_arg("addr", "ADDR"))
}

pub fn read_memory_command() -> ClapCommand {
    command("rmem", "Read a word at ADDR", "rmem ADDR").arg(number_arg("addr", "ADDR"))
}

pub fn write_memory_command() -> ClapCommand {
    command("wmem", "Write VALUE as a word at ADDR", "wmem ADDR VALUE")
        .arg(number_arg("addr", "ADDR"))
        .arg(number_arg("value", "VALUE"))
}

pub fn registers_command() -> ClapCommand {
    command("regs", "Show all registers or set one", "regs get | regs set NAME VALUE")
        .subcommand_required(true)
        .subcommand(command("get", "Show all register values", "regs get"))
        .subcommand(
            command("set", "Set register NAME to VALUE", "regs set NAME VALUE")
                .arg(text_arg("name", "NAME"))
                .arg(number_arg("value", "VALUE")),
        )
}

pub fn symbol_command() -> ClapCommand {
    command("sym", "Look up a symbol by name", "sym NAME")
        .visible_alias("gsym")
        .arg(text_arg("name", "NAME"))
}

pub fn disassemble_command() -> ClapCommand {
    command("dis", "Disassemble LENGTH bytes at ADDR", "dis ADDR LENGTH")
        .visible_alias("d")
        .arg(number_arg("addr", "ADDR"))
        .arg(number_arg("length", "LENGTH"))
}

pub fn read_variable_command() -> ClapCommand {
    command("var", "Read a variable by name", "var NAME").arg(text_arg("name", "NAME"))
}

pub fn write_variable_command() -> ClapCommand {
    command("vars", "Write VALUE to a variable", "vars NAME VALUE")
        .arg(text_arg("name", "NAME"))
        .arg(number_arg("value", "VALUE"))
}

pub fn plugins_command() -> ClapCommand {
    command("plugins", "List all available plugins", "plugins")
}

pub fn plugin_command() -> ClapCommand {
    command("plugin", "Activate or deactivate a plugin", "plugin NAME BOOL")
        .arg(text_arg("name", "NAME"))
        .arg(
            Arg::new("enabled")
                .value_name("BOOL")
                .required(true)
                .value_parser(parse_bool),
        )
}

pub fn version_command() -> ClapCommand {
    command("version", "Show the front-end and debugger versions", "version")
}

pub fn all_commands() -> [ClapCommand; 22] {
    [
        run_command(),
        continue_command(),
        step_single_command(),
        step_into_command(),
        step_over_command(),
        step_out_command(),
        break_command(),
        delbreak_command(),
        disassemble_command(),
        backtrace_command(),
        stack_command(),
        procmap_command(),
        registers_command(),
        read_memory_command(),
        write_memory_command(),
        symbol_command(),
        read_variable_command(),
        write_variable_command(),
        plugins_command(),
        plugin_command(),
        version_command(),
        ClapCommand::new("help")
            .about("Show this help")
            .visible_alias("h")
            .disable_help_flag(true),
    ]
}

pub fn cmdb_command() -> ClapCommand {
    ClapCommand::new("cmdb")
        .about("Debugger front-end commands")
        .no_binary_name(true)
        .subcommand_required(true)
        .disable_help_flag(true)
        .disable_help_subcommand(true)
        .color(ColorChoice::Never)
        .subcommands(all_commands())
}

/// Turns command lines into debugger commands.
pub struct Commands {
    cli: ClapCommand,
}

impl Commands {
    pub fn new() -> Commands {
        Commands {
            cli: cmdb_command(),
        }
    }

    pub fn help_text(&self) -> String {
        self.cli.clone().render_help().to_string()
    }

    /// Parse one line. The flag is set when the command can change the debuggee state,
    /// so registers, stack and backtrace should be reloaded after it.
    pub fn parse(&self, line: &str) -> (Result<Command, LocalError>, bool) {
        match self.parse_command(line) {
            Ok(command) => {
                let reload = command.reloads_basic_info();
                (Ok(command), reload)
            }
            Err(err) => (Err(err), false),
        }
    }

    fn parse_command(&self, line: &str) -> Result<Command, LocalError> {
        let mut tokens = shellwords::split(line)
            .map_err(|_| LocalError::command(format!("Mismatched quotes: {}", line)))?;

        let name = match tokens.first_mut() {
            Some(first) => {
                *first = first.to_lowercase();
                first.clone()
            }
            None => return Err(unknown_command(line)),
        };

        // Only debugger commands are parsed here, help is handled by the caller.
        let sub = match self.cli.find_subcommand(&name) {
            Some(sub) if sub.get_name() != "help" => sub,
            _ => return Err(unknown_command(line)),
        };
        if sub.has_subcommands() {
            if let Some(action) = tokens.get_mut(1) {
                *action = action.to_lowercase();
            }
        }

        let matches = self.cli.clone().try_get_matches_from(&tokens).map_err(|err| {
            let rendered = err.to_string();
            let detail = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ")
                .to_owned();
            let usage = sub.clone().render_usage().to_string();
            LocalError::command(format!(
                "{} ({})",
                detail,
                usage.trim().trim_start_matches("Usage: ")
            ))
        })?;

        let command = match matches.subcommand() {
            Some((sub_name, sub_matches)) => build_command(sub_name, sub_matches)?,
            None => return Err(unknown_command(line)),
        };

        Ok(match command {
            // Clap swallows a `--` right after PATH, the program gets its tokens as typed.
            Command::Run { path, .. } if tokens.get(1) == Some(&path) => Command::Run {
                args: tokens[2..].to_vec(),
                path,
            },
            command => command,
        })
    }
}

fn unknown_command(line: &str) -> LocalError {
    LocalError::command(format!("Unknown command: {}", line))
}

fn build_command(name: &str, matches: &ArgMatches) -> Result<Command, LocalError> {
    Ok(match name {
        "procmap" => Command::ProcMap,
        "backtrace" => Command::Backtrace,
        "continue" => Command::Continue,
        "stepover" => Command::StepOver,
        "stepout" => Command::StepOut,
        "stepinto" => Command::StepInto,
        "step" => Command::StepSingle,
        "stack" => Command::GetStack,
        "run" => Command::Run {
            path: text(matches, "path")?,
            args: matches
                .get_many::<String>("args")
                .map(|values| values.cloned().collect())
                .unwrap_or_default(),
        },
        "break" => Command::SetBreakpoint {
            addr: number(matches, "addr")?,
        },
        "delbreak" => Command::DelBreakpoint {
            addr: number(matches, "addr")?,
        },
        "rmem" => Command::ReadMem {
            addr: number(matches, "addr")?,
        },
        "wmem" => Command::WriteMem {
            addr: number(matches, "addr")?,
            value: number(matches, "value")?,
        },
        "regs" => match matches.subcommand() {
            Some(("get", _)) => Command::DumpRegisters,
            Some(("set", set)) => Command::SetRegister {
                name: text(set, "name")?,
                value: number(set, "value")?,
            },
            _ => return Err(LocalError::command("regs get | regs set NAME VALUE")),
        },
        "sym" => Command::GetSymbolByName {
            name: text(matches, "name")?,
        },
        "dis" => Command::DisassembleAt {
            addr: number(matches, "addr")?,
            length: number(matches, "length")?,
        },
        "var" => Command::ReadVariable {
            name: text(matches, "name")?,
        },
        "vars" => Command::WriteVariable {
            name: text(matches, "name")?,
            value: number(matches, "value")?,
        },
        "plugins" => Command::PluginList,
        "plugin" => Command::PluginSetEnabled {
            name: text(matches, "name")?,
            enabled: matches
                .get_one::<bool>("enabled")
                .copied()
                .ok_or_else(|| missing(name, "enabled"))?,
        },
        "version" => Command::Version,
        _ => return Err(LocalError::command(format!("Unknown command: {}", name))),
    })
}

fn text(matches: &ArgMatches, id: &str) -> Result<String, LocalError> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| missing("command", id))
}

fn number(matches: &ArgMatches, id: &str) -> Result<u64, LocalError> {
    matches
        .get_one::<u64>(id)
        .copied()
        .ok_or_else(|| missing("command", id))
}

fn missing(command: &str, id: &str) -> LocalError {
    LocalError::command(format!("Missing argument {} for {}", id, command))
}

/// Accepts `0x` prefixed hex or plain decimal.
pub fn parse_number(input: &str) -> Result<u64, String> {
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => input.parse::<u64>(),
    };
    parsed.map_err(|_| format!("not a hex (0x..) or decimal number: {}", input))
}

pub fn parse_bool(input: &str) -> Result<bool, String> {
    match input.to_lowercase().as_str() {
        "true" | "1" | "activate" | "on" => Ok(true),
        "false" | "0" | "deactivate" | "off" => Ok(false),
        _ => Err(format!("expected true/false, 1/0 or activate/deactivate: {}", input)),
    }
}
