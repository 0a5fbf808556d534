use serde_json::{json, Value};

/// A request for the external debugger. One variant per protocol operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ProcMap,
    Backtrace,
    Continue,
    StepOver,
    StepOut,
    StepInto,
    StepSingle,
    GetStack,
    Run { path: String, args: Vec<String> },
    SetBreakpoint { addr: u64 },
    DelBreakpoint { addr: u64 },
    ReadMem { addr: u64 },
    WriteMem { addr: u64, value: u64 },
    DumpRegisters,
    SetRegister { name: String, value: u64 },
    GetSymbolByName { name: String },
    DisassembleAt { addr: u64, length: u64 },
    ReadVariable { name: String },
    WriteVariable { name: String, value: u64 },
    PluginList,
    PluginSetEnabled { name: String, enabled: bool },
    Version,
}

impl Command {
    /// True for commands that can change execution, register or memory state of the debuggee.
    pub fn reloads_basic_info(&self) -> bool {
        matches!(
            self,
            Command::Continue
                | Command::StepOver
                | Command::StepOut
                | Command::StepInto
                | Command::StepSingle
                | Command::Run { .. }
                | Command::SetBreakpoint { .. }
                | Command::DelBreakpoint { .. }
                | Command::WriteMem { .. }
                | Command::SetRegister { .. }
                | Command::WriteVariable { .. }
        )
    }

    /// The protocol payload, without the `status` envelope.
    pub fn to_status(&self) -> Value {
        match self {
            Command::ProcMap => json!("ProcMap"),
            Command::Backtrace => json!("Backtrace"),
            Command::Continue => json!("Continue"),
            Command::StepOver => json!("StepOver"),
            Command::StepOut => json!("StepOut"),
            Command::StepInto => json!("StepInto"),
            Command::StepSingle => json!("StepSingle"),
            Command::GetStack => json!("GetStack"),
            Command::DumpRegisters => json!("DumpRegisters"),
            Command::PluginList => json!("PluginGetList"),
            Command::Version => json!("Version"),
            Command::Run { path, args } => json!({ "Run": [path, args] }),
            Command::SetBreakpoint { addr } => json!({ "SetBreakpoint": addr }),
            Command::DelBreakpoint { addr } => json!({ "DelBreakpoint": addr }),
            Command::ReadMem { addr } => json!({ "ReadMem": addr }),
            Command::WriteMem { addr, value } => json!({ "WriteMem": [addr, value] }),
            Command::SetRegister { name, value } => json!({ "SetRegister": [name, value] }),
            Command::GetSymbolByName { name } => json!({ "GetSymbolsByName": name }),
            Command::DisassembleAt { addr, length } => {
                json!({ "DisassembleAt": [addr, length, false] })
            }
            Command::ReadVariable { name } => json!({ "ReadVariable": name }),
            Command::WriteVariable { name, value } => json!({ "WriteVariable": [name, value] }),
            Command::PluginSetEnabled { name, enabled } => {
                json!({ "PluginSetEnable": [name, enabled] })
            }
        }
    }

    /// One protocol line, without the line terminator.
    pub fn to_line(&self) -> String {
        json!({ "status": self.to_status() }).to_string()
    }
}

/// Malformed user input, caught before anything reaches the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalError {
    pub kind: &'static str,
    pub message: String,
}

impl LocalError {
    pub fn command(message: impl Into<String>) -> LocalError {
        LocalError {
            kind: "command",
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LocalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error [{}]: {}", self.kind, self.message)
    }
}

impl std::error::Error for LocalError {}
