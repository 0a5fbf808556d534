use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// A structured reply from the debugger.
#[derive(Debug, Clone, PartialEq)]
pub enum Feedback {
    Ok,
    Error {
        error_type: String,
        message: String,
    },
    /// Register values in the order the debugger sent them.
    Registers {
        registers: Vec<(String, u64)>,
    },
    Stack {
        start_addr: u64,
        words: Vec<u64>,
    },
    Disassembly {
        entries: Vec<DisasmLine>,
    },
    ProcessMap(ProcessMap),
    Backtrace {
        frames: Vec<Frame>,
    },
    /// `None` when the payload was not a usable number.
    Word {
        value: Option<u64>,
    },
    Symbols {
        tree: Vec<SymbolNode>,
    },
    Variable {
        bytes: Vec<u8>,
    },
    PluginList {
        entries: Vec<(String, bool)>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

/// Address, raw bytes, token list and breakpoint flag of one instruction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DisasmLine(pub u64, pub Vec<u8>, pub Vec<Token>, pub bool);

impl DisasmLine {
    pub fn address(&self) -> u64 {
        self.0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.1
    }

    pub fn tokens(&self) -> &[Token] {
        &self.2
    }

    pub fn has_breakpoint(&self) -> bool {
        self.3
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProcessMap {
    pub total_mapped: u64,
    pub executable_regions: u64,
    pub writable_regions: u64,
    pub private_regions: u64,
    pub regions: Vec<Region>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Region {
    pub start_address: u64,
    pub end_address: u64,
    pub size: u64,
    pub offset: u64,
    pub device: Option<Value>,
    pub inode: Option<Value>,
    pub path: Option<String>,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Permissions {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub shared: bool,
    pub private: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub addr: u64,
    pub name: Option<String>,
    pub start_addr: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SymbolNode {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "unknown_kind")]
    pub kind: String,
    #[serde(default)]
    pub offset: Option<Value>,
    #[serde(default)]
    pub datatype: Option<Value>,
    #[serde(default)]
    pub low_addr: Option<u64>,
    #[serde(default)]
    pub high_addr: Option<u64>,
    #[serde(default)]
    pub children: Vec<SymbolNode>,
}

fn unknown_kind() -> String {
    "<unknown>".to_owned()
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error_type: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
}

#[derive(Deserialize)]
struct StackPayload {
    start_addr: u64,
    words: Vec<u64>,
}

#[derive(Deserialize)]
struct DisassemblyPayload {
    vec: Vec<DisasmLine>,
}

#[derive(Deserialize)]
struct BacktracePayload {
    #[serde(default)]
    frames: Vec<Frame>,
}

#[derive(Deserialize)]
struct VariablePayload {
    #[serde(default, rename = "Bytes")]
    bytes: Vec<u8>,
}

impl Feedback {
    /// Decode a whole `{"feedback": ...}` message.
    pub fn from_message(message: &Value) -> Result<Feedback> {
        match message.get("feedback") {
            Some(feedback) => Feedback::from_value(feedback),
            None => Err(anyhow!("Message without feedback -> {}", message)),
        }
    }

    /// Decode the value under the `feedback` key.
    pub fn from_value(value: &Value) -> Result<Feedback> {
        if let Some(tag) = value.as_str() {
            return match tag {
                "Ok" => Ok(Feedback::Ok),
                _ => Err(anyhow!("Unknown feedback key '{}' -> null", tag)),
            };
        }

        let object = value
            .as_object()
            .ok_or_else(|| anyhow!("Malformed feedback -> {}", value))?;
        let (tag, payload) = match object.iter().next() {
            Some(entry) if object.len() == 1 => entry,
            _ => return Err(anyhow!("Malformed feedback -> {}", value)),
        };

        Ok(match tag.as_str() {
            "Error" => match serde_json::from_value::<ErrorPayload>(payload.clone()) {
                Ok(error) => Feedback::Error {
                    error_type: error.error_type.map(value_to_text).unwrap_or_default(),
                    message: error.message.map(value_to_text).unwrap_or_default(),
                },
                // Some errors are sent as a bare string or enum name.
                Err(_) => Feedback::Error {
                    error_type: String::new(),
                    message: value_to_text(payload.clone()),
                },
            },
            "Registers" => Feedback::Registers {
                registers: decode_registers(payload)?,
            },
            "Stack" => {
                let stack: StackPayload = payload_of(tag, payload)?;
                Feedback::Stack {
                    start_addr: stack.start_addr,
                    words: stack.words,
                }
            }
            "Disassembly" => {
                let disassembly: DisassemblyPayload = payload_of(tag, payload)?;
                Feedback::Disassembly {
                    entries: disassembly.vec,
                }
            }
            "ProcessMap" => Feedback::ProcessMap(payload_of(tag, payload)?),
            "Backtrace" => {
                let backtrace: BacktracePayload = payload_of(tag, payload)?;
                Feedback::Backtrace {
                    frames: backtrace.frames,
                }
            }
            "Word" => Feedback::Word {
                value: decode_word(payload),
            },
            "Symbols" => Feedback::Symbols {
                tree: payload_of(tag, payload)?,
            },
            "Variable" => {
                let variable: VariablePayload = payload_of(tag, payload)?;
                Feedback::Variable {
                    bytes: variable.bytes,
                }
            }
            "PluginList" => Feedback::PluginList {
                entries: payload_of(tag, payload)?,
            },
            _ => return Err(anyhow!("Unknown feedback key '{}' -> {}", tag, payload)),
        })
    }
}

fn payload_of<T: DeserializeOwned>(tag: &str, payload: &Value) -> Result<T> {
    serde_json::from_value(payload.clone())
        .with_context(|| format!("Malformed '{}' feedback -> {}", tag, payload))
}

fn decode_registers(payload: &Value) -> Result<Vec<(String, u64)>> {
    let map = payload
        .as_object()
        .ok_or_else(|| anyhow!("Malformed 'Registers' feedback -> {}", payload))?;

    let mut registers = vec![];
    for (name, value) in map {
        match value.as_u64() {
            Some(v) => registers.push((name.clone(), v)),
            None => {
                return Err(anyhow!(
                    "Malformed 'Registers' feedback, {} is not a number -> {}",
                    name,
                    value
                ))
            }
        }
    }
    Ok(registers)
}

fn decode_word(payload: &Value) -> Option<u64> {
    match payload {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strings without their quotes, everything else as JSON.
pub fn value_to_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}
