use log::{debug, warn};
use serde_json::Value;

use crate::commands::feedback::{
    value_to_text, DisasmLine, Feedback, Frame, Permissions, ProcessMap, SymbolNode,
};
use crate::debugger::data_store::DataStore;

const ADDRESS_COL_WIDTH: usize = 21;
const BYTES_COL_WIDTH: usize = 22;
const MNEMONIC_COL_WIDTH: usize = 8;
const WORD_SIZE: u64 = 8;

/// Decode a raw protocol message and handle it.
///
/// The raw message always lands in the command log. Messages that can't be decoded are
/// reported in the output and count as a failed command.
pub fn handle_message(store: &mut DataStore, message: &Value) -> bool {
    store.append_command_log(&message.to_string());

    match Feedback::from_message(message) {
        Ok(feedback) => {
            debug!("Decoded feedback: {:?}", feedback);
            handle_feedback(store, &feedback)
        }
        Err(err) => {
            warn!("Rejected feedback: {:#}", err);
            store.append_output(&format!("{:#}", err));
            false
        }
    }
}

/// Render the feedback into the store. Returns false when the debugger reported a failure.
pub fn handle_feedback(store: &mut DataStore, feedback: &Feedback) -> bool {
    match feedback {
        Feedback::Ok => handle_ok_feedback(store),
        Feedback::Error {
            error_type,
            message,
        } => handle_error_feedback(store, error_type, message),
        Feedback::Registers { registers } => handle_registers_feedback(store, registers),
        Feedback::Stack { start_addr, words } => handle_stack_feedback(store, *start_addr, words),
        Feedback::Disassembly { entries } => handle_disassembly_feedback(store, entries),
        Feedback::ProcessMap(map) => handle_process_map_feedback(store, map),
        Feedback::Backtrace { frames } => handle_backtrace_feedback(store, frames),
        Feedback::Word { value } => handle_word_feedback(store, *value),
        Feedback::Symbols { tree } => handle_symbols_feedback(store, tree),
        Feedback::Variable { bytes } => handle_variable_feedback(store, bytes),
        Feedback::PluginList { entries } => handle_plugin_list_feedback(store, entries),
    }
}

fn handle_ok_feedback(store: &mut DataStore) -> bool {
    store.append_output("Debugger: Ok");
    true
}

fn handle_error_feedback(store: &mut DataStore, error_type: &str, message: &str) -> bool {
    let line = if error_type.is_empty() {
        format!("Debugger [Error]: {}", message)
    } else {
        format!("Debugger [Error]: {}: {}", error_type, message)
    };
    store.append_output(&line);
    false
}

fn handle_registers_feedback(store: &mut DataStore, registers: &[(String, u64)]) -> bool {
    let mut lines = vec![];
    for (name, value) in registers {
        lines.push(format!("  {}: {:x}", name, value));
        if name == "rip" {
            store.set_rip(*value);
        }
    }
    store.set_registers(lines.join("\n"));
    true
}

fn handle_stack_feedback(store: &mut DataStore, start_addr: u64, words: &[u64]) -> bool {
    let lines: Vec<String> = words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let address = start_addr.wrapping_add(i as u64 * WORD_SIZE);
            format!("  {:016x}: {:016x}", address, word)
        })
        .collect();
    store.set_stack(lines.join("\n"));
    true
}

fn format_disassembly_line(entry: &DisasmLine) -> String {
    let address = if entry.has_breakpoint() {
        format!("{:016x}(*)", entry.address())
    } else {
        format!("{:016x}", entry.address())
    };

    let bytes = entry
        .bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");

    let mut mnemonic: Option<&str> = None;
    let mut operands = String::new();
    for token in entry.tokens() {
        if mnemonic.is_none() && token.kind.eq_ignore_ascii_case("mnemonic") {
            mnemonic = Some(token.text.trim());
        } else {
            operands.push_str(&token.text);
        }
    }

    format!(
        "{:<aw$}{:<bw$}{:<mw$}{}",
        address,
        bytes,
        mnemonic.unwrap_or(""),
        operands.trim(),
        aw = ADDRESS_COL_WIDTH,
        bw = BYTES_COL_WIDTH,
        mw = MNEMONIC_COL_WIDTH,
    )
}

fn handle_disassembly_feedback(store: &mut DataStore, entries: &[DisasmLine]) -> bool {
    let lines: Vec<String> = entries.iter().map(format_disassembly_line).collect();
    store.set_disassembly(lines.join("\n"));
    true
}

fn permission_string(perms: &Permissions) -> String {
    let mut s = String::with_capacity(4);
    s.push(if perms.read { 'r' } else { '-' });
    s.push(if perms.write { 'w' } else { '-' });
    s.push(if perms.execute { 'x' } else { '-' });
    s.push(if perms.private {
        'p'
    } else if perms.shared {
        's'
    } else {
        '-'
    });
    s
}

fn text_or_na(value: &Option<Value>) -> String {
    match value {
        Some(v) => value_to_text(v.clone()),
        None => "N/A".to_owned(),
    }
}

fn handle_process_map_feedback(store: &mut DataStore, map: &ProcessMap) -> bool {
    let mut lines = vec![
        "Process Memory Map:".to_owned(),
        format!("  Total mapped memory: {} bytes", map.total_mapped),
        format!("  Executable regions: {}", map.executable_regions),
        format!("  Writable regions: {}", map.writable_regions),
        format!("  Private regions: {}", map.private_regions),
        String::new(),
        "Regions:".to_owned(),
    ];

    for (idx, region) in map.regions.iter().enumerate() {
        lines.push(format!(
            "  {}. {}",
            idx + 1,
            region.path.as_deref().unwrap_or("Anonymous")
        ));
        lines.push(format!(
            "      Address Range: 0x{:016x} - 0x{:016x}",
            region.start_address, region.end_address
        ));
        lines.push(format!(
            "      Size: {} bytes, Offset: {}, Device: {}, Inode: {}",
            region.size,
            region.offset,
            text_or_na(&region.device),
            text_or_na(&region.inode)
        ));
        lines.push(format!(
            "      Permissions: {}",
            permission_string(&region.permissions)
        ));
    }

    store.append_output(&lines.join("\n"));
    true
}

fn handle_backtrace_feedback(store: &mut DataStore, frames: &[Frame]) -> bool {
    let mut lines = vec!["Backtrace:".to_owned()];
    for (idx, frame) in frames.iter().enumerate() {
        let start = match frame.start_addr {
            Some(addr) => format!("0x{:016x}", addr),
            None => "N/A".to_owned(),
        };
        let name = match frame.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => "<unknown>",
        };
        lines.push(format!(
            "  {}. Address: 0x{:016x} | Function: {} | Start: {}",
            idx + 1,
            frame.addr,
            name,
            start
        ));
    }
    store.set_backtrace(lines.join("\n"));
    true
}

fn handle_word_feedback(store: &mut DataStore, value: Option<u64>) -> bool {
    let word = match value {
        Some(v) => format!("0x{:016x}", v),
        None => "Invalid word value".to_owned(),
    };
    store.append_output(&format!("Memory word: {}", word));
    true
}

fn format_symbol(symbol: &SymbolNode, depth: usize, lines: &mut Vec<String>) {
    let mut line = format!(
        "{}{}: {}",
        "  ".repeat(depth),
        symbol.kind,
        symbol.name.as_deref().unwrap_or("<anonymous>")
    );
    if let Some(offset) = &symbol.offset {
        line.push_str(&format!(", offset: {}", value_to_text(offset.clone())));
    }
    if let Some(datatype) = &symbol.datatype {
        line.push_str(&format!(", datatype: {}", value_to_text(datatype.clone())));
    }
    if symbol.low_addr.is_some() || symbol.high_addr.is_some() {
        let bound = |addr: Option<u64>| match addr {
            Some(a) => format!("0x{:016x}", a),
            None => "?".to_owned(),
        };
        line.push_str(&format!(
            ", range: {} - {}",
            bound(symbol.low_addr),
            bound(symbol.high_addr)
        ));
    }
    lines.push(line);

    for child in &symbol.children {
        format_symbol(child, depth + 1, lines);
    }
}

fn handle_symbols_feedback(store: &mut DataStore, tree: &[SymbolNode]) -> bool {
    let mut lines = vec!["Symbols:".to_owned()];
    for symbol in tree {
        format_symbol(symbol, 1, &mut lines);
    }
    store.append_output(&lines.join("\n"));
    true
}

fn handle_variable_feedback(store: &mut DataStore, bytes: &[u8]) -> bool {
    let hex = bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ");
    store.append_output(&format!("Variable: {}", hex));
    true
}

fn handle_plugin_list_feedback(store: &mut DataStore, entries: &[(String, bool)]) -> bool {
    let mut lines = vec!["Plugins:".to_owned()];
    for (name, active) in entries {
        let status = if *active { "activated" } else { "deactivated" };
        lines.push(format!("  {}: {}", name, status));
    }
    store.append_output(&lines.join("\n"));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::feedback::{Region, Token};
    use serde_json::json;

    #[test]
    fn ok_and_error_verdicts() {
        let mut store = DataStore::new();
        assert!(handle_feedback(&mut store, &Feedback::Ok));
        assert!(!handle_feedback(
            &mut store,
            &Feedback::Error {
                error_type: "Ptrace".to_owned(),
                message: "ESRCH".to_owned(),
            }
        ));
        assert_eq!(
            store.output(),
            "Debugger: Ok\nDebugger [Error]: Ptrace: ESRCH"
        );
    }

    #[test]
    fn registers_render_plain_hex() {
        let mut store = DataStore::new();
        let feedback = Feedback::Registers {
            registers: vec![("rax".to_owned(), 10)],
        };
        assert!(handle_feedback(&mut store, &feedback));
        assert_eq!(store.registers(), "  rax: a");
        assert_eq!(store.rip(), None);

        let feedback = Feedback::Registers {
            registers: vec![("rax".to_owned(), 255), ("rip".to_owned(), 10)],
        };
        assert!(handle_feedback(&mut store, &feedback));
        assert_eq!(store.registers(), "  rax: ff\n  rip: a");
        assert_eq!(store.rip(), Some(10));
    }

    #[test]
    fn stack_steps_by_word() {
        let mut store = DataStore::new();
        let feedback = Feedback::Stack {
            start_addr: 0,
            words: vec![1, 2],
        };
        assert!(handle_feedback(&mut store, &feedback));
        assert_eq!(
            store.stack(),
            "  0000000000000000: 0000000000000001\n  0000000000000008: 0000000000000002"
        );
    }

    #[test]
    fn disassembly_columns() {
        let entry = DisasmLine(
            0x1000,
            vec![0x48, 0x89, 0xe7],
            vec![
                Token {
                    kind: "Mnemonic".to_owned(),
                    text: "mov".to_owned(),
                },
                Token {
                    kind: "Text".to_owned(),
                    text: " ".to_owned(),
                },
                Token {
                    kind: "Register".to_owned(),
                    text: "rdi".to_owned(),
                },
                Token {
                    kind: "Text".to_owned(),
                    text: ", ".to_owned(),
                },
                Token {
                    kind: "Register".to_owned(),
                    text: "rsp".to_owned(),
                },
            ],
            true,
        );
        let line = format_disassembly_line(&entry);
        assert_eq!(
            line,
            format!(
                "{:<21}{:<22}{:<8}{}",
                "0000000000001000(*)", "48 89 e7", "mov", "rdi, rsp"
            )
        );
        assert_eq!(&line[21..29], "48 89 e7");
        assert_eq!(&line[43..46], "mov");

        let mut store = DataStore::new();
        assert!(handle_feedback(
            &mut store,
            &Feedback::Disassembly {
                entries: vec![entry.clone(), entry]
            }
        ));
        assert_eq!(store.disassembly().lines().count(), 2);
    }

    #[test]
    fn process_map_blocks() {
        let map = ProcessMap {
            total_mapped: 8192,
            executable_regions: 1,
            writable_regions: 1,
            private_regions: 2,
            regions: vec![
                Region {
                    start_address: 0x1000,
                    end_address: 0x2000,
                    size: 4096,
                    offset: 0,
                    device: Some(json!("08:01")),
                    inode: Some(json!(42)),
                    path: Some("/bin/ls".to_owned()),
                    permissions: Permissions {
                        read: true,
                        execute: true,
                        private: true,
                        ..Default::default()
                    },
                },
                Region {
                    permissions: Permissions {
                        read: true,
                        write: true,
                        shared: true,
                        ..Default::default()
                    },
                    ..Default::default()
                },
            ],
        };
        let mut store = DataStore::new();
        assert!(handle_feedback(&mut store, &Feedback::ProcessMap(map)));

        let output = store.output();
        assert!(output.contains("  Total mapped memory: 8192 bytes"));
        assert!(output.contains("  1. /bin/ls"));
        assert!(output.contains("Address Range: 0x0000000000001000 - 0x0000000000002000"));
        assert!(output.contains("Size: 4096 bytes, Offset: 0, Device: 08:01, Inode: 42"));
        assert!(output.contains("Permissions: r-xp"));
        assert!(output.contains("  2. Anonymous"));
        assert!(output.contains("Device: N/A, Inode: N/A"));
        assert!(output.contains("Permissions: rw-s"));
    }

    #[test]
    fn backtrace_numbered_frames() {
        let frames = vec![
            Frame {
                addr: 0x401000,
                name: Some("main".to_owned()),
                start_addr: Some(0x400ff0),
            },
            Frame {
                addr: 0x7f00,
                name: None,
                start_addr: None,
            },
        ];
        let mut store = DataStore::new();
        assert!(handle_feedback(&mut store, &Feedback::Backtrace { frames }));
        assert_eq!(
            store.backtrace(),
            "Backtrace:\n  1. Address: 0x0000000000401000 | Function: main | Start: 0x0000000000400ff0\n  2. Address: 0x0000000000007f00 | Function: <unknown> | Start: N/A"
        );
    }

    #[test]
    fn word_and_invalid_word() {
        let mut store = DataStore::new();
        assert!(handle_feedback(&mut store, &Feedback::Word { value: Some(0xdead) }));
        assert!(handle_feedback(&mut store, &Feedback::Word { value: None }));
        assert_eq!(
            store.output(),
            "Memory word: 0x000000000000dead\nMemory word: Invalid word value"
        );
    }

    #[test]
    fn symbols_indent_children() {
        let message = json!({"feedback": {"Symbols": [
            {"name": "main", "kind": "Function", "low_addr": 16, "high_addr": 32, "children": [
                {"name": "x", "kind": "Variable", "offset": 8, "datatype": 120},
                {"kind": "Block", "children": [{"name": "y", "kind": "Variable"}]}
            ]}
        ]}});
        let mut store = DataStore::new();
        assert!(handle_message(&mut store, &message));
        assert_eq!(
            store.output(),
            "Symbols:\n  Function: main, range: 0x0000000000000010 - 0x0000000000000020\n    Variable: x, offset: 8, datatype: 120\n    Block: <anonymous>\n      Variable: y"
        );
    }

    #[test]
    fn variable_and_plugins() {
        let mut store = DataStore::new();
        assert!(handle_feedback(
            &mut store,
            &Feedback::Variable {
                bytes: vec![0x01, 0xab]
            }
        ));
        assert!(handle_feedback(
            &mut store,
            &Feedback::PluginList {
                entries: vec![("sigtrap".to_owned(), true), ("hello".to_owned(), false)]
            }
        ));
        assert_eq!(
            store.output(),
            "Variable: 01 ab\nPlugins:\n  sigtrap: activated\n  hello: deactivated"
        );
    }

    #[test]
    fn unknown_tag_fails_and_is_reported() {
        let mut store = DataStore::new();
        let message = json!({"feedback": {"Mystery": {"a": 1}}});
        assert!(!handle_message(&mut store, &message));
        assert_eq!(store.output(), r#"Unknown feedback key 'Mystery' -> {"a":1}"#);
        assert_eq!(store.command_log(), message.to_string());
    }

    #[test]
    fn rendering_is_idempotent() {
        let feedback = Feedback::Disassembly {
            entries: vec![DisasmLine(
                0x10,
                vec![0xc3],
                vec![Token {
                    kind: "Mnemonic".to_owned(),
                    text: "ret".to_owned(),
                }],
                false,
            )],
        };
        let mut first = DataStore::new();
        let mut second = DataStore::new();
        handle_feedback(&mut first, &feedback);
        handle_feedback(&mut second, &feedback);
        handle_feedback(&mut second, &feedback);
        assert_eq!(first.disassembly(), second.disassembly());
    }
}
