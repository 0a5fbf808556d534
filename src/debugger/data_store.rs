/// Display state shared with the front-end.
///
/// Registers, stack, disassembly, backtrace and the instruction pointer always hold
/// the latest snapshot. The command log and the output log accumulate history.
#[derive(Debug, Default, Clone)]
pub struct DataStore {
    command_log: String,
    output: String,
    registers: String,
    stack: String,
    disassembly: String,
    backtrace: String,
    rip: Option<u64>,
}

fn append_line(field: &mut String, line: &str) {
    if !field.is_empty() {
        field.push('\n');
    }
    field.push_str(line);
}

impl DataStore {
    pub fn new() -> DataStore {
        DataStore::default()
    }

    /// Protocol traffic: sent commands and raw feedback.
    pub fn append_command_log(&mut self, line: &str) {
        append_line(&mut self.command_log, line);
    }

    pub fn command_log(&self) -> &str {
        &self.command_log
    }

    pub fn append_output(&mut self, line: &str) {
        append_line(&mut self.output, line);
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn set_registers(&mut self, registers: String) {
        self.registers = registers;
    }

    pub fn registers(&self) -> &str {
        &self.registers
    }

    pub fn set_stack(&mut self, stack: String) {
        self.stack = stack;
    }

    pub fn stack(&self) -> &str {
        &self.stack
    }

    pub fn set_disassembly(&mut self, disassembly: String) {
        self.disassembly = disassembly;
    }

    pub fn disassembly(&self) -> &str {
        &self.disassembly
    }

    pub fn set_backtrace(&mut self, backtrace: String) {
        self.backtrace = backtrace;
    }

    pub fn backtrace(&self) -> &str {
        &self.backtrace
    }

    pub fn set_rip(&mut self, rip: u64) {
        self.rip = Some(rip);
    }

    pub fn rip(&self) -> Option<u64> {
        self.rip
    }
}
