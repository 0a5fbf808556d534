use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

pub struct Config {
    pub debugger_path: PathBuf,
    pub debugger_args: Vec<OsString>,
    pub interval: Duration,
}

impl Config {
    pub fn new(opt: crate::Opt) -> Config {
        Config {
            debugger_path: opt.debugger,
            debugger_args: vec!["--logfile".into(), opt.logfile.into_os_string()],
            interval: Duration::from_millis(opt.interval.max(1)),
        }
    }

    /// The command line, for log messages.
    pub fn command_line(&self) -> String {
        let mut line = self.debugger_path.display().to_string();
        for arg in &self.debugger_args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::LevelFilter;

    #[test]
    fn logfile_is_passed_to_debugger() {
        let config = Config::new(crate::Opt {
            verbosity: LevelFilter::Off,
            debugger: PathBuf::from("cmserve"),
            logfile: PathBuf::from("/tmp/cm.log"),
            interval: 0,
        });
        assert_eq!(config.command_line(), "cmserve --logfile /tmp/cm.log");
        assert_eq!(config.interval, Duration::from_millis(1));
    }
}
