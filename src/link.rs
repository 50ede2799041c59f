use crate::{Error, Result};
use crate::cmd::Command;
use crate::config::SessionOptions;
use crate::sys::Bus;

/// Session-scoped connection to the instrument. Every command goes through here so that the
/// error queue is inspected after each one.
#[derive(Debug)]
pub struct Link<B: Bus> {
    bus: B,
    options: SessionOptions,
    errors: Vec<(i32, String)>,
}

impl<B: Bus> Link<B> {
    pub fn new(bus: B, options: SessionOptions) -> Link<B> {
        Link { bus, options, errors: Vec::new() }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Instrument errors reported since the last call.
    pub fn take_errors(&mut self) -> Vec<(i32, String)> {
        std::mem::take(&mut self.errors)
    }

    pub fn send(&mut self, command: &Command) -> Result<()> {
        log::debug!("send({})", command);
        self.bus.write(&command.to_string())?;
        self.check_errors()
    }

    /// Writes a command whose response must be read before the error queue can be queried.
    pub fn write(&mut self, command: &Command) -> Result<()> {
        log::debug!("write({})", command);
        Ok(self.bus.write(&command.to_string())?)
    }

    pub fn query(&mut self, command: &Command) -> Result<String> {
        let response = self.bus.query(&command.to_string())?;
        log::debug!("query({}) = {:?}", command, response);
        Ok(response)
    }

    pub fn read(&mut self) -> Result<String> {
        let data = self.bus.read()?;
        log::debug!("read() = {} bytes", data.len());
        Ok(data)
    }

    pub fn read_raw(&mut self) -> Result<Vec<u8>> {
        let data = self.bus.read_raw()?;
        log::debug!("read_raw() = {} bytes", data.len());
        Ok(data)
    }

    /// Queries the error queue, logs anything it reports and, if errors are fatal, fails.
    pub fn check_errors(&mut self) -> Result<()> {
        if !self.options.check_errors {
            return Ok(())
        }
        let response = self.bus.query("ERR?")?;
        let Some((code, message)) = parse_error(&response) else {
            return Ok(())
        };
        log::warn!("instrument error {}: {}", code, message);
        self.errors.push((code, message.clone()));
        if self.options.errors_fatal {
            Err(Error::Instrument { code, message })
        } else {
            Ok(())
        }
    }
}

/// Splits an `ERR?` response into code and message; `None` if it reports no error.
fn parse_error(response: &str) -> Option<(i32, String)> {
    let response = response.trim();
    if response.starts_with("+0") || response == "0" {
        return None
    }
    let (code, message) = response.split_once(',').unwrap_or((response, ""));
    let code = code.trim().parse::<i32>().unwrap_or(-1);
    if code == 0 {
        return None
    }
    Some((code, message.trim().trim_matches('"').to_owned()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sys::dummy::DummyBus;

    #[test]
    fn test_parse_error() {
        assert_eq!(parse_error("+0,\"No Error.\""), None);
        assert_eq!(parse_error("0"), None);
        assert_eq!(parse_error("+100,\"Undefined GPIB command.\""),
                   Some((100, "Undefined GPIB command.".to_owned())));
        assert_eq!(parse_error("garbage"), Some((-1, String::new())));
    }

    #[test]
    fn test_warning_by_default() {
        let mut bus = DummyBus::default();
        bus.respond("ERR?", "+120,\"Incorrect parameter.\"");
        let mut link = Link::new(bus, SessionOptions::default());
        link.send(&Command::new("CN").arg(1u32)).unwrap();
        assert_eq!(link.take_errors(), [(120, "Incorrect parameter.".to_owned())]);
        assert!(link.take_errors().is_empty());
    }

    #[test]
    fn test_fatal_when_configured() {
        let mut bus = DummyBus::default();
        bus.respond("ERR?", "+120,\"Incorrect parameter.\"");
        let options = SessionOptions { errors_fatal: true, ..Default::default() };
        let mut link = Link::new(bus, options);
        assert!(matches!(link.send(&Command::new("CN").arg(1u32)),
                         Err(Error::Instrument { code: 120, .. })));
    }

    #[test]
    fn test_queries_are_not_checked() {
        let mut link = Link::new(DummyBus::default(), SessionOptions::default());
        link.query(&Command::new("*OPC?")).unwrap();
        link.send(&Command::new("XE")).unwrap();
        assert_eq!(link.bus().transcript().iter().filter_map(|t| t.command()).collect::<Vec<_>>(),
                   ["*OPC?", "XE", "ERR?"]);
    }

    #[test]
    fn test_check_disabled() {
        let options = SessionOptions { check_errors: false, ..Default::default() };
        let mut link = Link::new(DummyBus::default(), options);
        link.send(&Command::new("XE")).unwrap();
        assert_eq!(link.bus().commands(), ["XE"]);
        assert_eq!(link.bus().transcript().len(), 1);
    }
}
