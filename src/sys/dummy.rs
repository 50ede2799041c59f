//! In-memory instrument stand-in that answers the discovery and status queries and records
//! every transaction, for dry runs and tests.

use std::collections::{HashMap, VecDeque};
use std::io;

use crate::Result;
use crate::output;
use super::Bus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Write(String),
    Query(String),
    Read,
}

impl Transaction {
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Write(command) | Self::Query(command) => Some(command),
            Self::Read => None,
        }
    }
}

#[derive(Debug)]
pub struct DummyBus {
    models: Vec<Option<String>>,
    transcript: Vec<Transaction>,
    responses: HashMap<String, VecDeque<String>>,
    reads: VecDeque<Vec<u8>>,
    failing_commands: Vec<String>,
    failing_reads: usize,
}

impl Default for DummyBus {
    fn default() -> Self {
        Self::with_models(&["B1517A"; 5])
    }
}

impl DummyBus {
    /// A chassis with the given models installed in slots 1 and up. Each slot exposes a single
    /// channel numbered after the slot.
    pub fn with_models(models: &[&str]) -> DummyBus {
        DummyBus {
            models: models.iter().map(|model| Some(model.to_string())).collect(),
            transcript: Vec::new(),
            responses: HashMap::new(),
            reads: VecDeque::new(),
            failing_commands: Vec::new(),
            failing_reads: 0,
        }
    }

    pub fn empty_slot(mut self, slot: usize) -> DummyBus {
        if slot >= 1 && slot <= self.models.len() {
            self.models[slot - 1] = None;
        }
        self
    }

    /// Queues a response for the next query whose mnemonic is `mnemonic`. Queued responses take
    /// precedence over the built-in answers.
    pub fn respond(&mut self, mnemonic: &str, response: &str) -> &mut Self {
        self.responses.entry(mnemonic.to_owned()).or_default().push_back(response.to_owned());
        self
    }

    /// Queues a data block returned by the next `read_raw`.
    pub fn push_read(&mut self, data: &[u8]) -> &mut Self {
        self.reads.push_back(data.to_vec());
        self
    }

    /// Makes every write or query whose text starts with `prefix` fail with an I/O error.
    pub fn fail_on(&mut self, prefix: &str) -> &mut Self {
        self.failing_commands.push(prefix.to_owned());
        self
    }

    pub fn fail_reads(&mut self, count: usize) -> &mut Self {
        self.failing_reads = count;
        self
    }

    pub fn transcript(&self) -> &[Transaction] {
        &self.transcript
    }

    pub fn clear_transcript(&mut self) {
        self.transcript.clear()
    }

    /// Commands sent with `write`, in order.
    pub fn writes(&self) -> Vec<&str> {
        self.transcript.iter().filter_map(|transaction| match transaction {
            Transaction::Write(command) => Some(command.as_str()),
            _ => None,
        }).collect()
    }

    /// Every write and query except the error queue polls, in order.
    pub fn commands(&self) -> Vec<&str> {
        self.transcript.iter()
            .filter_map(Transaction::command)
            .filter(|command| *command != "ERR?")
            .collect()
    }

    fn check_failure(&self, command: &str) -> Result<()> {
        if self.failing_commands.iter().any(|prefix| command.starts_with(prefix.as_str())) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe,
                format!("injected failure for {:?}", command)).into())
        }
        Ok(())
    }

    fn builtin_response(&self, command: &str) -> String {
        let (mnemonic, argument) = command.split_once(' ').unwrap_or((command, ""));
        match mnemonic {
            "UNT?" => {
                self.models.iter().map(|model| match model {
                    Some(model) => format!("{},0", model),
                    None => "0,0".to_owned(),
                }).collect::<Vec<_>>().join(";")
            }
            "*LRN?" => {
                match argument.trim().parse::<usize>() {
                    Ok(slot) if slot >= 1 && slot <= self.models.len()
                            && self.models[slot - 1].is_some() =>
                        format!("CL{};", slot),
                    _ => String::new(),
                }
            }
            "ERR?" => "+0,\"No Error.\"".to_owned(),
            "*OPC?" => "1".to_owned(),
            "SPST?" => "0".to_owned(),
            "NUB?" => self.reads.iter()
                .map(|data| output::count_values(&String::from_utf8_lossy(data)))
                .sum::<usize>()
                .to_string(),
            _ => "+0".to_owned(),
        }
    }
}

impl Bus for DummyBus {
    fn write(&mut self, command: &str) -> Result<()> {
        log::trace!("write({:?})", command);
        self.transcript.push(Transaction::Write(command.to_owned()));
        self.check_failure(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        log::trace!("query({:?})", command);
        self.transcript.push(Transaction::Query(command.to_owned()));
        self.check_failure(command)?;
        let mnemonic = command.split(' ').next().unwrap_or(command);
        let response = match self.responses.get_mut(mnemonic).and_then(VecDeque::pop_front) {
            Some(response) => response,
            None => self.builtin_response(command),
        };
        log::trace!("query({:?}) = {:?}", command, response);
        Ok(response)
    }

    fn read_raw(&mut self) -> Result<Vec<u8>> {
        self.transcript.push(Transaction::Read);
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "injected read timeout").into())
        }
        Ok(self.reads.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_discovery_answers() {
        let mut bus = DummyBus::with_models(&["B1517A", "B1511B"]).empty_slot(2);
        assert_eq!(bus.query("UNT?").unwrap(), "B1517A,0;0,0");
        assert_eq!(bus.query("*LRN? 1").unwrap(), "CL1;");
        assert_eq!(bus.query("*LRN? 2").unwrap(), "");
    }

    #[test]
    fn test_scripted_responses() {
        let mut bus = DummyBus::default();
        bus.respond("ERR?", "+100,\"Undefined GPIB command.\"");
        assert!(bus.query("ERR?").unwrap().starts_with("+100"));
        assert!(bus.query("ERR?").unwrap().starts_with("+0"));
    }

    #[test]
    fn test_pending_value_count() {
        let mut bus = DummyBus::default();
        assert_eq!(bus.query("NUB?").unwrap(), "0");
        bus.push_read(b"EV,EI\r\n").push_read(b"+1.0E+00,+2.0E-03\r\nNAI+1,NAV+2\r\n");
        assert_eq!(bus.query("NUB?").unwrap(), "4");
    }

    #[test]
    fn test_injected_failures() {
        let mut bus = DummyBus::default();
        bus.fail_on("DV").fail_reads(1);
        assert!(bus.write("DV 1,0,0,1E-3").is_err());
        assert!(bus.write("DI 1,0,0,1").is_ok());
        assert!(bus.read_raw().is_err());
        assert!(bus.read_raw().is_ok());
        assert_eq!(bus.writes(), ["DV 1,0,0,1E-3", "DI 1,0,0,1"]);
    }
}
