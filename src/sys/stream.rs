//! Line-oriented transport over any byte stream, e.g. a TCP socket of a LAN/GPIB gateway.

use std::io::{self, BufRead, BufReader, Read, Write};

use crate::Result;
use super::Bus;

#[derive(Debug)]
pub struct StreamBus<S: Read + Write> {
    stream: BufReader<S>,
    terminator: &'static str,
}

impl<S: Read + Write> StreamBus<S> {
    pub fn new(stream: S) -> StreamBus<S> {
        StreamBus { stream: BufReader::new(stream), terminator: "\n" }
    }

    pub fn with_terminator(mut self, terminator: &'static str) -> StreamBus<S> {
        self.terminator = terminator;
        self
    }

    pub fn into_inner(self) -> S {
        self.stream.into_inner()
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let count = self.stream.read_until(b'\n', &mut line)?;
        if count == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed").into())
        }
        log::trace!("read_line() = {:?}", String::from_utf8_lossy(&line));
        Ok(line)
    }
}

impl StreamBus<std::net::TcpStream> {
    pub fn connect<A: std::net::ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(StreamBus::new(stream))
    }
}

impl<S: Read + Write> Bus for StreamBus<S> {
    fn write(&mut self, command: &str) -> Result<()> {
        log::trace!("write({:?})", command);
        let stream = self.stream.get_mut();
        stream.write_all(command.as_bytes())?;
        stream.write_all(self.terminator.as_bytes())?;
        stream.flush()?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String> {
        self.write(command)?;
        let line = self.read_line()?;
        Ok(String::from_utf8_lossy(&line).trim_end().to_owned())
    }

    /// Reads one line. A block spanning several lines takes several reads.
    fn read_raw(&mut self) -> Result<Vec<u8>> {
        self.read_line()
    }
}
