use crate::Result;

/// Blocking command/response link to the instrument.
///
/// Commands and queries are single ASCII lines without terminator; implementations add whatever
/// framing the physical link needs.
pub trait Bus {
    fn write(&mut self, command: &str) -> Result<()>;
    fn query(&mut self, command: &str) -> Result<String>;

    /// Reads pending response data without sending anything. A transport may deliver a long
    /// block in pieces, e.g. one line per call.
    fn read_raw(&mut self) -> Result<Vec<u8>>;

    fn read(&mut self) -> Result<String> {
        let data = self.read_raw()?;
        Ok(String::from_utf8_lossy(&data).into_owned())
    }
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn write(&mut self, command: &str) -> Result<()> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String> {
        (**self).query(command)
    }

    fn read_raw(&mut self) -> Result<Vec<u8>> {
        (**self).read_raw()
    }

    fn read(&mut self) -> Result<String> {
        (**self).read()
    }
}

pub mod dummy;
pub mod stream;
