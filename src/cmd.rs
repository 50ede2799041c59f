//! Encoding of instrument commands as `MNEMONIC arg1,arg2,...` lines.

use std::fmt;

pub trait Argument {
    fn render(&self) -> Option<String>;
}

impl Argument for u32 {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Argument for i32 {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Argument for usize {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl Argument for f64 {
    fn render(&self) -> Option<String> {
        let magnitude = self.abs();
        if magnitude == 0.0 {
            Some("0".to_owned())
        } else if (1e-3..1e6).contains(&magnitude) {
            Some(self.to_string())
        } else {
            Some(format!("{:E}", self))
        }
    }
}

impl Argument for &str {
    fn render(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl<T: Argument> Argument for Option<T> {
    fn render(&self) -> Option<String> {
        self.as_ref().and_then(Argument::render)
    }
}

/// One instrument command. Unset arguments are left out of the rendered text entirely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    mnemonic: &'static str,
    args: Vec<String>,
}

impl Command {
    pub fn new(mnemonic: &'static str) -> Command {
        Command { mnemonic, args: Vec::new() }
    }

    pub fn arg<A: Argument>(mut self, value: A) -> Command {
        if let Some(text) = value.render() {
            self.args.push(text);
        }
        self
    }

    pub fn args<A: Argument, I: IntoIterator<Item = A>>(mut self, values: I) -> Command {
        for value in values {
            self = self.arg(value);
        }
        self
    }

    pub fn mnemonic(&self) -> &'static str {
        self.mnemonic
    }

    pub fn is_query(&self) -> bool {
        self.mnemonic.ends_with('?')
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        if !self.args.is_empty() {
            write!(f, " {}", self.args.join(","))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_render_plain() {
        assert_eq!(Command::new("XE").to_string(), "XE");
        assert_eq!(Command::new("CN").arg(1u32).to_string(), "CN 1");
        assert_eq!(Command::new("FMT").arg(1u32).arg(0u32).to_string(), "FMT 1,0");
    }

    #[test]
    fn test_unset_arguments_omitted() {
        let command = Command::new("WT").arg(0.0).arg(0.01).arg(None::<f64>).arg(None::<f64>);
        assert_eq!(command.to_string(), "WT 0,0.01");
    }

    #[test]
    fn test_render_numbers() {
        assert_eq!(Command::new("DV").arg(2u32).arg(-3i32).arg(5.0).arg(1e-3).to_string(),
                   "DV 2,-3,5,0.001");
        assert_eq!(Command::new("PT").arg(1e-5).arg(2.5e7).to_string(), "PT 1E-5,2.5E7");
    }

    #[test]
    fn test_query() {
        assert!(Command::new("*OPC?").is_query());
        assert!(!Command::new("XE").is_query());
    }
}
