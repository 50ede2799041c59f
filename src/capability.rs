//! Static description of what each plug-in module model can do.

use bitflags::bitflags;

use crate::{Error, Result};
use crate::range::{Quantity, Range};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    /// Source/monitor unit.
    Smu,
    /// Semiconductor pulse generator unit.
    PulseGenerator,
    /// Capacitance measurement unit.
    Capacitance,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Features: u32 {
        const DcForce           = 1<<0;
        const StaircaseSweep    = 1<<1;
        const PulsedSpot        = 1<<2;
        const PulsedSweep       = 1<<3;
        const BinarySearch      = 1<<4;
        const LinearSearch      = 1<<5;
        const PulseGenerator    = 1<<6;
        const SeriesResistance  = 1<<7;
        const Measure           = 1<<8;
    }
}

impl Features {
    const SMU: Features = Features::DcForce
        .union(Features::StaircaseSweep)
        .union(Features::PulsedSpot)
        .union(Features::PulsedSweep)
        .union(Features::Measure);

    const SEARCH: Features = Features::BinarySearch.union(Features::LinearSearch);
}

/// Limits of the binary and linear search sources.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchLimits {
    /// Largest start/stop magnitude of a voltage search source, in V.
    pub max_voltage: f64,
    /// Largest start/stop magnitude of a current search source, in A.
    pub max_current: f64,
    pub voltage_target: (f64, f64),
    pub current_target: (f64, f64),
    /// Steps of `(output magnitude, maximum compliance)` for voltage sources, ascending. The
    /// compliance of a voltage source is a current.
    pub voltage_compliance: &'static [(f64, f64)],
    /// Same for current sources; the compliance is a voltage.
    pub current_compliance: &'static [(f64, f64)],
}

impl SearchLimits {
    pub fn max_output(&self, quantity: Quantity) -> f64 {
        match quantity {
            Quantity::Voltage => self.max_voltage,
            Quantity::Current => self.max_current,
        }
    }

    pub fn target(&self, quantity: Quantity) -> (f64, f64) {
        match quantity {
            Quantity::Voltage => self.voltage_target,
            Quantity::Current => self.current_target,
        }
    }

    /// Largest compliance allowed for a search source of `quantity` sweeping up to `magnitude`,
    /// or `None` if the magnitude exceeds every step.
    pub fn max_compliance(&self, quantity: Quantity, magnitude: f64) -> Option<f64> {
        let steps = match quantity {
            Quantity::Voltage => self.voltage_compliance,
            Quantity::Current => self.current_compliance,
        };
        steps.iter()
            .find(|&&(output, _)| magnitude <= output)
            .map(|&(_, compliance)| compliance)
    }
}

#[derive(Debug, PartialEq)]
pub struct Capability {
    pub models: &'static [&'static str],
    pub name: &'static str,
    pub long_name: &'static str,
    pub kind: ModuleKind,
    pub features: Features,
    voltage_inputs: &'static [u32],
    current_inputs: &'static [u32],
    voltage_measure: &'static [u32],
    current_measure: &'static [u32],
    pub search: Option<SearchLimits>,
    /// Largest magnitude the module can force, in V.
    pub max_voltage: f64,
}

impl Capability {
    pub fn model(&self) -> &'static str {
        self.models[0]
    }

    pub fn supports(&self, features: Features) -> bool {
        self.features.contains(features)
    }

    fn input_codes(&self, quantity: Quantity) -> &'static [u32] {
        match quantity {
            Quantity::Voltage => self.voltage_inputs,
            Quantity::Current => self.current_inputs,
        }
    }

    fn measure_codes(&self, quantity: Quantity) -> &'static [u32] {
        match quantity {
            Quantity::Voltage => self.voltage_measure,
            Quantity::Current => self.current_measure,
        }
    }

    /// Ranges a source of `quantity` may be programmed with: full auto and every limited range.
    pub fn input_ranges(&self, quantity: Quantity) -> Vec<Range> {
        std::iter::once(Range::Auto)
            .chain(self.input_codes(quantity).iter().map(|&code| Range::Limited(code)))
            .collect()
    }

    /// Ranges a measurement of `quantity` may use: full auto, limited and fixed.
    pub fn measure_ranges(&self, quantity: Quantity) -> Vec<Range> {
        let codes = self.measure_codes(quantity);
        std::iter::once(Range::Auto)
            .chain(codes.iter().map(|&code| Range::Limited(code)))
            .chain(codes.iter().map(|&code| Range::Fixed(code)))
            .collect()
    }

    pub fn allows_input(&self, quantity: Quantity, range: Range) -> bool {
        match range {
            Range::Auto => true,
            Range::Limited(code) => self.input_codes(quantity).contains(&code),
            Range::Fixed(_) => false,
        }
    }

    pub fn allows_measure(&self, quantity: Quantity, range: Range) -> bool {
        match range.ceiling_code() {
            None => true,
            Some(code) => self.measure_codes(quantity).contains(&code),
        }
    }
}

const MPSMU_SEARCH: SearchLimits = SearchLimits {
    max_voltage: 100.0,
    max_current: 0.1,
    voltage_target: (0.0, 100.0),
    current_target: (1e-14, 0.1),
    voltage_compliance: &[(20.0, 0.1), (40.0, 0.05), (100.0, 0.02)],
    current_compliance: &[(0.02, 100.0), (0.05, 40.0), (0.1, 20.0)],
};

const HPSMU_SEARCH: SearchLimits = SearchLimits {
    max_voltage: 200.0,
    max_current: 1.0,
    voltage_target: (0.0, 200.0),
    current_target: (1e-13, 1.0),
    voltage_compliance: &[(20.0, 1.0), (40.0, 0.5), (100.0, 0.125), (200.0, 0.05)],
    current_compliance: &[(0.05, 200.0), (0.125, 100.0), (0.5, 40.0), (1.0, 20.0)],
};

const MODULES: &[Capability] = &[
    Capability {
        models: &["B1510A"],
        name: "HPSMU",
        long_name: "High power source/monitor unit",
        kind: ModuleKind::Smu,
        features: Features::SMU.union(Features::SEARCH).union(Features::SeriesResistance),
        voltage_inputs: &[20, 200, 400, 1000, 2000],
        current_inputs: &[11, 12, 13, 14, 15, 16, 17, 18, 19, 20],
        voltage_measure: &[20, 200, 400, 1000, 2000],
        current_measure: &[11, 12, 13, 14, 15, 16, 17, 18, 19, 20],
        search: Some(HPSMU_SEARCH),
        max_voltage: 200.0,
    },
    Capability {
        models: &["B1511A", "B1511B"],
        name: "MPSMU",
        long_name: "Medium power source/monitor unit",
        kind: ModuleKind::Smu,
        features: Features::SMU.union(Features::SEARCH).union(Features::SeriesResistance),
        voltage_inputs: &[5, 50, 200, 400, 1000],
        current_inputs: &[8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
        voltage_measure: &[5, 20, 50, 200, 400, 1000],
        current_measure: &[8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
        search: Some(MPSMU_SEARCH),
        max_voltage: 100.0,
    },
    Capability {
        models: &["B1512A"],
        name: "HCSMU",
        long_name: "High current source/monitor unit",
        kind: ModuleKind::Smu,
        features: Features::SMU,
        voltage_inputs: &[20, 200, 400, 1000, 2000],
        current_inputs: &[11, 12, 13, 14, 15, 16, 17, 18, 19, 20],
        voltage_measure: &[2, 20, 200, 400],
        current_measure: &[15, 16, 17, 18, 19, 22],
        search: None,
        max_voltage: 40.0,
    },
    Capability {
        models: &["B1513A", "B1513B"],
        name: "HVSMU",
        long_name: "High voltage source/monitor unit",
        kind: ModuleKind::Smu,
        features: Features::SMU,
        voltage_inputs: &[2000, 5000, 15000, 30000],
        current_inputs: &[11, 12, 13, 14, 15, 16, 17, 18],
        voltage_measure: &[2000, 5000, 15000, 30000],
        current_measure: &[11, 12, 13, 14, 15, 16, 17, 18],
        search: None,
        max_voltage: 3000.0,
    },
    Capability {
        models: &["B1514A"],
        name: "MCSMU",
        long_name: "Medium current source/monitor unit",
        kind: ModuleKind::Smu,
        features: Features::SMU,
        voltage_inputs: &[2, 200, 400],
        current_inputs: &[15, 16, 17, 18, 19, 20],
        voltage_measure: &[2, 20, 200, 400],
        current_measure: &[15, 16, 17, 18, 19],
        search: None,
        max_voltage: 30.0,
    },
    Capability {
        models: &["B1517A"],
        name: "HRSMU",
        long_name: "High resolution source/monitor unit",
        kind: ModuleKind::Smu,
        features: Features::SMU.union(Features::SEARCH).union(Features::SeriesResistance),
        voltage_inputs: &[5, 50, 200, 400, 1000],
        current_inputs: &[8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
        voltage_measure: &[5, 20, 50, 200, 400, 1000],
        current_measure: &[8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19],
        search: Some(MPSMU_SEARCH),
        max_voltage: 100.0,
    },
    Capability {
        models: &["B1525A"],
        name: "HVSPGU",
        long_name: "High voltage semiconductor pulse generator unit",
        kind: ModuleKind::PulseGenerator,
        features: Features::PulseGenerator,
        voltage_inputs: &[],
        current_inputs: &[],
        voltage_measure: &[],
        current_measure: &[],
        search: None,
        max_voltage: 40.0,
    },
    Capability {
        models: &["B1520A"],
        name: "MFCMU",
        long_name: "Multi frequency capacitance measurement unit",
        kind: ModuleKind::Capacitance,
        features: Features::empty(),
        voltage_inputs: &[],
        current_inputs: &[],
        voltage_measure: &[],
        current_measure: &[],
        search: None,
        max_voltage: 25.0,
    },
];

/// Resolves a model identifier as reported by `UNT?` (e.g. `B1517A`) to its capabilities.
pub fn lookup(model: &str) -> Result<&'static Capability> {
    let model = model.trim();
    MODULES.iter()
        .find(|capability| capability.models.contains(&model))
        .ok_or_else(|| Error::UnknownModel(model.to_owned()))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("B1517A").unwrap().name, "HRSMU");
        assert_eq!(lookup("B1511B").unwrap().name, "MPSMU");
        assert_eq!(lookup(" B1525A").unwrap().kind, ModuleKind::PulseGenerator);
        assert!(matches!(lookup("B1530A"), Err(Error::UnknownModel(model)) if model == "B1530A"));
    }

    #[test]
    fn test_ranges() {
        let hrsmu = lookup("B1517A").unwrap();
        assert!(hrsmu.allows_input(Quantity::Voltage, Range::Auto));
        assert!(hrsmu.allows_input(Quantity::Voltage, Range::Limited(50)));
        assert!(!hrsmu.allows_input(Quantity::Voltage, Range::Limited(20)));
        assert!(!hrsmu.allows_input(Quantity::Current, Range::Limited(20)));
        assert!(!hrsmu.allows_input(Quantity::Current, Range::Fixed(14)));
        assert!(hrsmu.allows_measure(Quantity::Voltage, Range::Fixed(20)));
        assert!(hrsmu.allows_measure(Quantity::Current, Range::Fixed(8)));
        assert!(!hrsmu.allows_measure(Quantity::Current, Range::Fixed(20)));
        assert_eq!(hrsmu.input_ranges(Quantity::Voltage).len(), 6);
        assert_eq!(hrsmu.measure_ranges(Quantity::Voltage).len(), 13);
    }

    #[test]
    fn test_features() {
        assert!(lookup("B1517A").unwrap().supports(Features::BinarySearch | Features::SeriesResistance));
        assert!(!lookup("B1512A").unwrap().supports(Features::SeriesResistance));
        assert!(!lookup("B1525A").unwrap().supports(Features::DcForce));
        assert!(lookup("B1525A").unwrap().supports(Features::PulseGenerator));
    }

    #[test]
    fn test_search_compliance_steps() {
        let search = lookup("B1511A").unwrap().search.unwrap();
        assert_eq!(search.max_compliance(Quantity::Voltage, 10.0), Some(0.1));
        assert_eq!(search.max_compliance(Quantity::Voltage, 20.0), Some(0.1));
        assert_eq!(search.max_compliance(Quantity::Voltage, 30.0), Some(0.05));
        assert_eq!(search.max_compliance(Quantity::Voltage, 150.0), None);
        assert_eq!(search.max_compliance(Quantity::Current, 0.03), Some(40.0));
    }
}
