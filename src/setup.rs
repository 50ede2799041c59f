//! Declarative description of a test: what each channel forces and measures, and the
//! session-wide data format and converter settings.

use crate::{Error, Result};
use crate::range::{Quantity, Range};

macro_rules! codes {
    ($($name:ident),+) => {
        $(impl $name {
            pub fn code(self) -> u32 {
                self as u32
            }
        })+
    }
}

/// Quantity a measurement channel reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Target {
    Voltage = 0,
    #[default]
    Current = 1,
    Both = 2,
    Capacitance = 3,
}

impl Target {
    /// Quantity whose range `RI`/`RV` configures, if any.
    pub fn ranged_quantity(self) -> Option<Quantity> {
        match self {
            Self::Voltage => Some(Quantity::Voltage),
            Self::Current | Self::Both => Some(Quantity::Current),
            Self::Capacitance => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeasureMode {
    #[default]
    Spot = 1,
    StaircaseSweep = 2,
    PulsedSpot = 3,
    PulsedSweep = 4,
    StaircaseSweepPulsedBias = 5,
    QuasiPulsedSpot = 9,
    Sampling = 10,
    QuasiStaticCv = 13,
    LinearSearch = 14,
    BinarySearch = 15,
    MultiChannelSweep = 16,
    SpotC = 17,
}

impl MeasureMode {
    /// Modes that produce a variable number of records, read back after asking for the count.
    pub fn is_sweep(self) -> bool {
        matches!(self,
            Self::StaircaseSweep | Self::PulsedSweep | Self::StaircaseSweepPulsedBias |
            Self::Sampling | Self::QuasiStaticCv | Self::MultiChannelSweep)
    }

    /// Modes whose measurement side and range are implied by the source setup.
    pub(crate) fn has_implicit_side(self) -> bool {
        matches!(self, Self::Sampling | Self::QuasiPulsedSpot)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MeasureSide {
    /// The quantity opposite to the forced one.
    #[default]
    Compliance = 0,
    Current = 1,
    Voltage = 2,
    /// The forced quantity itself.
    Force = 3,
    CurrentAndVoltage = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SweepMode {
    #[default]
    LinearUp = 1,
    LogUp = 2,
    LinearUpDown = 3,
    LogUpDown = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AutoAbort {
    #[default]
    Disabled = 1,
    Enabled = 2,
}

/// Output left on the source after a sweep or search ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PostOutput {
    Start = 1,
    Stop = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Polarity {
    #[default]
    LikeInput = 0,
    Manual = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdcType {
    #[default]
    HighSpeed = 0,
    HighResolution = 1,
    HighSpeedPulse = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdcMode {
    #[default]
    Auto = 0,
    Manual = 1,
}

/// Integration setting of one converter type, sent with `AIT`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdcSetting {
    pub adc: AdcType,
    pub mode: AdcMode,
    pub coefficient: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdcConfig {
    /// Averaging of the high speed converter, sent with `AV`.
    HighSpeed {
        samples: u32,
        mode: AdcMode,
    },
    PerType(Vec<AdcSetting>),
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self::HighSpeed { samples: 1, mode: AdcMode::Auto }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Format {
    #[default]
    Ascii12Header = 1,
    Ascii12 = 2,
    Binary4Crlf = 3,
    Binary4 = 4,
    Ascii12HeaderComma = 5,
    Ascii13Header = 11,
    Ascii13 = 12,
    Binary8Crlf = 13,
    Binary8 = 14,
    Ascii13HeaderComma = 15,
    Ascii13HeaderFlex = 21,
    Ascii13Flex = 22,
    Ascii13HeaderCommaFlex = 25,
}

impl Format {
    pub fn is_binary(self) -> bool {
        matches!(self, Self::Binary4Crlf | Self::Binary4 | Self::Binary8Crlf | Self::Binary8)
    }

    pub fn has_header(self) -> bool {
        matches!(self,
            Self::Ascii12Header | Self::Ascii12HeaderComma | Self::Ascii13Header |
            Self::Ascii13HeaderComma | Self::Ascii13HeaderFlex | Self::Ascii13HeaderCommaFlex)
    }

    /// Records are terminated by a comma instead of CR/LF.
    pub fn is_comma_terminated(self) -> bool {
        matches!(self,
            Self::Ascii12HeaderComma | Self::Ascii13HeaderComma | Self::Ascii13HeaderCommaFlex)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputMode {
    #[default]
    DataOnly = 0,
    WithPrimarySource = 1,
    WithSynchronousSource = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Filter {
    Enabled = 0,
    #[default]
    Disabled = 1,
}

/// Connection of one SMU/PGU selector output, sent with `ERSSP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SelectorState {
    #[default]
    Open = 0,
    Smu = 1,
    PulseGenerator = 2,
    PulseGeneratorOpen = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SelectorPort {
    pub port: u32,
    pub state: SelectorState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchKind {
    #[default]
    Binary,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchMode {
    #[default]
    Limit = 0,
    Repeat = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchOutput {
    #[default]
    DataOnly = 0,
    WithSource = 1,
}

/// Step control of a binary search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchControl {
    #[default]
    Normal = 0,
    Cautious = 1,
}

codes!(Target, MeasureMode, MeasureSide, SweepMode, AutoAbort, PostOutput, Polarity, AdcType,
       AdcMode, Format, OutputMode, Filter, SelectorState, SearchMode, SearchOutput,
       SearchControl);

/// Constant voltage or current output (`DV`/`DI`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DcForce {
    pub input: Quantity,
    pub value: f64,
    pub compliance: f64,
    /// Output range; derived from `value` when unset.
    pub range: Option<Range>,
    pub polarity: Option<Polarity>,
    pub compliance_range: Option<Range>,
}

impl DcForce {
    pub fn voltage(value: f64, compliance: f64) -> DcForce {
        DcForce {
            input: Quantity::Voltage,
            value,
            compliance,
            range: None,
            polarity: None,
            compliance_range: None,
        }
    }

    pub fn current(value: f64, compliance: f64) -> DcForce {
        DcForce { input: Quantity::Current, ..DcForce::voltage(value, compliance) }
    }

    pub fn with_range(mut self, range: Range) -> DcForce {
        self.range = Some(range);
        self
    }

    pub fn with_compliance_range(mut self, polarity: Polarity, range: Range) -> DcForce {
        self.polarity = Some(polarity);
        self.compliance_range = Some(range);
        self
    }
}

/// Stepped output from `start` to `stop` (`WT`, `WM`, `WV`/`WI`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StaircaseSweep {
    pub input: Quantity,
    pub mode: SweepMode,
    pub range: Option<Range>,
    pub start: f64,
    pub stop: f64,
    pub steps: u32,
    pub compliance: f64,
    pub power_compliance: Option<f64>,
    pub hold: f64,
    pub delay: f64,
    pub step_delay: Option<f64>,
    pub trigger_delay: Option<f64>,
    pub auto_abort: AutoAbort,
    pub post: Option<PostOutput>,
}

impl StaircaseSweep {
    pub fn voltage(start: f64, stop: f64, steps: u32, compliance: f64) -> StaircaseSweep {
        StaircaseSweep {
            input: Quantity::Voltage,
            mode: SweepMode::LinearUp,
            range: None,
            start,
            stop,
            steps,
            compliance,
            power_compliance: None,
            hold: 0.0,
            delay: 0.0,
            step_delay: None,
            trigger_delay: None,
            auto_abort: AutoAbort::Enabled,
            post: None,
        }
    }

    pub fn current(start: f64, stop: f64, steps: u32, compliance: f64) -> StaircaseSweep {
        StaircaseSweep { input: Quantity::Current, ..StaircaseSweep::voltage(start, stop, steps, compliance) }
    }

    pub fn with_mode(mut self, mode: SweepMode) -> StaircaseSweep {
        self.mode = mode;
        self
    }

    pub fn with_range(mut self, range: Range) -> StaircaseSweep {
        self.range = Some(range);
        self
    }

    pub fn with_timing(mut self, hold: f64, delay: f64) -> StaircaseSweep {
        self.hold = hold;
        self.delay = delay;
        self
    }

    pub fn with_power_compliance(mut self, power: f64) -> StaircaseSweep {
        self.power_compliance = Some(power);
        self
    }
}

/// Swept pulses on top of a base value (`PT`, `WM`, `PWV`/`PWI`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulsedSweep {
    pub input: Quantity,
    pub mode: SweepMode,
    pub range: Option<Range>,
    pub base: f64,
    pub start: f64,
    pub stop: f64,
    pub steps: u32,
    pub compliance: f64,
    pub power_compliance: Option<f64>,
    pub hold: f64,
    pub width: f64,
    /// Pulse period; the shortest the instrument allows when unset.
    pub period: Option<f64>,
    pub auto_abort: AutoAbort,
    pub post: Option<PostOutput>,
}

impl PulsedSweep {
    pub fn voltage(base: f64, start: f64, stop: f64, steps: u32, width: f64,
                   compliance: f64) -> PulsedSweep {
        PulsedSweep {
            input: Quantity::Voltage,
            mode: SweepMode::LinearUp,
            range: None,
            base,
            start,
            stop,
            steps,
            compliance,
            power_compliance: None,
            hold: 0.0,
            width,
            period: None,
            auto_abort: AutoAbort::Enabled,
            post: None,
        }
    }

    pub fn current(base: f64, start: f64, stop: f64, steps: u32, width: f64,
                   compliance: f64) -> PulsedSweep {
        PulsedSweep {
            input: Quantity::Current,
            ..PulsedSweep::voltage(base, start, stop, steps, width, compliance)
        }
    }

    pub fn with_period(mut self, period: f64) -> PulsedSweep {
        self.period = Some(period);
        self
    }
}

/// Single pulse from a base value (`PT`, `PV`/`PI`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulsedSpot {
    pub input: Quantity,
    pub range: Option<Range>,
    pub base: f64,
    pub pulse: f64,
    pub compliance: f64,
    pub hold: f64,
    pub width: f64,
    pub period: Option<f64>,
}

impl PulsedSpot {
    pub fn voltage(base: f64, pulse: f64, width: f64, compliance: f64) -> PulsedSpot {
        PulsedSpot {
            input: Quantity::Voltage,
            range: None,
            base,
            pulse,
            compliance,
            hold: 0.0,
            width,
            period: None,
        }
    }

    pub fn current(base: f64, pulse: f64, width: f64, compliance: f64) -> PulsedSpot {
        PulsedSpot { input: Quantity::Current, ..PulsedSpot::voltage(base, pulse, width, compliance) }
    }
}

/// Condition a search drives its source towards (`BGV`/`BGI`, `LGV`/`LGI`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SearchTarget {
    pub quantity: Quantity,
    pub mode: SearchMode,
    /// Tolerance in limit mode, repeat count in repeat mode.
    pub condition: f64,
    pub range: Option<Range>,
    pub value: f64,
}

/// Binary or linear search of a source value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Search {
    pub kind: SearchKind,
    pub input: Quantity,
    pub range: Option<Range>,
    pub start: f64,
    pub stop: f64,
    pub compliance: f64,
    pub control: SearchControl,
    pub auto_abort: AutoAbort,
    pub post: Option<PostOutput>,
    pub output: SearchOutput,
    pub hold: f64,
    pub delay: f64,
    pub target: SearchTarget,
}

impl Search {
    pub fn new(kind: SearchKind, input: Quantity, start: f64, stop: f64, compliance: f64,
               target: SearchTarget) -> Search {
        Search {
            kind,
            input,
            range: None,
            start,
            stop,
            compliance,
            control: SearchControl::Normal,
            auto_abort: AutoAbort::Disabled,
            post: None,
            output: SearchOutput::DataOnly,
            hold: 0.0,
            delay: 0.0,
            target,
        }
    }

    pub fn measure_mode(&self) -> MeasureMode {
        match self.kind {
            SearchKind::Binary => MeasureMode::BinarySearch,
            SearchKind::Linear => MeasureMode::LinearSearch,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PulseMode {
    /// Pulse until stopped.
    FreeRun,
    Count(u32),
    /// Pulse for a number of seconds.
    Duration(f64),
}

impl Default for PulseMode {
    fn default() -> Self {
        Self::Count(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadImpedance {
    /// Measure the load once and use the result (`CORRSER?`).
    #[default]
    Auto,
    Ohms(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseSignal {
    pub base: f64,
    pub peak: f64,
    pub delay: f64,
    pub width: f64,
}

/// Semiconductor switch in series with the pulse generator output (`ODSW`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseSwitch {
    pub normally_closed: bool,
    pub delay: f64,
    pub width: f64,
}

impl Default for PulseSwitch {
    fn default() -> Self {
        Self { normally_closed: false, delay: 0.0, width: 1e-7 }
    }
}

impl PulseSwitch {
    /// The default switch, if it fits into a pulse period. Its shortest width is 100 ns.
    fn default_for(period: f64) -> Option<PulseSwitch> {
        (period >= 1e-7).then(PulseSwitch::default)
    }
}

/// Two- or three-level pulse train of a pulse generator channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PulseGenerator {
    /// One signal gives a two-level pulse, two signals a three-level one.
    pub signals: Vec<PulseSignal>,
    pub period: f64,
    pub leading: f64,
    pub trailing: f64,
    pub mode: PulseMode,
    pub load: LoadImpedance,
    pub switch: Option<PulseSwitch>,
}

impl PulseGenerator {
    pub fn new(base: f64, peak: f64, width: f64) -> PulseGenerator {
        let period = width + 2e-8;
        PulseGenerator {
            signals: vec![PulseSignal { base, peak, delay: 0.0, width }],
            period,
            leading: 2e-8,
            trailing: 2e-8,
            mode: PulseMode::default(),
            load: LoadImpedance::default(),
            switch: PulseSwitch::default_for(period),
        }
    }

    /// Sets the pulse period. A switch left at its default follows the period.
    pub fn with_period(mut self, period: f64) -> PulseGenerator {
        if self.switch == PulseSwitch::default_for(self.period) {
            self.switch = PulseSwitch::default_for(period);
        }
        self.period = period;
        self
    }

    pub fn with_delay(mut self, delay: f64) -> PulseGenerator {
        if let Some(signal) = self.signals.first_mut() {
            signal.delay = delay;
        }
        self
    }

    pub fn with_edges(mut self, leading: f64, trailing: f64) -> PulseGenerator {
        self.leading = leading;
        self.trailing = trailing;
        self
    }

    pub fn with_second_signal(mut self, signal: PulseSignal) -> PulseGenerator {
        self.signals.truncate(1);
        self.signals.push(signal);
        self
    }

    pub fn with_mode(mut self, mode: PulseMode) -> PulseGenerator {
        self.mode = mode;
        self
    }

    pub fn with_load(mut self, load: LoadImpedance) -> PulseGenerator {
        self.load = load;
        self
    }

    pub fn with_switch(mut self, switch: Option<PulseSwitch>) -> PulseGenerator {
        self.switch = switch;
        self
    }

    /// `SPM` level/source selection.
    pub(crate) fn levels_code(&self) -> u32 {
        if self.signals.len() > 1 { 3 } else { 1 }
    }

    pub fn validate(&self) -> Result<()> {
        fn check(ok: bool, message: String) -> Result<()> {
            if ok { Ok(()) } else { Err(Error::InvalidSetup(message)) }
        }

        let period = self.period;
        check(!self.signals.is_empty() && self.signals.len() <= 2,
              format!("pulse generator needs one or two signals, got {}", self.signals.len()))?;
        check((2e-8..=10.0).contains(&period),
              format!("pulse period {}s is outside 2e-8..10s", period))?;
        for signal in &self.signals {
            for level in [signal.base, signal.peak] {
                check((-40.0..=40.0).contains(&level),
                      format!("pulse level {}V is outside -40..40V", level))?;
            }
            check(signal.width >= 1e-8 && signal.width <= period - 1e-8,
                  format!("pulse width {}s is outside 1e-8..{}s", signal.width, period - 1e-8))?;
            check(signal.delay >= 0.0 && signal.delay <= period - 2e-8,
                  format!("pulse delay {}s is outside 0..{}s", signal.delay, period - 2e-8))?;
        }
        for edge in [self.leading, self.trailing] {
            check((8e-9..=0.4).contains(&edge),
                  format!("pulse edge time {}s is outside 8e-9..0.4s", edge))?;
        }
        if let Some(switch) = self.switch {
            check(switch.delay >= 0.0 && switch.delay <= period - 1e-7,
                  format!("switch delay {}s is outside 0..{}s", switch.delay, period - 1e-7))?;
            check(switch.width >= 1e-7 && switch.width <= period - switch.delay,
                  format!("switch width {}s is outside 1e-7..{}s", switch.width,
                          period - switch.delay))?;
        }
        if let LoadImpedance::Ohms(ohms) = self.load {
            check(ohms > 0.1 && ohms < 1e6,
                  format!("load impedance {} ohm is outside 0.1..1e6 ohm", ohms))?;
        }
        Ok(())
    }
}

/// Configures what a measurement channel senses.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Measurement {
    pub target: Target,
    pub mode: MeasureMode,
    pub side: MeasureSide,
    /// Measurement range; derived from the compliance of the channel's source when unset.
    pub range: Option<Range>,
}

impl Measurement {
    pub fn new(target: Target, mode: MeasureMode) -> Measurement {
        let side = match target {
            Target::Voltage => MeasureSide::Voltage,
            Target::Current => MeasureSide::Current,
            Target::Both => MeasureSide::CurrentAndVoltage,
            Target::Capacitance => MeasureSide::Compliance,
        };
        Measurement { target, mode, side, range: None }
    }

    pub fn with_side(mut self, side: MeasureSide) -> Measurement {
        self.side = side;
        self
    }

    pub fn with_range(mut self, range: Range) -> Measurement {
        self.range = Some(range);
        self
    }
}

/// Kind of run a test performs; a test uses exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeFamily {
    /// Sweeps, pulses and spot measurements started by `XE`.
    Triggered,
    /// Pulse generator output started by `SPR`.
    PulseGenerator,
    Search,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Force {
    Dc(DcForce),
    StaircaseSweep(StaircaseSweep),
    PulsedSweep(PulsedSweep),
    PulsedSpot(PulsedSpot),
    Search(Search),
    PulseGenerator(PulseGenerator),
}

impl Force {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dc(_) => "DC force",
            Self::StaircaseSweep(_) => "staircase sweep",
            Self::PulsedSweep(_) => "pulsed sweep",
            Self::PulsedSpot(_) => "pulsed spot",
            Self::Search(search) => match search.kind {
                SearchKind::Binary => "binary search",
                SearchKind::Linear => "linear search",
            },
            Self::PulseGenerator(_) => "pulse generator",
        }
    }

    /// Quantity the source outputs.
    pub fn input(&self) -> Quantity {
        match self {
            Self::Dc(force) => force.input,
            Self::StaircaseSweep(sweep) => sweep.input,
            Self::PulsedSweep(sweep) => sweep.input,
            Self::PulsedSpot(spot) => spot.input,
            Self::Search(search) => search.input,
            Self::PulseGenerator(_) => Quantity::Voltage,
        }
    }

    /// Compliance of the source, if it has one.
    pub fn compliance(&self) -> Option<f64> {
        match self {
            Self::Dc(force) => Some(force.compliance),
            Self::StaircaseSweep(sweep) => Some(sweep.compliance),
            Self::PulsedSweep(sweep) => Some(sweep.compliance),
            Self::PulsedSpot(spot) => Some(spot.compliance),
            Self::Search(search) => Some(search.compliance),
            Self::PulseGenerator(_) => None,
        }
    }
}

/// Setup of one physical channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Channel {
    pub number: u32,
    pub force: Option<Force>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub series_resistance: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub adc: AdcType,
    pub measurement: Option<Measurement>,
}

impl Channel {
    pub fn builder(number: u32) -> ChannelBuilder {
        ChannelBuilder {
            number,
            forces: Vec::new(),
            series_resistance: false,
            adc: AdcType::default(),
            measurement: None,
        }
    }

    pub fn family(&self) -> Option<ModeFamily> {
        match (&self.force, &self.measurement) {
            (Some(Force::PulseGenerator(_)), _) => Some(ModeFamily::PulseGenerator),
            (Some(Force::Search(_)), _) => Some(ModeFamily::Search),
            (Some(Force::Dc(_)), None) | (None, None) => None,
            (Some(_), _) | (None, Some(_)) => Some(ModeFamily::Triggered),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChannelBuilder {
    number: u32,
    forces: Vec<Force>,
    series_resistance: bool,
    adc: AdcType,
    measurement: Option<Measurement>,
}

impl ChannelBuilder {
    pub fn force(mut self, force: Force) -> ChannelBuilder {
        self.forces.push(force);
        self
    }

    pub fn dc_force(self, force: DcForce) -> ChannelBuilder {
        self.force(Force::Dc(force))
    }

    pub fn staircase_sweep(self, sweep: StaircaseSweep) -> ChannelBuilder {
        self.force(Force::StaircaseSweep(sweep))
    }

    pub fn pulsed_sweep(self, sweep: PulsedSweep) -> ChannelBuilder {
        self.force(Force::PulsedSweep(sweep))
    }

    pub fn pulsed_spot(self, spot: PulsedSpot) -> ChannelBuilder {
        self.force(Force::PulsedSpot(spot))
    }

    pub fn search(self, search: Search) -> ChannelBuilder {
        self.force(Force::Search(search))
    }

    pub fn pulse_generator(self, pulse: PulseGenerator) -> ChannelBuilder {
        self.force(Force::PulseGenerator(pulse))
    }

    pub fn series_resistance(mut self, enabled: bool) -> ChannelBuilder {
        self.series_resistance = enabled;
        self
    }

    pub fn adc(mut self, adc: AdcType) -> ChannelBuilder {
        self.adc = adc;
        self
    }

    pub fn measure(mut self, measurement: Measurement) -> ChannelBuilder {
        self.measurement = Some(measurement);
        self
    }

    pub fn build(mut self) -> Result<Channel> {
        if self.forces.len() > 1 {
            return Err(Error::MultipleForces(self.number))
        }
        let force = self.forces.pop();
        if let Some(Force::PulseGenerator(pulse)) = &force {
            pulse.validate()?;
        }
        Ok(Channel {
            number: self.number,
            force,
            series_resistance: self.series_resistance,
            adc: self.adc,
            measurement: self.measurement,
        })
    }
}

/// A complete test: channel setups in dispatch order plus session-wide settings.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TestSetup {
    pub channels: Vec<Channel>,
    pub format: Format,
    pub output_mode: OutputMode,
    pub filter: Filter,
    pub adc: AdcConfig,
    pub selector: Vec<SelectorPort>,
    /// Prefix each measured value with its time stamp (`TSC`).
    pub timestamp: bool,
}

impl TestSetup {
    pub fn new(channels: Vec<Channel>) -> Result<TestSetup> {
        let test = TestSetup { channels, ..Default::default() };
        test.family()?;
        Ok(test)
    }

    pub fn with_format(mut self, format: Format, output_mode: OutputMode) -> TestSetup {
        self.format = format;
        self.output_mode = output_mode;
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> TestSetup {
        self.filter = filter;
        self
    }

    pub fn with_adc(mut self, adc: AdcConfig) -> TestSetup {
        self.adc = adc;
        self
    }

    pub fn with_timestamp(mut self, timestamp: bool) -> TestSetup {
        self.timestamp = timestamp;
        self
    }

    pub fn with_selector(mut self, port: u32, state: SelectorState) -> TestSetup {
        self.selector.push(SelectorPort { port, state });
        self
    }

    /// The single mode family used by the channels, or `None` if they only force DC.
    pub fn family(&self) -> Result<Option<ModeFamily>> {
        let mut family = None;
        for channel in &self.channels {
            match (family, channel.family()) {
                (_, None) => (),
                (None, next) => family = next,
                (Some(first), Some(second)) if first != second =>
                    return Err(Error::ConflictingMeasurementModes { first, second }),
                _ => (),
            }
        }
        Ok(family)
    }

    /// Measurement mode for `MM`, with the channels taking part in it.
    pub fn measure_mode(&self) -> Result<Option<(MeasureMode, Vec<u32>)>> {
        let mut result: Option<(MeasureMode, Vec<u32>)> = None;
        for channel in &self.channels {
            let Some(measurement) = channel.measurement else { continue };
            if let Some((mode, channels)) = &mut result {
                if *mode != measurement.mode {
                    return Err(Error::InvalidSetup(format!(
                        "channels use measurement modes {:?} and {:?}", mode, measurement.mode)))
                }
                channels.push(channel.number);
            } else {
                result = Some((measurement.mode, vec![channel.number]));
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn gate() -> Channel {
        Channel::builder(2).dc_force(DcForce::voltage(0.0, 1e-3)).build().unwrap()
    }

    #[test]
    fn test_multiple_forces() {
        let result = Channel::builder(1)
            .dc_force(DcForce::voltage(1.0, 1e-3))
            .staircase_sweep(StaircaseSweep::voltage(0.0, 5.0, 11, 1e-3))
            .build();
        assert!(matches!(result, Err(Error::MultipleForces(1))));
    }

    #[test]
    fn test_no_force_is_allowed() {
        let channel = Channel::builder(3).build().unwrap();
        assert_eq!(channel.force, None);
        assert_eq!(channel.family(), None);
    }

    #[test]
    fn test_families() {
        let sweep = Channel::builder(1)
            .staircase_sweep(StaircaseSweep::voltage(0.0, 5.0, 11, 1e-3))
            .build().unwrap();
        let pulse = Channel::builder(5)
            .pulse_generator(PulseGenerator::new(0.0, 1.0, 1e-6))
            .build().unwrap();
        assert_eq!(gate().family(), None);
        assert_eq!(sweep.family(), Some(ModeFamily::Triggered));
        assert_eq!(pulse.family(), Some(ModeFamily::PulseGenerator));
        assert_eq!(TestSetup::new(vec![sweep.clone(), gate()]).unwrap().family().unwrap(),
                   Some(ModeFamily::Triggered));
        assert!(matches!(TestSetup::new(vec![sweep, pulse]), Err(Error::ConflictingMeasurementModes {
            first: ModeFamily::Triggered,
            second: ModeFamily::PulseGenerator,
        })));
    }

    #[test]
    fn test_measure_mode() {
        let measured = Channel::builder(1)
            .staircase_sweep(StaircaseSweep::voltage(0.0, 5.0, 11, 1e-3))
            .measure(Measurement::new(Target::Current, MeasureMode::StaircaseSweep))
            .build().unwrap();
        let test = TestSetup::new(vec![measured, gate()]).unwrap();
        assert_eq!(test.measure_mode().unwrap(), Some((MeasureMode::StaircaseSweep, vec![1])));
    }

    #[test]
    fn test_pulse_generator_validation() {
        let build = |pulse| Channel::builder(5).pulse_generator(pulse).build();
        assert!(build(PulseGenerator::new(0.0, 5.0, 1e-6)).is_ok());
        assert!(matches!(build(PulseGenerator::new(0.0, 45.0, 1e-6)), Err(Error::InvalidSetup(_))));
        assert!(matches!(build(PulseGenerator::new(0.0, 5.0, 1e-6).with_period(20.0)),
                         Err(Error::InvalidSetup(_))));
        assert!(matches!(build(PulseGenerator::new(0.0, 5.0, 1e-6).with_edges(1e-9, 2e-8)),
                         Err(Error::InvalidSetup(_))));
        assert!(matches!(build(PulseGenerator::new(0.0, 5.0, 1e-6).with_load(LoadImpedance::Ohms(0.01))),
                         Err(Error::InvalidSetup(_))));
        assert!(build(PulseGenerator::new(0.0, 5.0, 1e-6).with_load(LoadImpedance::Ohms(50.0))).is_ok());
    }

    #[test]
    fn test_short_pulse_default_switch() {
        let short = PulseGenerator::new(0.0, 1.0, 5e-8);
        assert_eq!(short.switch, None);
        short.validate().unwrap();
        let long = short.with_period(1e-5);
        assert_eq!(long.switch, Some(PulseSwitch::default()));
        long.validate().unwrap();
        let custom = PulseSwitch { normally_closed: true, ..Default::default() };
        let kept = PulseGenerator::new(0.0, 1.0, 1e-6).with_switch(Some(custom)).with_period(1e-5);
        assert_eq!(kept.switch, Some(custom));
    }

    #[test]
    fn test_format_properties() {
        assert!(Format::Ascii12Header.has_header());
        assert!(!Format::Ascii12Header.is_comma_terminated());
        assert!(Format::Ascii13HeaderComma.is_comma_terminated());
        assert!(Format::Binary8.is_binary());
        assert!(!Format::Ascii13.has_header());
        assert_eq!(Format::Ascii13HeaderCommaFlex.code(), 25);
        assert_eq!(SweepMode::LogUpDown.code(), 4);
    }
}
