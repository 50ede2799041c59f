//! One installed plug-in module and the commands that configure its channels.

use std::collections::BTreeMap;

use crate::{Error, Result};
use crate::cmd::Command;
use crate::capability::{Capability, Features};
use crate::link::Link;
use crate::range::{self, Quantity, Range};
use crate::setup::{
    AdcType, Channel, DcForce, Force, LoadImpedance, Measurement, PulseGenerator, PulseMode,
    PulsedSpot, PulsedSweep, Search, SearchKind, StaircaseSweep, Target,
};
use crate::sys::Bus;

/// Configuration last applied to a channel.
#[derive(Debug, Clone, Default, PartialEq)]
struct ChannelState {
    force: Option<Force>,
    series_resistance: Option<bool>,
    adc: Option<AdcType>,
}

#[derive(Debug)]
pub struct Module {
    slot: u32,
    capability: &'static Capability,
    channels: Vec<u32>,
    state: BTreeMap<u32, ChannelState>,
}

impl Module {
    pub fn new(slot: u32, capability: &'static Capability, channels: Vec<u32>) -> Module {
        Module { slot, capability, channels, state: BTreeMap::new() }
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn capability(&self) -> &'static Capability {
        self.capability
    }

    pub fn channels(&self) -> &[u32] {
        &self.channels
    }

    pub fn has_channel(&self, channel: u32) -> bool {
        self.channels.contains(&channel)
    }

    /// Force setup last sent to `channel`, cleared when its output is zeroed.
    pub fn applied_force(&self, channel: u32) -> Option<&Force> {
        self.state.get(&channel).and_then(|state| state.force.as_ref())
    }

    /// Forgets everything applied to the channels, e.g. after an instrument reset.
    pub fn invalidate(&mut self) {
        self.state.clear()
    }

    pub fn smallest_voltage_range(&self, values: &[f64], fixed: bool) -> Range {
        self.smallest_range(Quantity::Voltage, values, fixed)
    }

    pub fn smallest_current_range(&self, values: &[f64], fixed: bool) -> Range {
        self.smallest_range(Quantity::Current, values, fixed)
    }

    fn smallest_range(&self, quantity: Quantity, values: &[f64], fixed: bool) -> Range {
        if fixed {
            range::smallest_range(quantity, values, true, &self.capability.measure_ranges(quantity))
        } else {
            range::smallest_range(quantity, values, false, &self.capability.input_ranges(quantity))
        }
    }

    fn check_channel(&self, channel: u32) -> Result<()> {
        if self.has_channel(channel) {
            Ok(())
        } else {
            Err(Error::UnknownChannel(channel))
        }
    }

    fn check_feature(&self, feature: Features, name: &'static str) -> Result<()> {
        if self.capability.supports(feature) {
            Ok(())
        } else {
            Err(Error::NotImplemented { model: self.capability.model(), feature: name })
        }
    }

    /// Resolves the output range of a source: checks an explicit one, otherwise picks the
    /// smallest one covering `values`.
    fn input_range(&self, quantity: Quantity, range: Option<Range>, values: &[f64]) -> Result<Range> {
        match range {
            Some(range) if self.capability.allows_input(quantity, range) => Ok(range),
            Some(range) => Err(Error::IllegalRange { model: self.capability.model(), quantity, range }),
            None => Ok(self.smallest_range(quantity, values, false)),
        }
    }

    fn measure_range(&self, quantity: Quantity, range: Option<Range>, values: &[f64]) -> Result<Range> {
        match range {
            Some(range) if self.capability.allows_measure(quantity, range) => Ok(range),
            Some(range) => Err(Error::IllegalRange { model: self.capability.model(), quantity, range }),
            None if values.is_empty() => Ok(Range::Auto),
            None => {
                let allowed = self.capability.measure_ranges(quantity);
                Ok(range::smallest_range(quantity, values, false, &allowed))
            }
        }
    }

    fn state_mut(&mut self, channel: u32) -> &mut ChannelState {
        self.state.entry(channel).or_default()
    }

    fn send_all<B: Bus>(link: &mut Link<B>, commands: &[Command]) -> Result<()> {
        for command in commands {
            link.send(command)?;
        }
        Ok(())
    }

    pub fn connect<B: Bus>(&mut self, link: &mut Link<B>, channel: u32) -> Result<()> {
        self.check_channel(channel)?;
        link.send(&Command::new("CN").arg(channel))
    }

    pub fn disconnect<B: Bus>(&mut self, link: &mut Link<B>, channel: u32) -> Result<()> {
        self.check_channel(channel)?;
        link.send(&Command::new("CL").arg(channel))
    }

    pub fn force_zero<B: Bus>(&mut self, link: &mut Link<B>, channel: u32) -> Result<()> {
        self.check_channel(channel)?;
        // the output is at zero even if the error check below fails
        self.state_mut(channel).force = None;
        link.send(&Command::new("DZ").arg(channel))
    }

    /// Returns the output to the setting it had before the last `force_zero`.
    pub fn restore<B: Bus>(&mut self, link: &mut Link<B>, channel: u32) -> Result<()> {
        self.check_channel(channel)?;
        link.send(&Command::new("RZ").arg(channel))
    }

    /// Connects or bypasses the series resistor. Returns whether a command was sent.
    pub fn set_series_resistance<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                                         enabled: bool) -> Result<bool> {
        self.check_channel(channel)?;
        if enabled {
            self.check_feature(Features::SeriesResistance, "series resistance")?;
        }
        if self.state.get(&channel).and_then(|state| state.series_resistance) == Some(enabled) {
            log::debug!("series resistance of channel {} already {}", channel, enabled);
            return Ok(false)
        }
        if !self.capability.supports(Features::SeriesResistance) {
            return Ok(false)
        }
        link.send(&Command::new("SSR").arg(channel).arg(enabled as u32))?;
        self.state_mut(channel).series_resistance = Some(enabled);
        Ok(true)
    }

    /// Selects the converter used by the channel. Returns whether a command was sent.
    pub fn set_adc_type<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                                adc: AdcType) -> Result<bool> {
        self.check_channel(channel)?;
        if self.state.get(&channel).and_then(|state| state.adc) == Some(adc) {
            log::debug!("ADC of channel {} already {:?}", channel, adc);
            return Ok(false)
        }
        link.send(&Command::new("AAD").arg(channel).arg(adc.code()))?;
        self.state_mut(channel).adc = Some(adc);
        Ok(true)
    }

    fn dc_force_commands(&self, channel: u32, force: &DcForce) -> Result<Vec<Command>> {
        self.check_channel(channel)?;
        self.check_feature(Features::DcForce, "DC force")?;
        let range = self.input_range(force.input, force.range, &[force.value])?;
        let compliance_range = match force.compliance_range {
            Some(range) => Some(self.input_range(force.input.opposite(), Some(range), &[])?),
            None => None,
        };
        let polarity = force.polarity.or(compliance_range.map(|_| Default::default()));
        let mnemonic = match force.input {
            Quantity::Voltage => "DV",
            Quantity::Current => "DI",
        };
        Ok(vec![
            Command::new(mnemonic)
                .arg(channel)
                .arg(range)
                .arg(force.value)
                .arg(force.compliance)
                .arg(polarity.map(|polarity| polarity.code()))
                .arg(compliance_range),
        ])
    }

    pub fn dc_force<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                            force: &DcForce) -> Result<()> {
        let commands = self.dc_force_commands(channel, force)?;
        Self::send_all(link, &commands)?;
        self.state_mut(channel).force = Some(Force::Dc(*force));
        Ok(())
    }

    fn staircase_sweep_commands(&self, channel: u32, sweep: &StaircaseSweep) -> Result<Vec<Command>> {
        self.check_channel(channel)?;
        self.check_feature(Features::StaircaseSweep, "staircase sweep")?;
        let range = self.input_range(sweep.input, sweep.range, &[sweep.start, sweep.stop])?;
        let mnemonic = match sweep.input {
            Quantity::Voltage => "WV",
            Quantity::Current => "WI",
        };
        Ok(vec![
            Command::new("WT")
                .arg(sweep.hold)
                .arg(sweep.delay)
                .arg(sweep.step_delay)
                .arg(sweep.trigger_delay),
            Command::new("WM")
                .arg(sweep.auto_abort.code())
                .arg(sweep.post.map(|post| post.code())),
            Command::new(mnemonic)
                .arg(channel)
                .arg(sweep.mode.code())
                .arg(range)
                .arg(sweep.start)
                .arg(sweep.stop)
                .arg(sweep.steps)
                .arg(sweep.compliance)
                .arg(sweep.power_compliance),
        ])
    }

    pub fn staircase_sweep<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                                   sweep: &StaircaseSweep) -> Result<()> {
        let commands = self.staircase_sweep_commands(channel, sweep)?;
        Self::send_all(link, &commands)?;
        self.state_mut(channel).force = Some(Force::StaircaseSweep(*sweep));
        Ok(())
    }

    fn pulsed_sweep_commands(&self, channel: u32, sweep: &PulsedSweep) -> Result<Vec<Command>> {
        self.check_channel(channel)?;
        self.check_feature(Features::PulsedSweep, "pulsed sweep")?;
        let range = self.input_range(sweep.input, sweep.range,
                                     &[sweep.base, sweep.start, sweep.stop])?;
        let mnemonic = match sweep.input {
            Quantity::Voltage => "PWV",
            Quantity::Current => "PWI",
        };
        Ok(vec![
            Command::new("PT")
                .arg(sweep.hold)
                .arg(sweep.width)
                .arg(sweep.period),
            Command::new("WM")
                .arg(sweep.auto_abort.code())
                .arg(sweep.post.map(|post| post.code())),
            Command::new(mnemonic)
                .arg(channel)
                .arg(sweep.mode.code())
                .arg(range)
                .arg(sweep.base)
                .arg(sweep.start)
                .arg(sweep.stop)
                .arg(sweep.steps)
                .arg(sweep.compliance)
                .arg(sweep.power_compliance),
        ])
    }

    pub fn pulsed_sweep<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                                sweep: &PulsedSweep) -> Result<()> {
        let commands = self.pulsed_sweep_commands(channel, sweep)?;
        Self::send_all(link, &commands)?;
        self.state_mut(channel).force = Some(Force::PulsedSweep(*sweep));
        Ok(())
    }

    fn pulsed_spot_commands(&self, channel: u32, spot: &PulsedSpot) -> Result<Vec<Command>> {
        self.check_channel(channel)?;
        self.check_feature(Features::PulsedSpot, "pulsed spot")?;
        let range = self.input_range(spot.input, spot.range, &[spot.base, spot.pulse])?;
        let mnemonic = match spot.input {
            Quantity::Voltage => "PV",
            Quantity::Current => "PI",
        };
        Ok(vec![
            Command::new("PT")
                .arg(spot.hold)
                .arg(spot.width)
                .arg(spot.period),
            Command::new(mnemonic)
                .arg(channel)
                .arg(range)
                .arg(spot.base)
                .arg(spot.pulse)
                .arg(spot.compliance),
        ])
    }

    pub fn pulsed_spot<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                               spot: &PulsedSpot) -> Result<()> {
        let commands = self.pulsed_spot_commands(channel, spot)?;
        Self::send_all(link, &commands)?;
        self.state_mut(channel).force = Some(Force::PulsedSpot(*spot));
        Ok(())
    }

    fn check_search(&self, search: &Search) -> Result<()> {
        let model = self.capability.model();
        let Some(limits) = self.capability.search else {
            return Err(Error::NotImplemented { model, feature: "search" })
        };
        let max_output = limits.max_output(search.input);
        for value in [search.start, search.stop] {
            if !(value.abs() <= max_output) {
                return Err(Error::IllegalSearchParameter(format!(
                    "search {:?} {} exceeds {} on {}", search.input, value, max_output, model)))
            }
        }
        let magnitude = search.start.abs().max(search.stop.abs());
        match limits.max_compliance(search.input, magnitude) {
            Some(max_compliance) if search.compliance.abs() <= max_compliance => (),
            Some(max_compliance) =>
                return Err(Error::IllegalSearchParameter(format!(
                    "compliance {} exceeds {} for a search up to {} on {}",
                    search.compliance, max_compliance, magnitude, model))),
            None =>
                return Err(Error::IllegalSearchParameter(format!(
                    "no compliance is allowed for a search up to {} on {}", magnitude, model))),
        }
        let (min_target, max_target) = limits.target(search.target.quantity);
        let target = search.target.value.abs();
        if !(target >= min_target && target <= max_target) {
            return Err(Error::IllegalSearchParameter(format!(
                "search target {} is outside {}..{} on {}",
                search.target.value, min_target, max_target, model)))
        }
        Ok(())
    }

    fn search_commands(&self, channel: u32, search: &Search) -> Result<Vec<Command>> {
        self.check_channel(channel)?;
        match search.kind {
            SearchKind::Binary => self.check_feature(Features::BinarySearch, "binary search")?,
            SearchKind::Linear => self.check_feature(Features::LinearSearch, "linear search")?,
        }
        self.check_search(search)?;
        let range = self.input_range(search.input, search.range, &[search.start, search.stop])?;
        let target = &search.target;
        let target_range = self.measure_range(target.quantity, target.range, &[target.value])?;
        let binary = search.kind == SearchKind::Binary;
        let monitor = match (binary, target.quantity) {
            (true, Quantity::Voltage) => "BGV",
            (true, Quantity::Current) => "BGI",
            (false, Quantity::Voltage) => "LGV",
            (false, Quantity::Current) => "LGI",
        };
        let source = match (binary, search.input) {
            (true, Quantity::Voltage) => "BSV",
            (true, Quantity::Current) => "BSI",
            (false, Quantity::Voltage) => "LSV",
            (false, Quantity::Current) => "LSI",
        };
        let control = if binary {
            Command::new("BSM")
                .arg(search.control.code())
                .arg(search.auto_abort.code())
                .arg(search.post.map(|post| post.code()))
        } else {
            Command::new("LSM")
                .arg(search.auto_abort.code())
                .arg(search.post.map(|post| post.code()))
        };
        Ok(vec![
            Command::new("MM").arg(search.measure_mode().code()),
            Command::new(if binary { "BSVM" } else { "LSVM" }).arg(search.output.code()),
            control,
            Command::new(if binary { "BST" } else { "LSTM" })
                .arg(search.hold)
                .arg(search.delay),
            Command::new(monitor)
                .arg(channel)
                .arg(target.mode.code())
                .arg(target.condition)
                .arg(target_range)
                .arg(target.value),
            Command::new(source)
                .arg(channel)
                .arg(range)
                .arg(search.start)
                .arg(search.stop)
                .arg(search.compliance),
        ])
    }

    pub fn search<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                          search: &Search) -> Result<()> {
        let commands = self.search_commands(channel, search)?;
        Self::send_all(link, &commands)?;
        self.state_mut(channel).force = Some(Force::Search(*search));
        Ok(())
    }

    /// Pulse generator setup up to `SPUPD`, plus `SER` for a fixed load. An automatic load is
    /// measured separately.
    fn pulse_generator_commands(&self, channel: u32,
                                pulse: &PulseGenerator) -> Result<Vec<Command>> {
        self.check_channel(channel)?;
        self.check_feature(Features::PulseGenerator, "pulse generator")?;
        pulse.validate()?;
        let mut commands = vec![
            // pulse mode, as opposed to arbitrary linear waveforms
            Command::new("SIM").arg(0u32),
            match pulse.mode {
                PulseMode::FreeRun => Command::new("SPRM").arg(0u32),
                PulseMode::Count(count) => Command::new("SPRM").arg(1u32).arg(count),
                PulseMode::Duration(duration) => Command::new("SPRM").arg(2u32).arg(duration),
            },
            match pulse.switch {
                None => Command::new("ODSW").arg(channel).arg(0u32),
                Some(switch) => Command::new("ODSW")
                    .arg(channel)
                    .arg(1u32)
                    .arg(switch.normally_closed as u32)
                    .arg(switch.delay)
                    .arg(switch.width),
            },
            Command::new("SPPER").arg(pulse.period),
            Command::new("SPM").arg(channel).arg(pulse.levels_code()),
        ];
        for (source, signal) in (1u32..).zip(&pulse.signals) {
            commands.push(Command::new("SPV")
                .arg(channel)
                .arg(source)
                .arg(signal.base)
                .arg(signal.peak));
        }
        for (source, signal) in (1u32..).zip(&pulse.signals) {
            commands.push(Command::new("SPT")
                .arg(channel)
                .arg(source)
                .arg(signal.delay)
                .arg(signal.width)
                .arg(pulse.leading)
                .arg(pulse.trailing));
        }
        commands.push(Command::new("SPUPD").arg(channel));
        if let LoadImpedance::Ohms(ohms) = pulse.load {
            commands.push(Command::new("SER").arg(channel).arg(ohms));
        }
        Ok(commands)
    }

    pub fn pulse_generator<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                                   pulse: &PulseGenerator) -> Result<()> {
        let commands = self.pulse_generator_commands(channel, pulse)?;
        Self::send_all(link, &commands)?;
        if pulse.load == LoadImpedance::Auto {
            let load = link.query(&Command::new("CORRSER?")
                .arg(channel)
                .arg(1u32)
                .arg(0u32)
                .arg(5e-6)
                .arg(1u32))?;
            log::debug!("load impedance of channel {} set to {}", channel, load.trim());
        }
        self.state_mut(channel).force = Some(Force::PulseGenerator(pulse.clone()));
        Ok(())
    }

    fn measure_commands(&self, channel: u32, measurement: &Measurement,
                        force: Option<&Force>) -> Result<Vec<Command>> {
        self.check_channel(channel)?;
        self.check_feature(Features::Measure, "measurement")?;
        if measurement.mode.has_implicit_side() {
            return Ok(Vec::new())
        }
        let mut commands = vec![
            Command::new("CMM").arg(channel).arg(measurement.side.code()),
        ];
        if let Some(quantity) = measurement.target.ranged_quantity() {
            let hint = force
                .filter(|force| force.input() != quantity)
                .and_then(Force::compliance);
            let range = self.measure_range(quantity, measurement.range, hint.as_slice())?;
            let mnemonic = match quantity {
                Quantity::Voltage => "RV",
                Quantity::Current => "RI",
            };
            commands.push(Command::new(mnemonic).arg(channel).arg(range));
        }
        Ok(commands)
    }

    /// Selects the measurement side and range of a channel. `force` is the channel's source,
    /// whose compliance bounds the range when none is given.
    pub fn measure<B: Bus>(&mut self, link: &mut Link<B>, channel: u32,
                           measurement: &Measurement, force: Option<&Force>) -> Result<()> {
        let commands = self.measure_commands(channel, measurement, force)?;
        Self::send_all(link, &commands)
    }

    pub(crate) fn high_speed_spot_command(&self, channel: u32, target: Target,
                                          current_range: Option<Range>,
                                          voltage_range: Option<Range>) -> Result<Command> {
        self.check_channel(channel)?;
        self.check_feature(Features::Measure, "high speed spot")?;
        let check = |quantity, range: Option<Range>| match range {
            Some(range) if !self.capability.allows_measure(quantity, range) =>
                Err(Error::IllegalRange { model: self.capability.model(), quantity, range }),
            range => Ok(range),
        };
        let current_range = check(Quantity::Current, current_range)?;
        let voltage_range = check(Quantity::Voltage, voltage_range)?;
        match target {
            Target::Current => Ok(Command::new("TTI").arg(channel).arg(current_range)),
            Target::Voltage => Ok(Command::new("TTV").arg(channel).arg(voltage_range)),
            // a voltage range can only follow a current range
            Target::Both => Ok(Command::new("TTIV")
                .arg(channel)
                .arg(current_range.or(voltage_range.map(|_| Range::Auto)))
                .arg(voltage_range)),
            Target::Capacitance => Err(Error::NotImplemented {
                model: self.capability.model(),
                feature: "high speed capacitance spot",
            }),
        }
    }

    /// Measures `target` on `channel` immediately, without a trigger. The result is left in the
    /// output buffer and the error queue is not checked until it has been read.
    pub fn high_speed_spot<B: Bus>(&mut self, link: &mut Link<B>, channel: u32, target: Target,
                                   current_range: Option<Range>,
                                   voltage_range: Option<Range>) -> Result<()> {
        let command = self.high_speed_spot_command(channel, target, current_range, voltage_range)?;
        link.write(&command)
    }

    fn force_commands(&self, channel: u32, force: &Force) -> Result<Vec<Command>> {
        match force {
            Force::Dc(force) => self.dc_force_commands(channel, force),
            Force::StaircaseSweep(sweep) => self.staircase_sweep_commands(channel, sweep),
            Force::PulsedSweep(sweep) => self.pulsed_sweep_commands(channel, sweep),
            Force::PulsedSpot(spot) => self.pulsed_spot_commands(channel, spot),
            Force::Search(search) => self.search_commands(channel, search),
            Force::PulseGenerator(pulse) => self.pulse_generator_commands(channel, pulse),
        }
    }

    /// Checks everything `channel` asks of this module without sending anything: channel number,
    /// features, ranges and search bounds.
    pub fn check(&self, channel: &Channel) -> Result<()> {
        let number = channel.number;
        self.check_channel(number)?;
        if channel.series_resistance {
            self.check_feature(Features::SeriesResistance, "series resistance")?;
        }
        if let Some(force) = &channel.force {
            self.force_commands(number, force)?;
        }
        if let Some(measurement) = &channel.measurement {
            self.measure_commands(number, measurement, channel.force.as_ref())?;
        }
        Ok(())
    }

    /// Applies `force` to `channel` with the operation for its kind.
    pub fn apply<B: Bus>(&mut self, link: &mut Link<B>, channel: u32, force: &Force) -> Result<()> {
        match force {
            Force::Dc(force) => self.dc_force(link, channel, force),
            Force::StaircaseSweep(sweep) => self.staircase_sweep(link, channel, sweep),
            Force::PulsedSweep(sweep) => self.pulsed_sweep(link, channel, sweep),
            Force::PulsedSpot(spot) => self.pulsed_spot(link, channel, spot),
            Force::Search(search) => self.search(link, channel, search),
            Force::PulseGenerator(pulse) => self.pulse_generator(link, channel, pulse),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::capability::lookup;
    use crate::config::SessionOptions;
    use crate::setup::{MeasureMode, PulseSignal, SearchMode, SearchTarget};
    use crate::sys::dummy::DummyBus;

    fn setup(model: &str, channel: u32) -> (Module, Link<DummyBus>) {
        let module = Module::new(channel, lookup(model).unwrap(), vec![channel]);
        let options = SessionOptions { check_errors: false, ..Default::default() };
        (module, Link::new(DummyBus::default(), options))
    }

    fn current_target(value: f64) -> SearchTarget {
        SearchTarget {
            quantity: Quantity::Current,
            mode: SearchMode::Limit,
            condition: 1e-9,
            range: None,
            value,
        }
    }

    #[test]
    fn test_unknown_channel() {
        let (mut module, mut link) = setup("B1517A", 1);
        assert!(matches!(module.connect(&mut link, 2), Err(Error::UnknownChannel(2))));
        assert!(link.bus().transcript().is_empty());
    }

    #[test]
    fn test_dc_force_derives_range() {
        let (mut module, mut link) = setup("B1517A", 1);
        module.dc_force(&mut link, 1, &DcForce::voltage(1.5, 1e-3)).unwrap();
        assert_eq!(link.bus().writes(), ["DV 1,50,1.5,0.001"]);
        assert!(matches!(module.applied_force(1), Some(Force::Dc(_))));
    }

    #[test]
    fn test_dc_force_compliance_range() {
        let (mut module, mut link) = setup("B1517A", 1);
        let force = DcForce::current(1e-6, 2.0).with_compliance_range(Default::default(), Range::Limited(50));
        module.dc_force(&mut link, 1, &force).unwrap();
        assert_eq!(link.bus().writes(), ["DI 1,14,1E-6,2,0,50"]);
    }

    #[test]
    fn test_illegal_range() {
        let (mut module, mut link) = setup("B1517A", 1);
        let force = DcForce::voltage(1.0, 1e-3).with_range(Range::Limited(20));
        assert!(matches!(module.dc_force(&mut link, 1, &force),
                         Err(Error::IllegalRange { range: Range::Limited(20), .. })));
        let sweep = StaircaseSweep::voltage(0.0, 1.0, 11, 1e-3).with_range(Range::Limited(2000));
        assert!(matches!(module.staircase_sweep(&mut link, 1, &sweep),
                         Err(Error::IllegalRange { .. })));
        assert!(link.bus().transcript().is_empty());
        assert_eq!(module.applied_force(1), None);
    }

    #[test]
    fn test_staircase_sweep_order() {
        let (mut module, mut link) = setup("B1517A", 1);
        let sweep = StaircaseSweep::voltage(0.0, 5.0, 11, 1e-3)
            .with_timing(0.1, 0.01)
            .with_power_compliance(0.05);
        module.staircase_sweep(&mut link, 1, &sweep).unwrap();
        assert_eq!(link.bus().writes(), [
            "WT 0.1,0.01",
            "WM 2",
            "WV 1,1,50,0,5,11,0.001,0.05",
        ]);
    }

    #[test]
    fn test_pulsed_sweep_and_spot() {
        let (mut module, mut link) = setup("B1511A", 3);
        module.pulsed_sweep(&mut link, 3,
            &PulsedSweep::current(0.0, 1e-3, 5e-3, 5, 1e-3, 10.0).with_period(0.01)).unwrap();
        module.pulsed_spot(&mut link, 3, &PulsedSpot::voltage(0.0, 2.0, 1e-3, 1e-2)).unwrap();
        assert_eq!(link.bus().writes(), [
            "PT 0,0.001,0.01",
            "WM 2",
            "PWI 3,1,18,0,0.001,0.005,5,10",
            "PT 0,0.001",
            "PV 3,50,0,2,0.01",
        ]);
    }

    #[test]
    fn test_not_implemented() {
        let (mut module, mut link) = setup("B1525A", 5);
        assert!(matches!(module.dc_force(&mut link, 5, &DcForce::voltage(1.0, 1e-3)),
                         Err(Error::NotImplemented { model: "B1525A", .. })));
        let (mut module, mut link) = setup("B1512A", 1);
        let search = Search::new(SearchKind::Binary, Quantity::Voltage, 0.0, 1.0, 1e-3,
                                 current_target(1e-6));
        assert!(matches!(module.search(&mut link, 1, &search), Err(Error::NotImplemented { .. })));
        assert!(matches!(module.set_series_resistance(&mut link, 1, true),
                         Err(Error::NotImplemented { .. })));
        assert!(link.bus().transcript().is_empty());
    }

    #[test]
    fn test_binary_search() {
        let (mut module, mut link) = setup("B1517A", 1);
        let search = Search::new(SearchKind::Binary, Quantity::Voltage, 0.0, 3.0, 1e-3,
                                 current_target(1e-6));
        module.search(&mut link, 1, &search).unwrap();
        assert_eq!(link.bus().writes(), [
            "MM 15",
            "BSVM 0",
            "BSM 0,1",
            "BST 0,0",
            "BGI 1,0,1E-9,14,1E-6",
            "BSV 1,50,0,3,0.001",
        ]);
    }

    #[test]
    fn test_linear_search() {
        let (mut module, mut link) = setup("B1511A", 2);
        let mut search = Search::new(SearchKind::Linear, Quantity::Current, 0.0, 1e-3, 5.0,
                                     SearchTarget { quantity: Quantity::Voltage, ..current_target(1.0) });
        search.target.range = Some(Range::Limited(20));
        module.search(&mut link, 2, &search).unwrap();
        assert_eq!(link.bus().writes(), [
            "MM 14",
            "LSVM 0",
            "LSM 1",
            "LSTM 0,0",
            "LGV 2,0,1E-9,20,1",
            "LSI 2,17,0,0.001,5",
        ]);
    }

    #[test]
    fn test_search_bounds() {
        let (mut module, mut link) = setup("B1517A", 1);
        let search = |start, stop, compliance, target| {
            Search::new(SearchKind::Binary, Quantity::Voltage, start, stop, compliance,
                        current_target(target))
        };
        for search in [
            search(0.0, 150.0, 1e-3, 1e-6),   // beyond the source
            search(0.0, 30.0, 0.08, 1e-6),    // compliance too large for 30 V
            search(0.0, 10.0, 1e-3, 1.0),     // target beyond the monitor
        ] {
            assert!(matches!(module.search(&mut link, 1, &search),
                             Err(Error::IllegalSearchParameter(_))), "{:?}", search);
        }
        assert!(link.bus().transcript().is_empty());
        module.search(&mut link, 1, &search(0.0, 30.0, 0.05, 1e-6)).unwrap();
    }

    #[test]
    fn test_pulse_generator() {
        let (mut module, mut link) = setup("B1525A", 5);
        let pulse = PulseGenerator::new(0.0, 3.0, 1e-6)
            .with_period(1e-5)
            .with_load(LoadImpedance::Ohms(50.0))
            .with_second_signal(PulseSignal { base: 0.0, peak: -1.0, delay: 2e-6, width: 1e-6 });
        module.pulse_generator(&mut link, 5, &pulse).unwrap();
        assert_eq!(link.bus().writes(), [
            "SIM 0",
            "SPRM 1,1",
            "ODSW 5,1,0,0,1E-7",
            "SPPER 1E-5",
            "SPM 5,3",
            "SPV 5,1,0,3",
            "SPV 5,2,0,-1",
            "SPT 5,1,0,1E-6,2E-8,2E-8",
            "SPT 5,2,2E-6,1E-6,2E-8,2E-8",
            "SPUPD 5",
            "SER 5,50",
        ]);
    }

    #[test]
    fn test_pulse_generator_auto_load() {
        let (mut module, mut link) = setup("B1525A", 5);
        let pulse = PulseGenerator::new(0.0, 3.0, 1e-6).with_switch(None);
        module.pulse_generator(&mut link, 5, &pulse).unwrap();
        let commands = link.bus().commands();
        assert_eq!(commands[2], "ODSW 5,0");
        assert_eq!(commands.last(), Some(&"CORRSER? 5,1,0,5E-6,1"));
    }

    #[test]
    fn test_series_resistance_and_adc_cached() {
        let (mut module, mut link) = setup("B1517A", 1);
        assert!(module.set_series_resistance(&mut link, 1, true).unwrap());
        assert!(!module.set_series_resistance(&mut link, 1, true).unwrap());
        assert!(module.set_adc_type(&mut link, 1, AdcType::HighResolution).unwrap());
        assert!(!module.set_adc_type(&mut link, 1, AdcType::HighResolution).unwrap());
        assert!(module.set_adc_type(&mut link, 1, AdcType::HighSpeed).unwrap());
        assert_eq!(link.bus().writes(), ["SSR 1,1", "AAD 1,1", "AAD 1,0"]);
    }

    #[test]
    fn test_failed_write_not_cached() {
        let (mut module, mut link) = setup("B1517A", 1);
        link.bus_mut().fail_on("AAD");
        assert!(module.set_adc_type(&mut link, 1, AdcType::HighResolution).is_err());
        assert!(module.set_adc_type(&mut link, 1, AdcType::HighResolution).is_err());
        assert_eq!(link.bus().writes().len(), 2);
    }

    #[test]
    fn test_force_zero_invalidates() {
        let (mut module, mut link) = setup("B1517A", 1);
        module.dc_force(&mut link, 1, &DcForce::voltage(1.0, 1e-3)).unwrap();
        module.force_zero(&mut link, 1).unwrap();
        assert_eq!(module.applied_force(1), None);
        module.restore(&mut link, 1).unwrap();
        assert_eq!(link.bus().writes()[1..], ["DZ 1", "RZ 1"]);
    }

    #[test]
    fn test_measure_range_from_compliance() {
        let (mut module, mut link) = setup("B1517A", 1);
        let force = Force::StaircaseSweep(StaircaseSweep::voltage(0.0, 5.0, 11, 1e-3));
        let measurement = Measurement::new(Target::Current, MeasureMode::StaircaseSweep);
        module.measure(&mut link, 1, &measurement, Some(&force)).unwrap();
        let measurement = measurement.with_side(crate::setup::MeasureSide::Force);
        module.measure(&mut link, 1, &measurement.with_range(Range::Fixed(50)), None).unwrap_err();
        assert_eq!(link.bus().writes(), ["CMM 1,1", "RI 1,17"]);
    }

    #[test]
    fn test_check_sends_nothing() {
        let (module, link) = setup("B1517A", 2);
        let channel = |force: Force| Channel::builder(2).force(force).build().unwrap();
        module.check(&channel(Force::Dc(DcForce::voltage(1.0, 1e-3)))).unwrap();
        assert!(matches!(
            module.check(&channel(Force::Dc(DcForce::voltage(1.0, 1e-3).with_range(Range::Limited(20))))),
            Err(Error::IllegalRange { range: Range::Limited(20), .. })));
        let search = Search::new(SearchKind::Binary, Quantity::Voltage, 0.0, 150.0, 1e-3,
                                 current_target(1e-6));
        assert!(matches!(module.check(&channel(Force::Search(search))),
                         Err(Error::IllegalSearchParameter(_))));
        let measured = Channel::builder(2)
            .dc_force(DcForce::voltage(1.0, 1e-3))
            .measure(Measurement::new(Target::Current, MeasureMode::Spot).with_range(Range::Fixed(50)))
            .build()
            .unwrap();
        assert!(matches!(module.check(&measured), Err(Error::IllegalRange { .. })));
        assert!(matches!(module.check(&Channel::builder(3).build().unwrap()),
                         Err(Error::UnknownChannel(3))));
        let (generator, _) = setup("B1525A", 5);
        let pulse = Channel::builder(5).force(Force::Dc(DcForce::voltage(1.0, 1e-3))).build().unwrap();
        assert!(matches!(generator.check(&pulse), Err(Error::NotImplemented { .. })));
        assert!(link.bus().transcript().is_empty());
        assert_eq!(module.applied_force(2), None);
    }

    #[test]
    fn test_high_speed_spot() {
        let (mut module, mut link) = setup("B1517A", 1);
        module.high_speed_spot(&mut link, 1, Target::Current, Some(Range::Limited(14)), None).unwrap();
        module.high_speed_spot(&mut link, 1, Target::Voltage, None, None).unwrap();
        module.high_speed_spot(&mut link, 1, Target::Both, None, Some(Range::Fixed(20))).unwrap();
        assert_eq!(link.bus().writes(), ["TTI 1,14", "TTV 1", "TTIV 1,0,-20"]);
        assert!(matches!(
            module.high_speed_spot(&mut link, 1, Target::Voltage, None, Some(Range::Limited(2000))),
            Err(Error::IllegalRange { .. })));
        assert!(matches!(module.high_speed_spot(&mut link, 1, Target::Capacitance, None, None),
                         Err(Error::NotImplemented { .. })));
        assert_eq!(link.bus().writes().len(), 3);
    }

    #[test]
    fn test_smallest_range_wrappers() {
        let (module, _) = setup("B1517A", 1);
        assert_eq!(module.smallest_voltage_range(&[1.0], false), Range::Limited(50));
        assert_eq!(module.smallest_voltage_range(&[1.0], true), Range::Fixed(20));
        assert_eq!(module.smallest_current_range(&[0.5e-6], false), Range::Limited(14));
        assert_eq!(module.smallest_current_range(&[0.5], false), Range::Auto);
    }
}
