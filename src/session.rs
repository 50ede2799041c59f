use std::collections::BTreeMap;
use std::thread::sleep;
use std::time::Instant;

use crate::{Error, Result};
use crate::capability;
use crate::cmd::Command;
use crate::config::{RunOptions, SessionOptions};
use crate::link::Link;
use crate::module::Module;
use crate::output::{self, Output};
use crate::range::Range;
use crate::setup::{
    AdcConfig, Channel, DcForce, Filter, Force, Format, MeasureMode, Measurement, ModeFamily,
    OutputMode, SelectorState, StaircaseSweep, SweepMode, Target, TestSetup,
};
use crate::sys::Bus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    GlobalConfigured,
    ChannelsConfigured,
    Triggered,
    Completed,
    TornDown,
}

/// Result of a test run.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// Data read back, if the run reads any.
    pub output: Option<Output>,
    /// Instrument errors reported while the test ran, including teardown.
    pub errors: Vec<(i32, String)>,
}

/// Session-wide settings last sent to the instrument.
#[derive(Debug, Clone, Default, PartialEq)]
struct GlobalState {
    format: Option<(Format, OutputMode)>,
    filter: Option<Filter>,
    timestamp: Option<bool>,
    adc: Option<AdcConfig>,
    selector: BTreeMap<u32, SelectorState>,
}

#[derive(Debug)]
struct Plan {
    family: Option<ModeFamily>,
    measure: Option<(MeasureMode, Vec<u32>)>,
    sweep: bool,
}

#[derive(Debug)]
pub struct Session<B: Bus> {
    link: Link<B>,
    modules: Vec<Module>,
    global: GlobalState,
    state: State,
}

impl<B: Bus> Session<B> {
    /// Opens a session, discovering the installed modules and their channels.
    pub fn open(bus: B, options: SessionOptions) -> Result<Session<B>> {
        let mut link = Link::new(bus, options);
        if options.reset {
            link.send(&Command::new("*RST"))?;
        }
        let units = link.query(&Command::new("UNT?"))?;
        let mut modules = Vec::new();
        for (slot, entry) in (1u32..).zip(units.trim().split(';')) {
            let model = entry.split(',').next().unwrap_or("").trim();
            if model.is_empty() || model == "0" {
                continue
            }
            let capability = match capability::lookup(model) {
                Ok(capability) => capability,
                Err(error) => {
                    log::warn!("slot {}: {}, treating as empty", slot, error);
                    continue
                }
            };
            let channels = Self::discover_channels(&mut link, slot)?;
            if channels.is_empty() {
                log::warn!("slot {}: {} reports no channels", slot, model);
                continue
            }
            log::debug!("slot {}: {} ({}) with channels {:?}", slot, model, capability.name, channels);
            modules.push(Module::new(slot, capability, channels));
        }
        Ok(Self::with_modules(link, modules))
    }

    /// Builds a session around already known modules, without discovery.
    pub fn with_modules(link: Link<B>, modules: Vec<Module>) -> Session<B> {
        Session { link, modules, global: GlobalState::default(), state: State::Idle }
    }

    fn discover_channels(link: &mut Link<B>, slot: u32) -> Result<Vec<u32>> {
        let response = link.query(&Command::new("*LRN?").arg(slot))?;
        Ok(response
            .split([';', ','])
            .map(|item| item.trim().trim_start_matches(|c: char| c.is_ascii_alphabetic()))
            .filter_map(|item| item.parse::<u32>().ok())
            .collect())
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    /// The module that owns `channel`.
    pub fn module(&self, channel: u32) -> Option<&Module> {
        self.modules.iter().find(|module| module.has_channel(channel))
    }

    pub fn bus(&self) -> &B {
        self.link.bus()
    }

    pub fn bus_mut(&mut self) -> &mut B {
        self.link.bus_mut()
    }

    pub fn into_bus(self) -> B {
        self.link.into_bus()
    }

    /// Instrument errors not yet returned in an `Outcome`, such as those of a failed run.
    pub fn take_errors(&mut self) -> Vec<(i32, String)> {
        self.link.take_errors()
    }

    fn module_index(&self, channel: u32) -> Result<usize> {
        self.modules.iter()
            .position(|module| module.has_channel(channel))
            .ok_or(Error::UnknownChannel(channel))
    }

    /// Resets the instrument and forgets all cached configuration.
    pub fn reset(&mut self) -> Result<()> {
        self.global = GlobalState::default();
        for module in &mut self.modules {
            module.invalidate();
        }
        self.link.send(&Command::new("*RST"))
    }

    /// Aborts a running measurement.
    pub fn abort(&mut self) -> Result<()> {
        self.link.send(&Command::new("AB"))
    }

    /// Stops a free-running pulse generator output.
    pub fn stop_pulse_generator(&mut self) -> Result<()> {
        self.link.send(&Command::new("SPP"))
    }

    /// Routes one output of the SMU/PGU selector.
    pub fn set_selector(&mut self, port: u32, state: SelectorState) -> Result<()> {
        self.set_selector_cached(port, state, false)
    }

    fn set_selector_cached(&mut self, port: u32, state: SelectorState, force: bool) -> Result<()> {
        if !force && self.global.selector.get(&port) == Some(&state) {
            log::debug!("selector port {} already {:?}", port, state);
            return Ok(())
        }
        self.link.send(&Command::new("ERSSP").arg(port).arg(state.code()))?;
        self.global.selector.insert(port, state);
        Ok(())
    }

    fn configure_global(&mut self, test: &TestSetup, force: bool) -> Result<()> {
        let format = (test.format, test.output_mode);
        if force || self.global.format != Some(format) {
            self.link.send(&Command::new("FMT")
                .arg(test.format.code())
                .arg(test.output_mode.code()))?;
            self.global.format = Some(format);
        } else {
            log::debug!("format already {:?}", format);
        }

        if force || self.global.filter != Some(test.filter) {
            self.link.send(&Command::new("FL").arg(test.filter.code()))?;
            self.global.filter = Some(test.filter);
        } else {
            log::debug!("filter already {:?}", test.filter);
        }

        // time stamps are off after power-on and reset
        if force || self.global.timestamp.unwrap_or(false) != test.timestamp {
            self.link.send(&Command::new("TSC").arg(test.timestamp as u32))?;
            self.global.timestamp = Some(test.timestamp);
        } else {
            log::debug!("time stamp already {}", test.timestamp);
        }

        if force || self.global.adc.as_ref() != Some(&test.adc) {
            match &test.adc {
                AdcConfig::HighSpeed { samples, mode } => {
                    self.link.send(&Command::new("AV").arg(*samples).arg(mode.code()))?;
                }
                AdcConfig::PerType(settings) => {
                    for setting in settings {
                        self.link.send(&Command::new("AIT")
                            .arg(setting.adc.code())
                            .arg(setting.mode.code())
                            .arg(setting.coefficient))?;
                    }
                }
            }
            self.global.adc = Some(test.adc.clone());
        } else {
            log::debug!("ADC already {:?}", test.adc);
        }

        for selector in &test.selector {
            self.set_selector_cached(selector.port, selector.state, force)?;
        }
        Ok(())
    }

    /// Checks the whole test before any channel is touched.
    fn plan(&self, test: &TestSetup) -> Result<Plan> {
        let family = test.family()?;
        for channel in &test.channels {
            let index = self.module_index(channel.number)?;
            if channel.force.is_none() {
                return Err(Error::NoForceConfigured(channel.number))
            }
            self.modules[index].check(channel)?;
        }
        let measure = test.measure_mode()?;
        let sweep = match &measure {
            Some((mode, _)) => mode.is_sweep(),
            None => test.channels.iter().any(|channel| matches!(channel.force,
                Some(Force::StaircaseSweep(_)) | Some(Force::PulsedSweep(_)))),
        };
        Ok(Plan { family, measure, sweep })
    }

    fn configure_channel(&mut self, channel: &Channel, touched: &mut Vec<u32>) -> Result<()> {
        let index = self.module_index(channel.number)?;
        let Some(force) = &channel.force else {
            return Err(Error::NoForceConfigured(channel.number))
        };
        let number = channel.number;
        let module = &mut self.modules[index];
        if !touched.contains(&number) {
            touched.push(number);
        }
        module.connect(&mut self.link, number)?;
        // pulse generator timing governs its output state
        if !matches!(force, Force::PulseGenerator(_)) {
            module.set_series_resistance(&mut self.link, number, channel.series_resistance)?;
            module.set_adc_type(&mut self.link, number, channel.adc)?;
        }
        module.apply(&mut self.link, number, force)?;
        if let Some(measurement) = &channel.measurement {
            module.measure(&mut self.link, number, measurement, Some(force))?;
        }
        Ok(())
    }

    fn wait(&mut self, family: ModeFamily) -> Result<()> {
        let (query, done) = match family {
            ModeFamily::PulseGenerator => ("SPST?", 0),
            ModeFamily::Triggered | ModeFamily::Search => ("*OPC?", 1),
        };
        let options = *self.link.options();
        let started = Instant::now();
        loop {
            let response = self.link.query(&Command::new(query))?;
            if response.trim().trim_start_matches('+').parse::<i32>() == Ok(done) {
                return Ok(())
            }
            if let Some(timeout) = options.timeout {
                if started.elapsed() >= timeout {
                    return Err(Error::Timeout(timeout))
                }
            }
            if !options.poll_interval.is_zero() {
                sleep(options.poll_interval);
            }
        }
    }

    /// Reads a data block, retrying transient bus failures.
    fn read_retrying(&mut self) -> Result<Vec<u8>> {
        let attempts = self.link.options().read_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.link.read_raw() {
                Ok(data) => return Ok(data),
                Err(Error::Bus(error)) if attempt < attempts => {
                    log::warn!("read attempt {}/{} failed: {}", attempt, attempts, error);
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// Reads a sweep block, in as many pieces as the bus delivers it.
    fn read_sweep(&mut self, format: Format) -> Result<Vec<u8>> {
        let response = self.link.query(&Command::new("NUB?"))?;
        let mut data = self.link.read_raw()?;
        if format.is_binary() {
            return Ok(data)
        }
        let expected = match response.trim().trim_start_matches('+').parse::<usize>() {
            Ok(expected) => expected,
            Err(_) => {
                log::warn!("cannot parse pending value count {:?}", response);
                return Ok(data)
            }
        };
        log::debug!("{} values pending", expected);
        loop {
            let received = output::count_values(&String::from_utf8_lossy(&data));
            if received >= expected {
                return Ok(data)
            }
            let more = self.link.read_raw()?;
            if more.is_empty() {
                log::warn!("data ended after {} of {} values", received, expected);
                return Ok(data)
            }
            data.extend_from_slice(&more);
        }
    }

    fn read_output(&mut self, format: Format, sweep: bool) -> Result<Output> {
        let data = if sweep {
            self.read_sweep(format)?
        } else {
            self.read_retrying()?
        };
        Ok(Self::decode(format, data))
    }

    fn decode(format: Format, data: Vec<u8>) -> Output {
        if format.is_binary() {
            return Output::Binary(data)
        }
        let raw = String::from_utf8_lossy(&data).into_owned();
        match output::parse(format, &raw) {
            Ok(series) => Output::Series(series),
            Err(error) => {
                log::warn!("{}, returning raw output", error);
                Output::Raw(raw)
            }
        }
    }

    fn execute(&mut self, test: &TestSetup, options: RunOptions,
               touched: &mut Vec<u32>) -> Result<Option<Output>> {
        self.configure_global(test, options.force_new_setup)?;
        self.state = State::GlobalConfigured;
        log::debug!("state = {:?}", self.state);

        let plan = self.plan(test)?;
        for channel in &test.channels {
            self.configure_channel(channel, touched)?;
        }
        if plan.family == Some(ModeFamily::Triggered) {
            if let Some((mode, channels)) = &plan.measure {
                self.link.send(&Command::new("MM").arg(mode.code()).args(channels.iter().copied()))?;
            }
        }
        self.state = State::ChannelsConfigured;
        log::debug!("state = {:?}", self.state);

        let Some(family) = plan.family else {
            return Ok(None)
        };
        match family {
            ModeFamily::Triggered | ModeFamily::Search =>
                self.link.send(&Command::new("XE"))?,
            ModeFamily::PulseGenerator =>
                self.link.send(&Command::new("SPR"))?,
        }
        self.state = State::Triggered;
        log::debug!("state = {:?}", self.state);

        if options.wait {
            self.wait(family)?;
        }
        self.state = State::Completed;
        log::debug!("state = {:?}", self.state);

        if !options.auto_read || family == ModeFamily::PulseGenerator {
            return Ok(None)
        }
        let sweep = plan.sweep && family == ModeFamily::Triggered;
        self.read_output(test.format, sweep).map(Some)
    }

    fn teardown(&mut self, channels: &[u32]) {
        for &channel in channels {
            let Some(module) = self.modules.iter_mut().find(|module| module.has_channel(channel)) else {
                continue
            };
            if let Err(error) = module.force_zero(&mut self.link, channel) {
                log::warn!("cannot zero channel {}: {}", channel, error);
            }
            if let Err(error) = module.disconnect(&mut self.link, channel) {
                log::warn!("cannot disconnect channel {}: {}", channel, error);
            }
        }
    }

    /// Runs `body` and then tears down every channel it connected, whether it succeeded or not.
    fn supervise<T>(&mut self,
                    body: impl FnOnce(&mut Self, &mut Vec<u32>) -> Result<T>) -> Result<T> {
        self.state = State::Idle;
        let mut touched = Vec::new();
        let result = body(self, &mut touched);
        self.teardown(&touched);
        self.state = State::TornDown;
        log::debug!("state = {:?}", self.state);
        result
    }

    /// Runs a test. Every channel that was connected is zeroed and disconnected afterwards, also
    /// when the run fails. Instrument errors of a failed run stay available from `take_errors`.
    pub fn run(&mut self, test: &TestSetup, options: RunOptions) -> Result<Outcome> {
        let output = self.supervise(|session, touched| session.execute(test, options, touched))?;
        Ok(Outcome { output, errors: self.link.take_errors() })
    }

    /// Forces `force` on `channel` and measures `target` right away with a high-speed spot
    /// measurement (`TTI`, `TTV`, `TTIV`), which needs no trigger.
    pub fn high_speed_spot(&mut self, channel: u32, force: DcForce, target: Target,
                           current_range: Option<Range>,
                           voltage_range: Option<Range>) -> Result<Outcome> {
        log::debug!("high_speed_spot({}, {:?})", channel, target);
        let test = TestSetup::new(vec![Channel::builder(channel).dc_force(force).build()?])?;
        let output = self.supervise(|session, touched| {
            session.configure_global(&test, false)?;
            session.state = State::GlobalConfigured;
            session.plan(&test)?;
            let index = session.module_index(channel)?;
            session.modules[index]
                .high_speed_spot_command(channel, target, current_range, voltage_range)?;
            for setup in &test.channels {
                session.configure_channel(setup, touched)?;
            }
            session.state = State::ChannelsConfigured;
            session.modules[index]
                .high_speed_spot(&mut session.link, channel, target, current_range, voltage_range)?;
            session.state = State::Triggered;
            let data = session.read_retrying()?;
            session.link.check_errors()?;
            session.state = State::Completed;
            Ok(Self::decode(test.format, data))
        })?;
        Ok(Outcome { output: Some(output), errors: self.link.take_errors() })
    }

    /// Sweeps the voltage of `input` from `start` to `stop` and back while `ground` is held at
    /// 0 V, measuring the current into `input`.
    pub fn iv_sweep(&mut self, input: u32, ground: u32, start: f64, stop: f64, steps: u32,
                    compliance: f64) -> Result<Outcome> {
        let sweep = StaircaseSweep::voltage(start, stop, steps, compliance)
            .with_mode(SweepMode::LinearUpDown);
        let test = TestSetup::new(vec![
            Channel::builder(input)
                .staircase_sweep(sweep)
                .measure(Measurement::new(Target::Current, MeasureMode::StaircaseSweep))
                .build()?,
            Channel::builder(ground)
                .dc_force(DcForce::voltage(0.0, compliance))
                .build()?,
        ])?;
        self.run(&test, RunOptions::default())
    }

    /// Forces `force` on `channel` and measures `target` once.
    pub fn spot(&mut self, channel: u32, force: DcForce, target: Target,
                range: Option<Range>) -> Result<Outcome> {
        let mut measurement = Measurement::new(target, MeasureMode::Spot);
        measurement.range = range;
        let test = TestSetup::new(vec![
            Channel::builder(channel)
                .dc_force(force)
                .measure(measurement)
                .build()?,
        ])?;
        self.run(&test, RunOptions::default())
    }
}
