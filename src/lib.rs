//! Driver library for the Keysight B1500 family of semiconductor parameter analyzers.
//!
//! A measurement is described declaratively as a [`TestSetup`]; a [`Session`] turns it into
//! the instrument's ASCII command sequence, runs it over a [`Bus`], reads back the data and
//! always returns every channel it touched to zero output and disconnects it.

pub mod sys;
mod cmd;
mod range;
mod capability;
mod config;
mod setup;
mod link;
mod module;
mod output;
mod session;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown module model {0:?}")]
    UnknownModel(String),
    #[error("channel {0} does not exist on any installed module")]
    UnknownChannel(u32),
    #[error("range {range:?} is not available for {quantity:?} on {model}")]
    IllegalRange {
        model: &'static str,
        quantity: Quantity,
        range: Range,
    },
    #[error("illegal search parameter: {0}")]
    IllegalSearchParameter(String),
    #[error("channel {0} has more than one force configured")]
    MultipleForces(u32),
    #[error("channel {0} has no force configured")]
    NoForceConfigured(u32),
    #[error("test setup mixes measurement modes {first:?} and {second:?}")]
    ConflictingMeasurementModes {
        first: ModeFamily,
        second: ModeFamily,
    },
    #[error("invalid setup: {0}")]
    InvalidSetup(String),
    #[error("{feature} is not implemented by {model}")]
    NotImplemented {
        model: &'static str,
        feature: &'static str,
    },
    #[error("instrument error {code}: {message}")]
    Instrument {
        code: i32,
        message: String,
    },
    #[error("cannot parse instrument output: {0}")]
    UnparsableOutput(String),
    #[error("operation did not complete within {0:?}")]
    Timeout(std::time::Duration),
    #[error("bus I/O error: {0}")]
    Bus(#[from] std::io::Error),
}

pub type Result<T> =
    core::result::Result<T, Error>;

pub use sys::{
    Bus,
    dummy::{DummyBus, Transaction},
    stream::StreamBus,
};

pub use cmd::Command;

pub use range::{
    Quantity,
    Range,
    smallest_voltage_range,
    smallest_current_range,
};

pub use capability::{
    ModuleKind,
    Features,
    SearchLimits,
    Capability,
    lookup,
};

pub use config::{
    SessionOptions,
    RunOptions,
};

pub use setup::{
    Target,
    MeasureMode,
    MeasureSide,
    SweepMode,
    AutoAbort,
    PostOutput,
    Polarity,
    AdcType,
    AdcMode,
    AdcSetting,
    AdcConfig,
    Format,
    OutputMode,
    Filter,
    SelectorPort,
    SelectorState,
    SearchKind,
    SearchMode,
    SearchOutput,
    SearchControl,
    DcForce,
    StaircaseSweep,
    PulsedSweep,
    PulsedSpot,
    SearchTarget,
    Search,
    PulseGenerator,
    PulseMode,
    PulseSignal,
    PulseSwitch,
    LoadImpedance,
    Measurement,
    Force,
    ModeFamily,
    Channel,
    ChannelBuilder,
    TestSetup,
};

pub use link::Link;

pub use module::Module;

pub use output::{
    Series,
    Output,
    parse,
};

pub use session::{
    State,
    Outcome,
    Session,
};
