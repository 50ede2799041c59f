use b1500::{
    Channel, DcForce, DummyBus, MeasureMode, Measurement, Output, RunOptions, Session,
    SessionOptions, StaircaseSweep, Target, TestSetup, Transaction,
};

fn demo_setup() -> b1500::Result<TestSetup> {
    TestSetup::new(vec![
        Channel::builder(1)
            .staircase_sweep(StaircaseSweep::voltage(0.0, 5.0, 11, 1e-3))
            .measure(Measurement::new(Target::Current, MeasureMode::StaircaseSweep))
            .build()?,
        Channel::builder(2)
            .dc_force(DcForce::voltage(0.0, 1e-3))
            .build()?,
    ])
}

#[cfg(feature = "serde")]
fn load_setup() -> b1500::Result<TestSetup> {
    let Some(path) = std::env::args().nth(1) else {
        return demo_setup()
    };
    let text = std::fs::read_to_string(&path)?;
    let test: TestSetup = toml::from_str(&text)
        .map_err(|error| b1500::Error::InvalidSetup(format!("{}: {}", path, error)))?;
    // validates the combination of channels
    TestSetup::new(test.channels.clone())?;
    Ok(test)
}

#[cfg(not(feature = "serde"))]
fn load_setup() -> b1500::Result<TestSetup> {
    if std::env::args().nth(1).is_some() {
        log::warn!("loading a test setup requires the `serde` feature, running the demo");
    }
    demo_setup()
}

fn main() -> b1500::Result<()> {
    env_logger::init();
    let test = load_setup()?;
    let mut session = Session::open(DummyBus::default(), SessionOptions::default())?;
    for module in session.modules() {
        println!("slot {}: {} {} channels {:?}", module.slot(), module.capability().model(),
                 module.capability().name, module.channels());
    }
    session.bus_mut().clear_transcript();

    let outcome = session.run(&test, RunOptions::default())?;
    for transaction in session.bus().transcript() {
        match transaction {
            Transaction::Write(command) => println!("> {}", command),
            Transaction::Query(command) if command == "ERR?" => (),
            Transaction::Query(command) => println!("? {}", command),
            Transaction::Read => println!("< (read)"),
        }
    }
    match outcome.output {
        Some(Output::Series(series)) => println!("{} rows {:?}", series.len(), series.columns),
        Some(Output::Raw(raw)) => println!("raw output {:?}", raw),
        Some(Output::Binary(data)) => println!("{} bytes of binary output", data.len()),
        None => println!("no output"),
    }
    for (code, message) in outcome.errors {
        println!("instrument error {}: {}", code, message);
    }
    Ok(())
}
