#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Config parsing must never panic; invalids are rejected gracefully by
    // either the parser or validate().
    let parsed = toml::from_str::<kegmeter_config::Config>(data);
    if let Ok(cfg) = parsed {
        let _ = cfg.validate();
    }
});
