//! End-to-end sequencer scenarios on the simulated board
//!
//! The rig's reference scenario: pre=5, cycles=5, enab=5, disab=4 gives
//! 5 + 5*(5+4) = 50 injected transitions of which exactly the 5*5 = 25
//! unmasked-phase injections may reach the handler.

use std::time::Duration;

use irqlab_hal::{Level, SimGpio};
use irqlab_irqtest::{EngineError, MaskMode, Sequencer, SequencerConfig};

fn quick(mask_mode: MaskMode) -> SequencerConfig {
    SequencerConfig {
        pacing_ms: 0,
        mask_mode,
        ..SequencerConfig::default()
    }
}

fn run_reference_scenario(mask_mode: MaskMode) {
    let gpio = SimGpio::new();
    gpio.wire(21, 16);

    let config = quick(mask_mode);
    assert_eq!(config.total_injected(), 50);
    assert_eq!(config.expected_hits(), 25);

    let mut sequencer = Sequencer::open(&gpio, (16, 21), config).unwrap();
    let outcome = sequencer.run();

    // End-of-sequence surfaces as the restart-on-signal error, never Ok
    assert!(matches!(outcome, Err(EngineError::Interrupted)));
    assert_eq!(sequencer.hits(), 25);
    sequencer.close();
}

#[test]
fn gate_masking_delivers_only_unmasked_injections() {
    run_reference_scenario(MaskMode::Gate);
}

#[test]
fn retype_masking_delivers_only_unmasked_injections() {
    run_reference_scenario(MaskMode::Retype);
}

#[test]
fn injected_levels_alternate_from_the_initial_level() {
    let gpio = SimGpio::new();
    gpio.wire(21, 16);
    let mut sequencer = Sequencer::open(&gpio, (16, 21), quick(MaskMode::Gate)).unwrap();
    let _ = sequencer.run();
    // 50 sends alternating from Low: the even-numbered last send is High,
    // and the jumper carries it through to the input line
    assert_eq!(gpio.level(21).unwrap(), Level::High);
    assert_eq!(gpio.level(16).unwrap(), Level::High);
    sequencer.close();
}

#[test]
fn cancellation_interrupts_a_running_sequence() {
    let gpio = SimGpio::new();
    gpio.wire(21, 16);
    let config = SequencerConfig {
        pacing_ms: 5,
        cycles: 1000,
        ..quick(MaskMode::Gate)
    };
    let mut sequencer = Sequencer::open(&gpio, (16, 21), config).unwrap();
    let cancel = sequencer.cancel_token();

    let runner = std::thread::spawn(move || {
        let outcome = sequencer.run();
        assert!(matches!(outcome, Err(EngineError::Interrupted)));
        sequencer.close();
    });

    std::thread::sleep(Duration::from_millis(30));
    cancel.cancel();
    runner.join().unwrap();
}

#[test]
fn session_resources_are_free_after_each_run() {
    let gpio = SimGpio::new();
    gpio.wire(21, 16);
    for _ in 0..20 {
        let mut sequencer = Sequencer::open(&gpio, (16, 21), quick(MaskMode::Retype)).unwrap();
        let _ = sequencer.run();
        assert_eq!(sequencer.hits(), 25);
        sequencer.close();
    }
}

#[test]
fn initial_level_high_injects_the_complement_sequence() {
    let gpio = SimGpio::new();
    gpio.wire(21, 16);
    let config = SequencerConfig {
        initial_level: Level::High,
        cycles: 1,
        pre_events: 0,
        enabled_events: 1,
        disabled_events: 0,
        ..quick(MaskMode::Gate)
    };
    let mut sequencer = Sequencer::open(&gpio, (16, 21), config).unwrap();
    let _ = sequencer.run();
    assert_eq!(sequencer.hits(), 1);
    // The single unmasked injection drove the configured initial level
    assert_eq!(gpio.level(16).unwrap(), Level::High);
    sequencer.close();
}
