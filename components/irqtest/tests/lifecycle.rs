//! Session lifecycle across the registry, with real engines on the
//! simulated board

use std::sync::Arc;

use irqlab_hal::{ManualClock, SimGpio};
use irqlab_irqtest::{
    EngineError, MaskMode, PinSet, Sequencer, SequencerConfig, SessionTable, Validator,
    ValidatorConfig,
};

fn quick() -> SequencerConfig {
    SequencerConfig {
        pacing_ms: 0,
        mask_mode: MaskMode::Gate,
        ..SequencerConfig::default()
    }
}

#[test]
fn one_session_per_pair_slot() {
    let pins = PinSet::Pairs(vec![(16, 21), (17, 22)]);
    pins.validate().unwrap();

    let gpio = SimGpio::new();
    gpio.wire(21, 16);
    gpio.wire(22, 17);

    let mut table: SessionTable<Sequencer> = SessionTable::new(pins.slots());

    table
        .open_with(0, || Sequencer::open(&gpio, (16, 21), quick()))
        .unwrap();
    table
        .open_with(1, || Sequencer::open(&gpio, (17, 22), quick()))
        .unwrap();

    // The slot is busy, and so is the hardware underneath it
    assert!(matches!(
        table.open_with(0, || Sequencer::open(&gpio, (16, 21), quick())),
        Err(EngineError::SlotBusy { index: 0 })
    ));

    // Closing the slot releases the pair for a fresh open
    if let Some(sequencer) = table.take(0) {
        sequencer.close();
    }
    table
        .open_with(0, || Sequencer::open(&gpio, (16, 21), quick()))
        .unwrap();

    assert_eq!(table.open_slots().count(), 2);
}

#[test]
fn pair_conflicts_surface_through_the_opener() {
    let gpio = SimGpio::new();
    gpio.wire(21, 16);

    let mut table: SessionTable<Sequencer> = SessionTable::new(2);
    table
        .open_with(0, || Sequencer::open(&gpio, (16, 21), quick()))
        .unwrap();

    // A different slot, same physical pair: the hardware conflict
    // propagates and the slot stays empty
    assert!(matches!(
        table.open_with(1, || Sequencer::open(&gpio, (16, 21), quick())),
        Err(EngineError::Hal(_))
    ));
    assert!(table.get(1).is_none());
}

#[test]
fn validator_singles_fill_their_own_table() {
    let pins = PinSet::Singles(vec![16, 17, 18]);
    pins.validate().unwrap();

    let gpio = SimGpio::new();
    let clock = Arc::new(ManualClock::new());
    let mut table: SessionTable<Validator> = SessionTable::new(pins.slots());

    for (slot, pin) in [16u32, 17, 18].into_iter().enumerate() {
        let clock = clock.clone();
        let gpio = gpio.clone();
        table
            .open_with(slot, move || {
                Validator::open(&gpio, clock, pin, ValidatorConfig::default())
            })
            .unwrap();
    }
    assert_eq!(table.open_slots().count(), 3);

    // Close everything; the board is fully free again
    for slot in 0..3 {
        assert!(table.close(slot));
    }
    table
        .open_with(0, || {
            Validator::open(&gpio, clock.clone(), 16, ValidatorConfig::default())
        })
        .unwrap();
}
