//! Integration tests for the throttle controller

use rs_trainz_ble::{
    drive::{DEPARTURE_LEVEL, FULL_SPEED, STOPPED},
    hal::{MockBus, MockLine, MockLink},
    IndicatorStatus, ThrottleController, TickOutcome,
};

type Throttle = ThrottleController<MockLink, MockBus, MockLine>;

fn connected(accel: u8, brake: u8) -> Throttle {
    ThrottleController::new(
        MockLink::connected(),
        MockBus::with_levels(accel, brake),
        MockLine::new(),
        MockLine::new(),
    )
    .unwrap()
}

fn set_levers(throttle: &mut Throttle, accel: u8, brake: u8) {
    throttle.reader_mut().bus_mut().set_levels(accel, brake);
}

fn run(throttle: &mut Throttle, ticks: usize) {
    for _ in 0..ticks {
        throttle.tick().unwrap();
    }
}

#[test]
fn connect_then_drive() {
    let mut throttle = ThrottleController::new(
        MockLink::new(),
        MockBus::with_levels(2, 0),
        MockLine::new(),
        MockLine::new(),
    )
    .unwrap();

    assert_eq!(throttle.tick().unwrap(), TickOutcome::Connecting);
    assert_eq!(throttle.tick().unwrap(), TickOutcome::Waiting);
    assert!(throttle.link().sent().is_empty());

    throttle.link().set_connected(true);
    let outcome = throttle.tick().unwrap();
    assert!(matches!(outcome, TickOutcome::Drove(u) if u.changed && u.speed == DEPARTURE_LEVEL));
    assert_eq!(throttle.state().indicator, IndicatorStatus::SteadyOn);
    assert_eq!(throttle.link().sent(), [DEPARTURE_LEVEL as i32]);
}

#[test]
fn accel_level_3_steps_every_sixth_tick() {
    let mut throttle = connected(3, 0);
    throttle.tick().unwrap();
    assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL);

    for step in 1..=5u8 {
        for _ in 0..5 {
            throttle.tick().unwrap();
            assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL - (step - 1));
        }
        throttle.tick().unwrap();
        assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL - step);
    }

    assert_eq!(throttle.link().sent(), [0x70, 0x6f, 0x6e, 0x6d, 0x6c, 0x6b]);
}

#[test]
fn brake_level_3_slows_every_eighth_tick() {
    let mut throttle = connected(5, 0);
    run(&mut throttle, 1 + 2 * 20);
    assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL - 20);

    set_levers(&mut throttle, 0, 3);
    throttle.link().clear_sent();

    for step in 1..=3u8 {
        for _ in 0..7 {
            throttle.tick().unwrap();
        }
        assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL - 20 + (step - 1));
        throttle.tick().unwrap();
        assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL - 20 + step);
    }
    assert_eq!(throttle.link().sent(), [0x5d, 0x5e, 0x5f]);
}

#[test]
fn braking_to_a_stop() {
    let mut throttle = connected(1, 0);
    run(&mut throttle, 1);

    set_levers(&mut throttle, 0, 9 - 1);
    run(&mut throttle, 200);

    assert_eq!(throttle.current_speed(), STOPPED);
    assert_eq!(throttle.link().last_sent(), Some(STOPPED as i32));
    // 0x70..=0x7a, then the snap to 0x80
    assert_eq!(throttle.link().sent().len(), 1 + 10 + 1);
}

#[test]
fn full_speed_is_reached_and_held() {
    let mut throttle = connected(5, 0);
    run(&mut throttle, 1 + 2 * DEPARTURE_LEVEL as usize + 20);

    assert_eq!(throttle.current_speed(), FULL_SPEED);
    assert_eq!(throttle.state().throttle_percent, 100);
    assert_eq!(throttle.link().last_sent(), Some(FULL_SPEED as i32));
    assert_eq!(throttle.link().sent().len(), 1 + DEPARTURE_LEVEL as usize);
}

#[test]
fn emergency_stop_latches_until_neutral() {
    let mut throttle = connected(2, 0);
    run(&mut throttle, 40);
    assert!(throttle.current_speed() < DEPARTURE_LEVEL);

    // Panic brake
    set_levers(&mut throttle, 0, 9);
    throttle.tick().unwrap();
    assert_eq!(throttle.current_speed(), STOPPED);
    assert_eq!(throttle.link().last_sent(), Some(STOPPED as i32));
    assert!(throttle.indicator().emergency_line().level);

    // Accelerator ignored while latched
    set_levers(&mut throttle, 4, 0);
    throttle.link().clear_sent();
    run(&mut throttle, 20);
    assert_eq!(throttle.current_speed(), STOPPED);
    assert!(throttle.link().sent().is_empty());
    assert!(throttle.state().emergency);
    assert_eq!(throttle.state().accel, 0);

    // Both levers at neutral releases the latch
    set_levers(&mut throttle, 0, 0);
    throttle.tick().unwrap();
    assert!(!throttle.state().emergency);
    assert!(!throttle.indicator().emergency_line().level);

    set_levers(&mut throttle, 1, 0);
    throttle.tick().unwrap();
    assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL);
}

#[test]
fn emergency_stop_survives_lamp_failure() {
    let mut throttle = connected(5, 0);
    run(&mut throttle, 20);
    assert_eq!(throttle.current_speed(), 0x67);

    set_levers(&mut throttle, 0, 9);
    throttle.indicator_mut().emergency_line_mut().fail = true;
    assert!(throttle.tick().is_err());
    assert_eq!(throttle.link().last_sent(), Some(STOPPED as i32));

    throttle.indicator_mut().emergency_line_mut().fail = false;
    run(&mut throttle, 50);
    assert_eq!(throttle.current_speed(), STOPPED);
    assert_eq!(throttle.link().last_sent(), Some(STOPPED as i32));
}

#[test]
fn link_drop_restarts_connection() {
    let mut throttle = connected(0, 9);
    throttle.tick().unwrap();
    assert!(throttle.indicator().emergency_line().level);

    throttle.link().set_connected(false);
    assert_eq!(throttle.tick().unwrap(), TickOutcome::Connecting);
    assert_eq!(throttle.link().connect_calls(), 1);
    assert!(!throttle.indicator().emergency_line().level);
    assert_eq!(throttle.state().indicator, IndicatorStatus::ScanningBlink);
}

#[test]
fn scanning_blink_blinks_while_connecting() {
    let mut throttle = ThrottleController::new(
        MockLink::new(),
        MockBus::new(),
        MockLine::new(),
        MockLine::new(),
    )
    .unwrap();

    run(&mut throttle, 8 * 6);
    let status = throttle.indicator().status_line();
    assert_eq!(status.rising_edges(), 3);
    assert_eq!(throttle.link().connect_calls(), 1);
}

#[test]
fn bus_failures_hold_the_lever() {
    let mut throttle = connected(5, 0);
    run(&mut throttle, 1);
    throttle.reader_mut().bus_mut().fail_next(6);
    run(&mut throttle, 6);

    assert_eq!(throttle.reader().failed_transfers(), 6);
    assert_eq!(throttle.current_speed(), DEPARTURE_LEVEL - 3);
    assert_eq!(throttle.state().accel, 5);
}

#[test]
fn unplugged_controller_stops_the_train() {
    let mut throttle = connected(3, 0);
    run(&mut throttle, 10);
    assert!(throttle.current_speed() < STOPPED);

    // Floating data line reads all ones
    throttle.reader_mut().bus_mut().set_frame([0xff; 5]);
    throttle.tick().unwrap();

    assert_eq!(throttle.current_speed(), STOPPED);
    assert!(throttle.state().emergency);
}
