//! Integration tests for the BLE link manager against the scripted radio

use std::time::Duration;

use rs_trainz_ble::{
    config::{BCORE_BATTERY_UUID, BCORE_MOTOR_UUID, BCORE_SERVICE_UUID},
    hal::MockRadio,
    traits::MotorLink,
    LinkConfig, LinkManager, LinkPhase,
};

/// Let spawned tasks run to idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

async fn start(radio: &MockRadio) -> LinkManager<MockRadio> {
    LinkManager::start(radio.clone(), LinkConfig::default())
        .await
        .unwrap()
}

async fn ready(radio: &MockRadio, address: u64) -> LinkManager<MockRadio> {
    let link = start(radio).await;
    link.connect();
    settle().await;
    radio.advertise(address);
    settle().await;
    assert_eq!(link.phase(), LinkPhase::Ready);
    link
}

// ============================================================================
// Connection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn scan_then_ready() {
    let radio = MockRadio::new();
    let link = start(&radio).await;
    let mut connection = link.subscribe_connection();
    assert_eq!(link.phase(), LinkPhase::Idle);

    link.connect();
    settle().await;
    assert_eq!(link.phase(), LinkPhase::Scanning);
    assert!(link.is_connecting());
    {
        let state = radio.state();
        assert!(state.scanning);
        assert_eq!(state.scan_filter, Some(BCORE_SERVICE_UUID));
    }

    radio.advertise(1);
    settle().await;
    assert!(link.is_connected());
    assert!(!link.is_connecting());
    assert!(connection.has_changed().unwrap());
    assert!(*connection.borrow_and_update());
    {
        let state = radio.state();
        assert!(!state.scanning);
        assert_eq!(state.resolved, [1]);
        assert!(state.released.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn connect_is_idempotent() {
    let radio = MockRadio::new();
    let link = start(&radio).await;

    link.connect();
    link.connect();
    settle().await;
    link.connect();
    settle().await;
    assert_eq!(radio.state().scans_started, 1);

    radio.advertise(1);
    settle().await;
    link.connect();
    settle().await;
    assert_eq!(radio.state().scans_started, 1);
    assert!(link.is_connected());
}

#[tokio::test(start_paused = true)]
async fn advertisement_ignored_when_not_scanning() {
    let radio = MockRadio::new();
    let link = start(&radio).await;

    radio.advertise(1);
    settle().await;
    assert_eq!(link.phase(), LinkPhase::Idle);
    assert!(radio.state().resolved.is_empty());
}

// ============================================================================
// Discovery Failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn failed_service_query_rescans() {
    let radio = MockRadio::new();
    radio.state().failing_service_queries = 1;
    let link = start(&radio).await;

    link.connect();
    settle().await;
    radio.advertise(1);
    settle().await;

    assert_eq!(link.phase(), LinkPhase::Scanning);
    assert!(!*link.subscribe_connection().borrow());
    {
        let state = radio.state();
        assert_eq!(state.released, [1]);
        assert_eq!(state.scans_started, 2);
        assert!(state.scanning);
    }

    radio.advertise(1);
    settle().await;
    assert!(link.is_connected());
    assert_eq!(radio.state().resolved, [1, 1]);
}

#[tokio::test(start_paused = true)]
async fn missing_service_rescans() {
    let radio = MockRadio::new();
    radio.state().services = vec![0x1234];
    let link = start(&radio).await;

    link.connect();
    settle().await;
    radio.advertise(1);
    settle().await;

    assert_eq!(link.phase(), LinkPhase::Scanning);
    assert_eq!(radio.state().released, [1]);
}

#[tokio::test(start_paused = true)]
async fn missing_characteristic_rescans() {
    let radio = MockRadio::new();
    radio.state().characteristics = vec![BCORE_BATTERY_UUID];
    let link = start(&radio).await;

    link.connect();
    settle().await;
    radio.advertise(1);
    settle().await;

    assert_eq!(link.phase(), LinkPhase::Scanning);
    assert_eq!(radio.state().released, [1]);
    assert_eq!(radio.state().scans_started, 2);

    radio.state().characteristics = vec![BCORE_BATTERY_UUID, BCORE_MOTOR_UUID];
    radio.advertise(2);
    settle().await;
    assert!(link.is_connected());
}

#[tokio::test(start_paused = true)]
async fn failed_characteristic_query_rescans() {
    let radio = MockRadio::new();
    radio.state().failing_characteristic_queries = 1;
    let link = start(&radio).await;

    link.connect();
    settle().await;
    radio.advertise(1);
    settle().await;

    assert_eq!(link.phase(), LinkPhase::Scanning);
    assert_eq!(radio.state().released, [1]);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_address_rescans() {
    let radio = MockRadio::new();
    radio.state().unresolvable.push(5);
    let link = start(&radio).await;

    link.connect();
    settle().await;
    radio.advertise(5);
    settle().await;

    assert_eq!(link.phase(), LinkPhase::Scanning);
    let state = radio.state();
    assert_eq!(state.scans_started, 2);
    assert!(state.resolved.is_empty());
    assert!(state.released.is_empty());
}

// ============================================================================
// Motor Writes
// ============================================================================

#[tokio::test(start_paused = true)]
async fn motor_levels_are_clamped() {
    let radio = MockRadio::new();
    let link = ready(&radio, 1).await;

    for level in [-5, 0x200, 0] {
        link.set_motor_speed(level);
        settle().await;
    }

    assert_eq!(
        radio.state().writes_to(BCORE_MOTOR_UUID),
        [vec![0x00, 0x00], vec![0x00, 0x80], vec![0x00, 0x00]]
    );
}

#[tokio::test(start_paused = true)]
async fn only_newest_level_written_when_behind() {
    let radio = MockRadio::new();
    let link = ready(&radio, 1).await;

    link.set_motor_speed(0x70);
    link.set_motor_speed(0x6f);
    link.set_motor_speed(0x6e);
    settle().await;

    assert_eq!(radio.state().writes_to(BCORE_MOTOR_UUID), [vec![0x00, 0x6e]]);
}

#[tokio::test(start_paused = true)]
async fn writes_dropped_until_ready() {
    let radio = MockRadio::new();
    let link = start(&radio).await;

    link.set_motor_speed(0x70);
    link.connect();
    settle().await;
    link.set_motor_speed(0x6f);
    radio.advertise(1);
    settle().await;

    assert!(link.is_connected());
    assert!(radio.state().writes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_failure_keeps_the_link() {
    let radio = MockRadio::new();
    let link = ready(&radio, 1).await;

    radio.state().fail_writes = true;
    link.set_motor_speed(0x70);
    settle().await;
    assert!(link.is_connected());
    assert!(radio.state().writes.is_empty());

    radio.state().fail_writes = false;
    link.set_motor_speed(0x6f);
    settle().await;
    assert_eq!(radio.state().writes_to(BCORE_MOTOR_UUID), [vec![0x00, 0x6f]]);
}

// ============================================================================
// Battery
// ============================================================================

#[tokio::test(start_paused = true)]
async fn battery_polled_on_interval() {
    let radio = MockRadio::new();
    let link = start(&radio).await;
    assert_eq!(link.battery_voltage(), None);

    link.connect();
    settle().await;
    radio.advertise(1);
    settle().await;
    assert_eq!(link.battery_voltage(), Some(7400));
    assert_eq!(radio.state().reads, 1);

    radio.state().battery = 7000u16.to_le_bytes().to_vec();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(link.battery_voltage(), Some(7000));

    // Short responses keep the last reading
    radio.state().battery = vec![0x01];
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(link.battery_voltage(), Some(7000));
    assert_eq!(radio.state().reads, 3);
}

// ============================================================================
// Link Drops
// ============================================================================

#[tokio::test(start_paused = true)]
async fn disconnect_rescans() {
    let radio = MockRadio::new();
    let link = ready(&radio, 1).await;
    let mut connection = link.subscribe_connection();
    assert!(*connection.borrow_and_update());

    radio.disconnect(1);
    settle().await;

    assert_eq!(link.phase(), LinkPhase::Scanning);
    assert!(connection.has_changed().unwrap());
    assert!(!*connection.borrow_and_update());
    {
        let state = radio.state();
        assert_eq!(state.released, [1]);
        assert_eq!(state.scans_started, 2);
        assert!(state.scanning);
    }

    // Battery poll ended with the session
    let reads = radio.state().reads;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(radio.state().reads, reads);

    radio.advertise(1);
    settle().await;
    assert!(link.is_connected());
}

#[tokio::test(start_paused = true)]
async fn disconnect_from_other_address_ignored() {
    let radio = MockRadio::new();
    let link = ready(&radio, 1).await;

    radio.disconnect(2);
    settle().await;

    assert!(link.is_connected());
    assert!(radio.state().released.is_empty());
}

// ============================================================================
// Initialize / Dispose
// ============================================================================

#[tokio::test(start_paused = true)]
async fn initialize_times_out_to_idle() {
    let radio = MockRadio::new();
    let link = LinkManager::start(radio.clone(), LinkConfig::default().with_init_budget(100, 5))
        .await
        .unwrap();

    assert!(!link.initialize().await);
    assert_eq!(link.phase(), LinkPhase::Idle);
    let state = radio.state();
    assert_eq!(state.scans_started, 1);
    assert_eq!(state.scans_stopped, 1);
    assert!(!state.scanning);
}

#[tokio::test(start_paused = true)]
async fn initialize_waits_for_the_train() {
    let radio = MockRadio::new();
    let link = start(&radio).await;

    let advertiser = radio.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(250)).await;
        advertiser.advertise(1);
    });

    assert!(link.initialize().await);
    assert_eq!(link.phase(), LinkPhase::Ready);
}

#[tokio::test(start_paused = true)]
async fn dispose_releases_and_stops_polling() {
    let radio = MockRadio::new();
    let link = ready(&radio, 1).await;
    let connection = link.subscribe_connection();

    link.dispose().await;
    assert_eq!(link.phase(), LinkPhase::Idle);
    assert!(!*connection.borrow());
    assert_eq!(radio.state().released, [1]);

    let reads = radio.state().reads;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(radio.state().reads, reads);

    link.set_motor_speed(0x70);
    settle().await;
    assert!(radio.state().writes.is_empty());

    // Start over
    link.connect();
    settle().await;
    assert_eq!(link.phase(), LinkPhase::Scanning);
    assert_eq!(radio.state().scans_started, 2);
}

#[tokio::test(start_paused = true)]
async fn dispose_while_scanning_stops_the_scan() {
    let radio = MockRadio::new();
    let link = start(&radio).await;

    link.connect();
    settle().await;
    link.dispose().await;

    assert_eq!(link.phase(), LinkPhase::Idle);
    let state = radio.state();
    assert_eq!(state.scans_stopped, 1);
    assert!(!state.scanning);
}

// ============================================================================
// Transition Guard
// ============================================================================

#[tokio::test(start_paused = true)]
async fn dispose_waits_for_discovery_in_flight() {
    let radio = MockRadio::new();
    let link = start(&radio).await;
    link.connect();
    settle().await;

    let gate = radio.hold_discovery();
    radio.advertise(1);
    settle().await;
    assert_eq!(link.phase(), LinkPhase::DiscoveringService);
    assert_eq!(radio.state().resolved, [1]);

    let finish_discovery = async {
        settle().await;
        // dispose is queued behind the discovery
        assert_eq!(link.phase(), LinkPhase::DiscoveringService);
        assert!(radio.state().released.is_empty());
        gate.notify_one();
    };
    tokio::join!(link.dispose(), finish_discovery);

    assert_eq!(link.phase(), LinkPhase::Idle);
    assert_eq!(radio.state().released, [1]);
    assert!(!*link.subscribe_connection().borrow());
}

#[tokio::test(start_paused = true)]
async fn connect_ignored_during_discovery() {
    let radio = MockRadio::new();
    let link = start(&radio).await;
    link.connect();
    settle().await;

    let gate = radio.hold_discovery();
    radio.advertise(1);
    settle().await;

    link.connect();
    settle().await;
    assert_eq!(link.phase(), LinkPhase::DiscoveringService);
    assert_eq!(radio.state().scans_started, 1);

    gate.notify_one();
    settle().await;
    assert!(link.is_connected());
    assert_eq!(radio.state().scans_started, 1);
}

#[tokio::test(start_paused = true)]
async fn second_advertisement_waits_for_discovery() {
    let radio = MockRadio::new();
    let link = start(&radio).await;
    link.connect();
    settle().await;

    let gate = radio.hold_discovery();
    radio.advertise(1);
    settle().await;
    radio.advertise(2);
    settle().await;
    assert_eq!(radio.state().resolved, [1]);

    gate.notify_one();
    settle().await;

    // The late hit arrives after ready and is ignored
    assert!(link.is_connected());
    let state = radio.state();
    assert_eq!(state.resolved, [1]);
    assert!(state.released.is_empty());
    assert_eq!(state.scans_started, 1);
}
